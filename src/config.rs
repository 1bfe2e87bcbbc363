//! Pipeline options and the optional TOML configuration file.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::utils::error::{ConversionError, ConversionResult};

/// How a canonicalized figure is centered in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum FigureStrategy {
    /// `\centering` right after `\begin{figure}`
    Centering,
    /// a `center` environment inside the figure
    CenterEnv,
    /// the image wrapped in `\centerline{..}`
    #[default]
    CenterLine,
    /// no figure container and no caption: the image between blank lines
    Paragraph,
}

impl FigureStrategy {
    pub const ALL: [FigureStrategy; 4] = [
        FigureStrategy::Centering,
        FigureStrategy::CenterEnv,
        FigureStrategy::CenterLine,
        FigureStrategy::Paragraph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FigureStrategy::Centering => "centering",
            FigureStrategy::CenterEnv => "center-env",
            FigureStrategy::CenterLine => "center-line",
            FigureStrategy::Paragraph => "paragraph",
        }
    }
}

impl fmt::Display for FigureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External programs the pipeline shells out to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Rasterizer for vector formats (EPS, PS, SVG)
    /// Default: `convert` (ImageMagick)
    pub vector_converter: String,

    /// Rasterizer for page-description formats (PDF)
    /// Default: `pdftoppm` (poppler)
    pub page_rasterizer: String,

    /// Longest side in pixels when the filter rasterizes a PDF image
    /// Default: 1024
    pub raster_scale: u32,

    /// Document converter
    /// Default: `pandoc`
    pub pandoc: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            vector_converter: "convert".to_string(),
            page_rasterizer: "pdftoppm".to_string(),
            raster_scale: 1024,
            pandoc: "pandoc".to_string(),
        }
    }
}

/// Options for the LaTeX preprocessing pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Leading path segment that may be duplicated in `\input` and
    /// `\includegraphics` paths depending on where the manuscript was built
    /// Default: `paper`
    pub root_alias: String,

    /// Width given to every canonicalized image
    /// Default: `0.8\textwidth`
    pub figure_width: String,

    /// Figure centering strategy
    /// Default: [`FigureStrategy::CenterLine`]
    pub figure_strategy: FigureStrategy,

    pub tools: ToolConfig,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            root_alias: "paper".to_string(),
            figure_width: "0.8\\textwidth".to_string(),
            figure_strategy: FigureStrategy::default(),
            tools: ToolConfig::default(),
        }
    }
}

impl PipelineOptions {
    /// Create new options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Same options with another figure strategy
    pub fn with_strategy(&self, figure_strategy: FigureStrategy) -> Self {
        Self {
            figure_strategy,
            ..self.clone()
        }
    }

    /// Apply the values present in a configuration file.
    pub fn apply(&mut self, file: &ConfigFile) {
        if let Some(alias) = &file.root_alias {
            self.root_alias = alias.trim_matches('/').to_string();
        }
        if let Some(width) = &file.figure_width {
            self.figure_width = width.clone();
        }
        if let Some(strategy) = file.strategies.first() {
            self.figure_strategy = *strategy;
        }
        if let Some(tools) = &file.tools {
            self.tools = tools.clone();
        }
    }
}

/// Contents of a `texdocx.toml` file. Every key is optional.
///
/// ```toml
/// root_alias = "paper"
/// figure_width = "0.8\\textwidth"
/// strategies = ["center-line", "paragraph"]
/// output_dir = "result"
/// reference_doc = "template.docx"
///
/// [tools]
/// page_rasterizer = "/opt/poppler/bin/pdftoppm"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub root_alias: Option<String>,
    pub figure_width: Option<String>,
    pub strategies: Vec<FigureStrategy>,
    pub output_dir: Option<PathBuf>,
    pub reference_doc: Option<PathBuf>,
    pub tools: Option<ToolConfig>,
}

impl ConfigFile {
    pub fn parse(input: &str) -> ConversionResult<Self> {
        toml::from_str(input).map_err(|e| ConversionError::config(e.to_string()))
    }

    pub fn load(path: &Path) -> ConversionResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConversionError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }
}
