//! Error handling for texdocx conversions
//!
//! Fatal conditions are [`ConversionError`] values that propagate to the
//! binary. Problems scoped to one figure or asset are reported as
//! [`ConversionWarning`]s and never abort the pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Conversion error type
#[derive(Debug, Error)]
pub enum ConversionError {
    /// An inclusion directive points at a file that does not exist
    #[error("unable to locate input file: {}", .path.display())]
    UnresolvedInclusion { path: PathBuf },
    /// A file includes itself, directly or through other files
    #[error("inclusion cycle: {}", display_chain(.chain))]
    InclusionCycle { chain: Vec<PathBuf> },
    /// A tabular region opens inside another one
    #[error("nested tabular at line {line}: a second \\begin{{tabular}} before the matching \\end{{tabular}}")]
    NestedTable { line: usize },
    /// Invalid input
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    /// Configuration could not be loaded
    #[error("configuration error: {message}")]
    Config { message: String },
    /// A required external program is not installed
    #[error("required program `{program}` not found")]
    ToolMissing { program: String },
    /// The document converter ran but failed
    #[error("{program} failed with {status}")]
    Converter { program: String, status: String },
    /// The converter's document model could not be read or written
    #[error(transparent)]
    Model(#[from] texdocx_ir::ModelError),
    /// IO error (for file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for conversion operations
pub type ConversionResult<T> = Result<T, ConversionError>;

// Convenience constructors for errors
impl ConversionError {
    pub fn unresolved(path: impl Into<PathBuf>) -> Self {
        ConversionError::UnresolvedInclusion { path: path.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ConversionError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        ConversionError::Config {
            message: message.into(),
        }
    }
}

/// Failure to produce a usable image for one figure.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("original file not found: {}", .path.display())]
    NotFound { path: PathBuf },
    #[error("unsupported file format: {}", .path.display())]
    Unsupported { path: PathBuf },
    #[error("required conversion tool `{program}` not found")]
    ToolMissing { program: String },
    #[error("failed to convert {} to PNG: {program} exited with {status}", .path.display())]
    ToolFailed {
        path: PathBuf,
        program: String,
        status: String,
    },
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl AssetError {
    pub fn not_found(path: &Path) -> Self {
        AssetError::NotFound {
            path: path.to_path_buf(),
        }
    }
}

/// Conversion warnings (non-fatal issues)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionWarning {
    pub message: String,
    pub line: Option<usize>,
    pub suggestion: Option<String>,
}

impl ConversionWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            suggestion: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl From<AssetError> for ConversionWarning {
    fn from(err: AssetError) -> Self {
        let warning = ConversionWarning::new(err.to_string());
        match err {
            AssetError::ToolMissing { .. } => {
                warning.with_suggestion("install ImageMagick and poppler-utils")
            }
            _ => warning,
        }
    }
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(l) = self.line {
            write!(f, "Warning at line {}: {}", l, self.message)?;
        } else {
            write!(f, "Warning: {}", self.message)?;
        }
        if let Some(ref sug) = self.suggestion {
            write!(f, " ({})", sug)?;
        }
        Ok(())
    }
}

/// Conversion output with optional warnings
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// The converted content
    pub content: String,
    /// Any warnings generated during conversion
    pub warnings: Vec<ConversionWarning>,
}

impl ConversionOutput {
    pub fn new(content: String) -> Self {
        Self {
            content,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(content: String, warnings: Vec<ConversionWarning>) -> Self {
        Self { content, warnings }
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_inclusion_names_path() {
        let err = ConversionError::unresolved("paper/sections/intro.tex");
        assert!(err.to_string().contains("paper/sections/intro.tex"));
    }

    #[test]
    fn test_cycle_lists_chain() {
        let err = ConversionError::InclusionCycle {
            chain: vec![PathBuf::from("a.tex"), PathBuf::from("b.tex"), PathBuf::from("a.tex")],
        };
        assert_eq!(err.to_string(), "inclusion cycle: a.tex -> b.tex -> a.tex");
    }

    #[test]
    fn test_nested_table_message() {
        let err = ConversionError::NestedTable { line: 12 };
        assert!(err.to_string().contains("line 12"));
        assert!(err.to_string().contains("\\begin{tabular}"));
    }

    #[test]
    fn test_missing_tool_warning_has_suggestion() {
        let warning: ConversionWarning = AssetError::ToolMissing {
            program: "pdftoppm".to_string(),
        }
        .into();
        let msg = warning.to_string();
        assert!(msg.contains("pdftoppm"));
        assert!(msg.contains("poppler-utils"));
    }

    #[test]
    fn test_conversion_output() {
        let output = ConversionOutput::new("hello".to_string());
        assert!(!output.has_warnings());

        let output_with_warn = ConversionOutput::with_warnings(
            "hello".to_string(),
            vec![ConversionWarning::new("test warning").at_line(1)],
        );
        assert!(output_with_warn.has_warnings());
        assert_eq!(
            output_with_warn.warnings[0].to_string(),
            "Warning at line 1: test warning"
        );
    }
}
