//! Driving pandoc: bibliography and template discovery, intermediate files,
//! and the converter command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use fxhash::FxHashSet;
use tracing::{debug, info, warn};

use crate::config::{FigureStrategy, PipelineOptions};
use crate::core::assets::AssetResolver;
use crate::core::filter::context::{ACRONYMS_ENV, RESOURCE_DIR_ENV};
use crate::core::preprocess::{normalize_file, render_strategy};
use crate::utils::error::{ConversionError, ConversionResult, ConversionWarning};

/// Name of the filter executable pandoc runs with `-F`.
pub const FILTER_PROGRAM: &str = "texdocx-filter";
/// Template used when no reference document is given.
pub const DEFAULT_REFERENCE_DOC: &str = "template.docx";

/// First `*.bib` file (by name) in `input_dir`, else in `<input_dir>/<alias>`.
pub fn find_bibliography(input_dir: &Path, root_alias: &str) -> Option<PathBuf> {
    [input_dir.to_path_buf(), input_dir.join(root_alias)]
        .iter()
        .find_map(|dir| first_with_extension(dir, "bib"))
}

fn first_with_extension(dir: &Path, ext: &str) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext)))
        .collect();
    found.sort();
    found.into_iter().next()
}

/// `acronyms.tex` next to the manuscript, or in its alias directory.
pub fn find_acronyms(input_dir: &Path, root_alias: &str) -> Option<PathBuf> {
    [input_dir.join("acronyms.tex"), input_dir.join(root_alias).join("acronyms.tex")]
        .into_iter()
        .find(|p| p.is_file())
}

/// Pick the reference document. An explicit path is used as given. Otherwise
/// `template.docx` in the working directory, then in `input_dir`, is offered
/// to `confirm`; declining converts without a template.
pub fn resolve_reference_doc<F>(
    explicit: Option<PathBuf>,
    input_dir: &Path,
    confirm: F,
) -> Option<PathBuf>
where
    F: FnOnce(&Path) -> bool,
{
    if explicit.is_some() {
        return explicit;
    }
    let candidate = [PathBuf::from(DEFAULT_REFERENCE_DOC), input_dir.join(DEFAULT_REFERENCE_DOC)]
        .into_iter()
        .find(|p| p.is_file())?;
    if confirm(&candidate) {
        Some(candidate)
    } else {
        info!("Converting without a reference document");
        None
    }
}

/// Intermediate `.tex` path for one strategy.
pub fn intermediate_path(output_dir: &Path, strategy: FigureStrategy, several: bool) -> PathBuf {
    if several {
        output_dir.join(format!("main_pandoc_{}.tex", strategy))
    } else {
        output_dir.join("main_pandoc.tex")
    }
}

/// Output document path for one strategy: `<stem>_<strategy>.docx` when
/// several strategies are produced.
pub fn output_path(output: &Path, strategy: FigureStrategy, several: bool) -> PathBuf {
    if !several {
        return output.to_path_buf();
    }
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "docx".to_string());
    output.with_file_name(format!("{}_{}.{}", stem, strategy, ext))
}

/// The filter executable installed next to the running binary, or the bare
/// name for a lookup on `PATH`.
pub fn filter_program() -> PathBuf {
    let name = format!("{}{}", FILTER_PROGRAM, std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .filter(|p| p.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}

/// One pandoc run.
#[derive(Debug, Clone)]
pub struct PandocCommand {
    pub program: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub filter: PathBuf,
    pub resource_dir: PathBuf,
    pub bibliography: Option<PathBuf>,
    pub reference_doc: Option<PathBuf>,
    pub acronyms: Option<PathBuf>,
}

impl PandocCommand {
    /// Command-line arguments, without the program name.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-s".to_string(),
            self.input.display().to_string(),
            "-f".to_string(),
            "latex+raw_tex".to_string(),
            "--citeproc".to_string(),
        ];
        if let Some(bib) = &self.bibliography {
            args.push("--bibliography".to_string());
            args.push(bib.display().to_string());
        }
        args.push("-F".to_string());
        args.push(self.filter.display().to_string());
        args.push("--resource-path".to_string());
        args.push(self.resource_dir.display().to_string());
        if let Some(doc) = &self.reference_doc {
            args.push("--reference-doc".to_string());
            args.push(doc.display().to_string());
        }
        args.push("-o".to_string());
        args.push(self.output.display().to_string());
        args
    }

    pub fn run(&self) -> ConversionResult<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args()).env(RESOURCE_DIR_ENV, &self.resource_dir);
        if let Some(acronyms) = &self.acronyms {
            cmd.env(ACRONYMS_ENV, acronyms);
        }
        info!("Running {} {}", self.program, self.args().join(" "));
        let status = cmd.status().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConversionError::ToolMissing {
                    program: self.program.clone(),
                }
            } else {
                ConversionError::Io(e)
            }
        })?;
        if !status.success() {
            return Err(ConversionError::Converter {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }
        info!("Conversion successful! Output file: {}", self.output.display());
        Ok(())
    }
}

/// Everything needed to turn one manuscript into Word documents.
#[derive(Debug, Clone)]
pub struct ConvertJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub output_dir: PathBuf,
    pub strategies: Vec<FigureStrategy>,
    pub bibliography: Option<PathBuf>,
    pub reference_doc: Option<PathBuf>,
    /// Stop after writing the intermediate files
    pub preprocess_only: bool,
    pub options: PipelineOptions,
}

/// Result for one figure strategy.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub strategy: FigureStrategy,
    pub intermediate: PathBuf,
    pub output: Option<PathBuf>,
    pub warnings: Vec<ConversionWarning>,
}

/// Reject anything but a `.tex` input.
pub fn validate_input(path: &Path) -> ConversionResult<()> {
    let is_tex = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("tex"));
    if !is_tex {
        return Err(ConversionError::invalid(format!(
            "input file must have a .tex extension: {}",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(ConversionError::invalid(format!(
            "input file not found: {}",
            path.display()
        )));
    }
    Ok(())
}

impl ConvertJob {
    pub fn input_dir(&self) -> PathBuf {
        self.input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Preprocess once, then render, write and (unless `preprocess_only`)
    /// convert every strategy.
    pub fn run(&self) -> ConversionResult<Vec<StrategyOutcome>> {
        validate_input(&self.input)?;
        let input_dir = self.input_dir();
        let normalized = normalize_file(&self.input, &self.options)?;
        let resolver = AssetResolver::new(&input_dir, &self.options);
        fs::create_dir_all(&self.output_dir)?;

        let strategies = if self.strategies.is_empty() {
            vec![self.options.figure_strategy]
        } else {
            self.strategies.clone()
        };
        let several = strategies.len() > 1;
        let bibliography = self
            .bibliography
            .clone()
            .or_else(|| find_bibliography(&input_dir, &self.options.root_alias));
        match &bibliography {
            Some(bib) => info!("Using bibliography {}", bib.display()),
            None => warn!("No .bib file detected. Proceeding without bibliography."),
        }

        // Image resolution does not depend on the strategy, so the same
        // warning comes back once per strategy.
        let mut reported: FxHashSet<String> = FxHashSet::default();
        let mut outcomes = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            let options = self.options.with_strategy(strategy);
            let rendered = render_strategy(&normalized, &resolver, &options);
            let intermediate = intermediate_path(&self.output_dir, strategy, several);
            fs::write(&intermediate, &rendered.content)?;
            info!("Wrote {} ({} figure strategy)", intermediate.display(), strategy);
            debug!("last lines of {}:\n{}", intermediate.display(), tail(&rendered.content, 10));
            for warning in &rendered.warnings {
                if reported.insert(warning.to_string()) {
                    warn!("{}", warning);
                }
            }

            let output = if self.preprocess_only {
                None
            } else {
                let output = output_path(&self.output, strategy, several);
                PandocCommand {
                    program: self.options.tools.pandoc.clone(),
                    input: intermediate.clone(),
                    output: output.clone(),
                    filter: filter_program(),
                    resource_dir: input_dir.clone(),
                    bibliography: bibliography.clone(),
                    reference_doc: self.reference_doc.clone(),
                    acronyms: find_acronyms(&input_dir, &self.options.root_alias),
                }
                .run()?;
                Some(output)
            };
            outcomes.push(StrategyOutcome {
                strategy,
                intermediate,
                output,
                warnings: rendered.warnings,
            });
        }
        Ok(outcomes)
    }
}

fn tail(content: &str, lines: usize) -> String {
    let all: Vec<&str> = content.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
