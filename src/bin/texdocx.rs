//! texdocx CLI - LaTeX manuscript to Word through pandoc

#[cfg(feature = "cli")]
use anyhow::{Context, Result};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::io::{self, BufRead, IsTerminal, Write};
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};
#[cfg(feature = "cli")]
use texdocx::{
    pandoc::{resolve_reference_doc, ConvertJob},
    ConfigFile, FigureStrategy, PipelineOptions,
};
#[cfg(feature = "cli")]
use tracing::{error, info, warn};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "texdocx")]
#[command(version)]
#[command(about = "Convert a LaTeX manuscript to DOCX with pandoc", long_about = None)]
struct Cli {
    /// Root .tex file of the manuscript
    input: PathBuf,

    /// Output DOCX path; with several strategies each gets a `_<strategy>` suffix
    #[arg(short, long, default_value = "output.docx")]
    output: PathBuf,

    /// Reference DOCX used as the style template
    #[arg(long)]
    refdoc: Option<PathBuf>,

    /// Figure centering strategy; repeat to produce one document per strategy
    #[arg(long = "strategy", value_enum)]
    strategies: Vec<FigureStrategy>,

    /// Directory for the intermediate .tex files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bibliography file (default: first .bib next to the input, then in paper/)
    #[arg(long)]
    bib: Option<PathBuf>,

    /// Only write the preprocessed .tex, do not run pandoc
    #[arg(long)]
    no_convert: bool,

    /// Accept the default reference document without asking
    #[arg(short, long)]
    yes: bool,
}

#[cfg(feature = "cli")]
fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn run(cli: Cli) -> Result<()> {
    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    let mut options = PipelineOptions::new();
    options.apply(&file);

    texdocx::pandoc::validate_input(&cli.input)?;
    let input = std::fs::canonicalize(&cli.input)
        .with_context(|| format!("cannot resolve {}", cli.input.display()))?;
    let input_dir = input.parent().map(Path::to_path_buf).unwrap_or_default();

    let strategies = if !cli.strategies.is_empty() {
        cli.strategies.clone()
    } else if !file.strategies.is_empty() {
        file.strategies.clone()
    } else {
        vec![FigureStrategy::default()]
    };
    let output_dir = cli
        .output_dir
        .clone()
        .or_else(|| file.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("result"));

    let reference_doc = if cli.no_convert {
        None
    } else {
        let assume_yes = cli.yes;
        resolve_reference_doc(cli.refdoc.clone().or(file.reference_doc.clone()), &input_dir, |path| {
            assume_yes || !io::stdin().is_terminal() || confirm(path)
        })
    };

    let job = ConvertJob {
        input,
        output: cli.output.clone(),
        output_dir,
        strategies,
        bibliography: cli.bib.clone(),
        reference_doc,
        preprocess_only: cli.no_convert,
        options,
    };
    let outcomes = job.run()?;

    // Every strategy renders the same figures
    let unchanged = outcomes.first().map_or(0, |o| o.warnings.len());
    for outcome in &outcomes {
        match &outcome.output {
            Some(path) => info!("{}: {}", outcome.strategy, path.display()),
            None => info!("{}: {}", outcome.strategy, outcome.intermediate.display()),
        }
    }
    if unchanged > 0 {
        warn!("{} figure(s) were left unchanged", unchanged);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn confirm(path: &Path) -> bool {
    eprint!("Use reference document {}? [Y/n] ", path.display());
    let _ = io::stderr().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "" | "y" | "yes")
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Build with --features cli");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  cargo install texdocx --features cli");
    eprintln!("  texdocx <INPUT.tex> [OPTIONS]");
}
