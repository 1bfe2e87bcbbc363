//! texdocx - LaTeX manuscripts to Word documents through pandoc
//!
//! The crate has two halves. The preprocessing pipeline rewrites LaTeX
//! source into a form pandoc reads well: inclusions expanded, custom macros
//! normalized, tables linearized and figures reduced to one raster image.
//! The filter runs inside pandoc (`texdocx-filter`) and resolves figure and
//! table numbers, cross-references and acronyms on the parsed document.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use texdocx::{preprocess_file, PipelineOptions};
//!
//! let output = preprocess_file(Path::new("paper/main.tex"), &PipelineOptions::default())?;
//! for warning in &output.warnings {
//!     eprintln!("{}", warning);
//! }
//! # Ok::<(), texdocx::ConversionError>(())
//! ```

pub mod config;
pub mod core;
pub mod pandoc;
pub mod utils;

pub use config::{ConfigFile, FigureStrategy, PipelineOptions, ToolConfig};
pub use crate::core::assets::{AssetResolver, ImageFormat};
pub use crate::core::filter::{filter_json, run_filter, ResolverContext};
pub use crate::core::preprocess::{preprocess_file, preprocess_str};
pub use pandoc::{ConvertJob, StrategyOutcome};
pub use utils::error::{ConversionError, ConversionOutput, ConversionResult, ConversionWarning};

/// Re-export of the document model crate
pub use texdocx_ir as ir;
