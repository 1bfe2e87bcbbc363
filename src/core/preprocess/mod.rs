//! LaTeX preprocessing pipeline
//!
//! Source text flows through inclusion expansion, macro normalization,
//! table linearization, figure canonicalization and finalization. The first
//! three stages do not depend on the figure strategy, so [`normalize_file`]
//! runs them once and [`render_strategy`] finishes the text per strategy.

pub mod figure;
pub mod finalize;
pub mod inputs;
pub mod math;
pub mod rules;
pub mod table;

use std::path::Path;

use tracing::{debug, info};

use crate::config::PipelineOptions;
use crate::core::assets::AssetResolver;
use crate::utils::error::{ConversionOutput, ConversionResult};

pub use figure::canonicalize_figures;
pub use finalize::finalize_document;
pub use inputs::{expand_file, expand_inputs};
pub use math::flatten_math_blocks;
pub use rules::{normalize_macros, RewritePass, RuleOrderError, RuleSet};
pub use table::linearize_tables;

/// Normalization and table linearization over already expanded text.
pub fn normalize_text(expanded: &str) -> ConversionResult<String> {
    let normalized = normalize_macros(expanded);
    linearize_tables(&normalized)
}

/// Expand, normalize and linearize the document rooted at `path`.
pub fn normalize_file(path: &Path, options: &PipelineOptions) -> ConversionResult<String> {
    info!("Reading {}", path.display());
    let expanded = expand_file(path, &options.root_alias)?;
    debug!("expanded source: {} bytes", expanded.len());
    normalize_text(&expanded)
}

/// Figure canonicalization and finalization for one strategy.
pub fn render_strategy(
    normalized: &str,
    resolver: &AssetResolver,
    options: &PipelineOptions,
) -> ConversionOutput {
    let figures = canonicalize_figures(normalized, resolver, options);
    ConversionOutput::with_warnings(finalize_document(&figures.content), figures.warnings)
}

/// Run the whole pipeline over in-memory text. Inclusions and images
/// resolve against `base_dir`.
pub fn preprocess_str(
    input: &str,
    base_dir: &Path,
    options: &PipelineOptions,
) -> ConversionResult<ConversionOutput> {
    let expanded = expand_inputs(input, base_dir, &options.root_alias)?;
    let normalized = normalize_text(&expanded)?;
    let resolver = AssetResolver::new(base_dir, options);
    Ok(render_strategy(&normalized, &resolver, options))
}

/// Run the whole pipeline over the file at `path`.
pub fn preprocess_file(path: &Path, options: &PipelineOptions) -> ConversionResult<ConversionOutput> {
    let normalized = normalize_file(path, options)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let resolver = AssetResolver::new(base_dir, options);
    Ok(render_strategy(&normalized, &resolver, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::latex::count_occurrences;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stage_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("body.tex"),
            "$\\mat{A}$\n\\begin{tabular}{ll}\na & b \\\\\n\\end{tabular}\n\\end{document}",
        )
        .unwrap();
        let out = preprocess_str(
            "\\begin{document}\n\\input{body}\n",
            dir.path(),
            &PipelineOptions::default(),
        )
        .unwrap();
        assert_eq!(
            out.content,
            "\\begin{document}\n$\\mathbf{A}$\n\\begin{tabular}\na  |  b \n\\end{tabular}\n\n% Debug information\n% End of document reached\n\\end{document}\n"
        );
        assert_eq!(count_occurrences(&out.content, "\\end{document}"), 1);
    }
}
