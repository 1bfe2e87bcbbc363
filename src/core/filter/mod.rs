//! Cross-reference resolution over pandoc's document model
//!
//! Runs after pandoc has parsed the preprocessed LaTeX. Every [`Pass`] walks
//! the whole document once, children before parents, in [`Pass::ORDER`], so
//! a reference may point at a float defined later in the document.

pub mod context;
pub mod passes;

use texdocx_ir::{walk_nodes, walk_payload, Document};
use tracing::debug;

use crate::utils::error::ConversionResult;

pub use context::{AcronymTable, FilterConfig, FloatKind, FloatRegistry, ResolverContext};
pub use passes::Pass;

/// Apply every pass to `doc`.
pub fn run_filter(doc: Document, ctx: &mut ResolverContext) -> Document {
    let Document {
        api_version,
        mut meta,
        mut blocks,
    } = doc;
    for pass in Pass::ORDER {
        debug!("filter pass {}", pass.name());
        let mut visit = |node, scope: &str| pass.visit(node, scope, ctx);
        meta = walk_payload(meta, "", &mut visit);
        blocks = walk_nodes(blocks, "", &mut visit);
    }
    debug!(
        "{} figure(s), {} table(s) numbered",
        ctx.floats.count(FloatKind::Figure),
        ctx.floats.count(FloatKind::Table)
    );
    Document {
        api_version,
        meta,
        blocks,
    }
}

/// JSON in, JSON out.
pub fn filter_json(input: &str, ctx: &mut ResolverContext) -> ConversionResult<String> {
    let doc = Document::from_json(input)?;
    Ok(run_filter(doc, ctx).to_json()?)
}
