//! Node rewrites applied by the filter, one full walk per pass.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use texdocx_ir::{first_str_mut, Attr, Node};
use tracing::{debug, error, info};

use super::context::{FloatKind, ResolverContext};
use crate::core::assets::{rasterize, strip_root_alias, ImageFormat};

lazy_static! {
    static ref REF_COMMAND_RE: Regex =
        Regex::new(r"^\\(?P<cmd>autoref|ref|cref|Cref)\{(?P<kind>[A-Za-z]+):(?P<id>[^}]*)\}$").unwrap();
    static ref BARE_REF_RE: Regex =
        Regex::new(r"^\[?(?P<kind>fig|tab):(?P<id>[^\]\s]+)\]?$").unwrap();
    static ref SI_RANGE_RE: Regex = Regex::new(r"^(.+)\x{00A0}(.+)\x{2013}(.+)$").unwrap();
}

const NBSP: char = '\u{00A0}';

/// The filter passes in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Acronyms,
    CitationSpacing,
    FloatNumbering,
    Placeholders,
    RasterizeImages,
    NumericRanges,
    ReferencesHeading,
}

impl Pass {
    pub const ORDER: [Pass; 7] = [
        Pass::Acronyms,
        Pass::CitationSpacing,
        Pass::FloatNumbering,
        Pass::Placeholders,
        Pass::RasterizeImages,
        Pass::NumericRanges,
        Pass::ReferencesHeading,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Pass::Acronyms => "acronyms",
            Pass::CitationSpacing => "citation-spacing",
            Pass::FloatNumbering => "float-numbering",
            Pass::Placeholders => "placeholders",
            Pass::RasterizeImages => "rasterize-images",
            Pass::NumericRanges => "numeric-ranges",
            Pass::ReferencesHeading => "references-heading",
        }
    }

    /// Rewrite one node. `scope` is the identifier of the closest enclosing
    /// element that has one.
    pub fn visit(&self, node: Node, scope: &str, ctx: &mut ResolverContext) -> Vec<Node> {
        match self {
            Pass::Acronyms => vec![resolve_acronym(node, ctx)],
            Pass::CitationSpacing => vec![space_citation(node)],
            Pass::FloatNumbering => vec![number_float(node, scope, ctx)],
            Pass::Placeholders => vec![resolve_placeholder(node, ctx)],
            Pass::RasterizeImages => vec![rasterize_image(node, ctx)],
            Pass::NumericRanges => vec![fix_numeric_range(node)],
            Pass::ReferencesHeading => add_references_heading(node),
        }
    }
}

fn resolve_acronym(node: Node, ctx: &mut ResolverContext) -> Node {
    match node {
        Node::Span { attr, content } => {
            let Some(label) = attr.get("acronym-label").map(str::to_string) else {
                return Node::Span { attr, content };
            };
            let Some(expansion) = ctx.acronyms.get(&label).map(str::to_string) else {
                return Node::Span { attr, content };
            };
            let form = attr.get("acronym-form").unwrap_or("singular+short");
            let text = acronym_text(&label, &expansion, form, ctx);
            Node::Span {
                attr: Attr::default(),
                content: vec![Node::text(text)],
            }
        }
        other => other,
    }
}

fn acronym_text(label: &str, expansion: &str, form: &str, ctx: &mut ResolverContext) -> String {
    let plural = form.contains("plural");
    let short = form.contains("short");
    let number = |s: &str| if plural { format!("{}s", s) } else { s.to_string() };

    if short && ctx.is_used(label) {
        number(label)
    } else if short || form.contains("full") {
        if short {
            ctx.mark_used(label);
        }
        format!("{} ({})", number(expansion), number(label))
    } else if form.contains("abbrv") {
        number(label)
    } else {
        number(expansion)
    }
}

fn space_citation(node: Node) -> Node {
    match node {
        Node::Cite {
            citations,
            mut content,
        } => {
            if let Some(text) = first_str_mut(&mut content) {
                if text.starts_with('(') {
                    text.insert(0, NBSP);
                }
            }
            Node::Cite { citations, content }
        }
        other => other,
    }
}

fn number_float(node: Node, scope: &str, ctx: &mut ResolverContext) -> Node {
    match node {
        Node::Figure {
            attr,
            mut caption,
            content,
        } => {
            let number = ctx.floats.register(FloatKind::Figure, &attr.identifier);
            prefix_caption(&mut caption.long, FloatKind::Figure, number);
            Node::Figure {
                attr,
                caption,
                content,
            }
        }
        Node::Table {
            attr,
            mut caption,
            body,
        } => {
            let identifier = if attr.identifier.is_empty() {
                scope
            } else {
                attr.identifier.as_str()
            };
            let number = ctx.floats.register(FloatKind::Table, identifier);
            prefix_caption(&mut caption.long, FloatKind::Table, number);
            Node::Table {
                attr,
                caption,
                body,
            }
        }
        other => other,
    }
}

fn prefix_caption(caption: &mut [Node], kind: FloatKind, number: usize) {
    if let Some(text) = first_str_mut(caption) {
        *text = format!("{} {}: {}", kind.label(), number, text);
    }
}

fn resolve_placeholder(node: Node, ctx: &ResolverContext) -> Node {
    match node {
        Node::RawInline { format, text } => {
            let resolved = REF_COMMAND_RE.captures(&text).and_then(|caps| {
                let kind = FloatKind::from_prefix(&caps["kind"])?;
                let number = ctx.floats.lookup(kind, &caps["id"])?;
                Some(if &caps["cmd"] == "autoref" {
                    format!("{} {}", kind.label(), number)
                } else {
                    number.to_string()
                })
            });
            match resolved {
                Some(s) => Node::text(s),
                None => Node::RawInline { format, text },
            }
        }
        Node::Str(text) => {
            let resolved = BARE_REF_RE.captures(&text).and_then(|caps| {
                let kind = FloatKind::from_prefix(&caps["kind"])?;
                ctx.floats.lookup(kind, &caps["id"])
            });
            match resolved {
                Some(number) => Node::text(number.to_string()),
                None => Node::Str(text),
            }
        }
        other => other,
    }
}

fn rasterize_image(node: Node, ctx: &ResolverContext) -> Node {
    match node {
        Node::Image {
            mut attr,
            alt,
            url,
            title,
        } => {
            let url = if url.to_ascii_lowercase().ends_with(".pdf") {
                rasterize_pdf_url(&url, ctx)
            } else {
                url
            };
            // Word ignores LaTeX widths; the page width is used instead
            attr.remove("width");
            Node::Image {
                attr,
                alt,
                url,
                title,
            }
        }
        other => other,
    }
}

/// Returns the url of the PNG rendering, or `url` when conversion failed.
fn rasterize_pdf_url(url: &str, ctx: &ResolverContext) -> String {
    let config = &ctx.config;
    let rel = strip_root_alias(url, &config.root_alias);
    let png = Path::new(rel).with_extension("png");
    let target = config.resource_dir.join(&png);
    if target.exists() {
        debug!("reusing {}", target.display());
    } else {
        let source = config.resource_dir.join(rel);
        let scale = Some(config.tools.raster_scale);
        if let Err(e) = rasterize(&config.tools, &source, ImageFormat::Pdf, &target, scale) {
            error!("Failed to convert {} to PNG: {}", rel, e);
            return url.to_string();
        }
        info!("Rasterized {}", rel);
    }
    png.to_string_lossy().replace('\\', "/")
}

fn fix_numeric_range(node: Node) -> Node {
    match node {
        Node::Str(text) => match SI_RANGE_RE.captures(&text) {
            Some(caps) => Node::text(format!("{}\u{2013}{}", &caps[1], &caps[3])),
            None => Node::Str(text),
        },
        other => other,
    }
}

fn add_references_heading(node: Node) -> Vec<Node> {
    match node {
        Node::Div { attr, content } if attr.identifier == "refs" => vec![
            Node::Header {
                level: 1,
                attr: Attr::with_id("references"),
                content: vec![Node::text("References")],
            },
            Node::Div { attr, content },
        ],
        other => vec![other],
    }
}
