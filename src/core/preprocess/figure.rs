//! Figure canonicalization.
//!
//! The first `\includegraphics` of every figure is rewritten to a raster
//! path at a fixed width and the figure is centered with the selected
//! [`FigureStrategy`]. Figures whose image cannot be found or converted are
//! left byte-identical and returned as warnings; reporting them is up to
//! the caller.

use std::path::Path;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::debug;

use crate::config::{FigureStrategy, PipelineOptions};
use crate::core::assets::AssetResolver;
use crate::utils::error::{AssetError, ConversionOutput, ConversionWarning};

lazy_static! {
    static ref FIGURE_RE: Regex =
        Regex::new(r"(?s)\\begin\{figure\}(\[[^\]]*\])?(.*?)\\end\{figure\}").unwrap();
    static ref INCLUDEGRAPHICS_RE: Regex =
        Regex::new(r"\\includegraphics\s*(\[[^\]]*\])?\s*\{([^}]*)\}").unwrap();
}

pub fn canonicalize_figures(
    input: &str,
    resolver: &AssetResolver,
    options: &PipelineOptions,
) -> ConversionOutput {
    let mut warnings = Vec::new();
    let mut count = 0usize;
    let content = FIGURE_RE.replace_all(input, |caps: &Captures| {
        count += 1;
        let whole = caps[0].to_string();
        match rewrite_figure(caps, resolver, options) {
            Ok(Some(figure)) => figure,
            Ok(None) => whole,
            Err(e) => {
                debug!("figure {} left unchanged", count);
                let line = line_of(input, caps.get(0).map_or(0, |m| m.start()));
                warnings.push(ConversionWarning::from(e).at_line(line));
                whole
            }
        }
    });
    debug!("{} figure(s), {} left unchanged", count, warnings.len());
    ConversionOutput::with_warnings(content.into_owned(), warnings)
}

/// `Ok(None)` for a figure without an image.
fn rewrite_figure(
    caps: &Captures,
    resolver: &AssetResolver,
    options: &PipelineOptions,
) -> Result<Option<String>, AssetError> {
    let placement = caps.get(1).map_or("", |m| m.as_str());
    let body = caps.get(2).map_or("", |m| m.as_str());
    let Some(image) = INCLUDEGRAPHICS_RE.captures(body) else {
        return Ok(None);
    };
    let (Some(directive), Some(raw_path)) = (image.get(0), image.get(2)) else {
        return Ok(None);
    };

    let asset = resolver.resolve(raw_path.as_str())?;
    let raster = resolver.ensure_raster(&asset)?;
    let graphic = format!(
        "\\includegraphics[width={}]{{{}}}",
        options.figure_width,
        latex_path(&raster)
    );

    let before = &body[..directive.start()];
    let after = &body[directive.end()..];
    let figure = match options.figure_strategy {
        FigureStrategy::Paragraph => format!("\n\n{}\n\n", graphic),
        FigureStrategy::Centering => {
            let inner = format!("{}{}{}", before, graphic, after);
            let inner = inner.trim();
            if inner.starts_with("\\centering") {
                format!("\\begin{{figure}}{}{}\n\\end{{figure}}", placement, inner)
            } else {
                format!("\\begin{{figure}}{}\\centering\n{}\n\\end{{figure}}", placement, inner)
            }
        }
        FigureStrategy::CenterEnv => {
            let inner = format!("{}{}{}", before, graphic, after);
            let inner = inner.trim();
            if inner.contains("\\begin{center}") {
                format!("\\begin{{figure}}{}\n{}\n\\end{{figure}}", placement, inner)
            } else {
                format!(
                    "\\begin{{figure}}{}\n\\begin{{center}}\n{}\n\\end{{center}}\n\\end{{figure}}",
                    placement, inner
                )
            }
        }
        FigureStrategy::CenterLine => {
            let inner = if before.ends_with("\\centerline{") {
                format!("{}{}{}", before, graphic, after)
            } else {
                format!("{}\\centerline{{{}}}{}", before, graphic, after)
            };
            format!("\\begin{{figure}}{}\n{}\n\\end{{figure}}", placement, inner.trim())
        }
    };
    Ok(Some(figure))
}

fn latex_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn line_of(input: &str, offset: usize) -> usize {
    input[..offset].matches('\n').count() + 1
}
