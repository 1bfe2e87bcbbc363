//! Image asset lookup and on-demand rasterization.
//!
//! Manuscripts reference images by paths that are often relative to a
//! different build directory, lack an extension, or point at vector and PDF
//! files a Word document cannot display. [`AssetResolver`] finds the file and
//! produces a PNG next to it, reusing any PNG that already exists.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use phf::phf_map;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{PipelineOptions, ToolConfig};
use crate::utils::error::AssetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Eps,
    PostScript,
    Svg,
    Pdf,
}

/// What it takes to get a format into the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    /// Displayable as is
    Raster,
    /// Rasterized by the vector converter
    Vector,
    /// Rasterized by the page rasterizer
    Page,
}

static IMAGE_FORMATS: phf::Map<&'static str, ImageFormat> = phf_map! {
    "png" => ImageFormat::Png,
    "jpg" => ImageFormat::Jpeg,
    "jpeg" => ImageFormat::Jpeg,
    "eps" => ImageFormat::Eps,
    "ps" => ImageFormat::PostScript,
    "svg" => ImageFormat::Svg,
    "pdf" => ImageFormat::Pdf,
};

/// Extensions tried for `\includegraphics{name}` without one, raster first.
const PROBE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "pdf", "eps", "ps", "svg"];

impl ImageFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        IMAGE_FORMATS.get(ext.as_str()).copied()
    }

    pub fn kind(&self) -> FormatKind {
        match self {
            ImageFormat::Png | ImageFormat::Jpeg => FormatKind::Raster,
            ImageFormat::Eps | ImageFormat::PostScript | ImageFormat::Svg => FormatKind::Vector,
            ImageFormat::Pdf => FormatKind::Page,
        }
    }
}

/// Every directory under `base` holding at least one recognized image, sorted.
pub fn image_folders(base: &Path) -> Vec<PathBuf> {
    let mut folders = BTreeSet::new();
    for entry in WalkDir::new(base).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file() && ImageFormat::from_path(entry.path()).is_some() {
            if let Some(parent) = entry.path().parent() {
                folders.insert(parent.to_path_buf());
            }
        }
    }
    folders.into_iter().collect()
}

/// An image file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// Path relative to the base directory, as written back into the source
    pub rel: PathBuf,
    /// Path on disk
    pub full: PathBuf,
    pub format: Option<ImageFormat>,
}

impl ResolvedAsset {
    fn new(base: &Path, full: PathBuf) -> Self {
        let rel = full
            .strip_prefix(base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| full.clone());
        let format = ImageFormat::from_path(&full);
        Self { rel, full, format }
    }
}

/// Finds referenced images below a base directory and rasterizes them.
pub struct AssetResolver {
    base: PathBuf,
    root_alias: String,
    folders: Vec<PathBuf>,
    tools: ToolConfig,
}

impl AssetResolver {
    /// Scan `base` for image folders once; lookups reuse the scan.
    pub fn new(base: impl Into<PathBuf>, options: &PipelineOptions) -> Self {
        let base = base.into();
        let folders = image_folders(&base);
        debug!("{} image folder(s) under {}", folders.len(), base.display());
        Self {
            base,
            root_alias: options.root_alias.clone(),
            folders,
            tools: options.tools.clone(),
        }
    }

    /// Strip the duplicated root segment (`paper/fig.pdf` -> `fig.pdf`).
    pub fn strip_alias<'a>(&self, raw: &'a str) -> &'a str {
        strip_root_alias(raw, &self.root_alias)
    }

    /// Locate the file an `\includegraphics` path refers to.
    ///
    /// Tries the literal path under the base, then the same name with each
    /// known extension when the path has none, then every image folder.
    pub fn resolve(&self, raw: &str) -> Result<ResolvedAsset, AssetError> {
        let stripped = self.strip_alias(raw.trim());
        let candidates = candidate_names(stripped);

        for name in &candidates {
            let full = self.base.join(name);
            if full.is_file() {
                return Ok(ResolvedAsset::new(&self.base, full));
            }
        }

        let file_names: Vec<PathBuf> = candidates
            .iter()
            .filter_map(|name| Path::new(name).file_name().map(PathBuf::from))
            .collect();
        for folder in &self.folders {
            for name in &file_names {
                let full = folder.join(name);
                if full.is_file() {
                    debug!("found {} in {}", raw, folder.display());
                    return Ok(ResolvedAsset::new(&self.base, full));
                }
            }
        }

        Err(AssetError::not_found(&self.base.join(stripped)))
    }

    /// Return a raster path (relative to the base) for `asset`, converting it
    /// when no PNG sibling exists yet.
    pub fn ensure_raster(&self, asset: &ResolvedAsset) -> Result<PathBuf, AssetError> {
        let Some(format) = asset.format else {
            return Err(AssetError::Unsupported {
                path: asset.rel.clone(),
            });
        };
        if format.kind() == FormatKind::Raster {
            return Ok(asset.rel.clone());
        }

        let target_rel = asset.rel.with_extension("png");
        let target = self.base.join(&target_rel);
        if target.exists() {
            debug!("reusing {}", target.display());
            return Ok(target_rel);
        }

        rasterize(&self.tools, &asset.full, format, &target, None)?;
        info!("Converted {} to {}", asset.rel.display(), target_rel.display());
        Ok(target_rel)
    }
}

/// Strip a leading `<alias>/` segment.
pub fn strip_root_alias<'a>(raw: &'a str, alias: &str) -> &'a str {
    if alias.is_empty() {
        return raw;
    }
    raw.strip_prefix(alias)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(raw)
}

fn candidate_names(raw: &str) -> Vec<String> {
    let mut names = vec![raw.to_string()];
    if ImageFormat::from_path(Path::new(raw)).is_none() {
        names.extend(PROBE_EXTENSIONS.iter().map(|ext| format!("{}.{}", raw, ext)));
    }
    names
}

/// Rasterize `source` into the PNG `target` with the tool for `format`.
///
/// `scale` bounds the longest side in pixels; only the page rasterizer
/// honours it.
pub fn rasterize(
    tools: &ToolConfig,
    source: &Path,
    format: ImageFormat,
    target: &Path,
    scale: Option<u32>,
) -> Result<(), AssetError> {
    let (program, mut cmd) = match format.kind() {
        FormatKind::Raster => {
            return Err(AssetError::Unsupported {
                path: source.to_path_buf(),
            })
        }
        FormatKind::Vector => {
            let mut cmd = Command::new(&tools.vector_converter);
            cmd.arg(source).arg(target);
            (tools.vector_converter.clone(), cmd)
        }
        FormatKind::Page => {
            let mut cmd = Command::new(&tools.page_rasterizer);
            if let Some(scale) = scale {
                cmd.args(["-scale-to", &scale.to_string()]);
            }
            // pdftoppm appends the extension itself
            cmd.args(["-png", "-singlefile"])
                .arg(source)
                .arg(target.with_extension(""));
            (tools.page_rasterizer.clone(), cmd)
        }
    };

    debug!("running {:?}", cmd);
    let status = cmd.status().map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            AssetError::ToolMissing {
                program: program.clone(),
            }
        } else {
            AssetError::Spawn {
                program: program.clone(),
                source,
            }
        }
    })?;
    if !status.success() {
        return Err(AssetError::ToolFailed {
            path: source.to_path_buf(),
            program,
            status: status.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ImageFormat::from_path(Path::new("a/B.PDF")), Some(ImageFormat::Pdf));
        assert_eq!(ImageFormat::from_path(Path::new("plot.eps")).map(|f| f.kind()), Some(FormatKind::Vector));
        assert_eq!(ImageFormat::from_path(Path::new("photo.jpeg")).map(|f| f.kind()), Some(FormatKind::Raster));
        assert_eq!(ImageFormat::from_path(Path::new("data.tiff")), None);
        assert_eq!(ImageFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_strip_root_alias() {
        assert_eq!(strip_root_alias("paper/figs/a.pdf", "paper"), "figs/a.pdf");
        assert_eq!(strip_root_alias("paperback/a.pdf", "paper"), "paperback/a.pdf");
        assert_eq!(strip_root_alias("figs/a.pdf", ""), "figs/a.pdf");
    }

    #[test]
    fn test_image_folders_only_lists_dirs_with_images() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("figs/a.png"));
        touch(&dir.path().join("figs/deep/b.eps"));
        touch(&dir.path().join("sections/intro.tex"));
        let folders = image_folders(dir.path());
        assert_eq!(
            folders,
            vec![dir.path().join("figs"), dir.path().join("figs/deep")]
        );
    }

    #[test]
    fn test_resolve_literal_alias_and_search() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("figs/plot.png"));
        touch(&dir.path().join("other/deep/scan.jpg"));
        let resolver = AssetResolver::new(dir.path(), &PipelineOptions::default());

        let literal = resolver.resolve("paper/figs/plot.png").unwrap();
        assert_eq!(literal.rel, PathBuf::from("figs/plot.png"));

        let searched = resolver.resolve("images/scan.jpg").unwrap();
        assert_eq!(searched.rel, PathBuf::from("other/deep/scan.jpg"));
        assert_eq!(searched.format, Some(ImageFormat::Jpeg));

        let probed = resolver.resolve("figs/plot").unwrap();
        assert_eq!(probed.rel, PathBuf::from("figs/plot.png"));
    }

    #[test]
    fn test_resolve_missing_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = AssetResolver::new(dir.path(), &PipelineOptions::default());
        let err = resolver.resolve("figs/none.pdf").unwrap_err();
        assert!(matches!(err, AssetError::NotFound { .. }));
        assert!(err.to_string().contains("none.pdf"));
    }

    #[test]
    fn test_existing_png_is_reused_without_tools() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("figs/plot.pdf"));
        touch(&dir.path().join("figs/plot.png"));
        let mut options = PipelineOptions::default();
        options.tools.page_rasterizer = "texdocx-no-such-tool".to_string();
        let resolver = AssetResolver::new(dir.path(), &options);
        let asset = resolver.resolve("figs/plot.pdf").unwrap();
        assert_eq!(resolver.ensure_raster(&asset).unwrap(), PathBuf::from("figs/plot.png"));
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("figs/plot.eps"));
        let mut options = PipelineOptions::default();
        options.tools.vector_converter = "texdocx-no-such-tool".to_string();
        let resolver = AssetResolver::new(dir.path(), &options);
        let asset = resolver.resolve("figs/plot.eps").unwrap();
        let err = resolver.ensure_raster(&asset).unwrap_err();
        assert!(matches!(err, AssetError::ToolMissing { ref program } if program == "texdocx-no-such-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn test_vector_image_is_converted_once() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("figs/plot.eps"));
        let mut options = PipelineOptions::default();
        options.tools.vector_converter = "cp".to_string();
        let resolver = AssetResolver::new(dir.path(), &options);
        let asset = resolver.resolve("figs/plot").unwrap();
        assert_eq!(asset.format, Some(ImageFormat::Eps));

        assert_eq!(resolver.ensure_raster(&asset).unwrap(), PathBuf::from("figs/plot.png"));
        assert!(dir.path().join("figs/plot.png").is_file());

        // The second call finds the PNG and never runs the converter
        fs::remove_file(dir.path().join("figs/plot.eps")).unwrap();
        assert_eq!(resolver.ensure_raster(&asset).unwrap(), PathBuf::from("figs/plot.png"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("plot.pdf"));
        let mut options = PipelineOptions::default();
        options.tools.page_rasterizer = "false".to_string();
        let resolver = AssetResolver::new(dir.path(), &options);
        let asset = resolver.resolve("plot.pdf").unwrap();
        let err = resolver.ensure_raster(&asset).unwrap_err();
        assert!(matches!(err, AssetError::ToolFailed { .. }));
    }
}
