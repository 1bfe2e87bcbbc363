//! State carried through one filter run.

use std::path::{Path, PathBuf};

use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::ToolConfig;

/// Environment variable naming the acronym definitions file
pub const ACRONYMS_ENV: &str = "TEXDOCX_ACRONYMS";
/// Environment variable naming the directory image urls are relative to
pub const RESOURCE_DIR_ENV: &str = "TEXDOCX_RESOURCE_DIR";

lazy_static! {
    static ref NEWACRONYM_RE: Regex = Regex::new(
        r"^\\newacronym(?:\[.*\])?\{(?P<label>[A-Za-z]+)\}\{.+\}\{(?P<value>[A-Za-z 0-9-]+)\}"
    )
    .unwrap();
}

/// Filter settings that come from the environment, since pandoc gives a
/// filter no arguments beyond the output format.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub acronym_file: Option<PathBuf>,
    pub resource_dir: PathBuf,
    pub root_alias: String,
    pub tools: ToolConfig,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            acronym_file: None,
            resource_dir: PathBuf::from("."),
            root_alias: "paper".to_string(),
            tools: ToolConfig::default(),
        }
    }
}

impl FilterConfig {
    /// Read `TEXDOCX_ACRONYMS` and `TEXDOCX_RESOURCE_DIR`. Without an
    /// explicit acronym file, `./acronyms.tex` then `./paper/acronyms.tex`
    /// are tried.
    pub fn from_env() -> Self {
        let acronym_file = std::env::var_os(ACRONYMS_ENV)
            .map(PathBuf::from)
            .or_else(|| {
                ["acronyms.tex", "paper/acronyms.tex"]
                    .iter()
                    .map(PathBuf::from)
                    .find(|p| p.is_file())
            });
        let resource_dir = std::env::var_os(RESOURCE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            acronym_file,
            resource_dir,
            ..Self::default()
        }
    }
}

/// Acronym label to expansion.
#[derive(Debug, Clone, Default)]
pub struct AcronymTable {
    entries: FxHashMap<String, String>,
}

impl AcronymTable {
    /// Parse `\newacronym[opts]{LABEL}{short}{Expansion}` lines. Other lines
    /// are ignored.
    pub fn parse(source: &str) -> Self {
        let entries = source
            .lines()
            .filter_map(|line| NEWACRONYM_RE.captures(line))
            .map(|caps| (caps["label"].to_string(), caps["value"].to_string()))
            .collect();
        Self { entries }
    }

    /// Load from `path`. A missing or unreadable file gives an empty table.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(source) => {
                let table = Self::parse(&source);
                debug!("{} acronym(s) from {}", table.len(), path.display());
                table
            }
            Err(e) => {
                warn!("{} not readable ({}), skipping acronym loading", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn insert(&mut self, label: impl Into<String>, expansion: impl Into<String>) {
        self.entries.insert(label.into(), expansion.into());
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries.get(label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Kind of numbered float.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatKind {
    Figure,
    Table,
}

impl FloatKind {
    pub fn label(&self) -> &'static str {
        match self {
            FloatKind::Figure => "Figure",
            FloatKind::Table => "Table",
        }
    }

    /// Reference prefix used in LaTeX labels (`fig:`, `tab:`).
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "fig" => Some(FloatKind::Figure),
            "tab" => Some(FloatKind::Table),
            _ => None,
        }
    }
}

/// Figure and table numbers in document order.
#[derive(Debug, Clone, Default)]
pub struct FloatRegistry {
    figures: IndexMap<String, usize>,
    tables: IndexMap<String, usize>,
    figure_count: usize,
    table_count: usize,
}

impl FloatRegistry {
    /// Assign the next number for `kind`. Empty identifiers take a number
    /// but cannot be referenced.
    pub fn register(&mut self, kind: FloatKind, identifier: &str) -> usize {
        let (map, count) = match kind {
            FloatKind::Figure => (&mut self.figures, &mut self.figure_count),
            FloatKind::Table => (&mut self.tables, &mut self.table_count),
        };
        *count += 1;
        if !identifier.is_empty() {
            map.insert(identifier.to_string(), *count);
        }
        *count
    }

    /// Number for `kind:id`, trying the full key then the bare `id`.
    pub fn lookup(&self, kind: FloatKind, id: &str) -> Option<usize> {
        let map = match kind {
            FloatKind::Figure => &self.figures,
            FloatKind::Table => &self.tables,
        };
        let prefix = match kind {
            FloatKind::Figure => "fig",
            FloatKind::Table => "tab",
        };
        map.get(&format!("{}:{}", prefix, id))
            .or_else(|| map.get(id))
            .copied()
    }

    pub fn count(&self, kind: FloatKind) -> usize {
        match kind {
            FloatKind::Figure => self.figure_count,
            FloatKind::Table => self.table_count,
        }
    }
}

/// Everything the filter passes share.
#[derive(Debug, Clone, Default)]
pub struct ResolverContext {
    pub config: FilterConfig,
    pub acronyms: AcronymTable,
    used_acronyms: FxHashSet<String>,
    pub floats: FloatRegistry,
}

impl ResolverContext {
    pub fn new(config: FilterConfig, acronyms: AcronymTable) -> Self {
        Self {
            config,
            acronyms,
            used_acronyms: FxHashSet::default(),
            floats: FloatRegistry::default(),
        }
    }

    /// Context for the filter binary: settings from the environment and the
    /// acronym file they point at.
    pub fn from_env() -> Self {
        let config = FilterConfig::from_env();
        let acronyms = match &config.acronym_file {
            Some(path) => AcronymTable::load(path),
            None => {
                warn!("no acronyms.tex found, skipping acronym loading");
                AcronymTable::default()
            }
        };
        Self::new(config, acronyms)
    }

    pub fn is_used(&self, label: &str) -> bool {
        self.used_acronyms.contains(label)
    }

    pub fn mark_used(&mut self, label: &str) {
        self.used_acronyms.insert(label.to_string());
    }
}
