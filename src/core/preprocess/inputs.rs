//! `\input` / `\include` expansion.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::utils::error::{ConversionError, ConversionResult};
use crate::utils::latex::{extract_braced_content, is_commented};

/// Expand `\input{...}` and `\include{...}` directives using the filesystem.
///
/// Paths resolve against the directory of the file that contains the
/// directive. A path without an extension gets `.tex`. When the path starts
/// with `root_alias` and does not exist, the alias segment is dropped and the
/// lookup retried. A missing file or an inclusion cycle is fatal.
pub fn expand_inputs(input: &str, base_dir: &Path, root_alias: &str) -> ConversionResult<String> {
    let mut stack = Vec::new();
    expand_inputs_inner(input, base_dir, root_alias, &mut stack)
}

/// Like [`expand_inputs`] for the root file itself, so a file including the
/// root is reported as a cycle.
pub fn expand_file(path: &Path, root_alias: &str) -> ConversionResult<String> {
    let content = std::fs::read_to_string(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    let mut stack = vec![normalize(path)];
    expand_inputs_inner(&content, base_dir, root_alias, &mut stack)
}

fn expand_inputs_inner(
    input: &str,
    base_dir: &Path,
    root_alias: &str,
    stack: &mut Vec<PathBuf>,
) -> ConversionResult<String> {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0usize;
    let mut copied = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            i += 1;
            continue;
        }
        // `\\input` is a line break followed by text, not a directive
        if i > 0 && bytes[i - 1] == b'\\' {
            i += 1;
            continue;
        }
        let remaining = &input[i..];
        let cmd_len = if remaining.starts_with("\\input") {
            6usize
        } else if remaining.starts_with("\\include") {
            8usize
        } else {
            0usize
        };
        // Avoid matching commands like \inputenc or \includegraphics
        if cmd_len == 0
            || (i + cmd_len < bytes.len() && bytes[i + cmd_len].is_ascii_alphabetic())
            || is_commented(input, i)
        {
            i += 1;
            continue;
        }

        let mut j = i + cmd_len;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        let (path_str, end_idx) = if j < bytes.len() && bytes[j] == b'{' {
            match extract_braced_content(&input[j..]) {
                (Some(c), used) => (c, j + used),
                (None, _) => (String::new(), j),
            }
        } else {
            let start = j;
            while j < bytes.len() && !bytes[j].is_ascii_whitespace() && bytes[j] != b'%' {
                j += 1;
            }
            (input[start..j].to_string(), j)
        };
        let path_str = path_str.trim();
        if path_str.is_empty() {
            i += 1;
            continue;
        }

        let full_path = resolve_input(path_str, base_dir, root_alias)?;
        let key = normalize(&full_path);
        if stack.contains(&key) {
            let mut chain = stack.clone();
            chain.push(key);
            return Err(ConversionError::InclusionCycle { chain });
        }
        debug!("expanding {}", full_path.display());
        let content = std::fs::read_to_string(&full_path)?;
        let next_base = full_path.parent().unwrap_or(base_dir).to_path_buf();
        stack.push(key);
        let expanded = expand_inputs_inner(&content, &next_base, root_alias, stack)?;
        stack.pop();

        out.push_str(&input[copied..i]);
        out.push_str(&expanded);
        i = end_idx;
        copied = end_idx;
    }
    out.push_str(&input[copied..]);
    Ok(out)
}

/// Find the file an inclusion directive refers to.
fn resolve_input(raw: &str, base_dir: &Path, root_alias: &str) -> ConversionResult<PathBuf> {
    let candidate = base_dir.join(with_tex_extension(raw));
    if candidate.is_file() {
        return Ok(candidate);
    }
    let stripped = crate::core::assets::strip_root_alias(raw, root_alias);
    if stripped != raw {
        let alt = base_dir.join(with_tex_extension(stripped));
        if alt.is_file() {
            return Ok(alt);
        }
    }
    Err(ConversionError::unresolved(candidate))
}

fn with_tex_extension(raw: &str) -> PathBuf {
    if raw.to_ascii_lowercase().ends_with(".tex") {
        PathBuf::from(raw)
    } else {
        PathBuf::from(format!("{}.tex", raw))
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
