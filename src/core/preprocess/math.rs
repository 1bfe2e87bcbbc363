//! Multi-line math flattening.
//!
//! `aligned`, `gather`, `gather*` and `equation*` blocks are rebuilt as a
//! plain `equation*` with one row per line. Alignment markers are dropped.
//! Only top-level row breaks split a block, so a `pmatrix` inside a `gather`
//! keeps its own rows. A flattened environment nested in another one (an
//! `aligned` inside `equation*`) has its rows spliced into the outer block.

use super::rules::RewritePass;

const FLATTENED_ENVS: [&str; 4] = ["aligned", "gather", "gather*", "equation*"];

/// [`RewritePass`] wrapper around [`flatten_math_blocks`].
pub struct MathFlattener;

impl RewritePass for MathFlattener {
    fn name(&self) -> &str {
        "math-blocks"
    }

    fn apply(&self, input: &str) -> String {
        flatten_math_blocks(input)
    }
}

pub fn flatten_math_blocks(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some((start, env)) = next_block(rest) {
        let open = format!("\\begin{{{}}}", env);
        let close = format!("\\end{{{}}}", env);
        let body_start = start + open.len();
        let Some(body_len) = matching_end(&rest[body_start..], &open, &close) else {
            // Unclosed block: leave the remainder untouched
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(&render_rows(&rest[body_start..body_start + body_len]));
        rest = &rest[body_start + body_len + close.len()..];
    }
    out.push_str(rest);
    out
}

fn next_block(input: &str) -> Option<(usize, &'static str)> {
    FLATTENED_ENVS
        .iter()
        .filter_map(|env| {
            input
                .find(&format!("\\begin{{{}}}", env))
                .map(|pos| (pos, *env))
        })
        .min_by_key(|(pos, _)| *pos)
}

/// Offset of the `close` marker that balances an already consumed `open`.
fn matching_end(body: &str, open: &str, close: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut offset = 0usize;
    loop {
        let next_open = body[offset..].find(open);
        let next_close = body[offset..].find(close)?;
        match next_open {
            Some(o) if o < next_close => {
                depth += 1;
                offset += o + open.len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + next_close);
                }
                offset += next_close + close.len();
            }
        }
    }
}

fn render_rows(body: &str) -> String {
    let rows: Vec<String> = split_rows(body)
        .into_iter()
        .map(|row| row.trim().to_string())
        .filter(|row| !row.is_empty())
        .collect();
    let mut out = String::from("\\begin{equation*}\n");
    if !rows.is_empty() {
        out.push_str(&rows.join("\\\\\n"));
        out.push('\n');
    }
    out.push_str("\\end{equation*}");
    out
}

/// Split on top-level `\\` and drop top-level `&`. The optional `*` and
/// `[len]` after a row break are consumed with it.
fn split_rows(body: &str) -> Vec<String> {
    let mut rows = Vec::new();
    let mut row = String::new();
    let mut braces = 0usize;
    let mut envs = 0usize;
    let mut chars = body.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' => {
                let tail = &body[idx..];
                if braces == 0 && envs == 0 {
                    if let Some((inner, consumed)) = nested_block(tail) {
                        let mut inner_rows = split_rows(inner).into_iter();
                        if let Some(first) = inner_rows.next() {
                            row.push_str(&first);
                        }
                        for next in inner_rows {
                            rows.push(std::mem::replace(&mut row, next));
                        }
                        let end = idx + consumed;
                        while chars.peek().is_some_and(|(i, _)| *i < end) {
                            chars.next();
                        }
                        continue;
                    }
                }
                if tail.starts_with("\\begin{") {
                    envs += 1;
                } else if tail.starts_with("\\end{") {
                    envs = envs.saturating_sub(1);
                }
                match chars.peek().map(|(_, c)| *c) {
                    Some('\\') if braces == 0 && envs == 0 => {
                        chars.next();
                        rows.push(std::mem::take(&mut row));
                        skip_break_options(body, &mut chars);
                    }
                    Some(next) if !next.is_ascii_alphabetic() => {
                        // Escaped character such as `\&` or `\{`
                        chars.next();
                        row.push('\\');
                        row.push(next);
                    }
                    _ => row.push('\\'),
                }
            }
            '{' => {
                braces += 1;
                row.push(ch);
            }
            '}' => {
                braces = braces.saturating_sub(1);
                row.push(ch);
            }
            '&' if braces == 0 && envs == 0 => {}
            _ => row.push(ch),
        }
    }
    rows.push(row);
    rows
}

/// Body of a flattened environment opening at the start of `tail`, and the
/// length of the whole block including its markers.
fn nested_block(tail: &str) -> Option<(&str, usize)> {
    FLATTENED_ENVS.iter().find_map(|env| {
        let open = format!("\\begin{{{}}}", env);
        let close = format!("\\end{{{}}}", env);
        let body = tail.strip_prefix(open.as_str())?;
        let len = matching_end(body, &open, &close)?;
        Some((&body[..len], open.len() + len + close.len()))
    })
}

fn skip_break_options(
    body: &str,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) {
    if chars.peek().map(|(_, c)| *c) == Some('*') {
        chars.next();
    }
    if let Some(&(idx, '[')) = chars.peek() {
        if let Some(close) = body[idx..].find(']') {
            let end = idx + close;
            while chars.peek().is_some_and(|(i, _)| *i <= end) {
                chars.next();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_gather_rows_become_equation() {
        let input = "Before\n\\begin{gather}\na &= b \\\\\n c &= d\n\\end{gather}\nAfter";
        assert_eq!(
            flatten_math_blocks(input),
            "Before\n\\begin{equation*}\na = b\\\\\nc = d\n\\end{equation*}\nAfter"
        );
    }

    #[test]
    fn test_aligned_inside_equation() {
        let input = "\\begin{equation*}\\begin{aligned}x &= 1\\\\[2pt] y &= 2\\end{aligned}\\end{equation*}";
        let once = flatten_math_blocks(input);
        assert_eq!(once, "\\begin{equation*}\nx = 1\\\\\ny = 2\n\\end{equation*}");
        assert_eq!(flatten_math_blocks(&once), once);
    }

    #[test]
    fn test_aligned_rows_splice_into_gather_row() {
        let input = "\\begin{gather*}f(x) = \\begin{aligned}a &+ b \\\\ &+ c\\end{aligned} \\\\ g\\end{gather*}";
        let out = flatten_math_blocks(input);
        assert_eq!(out, "\\begin{equation*}\nf(x) = a + b\\\\\n+ c\\\\\ng\n\\end{equation*}");
        assert!(!out.contains('&'));
    }

    #[test]
    fn test_standalone_aligned() {
        let input = "$\\begin{aligned}x &= 1\\\\[2pt] y &= 2\\end{aligned}$";
        assert_eq!(
            flatten_math_blocks(input),
            "$\\begin{equation*}\nx = 1\\\\\ny = 2\n\\end{equation*}$"
        );
    }

    #[test]
    fn test_nested_matrix_rows_are_kept() {
        let input = "\\begin{gather*}A = \\begin{pmatrix}1 & 0\\\\ 0 & 1\\end{pmatrix}\\\\ B\\end{gather*}";
        assert_eq!(
            flatten_math_blocks(input),
            "\\begin{equation*}\nA = \\begin{pmatrix}1 & 0\\\\ 0 & 1\\end{pmatrix}\\\\\nB\n\\end{equation*}"
        );
    }

    #[test]
    fn test_empty_rows_are_dropped() {
        let input = "\\begin{gather}\n\\\\ \n x \\\\\n\\end{gather}";
        assert_eq!(flatten_math_blocks(input), "\\begin{equation*}\nx\n\\end{equation*}");
    }

    #[test]
    fn test_flattening_is_stable() {
        let input = "\\begin{gather}a \\& b \\\\ c\\end{gather}";
        let once = flatten_math_blocks(input);
        assert_eq!(once, "\\begin{equation*}\na \\& b\\\\\nc\n\\end{equation*}");
        assert_eq!(flatten_math_blocks(&once), once);
    }

    #[test]
    fn test_unclosed_block_is_untouched() {
        let input = "\\begin{gather} a \\\\ b";
        assert_eq!(flatten_math_blocks(input), input);
    }
}
