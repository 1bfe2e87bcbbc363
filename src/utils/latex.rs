//! Small LaTeX scanning helpers shared by the rewrite passes.

/// Extract the content of the first balanced `{...}` group.
///
/// Returns the inner text and the number of bytes consumed up to and
/// including the closing brace, or `(None, 0)` when the group never closes.
pub fn extract_braced_content(input: &str) -> (Option<String>, usize) {
    let mut depth = 0usize;
    let mut start = None;
    for (idx, ch) in input.char_indices() {
        match ch {
            '{' => {
                depth += 1;
                if depth == 1 {
                    start = Some(idx + 1);
                }
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start {
                            return (Some(input[s..idx].to_string()), idx + 1);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    (None, 0)
}

/// Whether byte offset `pos` sits after an unescaped `%` on its line.
pub fn is_commented(input: &str, pos: usize) -> bool {
    let line_start = input[..pos].rfind('\n').map(|p| p + 1).unwrap_or(0);
    let mut prev_backslash = false;
    for b in input[line_start..pos].bytes() {
        if b == b'%' && !prev_backslash {
            return true;
        }
        prev_backslash = b == b'\\' && !prev_backslash;
    }
    false
}

/// Count non-overlapping occurrences of `needle`.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}
