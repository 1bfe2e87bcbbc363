//! Tabular linearization.
//!
//! Inside a `tabular` region every unescaped column separator becomes ` | `
//! and row terminators are removed. Text outside the region is untouched.
//! Nested regions are rejected.

use crate::utils::error::{ConversionError, ConversionResult};

const BEGIN: &str = "\\begin{tabular}";
const END: &str = "\\end{tabular}";

pub fn linearize_tables(input: &str) -> ConversionResult<String> {
    let mut in_table = false;
    let mut lines = Vec::new();
    for (idx, line) in input.split('\n').enumerate() {
        lines.push(linearize_line(line, idx + 1, &mut in_table)?);
    }
    Ok(lines.join("\n"))
}

fn linearize_line(line: &str, line_no: usize, in_table: &mut bool) -> ConversionResult<String> {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    loop {
        if *in_table {
            let next_begin = rest.find(BEGIN);
            match (next_begin, rest.find(END)) {
                (Some(b), e) if e.map_or(true, |e| b < e) => {
                    return Err(ConversionError::NestedTable { line: line_no });
                }
                (_, Some(e)) => {
                    out.push_str(&linearize_cells(&rest[..e]));
                    out.push_str(END);
                    rest = &rest[e + END.len()..];
                    *in_table = false;
                }
                (_, None) => {
                    out.push_str(&linearize_cells(rest));
                    return Ok(out);
                }
            }
        } else {
            match rest.find(BEGIN) {
                Some(b) => {
                    out.push_str(&rest[..b + BEGIN.len()]);
                    rest = &rest[b + BEGIN.len()..];
                    *in_table = true;
                }
                None => {
                    out.push_str(rest);
                    return Ok(out);
                }
            }
        }
    }
}

fn linearize_cells(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() + 8);
    let mut chars = segment.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('\\') => {}
                Some(escaped) => {
                    out.push('\\');
                    out.push(escaped);
                }
                None => out.push('\\'),
            },
            '&' => out.push_str(" | "),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rows_are_linearized() {
        let input = "\\begin{tabular}\nName & Value \\\\\nA & 1 \\\\\n\\end{tabular}";
        assert_eq!(
            linearize_tables(input).unwrap(),
            "\\begin{tabular}\nName  |  Value \nA  |  1 \n\\end{tabular}"
        );
    }

    #[test]
    fn test_text_outside_region_is_untouched() {
        let input = "a & b \\\\ c\n\\begin{tabular}x & y\\end{tabular} p & q \\\\";
        assert_eq!(
            linearize_tables(input).unwrap(),
            "a & b \\\\ c\n\\begin{tabular}x | y\\end{tabular} p & q \\\\"
        );
    }

    #[test]
    fn test_escaped_ampersand_survives() {
        let input = "\\begin{tabular}\nR\\&D & 3\\% \\\\\n\\end{tabular}";
        assert_eq!(
            linearize_tables(input).unwrap(),
            "\\begin{tabular}\nR\\&D  |  3\\% \n\\end{tabular}"
        );
    }

    #[test]
    fn test_no_tables_is_identity() {
        let input = "plain & text \\\\\nsecond line\n";
        assert_eq!(linearize_tables(input).unwrap(), input);
    }

    #[test]
    fn test_nested_table_reports_line() {
        let input = "intro\n\\begin{tabular}\na & \\begin{tabular} b \\end{tabular}\n\\end{tabular}";
        match linearize_tables(input) {
            Err(ConversionError::NestedTable { line }) => assert_eq!(line, 3),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
