//! Macro and environment normalization.
//!
//! Each rule is an independent [`RewritePass`] applied once, left to right,
//! over the whole document. Rules are not iterated to a fixpoint, so a rule
//! that matches a macro nested inside another macro must run before the rule
//! for the nested macro alone; [`RuleSet::check_order`] enforces this.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::trace;

use super::math::MathFlattener;
use crate::utils::latex::extract_braced_content;

/// One textual rewrite over the full document.
pub trait RewritePass: Send + Sync {
    /// Macro or environment this pass rewrites.
    fn name(&self) -> &str;

    /// Macros matched inside this pass's argument. Non-empty for composite
    /// rules such as `\tcov{\mat{..}}`.
    fn consumes(&self) -> &[&'static str] {
        &[]
    }

    fn apply(&self, input: &str) -> String;
}

/// Regex-driven rule.
pub struct PatternRule {
    name: &'static str,
    consumes: &'static [&'static str],
    pattern: Regex,
    replacement: &'static str,
}

impl PatternRule {
    /// Panics on an invalid pattern; patterns are compile-time constants.
    pub fn new(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        Self {
            name,
            consumes: &[],
            pattern: Regex::new(pattern).expect("invalid rewrite pattern"),
            replacement,
        }
    }

    pub fn composite(
        name: &'static str,
        consumes: &'static [&'static str],
        pattern: &str,
        replacement: &'static str,
    ) -> Self {
        Self {
            consumes,
            ..Self::new(name, pattern, replacement)
        }
    }
}

impl RewritePass for PatternRule {
    fn name(&self) -> &str {
        self.name
    }

    fn consumes(&self) -> &[&'static str] {
        self.consumes
    }

    fn apply(&self, input: &str) -> String {
        self.pattern.replace_all(input, self.replacement).into_owned()
    }
}

/// Replaces `\name[..]{a}[..]{b}...` with one of its braced arguments, or
/// drops it entirely. Arguments are matched with brace balancing, so nested
/// groups such as `\multicolumn{2}{c}{\textbf{Total}}` survive.
pub struct ArgumentRule {
    name: &'static str,
    arity: usize,
    keep: Option<usize>,
}

impl ArgumentRule {
    pub fn keep(name: &'static str, arity: usize, keep: usize) -> Self {
        Self {
            name,
            arity,
            keep: Some(keep),
        }
    }

    pub fn delete(name: &'static str, arity: usize) -> Self {
        Self {
            name,
            arity,
            keep: None,
        }
    }

    /// Parse the arguments following the command name; returns the braced
    /// arguments and the number of bytes consumed.
    fn parse_args(&self, input: &str) -> Option<(Vec<String>, usize)> {
        let bytes = input.as_bytes();
        let mut args = Vec::with_capacity(self.arity);
        let mut j = 0usize;
        while args.len() < self.arity {
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            match bytes.get(j)? {
                b'[' => {
                    let close = input[j..].find(']')?;
                    j += close + 1;
                }
                b'{' => {
                    let (content, used) = extract_braced_content(&input[j..]);
                    args.push(content?);
                    j += used;
                }
                _ => return None,
            }
        }
        Some((args, j))
    }
}

impl RewritePass for ArgumentRule {
    fn name(&self) -> &str {
        self.name
    }

    fn apply(&self, input: &str) -> String {
        let needle = format!("\\{}", self.name);
        let mut out = String::with_capacity(input.len());
        let mut i = 0usize;
        while let Some(pos) = input[i..].find(&needle) {
            let start = i + pos;
            let after = start + needle.len();
            out.push_str(&input[i..start]);
            let is_longer_name = input[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic());
            match self.parse_args(&input[after..]) {
                Some((args, used)) if !is_longer_name => {
                    if let Some(keep) = self.keep {
                        out.push_str(&args[keep]);
                    }
                    i = after + used;
                }
                _ => {
                    out.push_str(&needle);
                    i = after;
                }
            }
        }
        out.push_str(&input[i..]);
        out
    }
}

/// `\begin{tabular}[pos]{spec}` -> `\begin{tabular}`.
pub struct TabularSpecRule;

impl RewritePass for TabularSpecRule {
    fn name(&self) -> &str {
        "tabular"
    }

    fn apply(&self, input: &str) -> String {
        const BEGIN: &str = "\\begin{tabular}";
        let mut out = String::with_capacity(input.len());
        let mut i = 0usize;
        while let Some(pos) = input[i..].find(BEGIN) {
            let after = i + pos + BEGIN.len();
            out.push_str(&input[i..after]);
            let mut j = after;
            if input[j..].starts_with('[') {
                if let Some(close) = input[j..].find(']') {
                    j += close + 1;
                }
            }
            if input[j..].starts_with('{') {
                let (spec, used) = extract_braced_content(&input[j..]);
                if spec.is_some() {
                    j += used;
                }
            }
            // Only drop the position argument when a column spec followed it
            i = if j > after && input[after..j].ends_with('}') {
                j
            } else {
                after
            };
        }
        out.push_str(&input[i..]);
        out
    }
}

/// A composite rule placed after a rule it depends on.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("rule `{composite}` (#{composite_index}) must run before `{simple}` (#{simple_index})")]
pub struct RuleOrderError {
    pub composite: String,
    pub composite_index: usize,
    pub simple: String,
    pub simple_index: usize,
}

/// Ordered list of rewrite passes.
pub struct RuleSet {
    passes: Vec<Box<dyn RewritePass>>,
}

impl RuleSet {
    pub fn new(passes: Vec<Box<dyn RewritePass>>) -> Self {
        Self { passes }
    }

    /// Built-in rules for the manuscript macros.
    pub fn builtin() -> Self {
        let passes: Vec<Box<dyn RewritePass>> = vec![
            Box::new(PatternRule::new("figure*", r"\\(begin|end)\{figure\*\}", r"\${1}{figure}")),
            // Composite covariance forms, before \tcov, \icov, \ticov and the
            // \mat / \emat / \text rules they contain
            Box::new(PatternRule::composite(
                "tcov",
                &["mat"],
                r"\\tcov\{\\mat\{([^}]+)\}\}",
                r"$$\mathbf{\Sigma}_\mathbf{${1}}$$",
            )),
            Box::new(PatternRule::composite(
                "tcov",
                &["emat"],
                r"\\tcov\{\\emat\{([^}]+)\}\}",
                r"$$\mathbf{\Sigma}_{\widehat{\mathbf{${1}}}}$$",
            )),
            Box::new(PatternRule::composite(
                "tcov",
                &["text"],
                r"\\tcov\{\\text\{([^}]+)\}\}",
                r"$$\mathbf{\Sigma}_\text{${1}}$$",
            )),
            Box::new(PatternRule::composite(
                "icov",
                &["emat"],
                r"\\icov\{\\emat\{([^}]+)\}\}",
                r"\mathbf{\Sigma}^{-1}_{\widehat{\mathbf{${1}}}}",
            )),
            Box::new(PatternRule::composite(
                "ticov",
                &["emat"],
                r"\\ticov\{\\emat\{([^}]+)\}\}",
                r"$$\mathbf{\Sigma}^{-1}_{\widehat{\mathbf{${1}}}}$$",
            )),
            Box::new(PatternRule::new("mat", r"\\mat\{([^}]+)\}", r"\mathbf{${1}}")),
            Box::new(PatternRule::new("vec", r"\\vec\{([^}]+)\}", r"\mathbf{${1}}")),
            Box::new(PatternRule::new("tmat", r"\\tmat\{([^}]+)\}", r"$$\mathbf{${1}}$$")),
            Box::new(PatternRule::new("tvec", r"\\tvec\{([^}]+)\}", r"$$\mathbf{${1}}$$")),
            Box::new(PatternRule::new("emat", r"\\emat\{([^}]+)\}", r"\widehat{\mathbf{${1}}}")),
            Box::new(PatternRule::new("evec", r"\\evec\{([^}]+)\}", r"\widehat{\mathbf{${1}}}")),
            Box::new(PatternRule::new("temat", r"\\temat\{([^}]+)\}", r"$$\widehat{\mathbf{${1}}}$$")),
            Box::new(PatternRule::new("tevec", r"\\tevec\{([^}]+)\}", r"$$\widehat{\mathbf{${1}}}$$")),
            Box::new(PatternRule::new("trans", r"\\trans([^A-Za-z]|$)", r"^\mathsf{T}${1}")),
            Box::new(PatternRule::new("hermconj", r"\\hermconj([^A-Za-z]|$)", r"^\mathsf{H}${1}")),
            Box::new(PatternRule::new("cov", r"\\cov\{([^}]+)\}", r"\mathbf{\Sigma}_\mathbf{${1}}")),
            Box::new(PatternRule::new("icov", r"\\icov\{([^}]+)\}", r"\mathbf{\Sigma}^{-1}_\mathbf{${1}}")),
            Box::new(PatternRule::new("tcov", r"\\tcov\{([^}]+)\}", r"$$\mathbf{\Sigma}_\mathbf{${1}}$$")),
            Box::new(PatternRule::new(
                "ticov",
                r"\\ticov\{([^}]+)\}",
                r"$$\mathbf{\Sigma}^{-1}_\mathbf{${1}}$$",
            )),
            Box::new(PatternRule::new("vspace", r"\\vspace\{2ex\}", "")),
            Box::new(PatternRule::new("table*", r"\\(begin|end)\{table\*?\}", r"\${1}{table}")),
            Box::new(TabularSpecRule),
            Box::new(PatternRule::new("hline", r"\\hline\b", "")),
            Box::new(PatternRule::new("cline", r"\\cline\{[^}]*\}", "")),
            Box::new(ArgumentRule::keep("multicolumn", 3, 2)),
            Box::new(ArgumentRule::keep("multirow", 3, 2)),
            Box::new(ArgumentRule::delete("newcolumntype", 2)),
            Box::new(MathFlattener),
            Box::new(PatternRule::new("spacing", r"\\quad\b|\\,", " ")),
        ];
        Self::new(passes)
    }

    /// Verify that every composite rule precedes the simple rules for its
    /// own macro and for the macros it consumes.
    pub fn check_order(&self) -> Result<(), RuleOrderError> {
        for (ci, composite) in self.passes.iter().enumerate() {
            if composite.consumes().is_empty() {
                continue;
            }
            for (si, simple) in self.passes.iter().enumerate().take(ci) {
                let shadows_outer = simple.name() == composite.name() && simple.consumes().is_empty();
                if shadows_outer || composite.consumes().contains(&simple.name()) {
                    return Err(RuleOrderError {
                        composite: composite.name().to_string(),
                        composite_index: ci,
                        simple: simple.name().to_string(),
                        simple_index: si,
                    });
                }
            }
        }
        Ok(())
    }

    /// Apply every pass in order.
    pub fn apply(&self, input: &str) -> String {
        let mut content = input.to_string();
        for pass in &self.passes {
            let next = pass.apply(&content);
            if next != content {
                trace!("rule `{}` rewrote the document", pass.name());
            }
            content = next;
        }
        content
    }
}

lazy_static! {
    /// The built-in rule set, order-checked at first use.
    pub static ref BUILTIN_RULES: RuleSet = {
        let rules = RuleSet::builtin();
        debug_assert_eq!(rules.check_order(), Ok(()));
        rules
    };
}

/// Normalize macros and environments with the built-in rules.
pub fn normalize_macros(input: &str) -> String {
    BUILTIN_RULES.apply(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_order_holds() {
        assert_eq!(RuleSet::builtin().check_order(), Ok(()));
    }

    #[test]
    fn test_misordered_composite_is_rejected() {
        let rules = RuleSet::new(vec![
            Box::new(PatternRule::new("mat", r"\\mat\{([^}]+)\}", r"\mathbf{${1}}")),
            Box::new(PatternRule::composite(
                "tcov",
                &["mat"],
                r"\\tcov\{\\mat\{([^}]+)\}\}",
                r"$$\mathbf{\Sigma}_\mathbf{${1}}$$",
            )),
        ]);
        let err = rules.check_order().unwrap_err();
        assert_eq!(err.composite, "tcov");
        assert_eq!(err.simple, "mat");
    }

    #[test]
    fn test_matrix_macros() {
        assert_eq!(normalize_macros(r"\mat{A}"), r"\mathbf{A}");
        assert_eq!(normalize_macros(r"\vec{x}"), r"\mathbf{x}");
        assert_eq!(normalize_macros(r"\tmat{W}"), r"$\mathbf{W}$");
        assert_eq!(normalize_macros(r"\emat{X}"), r"\widehat{\mathbf{X}}");
        assert_eq!(normalize_macros(r"\tevec{y}"), r"$\widehat{\mathbf{y}}$");
    }

    #[test]
    fn test_composite_covariance_before_simple() {
        assert_eq!(normalize_macros(r"\tcov{\mat{B}}"), r"$\mathbf{\Sigma}_\mathbf{B}$");
        assert_eq!(
            normalize_macros(r"\tcov{\emat{B}}"),
            r"$\mathbf{\Sigma}_{\widehat{\mathbf{B}}}$"
        );
        assert_eq!(normalize_macros(r"\tcov{\text{noise}}"), r"$\mathbf{\Sigma}_\text{noise}$");
        assert_eq!(
            normalize_macros(r"\icov{\emat{X}}"),
            r"\mathbf{\Sigma}^{-1}_{\widehat{\mathbf{X}}}"
        );
        assert_eq!(normalize_macros(r"\cov{X}"), r"\mathbf{\Sigma}_\mathbf{X}");
        assert_eq!(normalize_macros(r"\ticov{X}"), r"$\mathbf{\Sigma}^{-1}_\mathbf{X}$");
    }

    #[test]
    fn test_transpose_keeps_longer_names() {
        assert_eq!(normalize_macros(r"A\trans B\hermconj"), r"A^\mathsf{T} B^\mathsf{H}");
        assert_eq!(normalize_macros(r"\transpose"), r"\transpose");
        assert_eq!(normalize_macros(r"X\trans_{i}"), r"X^\mathsf{T}_{i}");
        assert_eq!(normalize_macros(r"y = x\hermconj"), r"y = x^\mathsf{H}");
    }

    #[test]
    fn test_starred_floats() {
        let input = "\\begin{figure*}[t]\n\\begin{table*}x\\end{table*}\n\\end{figure*}";
        assert_eq!(
            normalize_macros(input),
            "\\begin{figure}[t]\n\\begin{table}x\\end{table}\n\\end{figure}"
        );
    }

    #[test]
    fn test_vspace_is_deleted_and_idempotent() {
        let once = normalize_macros("a\\vspace{2ex}b");
        assert_eq!(once, "ab");
        assert_eq!(normalize_macros(&once), "ab");
    }

    #[test]
    fn test_table_cells() {
        let input = "\\begin{tabular}[t]{@{}l|c@{}}\\hline\n\\multicolumn{2}{c}{\\textbf{Total}} \\\\ \\cline{1-2}\n\\multirow{2}{*}{A} & b\n\\end{tabular}";
        assert_eq!(
            normalize_macros(input),
            "\\begin{tabular}\n\\textbf{Total} \\\\ \nA & b\n\\end{tabular}"
        );
    }

    #[test]
    fn test_tabular_without_spec_keeps_following_text() {
        assert_eq!(
            TabularSpecRule.apply("\\begin{tabular}\na & b"),
            "\\begin{tabular}\na & b"
        );
    }

    #[test]
    fn test_newcolumntype_definition_removed() {
        let input = "\\newcolumntype{L}[1]{>{\\raggedright\\let\\newline\\\\\\arraybackslash\\hspace{0pt}}m{#1}}\nbody";
        assert_eq!(normalize_macros(input), "\nbody");
    }

    #[test]
    fn test_argument_rule_leaves_malformed_use() {
        let rule = ArgumentRule::keep("multicolumn", 3, 2);
        assert_eq!(rule.apply("\\multicolumn{2}{c}"), "\\multicolumn{2}{c}");
        assert_eq!(rule.apply("\\multicolumnx{1}"), "\\multicolumnx{1}");
    }

    #[test]
    fn test_spacing_commands() {
        assert_eq!(normalize_macros("a\\quad b\\,c \\qquad"), "a  b c \\qquad");
    }
}
