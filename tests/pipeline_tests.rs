use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use texdocx::core::preprocess::{finalize_document, linearize_tables, normalize_macros};
use texdocx::{preprocess_file, ConversionError, FigureStrategy, PipelineOptions};

fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

const MAIN: &str = r"\documentclass{vanvliet_paper}
\begin{document}
\input{paper/sections/intro}
\begin{figure*}[t]
  \centering
  \includegraphics[width=\linewidth]{paper/figures/pipeline}
  \caption{Pipeline overview.}
  \label{fig:pipeline}
\end{figure*}
\begin{table}
\begin{tabular}{lr}
\hline
Method & Error \\
\multicolumn{1}{l}{\textbf{Ours}} & 0.1 \\
\end{tabular}
\end{table}
\end{document}
";

fn manuscript() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("main.tex"), MAIN);
    write_file(
        &dir.path().join("sections/intro.tex"),
        "We estimate \\tcov{\\mat{B}} from $\\mat{X}\\trans$.\n\\end{document}\n",
    );
    write_file(&dir.path().join("figures/pipeline.png"), "png");
    dir
}

#[test]
fn test_full_pipeline() {
    let dir = manuscript();
    let out = preprocess_file(&dir.path().join("main.tex"), &PipelineOptions::default()).unwrap();
    assert!(!out.has_warnings(), "{:?}", out.warnings);
    let expected = concat!(
        "\\documentclass{vanvliet_paper}\n",
        "\\begin{document}\n",
        "We estimate $\\mathbf{\\Sigma}_\\mathbf{B}$ from $\\mathbf{X}^\\mathsf{T}$.\n",
        "\n",
        "\n",
        "\\begin{figure}[t]\n",
        "\\centering\n",
        "  \\centerline{\\includegraphics[width=0.8\\textwidth]{figures/pipeline.png}}\n",
        "  \\caption{Pipeline overview.}\n",
        "  \\label{fig:pipeline}\n",
        "\\end{figure}\n",
        "\\begin{table}\n",
        "\\begin{tabular}\n",
        "\n",
        "Method  |  Error \n",
        "\\textbf{Ours}  |  0.1 \n",
        "\\end{tabular}\n",
        "\\end{table}\n",
        "\n",
        "% Debug information\n",
        "% End of document reached\n",
        "\\end{document}\n",
    );
    assert_eq!(out.content, expected);
}

#[test]
fn test_each_strategy_produces_one_terminator() {
    let dir = manuscript();
    for strategy in FigureStrategy::ALL {
        let options = PipelineOptions::default().with_strategy(strategy);
        let out = preprocess_file(&dir.path().join("main.tex"), &options).unwrap();
        assert_eq!(out.content.matches("\\end{document}").count(), 1, "{}", strategy);
        assert!(out.content.contains("figures/pipeline.png"), "{}", strategy);
    }
}

#[test]
fn test_missing_image_is_a_warning() {
    let dir = manuscript();
    fs::remove_file(dir.path().join("figures/pipeline.png")).unwrap();
    let out = preprocess_file(&dir.path().join("main.tex"), &PipelineOptions::default()).unwrap();
    assert_eq!(out.warnings.len(), 1);
    assert!(out.content.contains("\\includegraphics[width=\\linewidth]{paper/figures/pipeline}"));
}

#[test]
fn test_missing_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("main.tex"), "\\input{nowhere}");
    let err = preprocess_file(&dir.path().join("main.tex"), &PipelineOptions::default()).unwrap_err();
    assert!(matches!(err, ConversionError::UnresolvedInclusion { .. }));
}

#[test]
fn test_self_inclusion_is_a_cycle() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("main.tex"), "a \\input{main} b");
    let err = preprocess_file(&dir.path().join("main.tex"), &PipelineOptions::default()).unwrap_err();
    assert!(matches!(err, ConversionError::InclusionCycle { .. }));
    assert!(err.to_string().contains("main.tex -> "));
}

#[test]
fn test_documented_rewrites() {
    assert_eq!(normalize_macros("\\mat{A}"), "\\mathbf{A}");
    assert_eq!(normalize_macros("\\tcov{\\mat{B}}"), "$\\mathbf{\\Sigma}_\\mathbf{B}$");
}

#[test]
fn test_finalizer_for_any_terminator_count() {
    for n in 0..4 {
        let input = format!("body\n{}", "\\end{document}\n".repeat(n));
        let twice = finalize_document(&finalize_document(&input));
        assert_eq!(twice.matches("\\end{document}").count(), 1);
        assert_eq!(twice, finalize_document(&input));
    }
}

#[test]
fn test_linearizer_without_tables() {
    let text = "a & b \\\\ c";
    assert_eq!(linearize_tables(text).unwrap(), text);
}
