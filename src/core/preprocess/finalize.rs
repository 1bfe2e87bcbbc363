//! Document terminator normalization.

use tracing::debug;

use crate::utils::latex::count_occurrences;

const DOCUMENT_END: &str = "\\end{document}";
const TRAILER_NOTE: &str = "% Debug information\n% End of document reached";

/// Remove every `\end{document}` and append exactly one, preceded by a short
/// comment block. Applying it twice gives the same text.
pub fn finalize_document(input: &str) -> String {
    debug!(
        "replacing {} document terminator(s)",
        count_occurrences(input, DOCUMENT_END)
    );
    let stripped = input.replace(DOCUMENT_END, "");
    let mut body = stripped.trim_end();
    while let Some(rest) = body.strip_suffix(TRAILER_NOTE) {
        body = rest.trim_end();
    }
    format!("{}\n\n{}\n{}\n", body, TRAILER_NOTE, DOCUMENT_END)
}
