//! Final answer assembly.

use crate::output::{AnswerResponse, ContextRow, Link};

/// Maximum characters of a description shown as link text.
pub const LINK_TEXT_CHARS: usize = 60;

/// Appended to link text that was cut short.
pub const ELLIPSIS: &str = "...";

/// Pair the generated answer with links to the passages that grounded it.
///
/// Rows missing either a URL or a description produce no link.
pub fn compose(answer: String, rows: &[ContextRow]) -> AnswerResponse {
    let links = rows
        .iter()
        .filter(|r| !r.url.is_empty() && !r.description.is_empty())
        .map(|r| Link {
            url: r.url.clone(),
            text: excerpt(&r.description),
        })
        .collect();

    AnswerResponse { answer, links }
}

/// First [`LINK_TEXT_CHARS`] characters, plus [`ELLIPSIS`] only if anything was cut.
pub fn excerpt(description: &str) -> String {
    match description.char_indices().nth(LINK_TEXT_CHARS) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &description[..cut]),
        None => description.to_string(),
    }
}
