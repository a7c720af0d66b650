//! Types that cross module boundaries: retrieved rows and the final answer.

use serde::{Deserialize, Serialize};

/// One passage matched by the search store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRow {
    pub url: String,
    pub description: String,
}

impl ContextRow {
    pub fn new(url: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            description: description.into(),
        }
    }
}

/// A supporting link shown under the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    /// Description excerpt, at most 60 characters plus `...`.
    pub text: String,
}

/// The response body of a successful request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub links: Vec<Link>,
}
