//! Prompt template for the completion call.
//!
//! The template is fixed: one system message establishing the persona and one
//! user message carrying the question followed by the retrieved passages.
//! Callers can override the persona via
//! [`crate::config::AssistantConfig::system_prompt`]; the user-message layout
//! cannot be changed.

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful TA for the Tools in Data Science course.";

/// Label introducing the retrieved passages inside the user message.
pub const CONTEXT_LABEL: &str = "Reference context:";

/// Build the user message: question, blank line, labelled context block.
pub fn user_message(question: &str, context: &str) -> String {
    format!("{question}\n\n{CONTEXT_LABEL}\n{context}")
}
