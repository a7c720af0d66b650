//! Pipeline stages for answering one question.
//!
//! Each submodule implements exactly one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! sanitize ──▶ encode ──▶ ocr ──▶ retrieve ──▶ llm ──▶ compose
//! (payload)   (base64)   (text)   (FTS5)     (chat)   (links)
//! ```
//!
//! 1. [`sanitize`] — decode the body and strip template markers
//! 2. [`encode`]   — base64 field → bytes; bytes → PNG for the recognizer
//! 3. [`ocr`]      — digest-keyed, single-flight cache over the recognizer,
//!    which runs in `spawn_blocking`
//! 4. [`retrieve`] — one `MATCH` query; errors are returned, not hidden
//! 5. [`llm`]      — prompt + retry/timeout around the completion backend;
//!    the only stage with network I/O
//! 6. [`compose`]  — answer plus trimmed link excerpts

pub mod compose;
pub mod encode;
pub mod llm;
pub mod ocr;
pub mod retrieve;
pub mod sanitize;
