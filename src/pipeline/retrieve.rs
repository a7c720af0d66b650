//! Context retrieval from the course corpus.
//!
//! The corpus is an SQLite FTS5 table built offline by the crawler. This
//! module only reads it: one `MATCH` query per request, capped at `top_k`
//! rows. Rows come back in table order, as the crawler inserted them.
//!
//! Failures come back as `Err(RetrievalError)`. Deciding to carry on with an
//! empty context is the caller's job (see [`crate::answer`]), so the policy is
//! visible where the pipeline is assembled rather than hidden in here.

use crate::error::RetrievalError;
use crate::output::ContextRow;
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A full-text index.
pub trait SearchStore: Send + Sync {
    /// Return at most `limit` rows matching `text`, in the store's own order.
    fn query(&self, text: &str, limit: usize) -> Result<Vec<ContextRow>, RetrievalError>;
}

/// [`SearchStore`] over an FTS5 virtual table with `url` and `description` columns.
#[derive(Debug, Clone)]
pub struct SqliteFtsStore {
    path: PathBuf,
    table: String,
    escape_query: bool,
}

impl SqliteFtsStore {
    /// `table` must already be validated as an identifier (see
    /// [`crate::config::AssistantConfigBuilder::build`]).
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            table: table.into(),
            escape_query: false,
        }
    }

    /// Quote every query term so punctuation cannot break FTS5 syntax.
    pub fn with_escaped_queries(mut self, v: bool) -> Self {
        self.escape_query = v;
        self
    }

    fn open(&self) -> Result<Connection, RetrievalError> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RetrievalError::Unavailable {
            path: self.path.display().to_string(),
            detail: e.to_string(),
        })
    }
}

impl SearchStore for SqliteFtsStore {
    fn query(&self, text: &str, limit: usize) -> Result<Vec<ContextRow>, RetrievalError> {
        let conn = self.open()?;
        let match_expr = if self.escape_query {
            escape_fts_query(text)
        } else {
            text.to_string()
        };

        let sql = format!(
            "SELECT url, description FROM {table} WHERE {table} MATCH ?1 LIMIT ?2",
            table = self.table
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| RetrievalError::Query(e.to_string()))?;

        let rows = stmt
            .query_map(params![match_expr, limit as i64], |row| {
                let url: Option<String> = row.get(0)?;
                let description: Option<String> = row.get(1)?;
                Ok(ContextRow::new(
                    url.unwrap_or_default(),
                    description.unwrap_or_default(),
                ))
            })
            .map_err(|e| RetrievalError::Query(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RetrievalError::Query(e.to_string()))?;

        Ok(rows)
    }
}

/// Create the FTS5 table the crawler fills, if it does not exist yet.
pub fn create_schema(path: &Path, table: &str) -> rusqlite::Result<()> {
    let conn = Connection::open(path)?;
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING fts5(
            url,
            description,
            content,
            tokenize = 'porter'
        );"
    ))
}

/// Turn free text into an OR of quoted terms.
///
/// Everything except letters, digits and whitespace becomes a separator, so
/// FTS5 operators and punctuation (`?`, `"`, `*`, `:`) never reach the parser.
pub fn escape_fts_query(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(|w| format!("\"{w}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Fetches the passages that ground an answer.
pub struct ContextRetriever {
    store: Arc<dyn SearchStore>,
    top_k: usize,
}

impl ContextRetriever {
    pub fn new(store: Arc<dyn SearchStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }

    /// Query the store with the full merged question text.
    pub fn retrieve(&self, question: &str) -> Result<Vec<ContextRow>, RetrievalError> {
        let mut rows = self.store.query(question, self.top_k)?;
        rows.truncate(self.top_k);
        debug!("Retrieved {} context rows", rows.len());
        Ok(rows)
    }
}

/// Join non-empty descriptions with a blank line, in retrieval order.
pub fn join_context(rows: &[ContextRow]) -> String {
    rows.iter()
        .map(|r| r.description.as_str())
        .filter(|d| !d.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> (tempfile::TempDir, SqliteFtsStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.db");
        create_schema(&path, "content_fts").unwrap();

        let conn = Connection::open(&path).unwrap();
        for (url, desc, content) in [
            ("https://x/1", "A DataFrame is a 2-D labeled table.", "pandas dataframe basics"),
            ("https://x/2", "Series are 1-D arrays.", "pandas series"),
            ("https://x/3", "Docker packages applications.", "containers images"),
        ] {
            conn.execute(
                "INSERT INTO content_fts (url, description, content) VALUES (?1, ?2, ?3)",
                params![url, desc, content],
            )
            .unwrap();
        }

        (dir, SqliteFtsStore::new(path, "content_fts"))
    }

    #[test]
    fn matches_plain_terms() {
        let (_dir, store) = seeded_store();
        let rows = store.query("dataframe", 3).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].url, "https://x/1");
    }

    #[test]
    fn respects_limit() {
        let (_dir, store) = seeded_store();
        let rows = store.query("pandas", 1).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn rows_follow_insertion_order() {
        let (_dir, store) = seeded_store();
        let rows = store.query("pandas", 3).unwrap();
        let urls: Vec<_> = rows.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, ["https://x/1", "https://x/2"]);
    }

    #[test]
    fn raw_punctuation_is_a_query_error() {
        let (_dir, store) = seeded_store();
        let err = store.query("What is a DataFrame?", 3).unwrap_err();
        assert!(matches!(err, RetrievalError::Query(_)), "got {err:?}");
    }

    #[test]
    fn escaped_queries_tolerate_punctuation() {
        let (_dir, store) = seeded_store();
        let store = store.with_escaped_queries(true);
        let rows = store.query("What is a DataFrame?", 3).unwrap();
        assert!(rows.iter().any(|r| r.url == "https://x/1"));
    }

    #[test]
    fn missing_database_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteFtsStore::new(dir.path().join("absent.db"), "content_fts");
        let err = store.query("anything", 3).unwrap_err();
        assert!(matches!(err, RetrievalError::Unavailable { .. }));
    }

    #[test]
    fn escape_quotes_each_term() {
        assert_eq!(escape_fts_query("a* \"b\" c?"), "\"a\" OR \"b\" OR \"c\"");
        assert_eq!(escape_fts_query("?!"), "");
    }

    #[test]
    fn join_skips_empty_descriptions() {
        let rows = vec![
            ContextRow::new("u1", "first"),
            ContextRow::new("u2", ""),
            ContextRow::new("u3", "third"),
        ];
        assert_eq!(join_context(&rows), "first\n\nthird");
    }
}
