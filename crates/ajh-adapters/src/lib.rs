//! Board adapter contracts and per-board payload parsers.
//!
//! Each adapter splits fetching (async, goes through the shared
//! [`HttpFetcher`]) from parsing (sync, pure function of the payload
//! text). Parsers emit loosely-typed [`RawListing`] records; the
//! normalizer in [`normalize`] turns those into canonical listings and
//! drops the malformed ones.

use ajh_core::BoardId;
use ajh_storage::HttpFetcher;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod gradconnection;
pub mod indeed;
pub mod linkedin;
pub mod normalize;
pub mod prosple;
pub mod seek;

pub use gradconnection::GradConnectionAdapter;
pub use indeed::IndeedAdapter;
pub use linkedin::LinkedInAdapter;
pub use normalize::{normalize, normalize_batch, MalformedListing, NormalizeOutcome, Normalizer};
pub use prosple::ProspleAdapter;
pub use seek::SeekAdapter;

pub const CRATE_NAME: &str = "ajh-adapters";

/// Field-by-field capture of one listing exactly as the board payload
/// presented it. Everything is optional; the normalizer decides what
/// is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub source: Option<BoardId>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub salary_text: Option<String>,
    pub date_posted: Option<DateTime<Utc>>,
    pub url: Option<String>,
}

/// One board search: keyword terms plus a location hint. Adapters
/// translate this into whatever URL shape their board expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keywords: String,
    pub location: String,
}

impl SearchQuery {
    pub fn new(keywords: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            location: location.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("payload from {board} did not match the expected shape: {detail}")]
    UnexpectedPayload { board: BoardId, detail: String },
    #[error(transparent)]
    Fetch(#[from] anyhow::Error),
}

impl AdapterError {
    pub fn unexpected(board: BoardId, detail: impl Into<String>) -> Self {
        Self::UnexpectedPayload {
            board,
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait BoardAdapter: Send + Sync {
    fn board(&self) -> BoardId;

    /// Fetch the raw search payload for one query. The payload text is
    /// returned untouched so the caller can archive it before parsing.
    async fn fetch(&self, http: &HttpFetcher, query: &SearchQuery) -> Result<String, AdapterError>;

    /// Parse a previously fetched payload. `fetched_at` anchors
    /// relative timestamps ("3 days ago") some boards use.
    fn parse(
        &self,
        payload: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<RawListing>, AdapterError>;
}

pub fn adapter_for_board(board: &BoardId) -> Option<Box<dyn BoardAdapter>> {
    match board {
        BoardId::Seek => Some(Box::new(SeekAdapter)),
        BoardId::LinkedIn => Some(Box::new(LinkedInAdapter)),
        BoardId::GradConnection => Some(Box::new(GradConnectionAdapter)),
        BoardId::Prosple => Some(Box::new(ProspleAdapter)),
        BoardId::Indeed => Some(Box::new(IndeedAdapter)),
        BoardId::Other(_) => None,
    }
}

pub fn default_adapters() -> Vec<Box<dyn BoardAdapter>> {
    vec![
        Box::new(SeekAdapter),
        Box::new(LinkedInAdapter),
        Box::new(GradConnectionAdapter),
        Box::new(ProspleAdapter),
        Box::new(IndeedAdapter),
    ]
}

/// Percent-encode a query value for the boards that take GET params.
pub(crate) fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(ch),
            ' ' => out.push_str("%20"),
            _ => {
                let mut buf = [0u8; 4];
                for byte in ch.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    out
}

/// Lowercase hyphenated slug for boards that put search terms in the
/// URL path.
pub(crate) fn slugify(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_registry_covers_the_supported_boards() {
        for board in [
            BoardId::Seek,
            BoardId::LinkedIn,
            BoardId::GradConnection,
            BoardId::Prosple,
            BoardId::Indeed,
        ] {
            let adapter = adapter_for_board(&board).unwrap();
            assert_eq!(adapter.board(), board);
        }
        assert!(adapter_for_board(&BoardId::Other("mystery".into())).is_none());
    }

    #[test]
    fn query_values_are_percent_encoded() {
        assert_eq!(
            encode_query_value("software engineer"),
            "software%20engineer"
        );
        assert_eq!(encode_query_value("c++ & go"), "c%2B%2B%20%26%20go");
    }

    #[test]
    fn slugs_are_lowercase_hyphenated() {
        assert_eq!(slugify("  Graduate Software Engineer "), "graduate-software-engineer");
    }
}
