//! Seek search-page adapter.
//!
//! Seek renders search results into an inline `window.SEEK_REDUX_DATA`
//! script blob. The parser cuts that object out of the HTML with a
//! balanced-brace scan (string-aware, since job teasers contain braces)
//! and reads the embedded results array as JSON.

use ajh_core::BoardId;
use ajh_storage::HttpFetcher;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::{slugify, AdapterError, BoardAdapter, RawListing, SearchQuery};

const REDUX_MARKER: &str = "window.SEEK_REDUX_DATA";

#[derive(Debug, Clone, Copy)]
pub struct SeekAdapter;

#[async_trait]
impl BoardAdapter for SeekAdapter {
    fn board(&self) -> BoardId {
        BoardId::Seek
    }

    async fn fetch(&self, http: &HttpFetcher, query: &SearchQuery) -> Result<String, AdapterError> {
        let url = format!(
            "https://www.seek.com.au/{}-jobs/in-{}",
            slugify(&query.keywords),
            slugify(&query.location)
        );
        Ok(http.fetch_text(&self.board(), &url).await?)
    }

    fn parse(
        &self,
        payload: &str,
        _fetched_at: DateTime<Utc>,
    ) -> Result<Vec<RawListing>, AdapterError> {
        let blob = extract_redux_object(payload).ok_or_else(|| {
            AdapterError::unexpected(self.board(), format!("no {REDUX_MARKER} object in page"))
        })?;
        let data: JsonValue = serde_json::from_str(blob)
            .map_err(|e| AdapterError::unexpected(self.board(), format!("redux blob: {e}")))?;

        let jobs = data
            .get("results")
            .and_then(|r| r.get("results"))
            .and_then(JsonValue::as_array)
            .ok_or_else(|| {
                AdapterError::unexpected(self.board(), "results.results array missing")
            })?;

        Ok(jobs.iter().map(|job| self.raw_from_job(job)).collect())
    }
}

impl SeekAdapter {
    fn raw_from_job(&self, job: &JsonValue) -> RawListing {
        let url = job.get("id").and_then(job_id_string).map(|id| {
            format!("https://www.seek.com.au/job/{id}")
        });
        RawListing {
            source: Some(BoardId::Seek),
            title: json_string(job, "title"),
            company: job
                .get("advertiser")
                .and_then(|a| a.get("description"))
                .and_then(JsonValue::as_str)
                .map(ToString::to_string),
            location: json_string(job, "location"),
            description: json_string(job, "teaser"),
            salary_text: json_string(job, "salary"),
            date_posted: json_string(job, "listingDate")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc)),
            url,
        }
    }
}

fn json_string(value: &JsonValue, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(JsonValue::as_str)
        .map(ToString::to_string)
}

/// Seek job ids arrive as either JSON numbers or strings.
fn job_id_string(id: &JsonValue) -> Option<String> {
    if let Some(s) = id.as_str() {
        return Some(s.to_string());
    }
    id.as_i64().map(|n| n.to_string())
}

/// Find the first balanced `{...}` object after the marker assignment.
/// Braces inside JSON strings are ignored; backslash escapes inside
/// strings are honoured.
fn extract_redux_object(html: &str) -> Option<&str> {
    let marker_at = html.find(REDUX_MARKER)?;
    let after = &html[marker_at..];
    let open_rel = after.find('{')?;
    let object = &after[open_rel..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in object.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&object[..i + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
