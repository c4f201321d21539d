//! Indeed AU search-page adapter.
//!
//! Result cards only expose a relative age ("Posted 3 days ago"), so
//! posting dates are reconstructed against the fetch time. The card's
//! `data-jk` key rebuilds a stable viewjob URL, which keeps dedup
//! identity independent of Indeed's tracking-laden anchor hrefs.

use ajh_core::BoardId;
use ajh_storage::HttpFetcher;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use scraper::{ElementRef, Html, Selector};

use crate::{encode_query_value, AdapterError, BoardAdapter, RawListing, SearchQuery};

#[derive(Debug, Clone, Copy)]
pub struct IndeedAdapter;

#[async_trait]
impl BoardAdapter for IndeedAdapter {
    fn board(&self) -> BoardId {
        BoardId::Indeed
    }

    async fn fetch(&self, http: &HttpFetcher, query: &SearchQuery) -> Result<String, AdapterError> {
        let url = format!(
            "https://au.indeed.com/jobs?q={}&l={}&sort=date",
            encode_query_value(&query.keywords),
            encode_query_value(&query.location)
        );
        Ok(http.fetch_text(&self.board(), &url).await?)
    }

    fn parse(
        &self,
        payload: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<RawListing>, AdapterError> {
        let document = Html::parse_document(payload);
        let card = selector(self.board(), "div.job_seen_beacon")?;
        let title = selector(self.board(), "h2.jobTitle span")?;
        let job_key = selector(self.board(), "a[data-jk]")?;
        let company = selector(self.board(), "span.companyName")?;
        let location = selector(self.board(), "div.companyLocation")?;
        let snippet = selector(self.board(), "div.job-snippet")?;
        let salary = selector(self.board(), "div.salary-snippet-container")?;
        let age = selector(self.board(), "span.date")?;

        let mut raws = Vec::new();
        for element in document.select(&card) {
            raws.push(RawListing {
                source: Some(BoardId::Indeed),
                title: first_text(&element, &title),
                company: first_text(&element, &company),
                location: first_text(&element, &location),
                description: first_text(&element, &snippet),
                salary_text: first_text(&element, &salary),
                date_posted: first_text(&element, &age)
                    .and_then(|text| parse_relative_age(&text, fetched_at)),
                url: element
                    .select(&job_key)
                    .next()
                    .and_then(|a| a.value().attr("data-jk"))
                    .map(|jk| format!("https://au.indeed.com/viewjob?jk={jk}")),
            });
        }
        Ok(raws)
    }
}

fn selector(board: BoardId, css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::unexpected(board, e.to_string()))
}

fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    let text = element
        .select(selector)
        .next()?
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// "Just posted" and "Today" anchor to the fetch time; "n day(s) ago"
/// and "n hour(s) ago" subtract from it. Anything else stays unknown.
fn parse_relative_age(text: &str, fetched_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let folded = text.to_lowercase();
    if folded.contains("just posted") || folded.contains("today") {
        return Some(fetched_at);
    }
    let amount: i64 = folded
        .split_whitespace()
        .find_map(|word| word.parse().ok())?;
    if folded.contains("hour") {
        Some(fetched_at - Duration::hours(amount))
    } else if folded.contains("day") {
        Some(fetched_at - Duration::days(amount))
    } else {
        None
    }
}
