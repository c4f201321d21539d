//! LinkedIn guest-search adapter.
//!
//! The guest jobs API returns an HTML fragment of `base-search-card`
//! list items, no login required. Posting dates come from the `<time>`
//! element's `datetime` attribute as a bare date.

use ajh_core::BoardId;
use ajh_storage::HttpFetcher;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};

use crate::{encode_query_value, AdapterError, BoardAdapter, RawListing, SearchQuery};

#[derive(Debug, Clone, Copy)]
pub struct LinkedInAdapter;

#[async_trait]
impl BoardAdapter for LinkedInAdapter {
    fn board(&self) -> BoardId {
        BoardId::LinkedIn
    }

    async fn fetch(&self, http: &HttpFetcher, query: &SearchQuery) -> Result<String, AdapterError> {
        let url = format!(
            "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search?keywords={}&location={}&f_TPR=r86400",
            encode_query_value(&query.keywords),
            encode_query_value(&query.location)
        );
        Ok(http.fetch_text(&self.board(), &url).await?)
    }

    fn parse(
        &self,
        payload: &str,
        _fetched_at: DateTime<Utc>,
    ) -> Result<Vec<RawListing>, AdapterError> {
        let document = Html::parse_document(payload);
        let card = selector(self.board(), "div.base-card, li div.base-search-card")?;
        let title = selector(self.board(), "h3.base-search-card__title")?;
        let company = selector(self.board(), "h4.base-search-card__subtitle")?;
        let location = selector(self.board(), "span.job-search-card__location")?;
        let link = selector(self.board(), "a.base-card__full-link")?;
        let posted = selector(self.board(), "time")?;

        let mut raws = Vec::new();
        for element in document.select(&card) {
            raws.push(RawListing {
                source: Some(BoardId::LinkedIn),
                title: first_text(&element, &title),
                company: first_text(&element, &company),
                location: first_text(&element, &location),
                description: None,
                salary_text: None,
                date_posted: element
                    .select(&posted)
                    .next()
                    .and_then(|t| t.value().attr("datetime"))
                    .and_then(parse_posting_date),
                url: element
                    .select(&link)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(|href| strip_tracking(href).to_string()),
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
        .trim()
        .to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// `datetime` carries a bare date; treat it as midnight UTC.
fn parse_posting_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}

/// Guest links append a `?refId=...&trackingId=...` query.
fn strip_tracking(href: &str) -> &str {
    href.split('?').next().unwrap_or(href)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUEST_FRAGMENT: &str = r#"
<ul>
  <li>
    <div class="base-card base-search-card">
      <a class="base-card__full-link" href="https://au.linkedin.com/jobs/view/graduate-engineer-4123?refId=abc&amp;trackingId=def">view</a>
      <h3 class="base-search-card__title"> Graduate Engineer </h3>
      <h4 class="base-search-card__subtitle">Atlassian</h4>
      <span class="job-search-card__location">Sydney, New South Wales, Australia</span>
      <time class="job-search-card__listdate" datetime="2026-03-01">1 day ago</time>
    </div>
  </li>
  <li>
    <div class="base-card base-search-card">
      <h3 class="base-search-card__title">Junior Developer</h3>
      <h4 class="base-search-card__subtitle">Tyro</h4>
      <span class="job-search-card__location">Melbourne, Victoria, Australia</span>
    </div>
  </li>
</ul>"#;

    fn fetched_at() -> DateTime<Utc> {
        "2026-03-02T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn parses_guest_cards() {
        let raws = LinkedInAdapter.parse(GUEST_FRAGMENT, fetched_at()).unwrap();
        assert_eq!(raws.len(), 2);

        let first = &raws[0];
        assert_eq!(first.title.as_deref(), Some("Graduate Engineer"));
        assert_eq!(first.company.as_deref(), Some("Atlassian"));
        assert_eq!(
            first.url.as_deref(),
            Some("https://au.linkedin.com/jobs/view/graduate-engineer-4123")
        );
        assert_eq!(
            first.date_posted,
            Some("2026-03-01T00:00:00Z".parse().unwrap())
        );
    }

    #[test]
    fn cards_without_link_or_date_still_parse() {
        let raws = LinkedInAdapter.parse(GUEST_FRAGMENT, fetched_at()).unwrap();
        let second = &raws[1];
        assert_eq!(second.title.as_deref(), Some("Junior Developer"));
        assert_eq!(second.url, None);
        assert_eq!(second.date_posted, None);
    }

    #[test]
    fn empty_fragment_yields_no_listings() {
        let raws = LinkedInAdapter.parse("<ul></ul>", fetched_at()).unwrap();
        assert!(raws.is_empty());
    }
}
