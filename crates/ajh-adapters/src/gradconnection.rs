//! GradConnection search-page adapter.
//!
//! Search pages render one `box_container` section per campaign. The
//! page also mixes promo boxes into the same markup, so titles are
//! screened against a junk list before a listing is emitted.

use ajh_core::{phrase, BoardId};
use ajh_storage::HttpFetcher;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};

use crate::{slugify, AdapterError, BoardAdapter, RawListing, SearchQuery};

const BASE_URL: &str = "https://au.gradconnection.com";

/// Promo-box headings that turn up inside the results markup.
const JUNK_TITLES: &[&str] = &[
    "sign up",
    "log in",
    "create an account",
    "employers",
    "advertise with us",
];

#[derive(Debug, Clone, Copy)]
pub struct GradConnectionAdapter;

#[async_trait]
impl BoardAdapter for GradConnectionAdapter {
    fn board(&self) -> BoardId {
        BoardId::GradConnection
    }

    async fn fetch(&self, http: &HttpFetcher, query: &SearchQuery) -> Result<String, AdapterError> {
        let url = format!(
            "{BASE_URL}/{}-graduate-jobs/{}/",
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
        let document = Html::parse_document(payload);
        let container = selector(self.board(), "div.box_container, section.box_container")?;
        let title_link = selector(self.board(), "a.box-header-title")?;
        let employer = selector(self.board(), "p.box-employer-name, div.box-employer-name")?;
        let location = selector(self.board(), "div.box-location, p.box-location")?;
        let teaser = selector(self.board(), "div.box-description p, div.box-description")?;

        let mut raws = Vec::new();
        for card in document.select(&container) {
            let Some(link) = card.select(&title_link).next() else {
                continue;
            };
            let title = collected_text(&link);
            let Some(title) = title else { continue };
            if is_junk_title(&title) {
                continue;
            }
            raws.push(RawListing {
                source: Some(BoardId::GradConnection),
                title: Some(title),
                company: card.select(&employer).next().and_then(|e| collected_text(&e)),
                location: card.select(&location).next().and_then(|e| collected_text(&e)),
                description: card.select(&teaser).next().and_then(|e| collected_text(&e)),
                salary_text: None,
                date_posted: None,
                url: link.value().attr("href").map(absolute_url),
            });
        }
        Ok(raws)
    }
}

fn selector(board: BoardId, css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::unexpected(board, e.to_string()))
}

fn collected_text(element: &ElementRef<'_>) -> Option<String> {
    let text = element
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

fn is_junk_title(title: &str) -> bool {
    let folded = phrase::fold(title);
    JUNK_TITLES
        .iter()
        .any(|junk| phrase::contains_phrase(&folded, junk))
}

fn absolute_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{BASE_URL}{href}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_PAGE: &str = r#"
<main>
  <div class="box_container">
    <a class="box-header-title" href="/employers/maptek/jobs/graduate-software-engineer-2026/">
      Graduate Software
      Engineer 2026
    </a>
    <p class="box-employer-name">Maptek</p>
    <div class="box-location">Adelaide</div>
    <div class="box-description"><p>Build 3D mining software in C++ and Rust.</p></div>
  </div>
  <div class="box_container">
    <a class="box-header-title" href="/register/">Sign up for job alerts</a>
  </div>
  <div class="box_container">
    <a class="box-header-title" href="https://au.gradconnection.com/employers/csl/jobs/it-graduate/">IT Graduate Program</a>
    <p class="box-employer-name">CSL</p>
    <div class="box-location">Melbourne</div>
  </div>
</main>"#;

    fn fetched_at() -> DateTime<Utc> {
        "2026-03-02T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn parses_campaign_boxes_and_resolves_relative_urls() {
        let raws = GradConnectionAdapter.parse(SEARCH_PAGE, fetched_at()).unwrap();
        assert_eq!(raws.len(), 2);

        let first = &raws[0];
        assert_eq!(first.title.as_deref(), Some("Graduate Software Engineer 2026"));
        assert_eq!(first.company.as_deref(), Some("Maptek"));
        assert_eq!(
            first.url.as_deref(),
            Some("https://au.gradconnection.com/employers/maptek/jobs/graduate-software-engineer-2026/")
        );
        assert_eq!(
            first.description.as_deref(),
            Some("Build 3D mining software in C++ and Rust.")
        );

        // Absolute hrefs pass through untouched.
        assert_eq!(
            raws[1].url.as_deref(),
            Some("https://au.gradconnection.com/employers/csl/jobs/it-graduate/")
        );
    }

    #[test]
    fn promo_boxes_are_screened_out() {
        let raws = GradConnectionAdapter.parse(SEARCH_PAGE, fetched_at()).unwrap();
        assert!(raws.iter().all(|r| {
            !r.title.as_deref().unwrap_or_default().contains("Sign up")
        }));
    }
}
