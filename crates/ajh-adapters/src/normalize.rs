//! Raw-to-canonical listing conversion.
//!
//! A raw listing survives normalization only if it carries a title and
//! a URL; everything else degrades to an empty field. Malformed
//! records are dropped and counted, never allowed to abort a batch.

use ajh_core::{phrase, BoardId, CanonicalListing};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::RawListing;

#[derive(Debug, Error, PartialEq)]
pub enum MalformedListing {
    #[error("listing from {0} has no title")]
    MissingTitle(BoardId),
    #[error("listing from {0} has no url")]
    MissingUrl(BoardId),
    #[error("listing has no source board")]
    MissingSource,
}

/// Phrases that mark a listing as remote-friendly. Scanned over the
/// location, title, and description.
#[derive(Debug, Clone)]
pub struct Normalizer {
    remote_phrases: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            remote_phrases: [
                "remote",
                "work from home",
                "work-from-home",
                "wfh",
                "anywhere in australia",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeOutcome {
    pub listings: Vec<CanonicalListing>,
    pub dropped: usize,
}

impl Normalizer {
    pub fn new(remote_phrases: Vec<String>) -> Self {
        Self { remote_phrases }
    }

    pub fn normalize(&self, raw: RawListing) -> Result<CanonicalListing, MalformedListing> {
        let source = raw.source.ok_or(MalformedListing::MissingSource)?;
        let title = clean_text(raw.title)
            .ok_or_else(|| MalformedListing::MissingTitle(source.clone()))?;
        let url =
            clean_text(raw.url).ok_or_else(|| MalformedListing::MissingUrl(source.clone()))?;

        let company = clean_text(raw.company).unwrap_or_default();
        let location = clean_text(raw.location).unwrap_or_default();
        let description = clean_text(raw.description).unwrap_or_default();
        let salary_text = clean_text(raw.salary_text).filter(|s| !is_placeholder(s));

        let haystack = phrase::fold(&format!("{location} {title} {description}"));
        let is_remote = self
            .remote_phrases
            .iter()
            .any(|p| phrase::contains_phrase(&haystack, p));

        Ok(CanonicalListing {
            title,
            company,
            location,
            description,
            date_posted: raw.date_posted,
            salary_text,
            is_remote,
            source,
            url,
        })
    }

    /// Normalize a whole parse batch, counting the drops.
    pub fn normalize_batch(&self, raws: Vec<RawListing>) -> NormalizeOutcome {
        let mut outcome = NormalizeOutcome::default();
        for raw in raws {
            match self.normalize(raw) {
                Ok(listing) => outcome.listings.push(listing),
                Err(_) => outcome.dropped += 1,
            }
        }
        outcome
    }
}

pub fn normalize(raw: RawListing) -> Result<CanonicalListing, MalformedListing> {
    Normalizer::default().normalize(raw)
}

pub fn normalize_batch(raws: Vec<RawListing>) -> NormalizeOutcome {
    Normalizer::default().normalize_batch(raws)
}

fn clean_text(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Serialized not-a-value markers some board payloads leak through.
fn is_placeholder(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "nan" | "none" | "null" | "n/a" | "undefined"
    )
}
