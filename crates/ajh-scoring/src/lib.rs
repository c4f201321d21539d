//! Scoring and ranking of canonical listings against a profile.
//!
//! The engine is a pure function of `(listing, profile, now)`: no I/O,
//! no clock reads, no hidden state. Each of the eight categories caps
//! the unweighted subtotal first and then applies the profile weight,
//! so a weight of 2.0 can at most double the capped contribution.

use ajh_core::phrase;
use ajh_core::{CanonicalListing, Profile, ScoreBreakdown, ScoredListing};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

pub mod tables;

pub use tables::{Adjacency, CulturePhrase, ScoringTables, TitlePoints};

const ADJACENCY_CAP: f64 = 10.0;
const COMPANY_TIER_CAP: f64 = 12.0;
const LOCATION_CAP: f64 = 20.0;
const TITLE_CAP: f64 = 18.0;
const SPONSORSHIP_CAP: f64 = 12.0;
const RECENCY_CAP: f64 = 10.0;
const CULTURE_CAP: f64 = 15.0;
const QUALITY_CAP: f64 = 12.0;

const ADJACENCY_POINTS: f64 = 2.0;
const SPONSORSHIP_POINTS_PER_PHRASE: f64 = 4.0;
const SPONSORSHIP_MAX_PHRASES: usize = 3;
const BAD_TITLE_PENALTY: f64 = 20.0;
const SOFT_SENIORITY_PENALTY: f64 = 5.0;

const PROFILE_TITLE_POINTS: f64 = 18.0;
const GENERALIZED_TITLE_POINTS: f64 = 14.0;
const PROFILE_ROLE_POINTS: f64 = 14.0;

/// Seniority prefixes stripped from a resume title to form its
/// generalized variant.
const SENIORITY_TITLE_PREFIXES: &[&str] = &[
    "junior ",
    "senior ",
    "lead ",
    "staff ",
    "principal ",
    "intern ",
    "graduate ",
    "mid-level ",
    "entry-level ",
];

/// Broad catch-alls appended to every preference list so a profile
/// with niche titles still matches ordinary postings.
const BROAD_TITLE_TERMS: &[(&str, f64)] = &[
    ("software engineer", 10.0),
    ("software developer", 10.0),
    ("developer", 8.0),
    ("engineer", 8.0),
];

const FIRST_LOCATION_POINTS: f64 = 15.0;
const OTHER_LOCATION_POINTS: f64 = 12.0;
const REMOTE_BONUS: f64 = 5.0;

const SALARY_POINTS: f64 = 5.0;
const LONG_DESCRIPTION_POINTS: f64 = 3.0;
const LONG_DESCRIPTION_CHARS: usize = 600;
const BENEFITS_POINTS: f64 = 4.0;

/// Two listings from different boards whose title and company read as
/// the same role. Flagged for the report, never dropped.
const DUPLICATE_FLAG_THRESHOLD: f64 = 0.90;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringOptions {
    /// Apply a -5 penalty to excluded-seniority listings instead of
    /// relying solely on the hard ranking filter. Off by default; the
    /// hard filter remains authoritative either way.
    pub soft_seniority_penalty: bool,
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    tables: ScoringTables,
    options: ScoringOptions,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoringTables::default())
    }
}

impl ScoringEngine {
    pub fn new(tables: ScoringTables) -> Self {
        Self {
            tables,
            options: ScoringOptions::default(),
        }
    }

    pub fn with_options(tables: ScoringTables, options: ScoringOptions) -> Self {
        Self { tables, options }
    }

    pub fn tables(&self) -> &ScoringTables {
        &self.tables
    }

    /// Score one listing against one profile at the given instant.
    /// Callers must pass a normalized, validated profile.
    pub fn score(
        &self,
        listing: &CanonicalListing,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> ScoredListing {
        let title = phrase::fold(&listing.title);
        let body = phrase::fold(&format!("{} {}", listing.title, listing.description));
        let description = phrase::fold(&listing.description);
        let location = phrase::fold(&listing.location);

        let tier = self.tables.classify_company(&listing.company);
        let seniority = self.tables.detect_seniority(&listing.title);

        let weights = &profile.weights;
        let breakdown = ScoreBreakdown {
            skills: self.skills_subtotal(&body, profile) * weights.skills,
            company_tier: tier
                .map(|t| t.base_points().min(COMPANY_TIER_CAP))
                .unwrap_or(0.0)
                * weights.company_tier,
            location: self.location_subtotal(&location, listing.is_remote, profile)
                * weights.location,
            title_match: self.title_subtotal(&title, profile) * weights.title_match,
            sponsorship: self.sponsorship_subtotal(&description) * weights.sponsorship,
            recency: recency_subtotal(listing.date_posted, now) * weights.recency,
            culture: self.culture_subtotal(&body) * weights.culture,
            quality: self.quality_subtotal(listing, &description) * weights.quality,
            penalties: self.penalties(&title, seniority, profile),
        };

        ScoredListing {
            listing: listing.clone(),
            score: breakdown.total(),
            breakdown,
            tier,
            seniority,
        }
    }

    /// Direct skill matches are uncapped; adjacency credit for skills
    /// that did not match directly is capped on its own. Profile
    /// keywords count one point each, like a peripheral skill.
    fn skills_subtotal(&self, body: &str, profile: &Profile) -> f64 {
        let mut direct = 0.0;
        let mut adjacency = 0.0;
        for skill in &profile.skills {
            if phrase::contains_phrase(body, &skill.name) {
                direct += skill.tier.points();
            } else if let Some(related) = self.tables.adjacent_terms(&skill.name) {
                if related
                    .iter()
                    .any(|term| phrase::contains_phrase(body, term))
                {
                    adjacency += ADJACENCY_POINTS;
                }
            }
        }
        for keyword in &profile.keywords {
            if phrase::contains_phrase(body, keyword) {
                direct += 1.0;
            }
        }
        direct + adjacency.min(ADJACENCY_CAP)
    }

    /// Best single preferred-location match (first preference counting
    /// more than the rest) plus a remote bonus, capped.
    fn location_subtotal(&self, location: &str, is_remote: bool, profile: &Profile) -> f64 {
        let mut subtotal = 0.0;
        for (index, preferred) in profile.locations.iter().enumerate() {
            if phrase::contains_phrase(location, preferred) {
                subtotal = if index == 0 {
                    FIRST_LOCATION_POINTS
                } else {
                    OTHER_LOCATION_POINTS
                };
                break;
            }
        }
        if is_remote {
            subtotal += REMOTE_BONUS;
        }
        subtotal.min(LOCATION_CAP)
    }

    /// Highest single match wins; on equal points the earlier source
    /// wins (the profile-built preference list, then the fixed table
    /// in declaration order).
    fn title_subtotal(&self, title: &str, profile: &Profile) -> f64 {
        let mut best = 0.0;
        for pref in title_preferences(profile) {
            if phrase::contains_phrase(title, &pref.term) && pref.points > best {
                best = pref.points;
            }
        }
        for entry in &self.tables.title_points {
            if phrase::contains_phrase(title, &entry.term) && entry.points > best {
                best = entry.points;
            }
        }
        best.min(TITLE_CAP)
    }

    fn sponsorship_subtotal(&self, description: &str) -> f64 {
        let matched = phrase::count_matches(
            description,
            self.tables.sponsorship_phrases.iter().map(String::as_str),
        );
        let counted = matched.min(SPONSORSHIP_MAX_PHRASES) as f64;
        (counted * SPONSORSHIP_POINTS_PER_PHRASE).min(SPONSORSHIP_CAP)
    }

    fn culture_subtotal(&self, body: &str) -> f64 {
        let mut subtotal = 0.0;
        for entry in &self.tables.culture_phrases {
            if phrase::contains_phrase(body, &entry.term) {
                subtotal += entry.points;
            }
        }
        subtotal.min(CULTURE_CAP)
    }

    fn quality_subtotal(&self, listing: &CanonicalListing, description: &str) -> f64 {
        let mut subtotal = 0.0;
        if listing
            .salary_text
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
        {
            subtotal += SALARY_POINTS;
        }
        if listing.description.chars().count() > LONG_DESCRIPTION_CHARS {
            subtotal += LONG_DESCRIPTION_POINTS;
        }
        if self
            .tables
            .benefits_phrases
            .iter()
            .any(|term| phrase::contains_phrase(description, term))
        {
            subtotal += BENEFITS_POINTS;
        }
        subtotal.min(QUALITY_CAP)
    }

    fn penalties(
        &self,
        title: &str,
        seniority: ajh_core::SeniorityLevel,
        profile: &Profile,
    ) -> f64 {
        let mut penalties = 0.0;
        if self
            .tables
            .bad_title_terms
            .iter()
            .any(|term| phrase::contains_phrase(title, term))
        {
            penalties += BAD_TITLE_PENALTY;
        }
        if self.options.soft_seniority_penalty && profile.excludes(seniority) {
            penalties += SOFT_SENIORITY_PENALTY;
        }
        penalties
    }
}

/// Posting-age buckets. A missing date earns nothing; a future-dated
/// posting is treated as freshly posted.
fn recency_subtotal(date_posted: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(posted) = date_posted else {
        return 0.0;
    };
    let hours = (now - posted).num_hours().max(0);
    let points: f64 = if hours <= 24 {
        10.0
    } else if hours <= 24 * 7 {
        6.0
    } else if hours <= 24 * 30 {
        3.0
    } else {
        0.0
    };
    points.min(RECENCY_CAP)
}

/// Build the merged title-preference list from a profile: each resume
/// title at full points, its seniority-stripped generalized form at 14,
/// the profile's role categories at 14, and the broad catch-alls
/// appended when the profile did not already name them. Earlier entries
/// win ties, so resume titles always outrank the catch-alls.
pub fn title_preferences(profile: &Profile) -> Vec<TitlePoints> {
    let mut prefs: Vec<TitlePoints> = Vec::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

    for title in &profile.titles {
        let term = phrase::fold(title.trim());
        if !term.is_empty() && seen.insert(term.clone()) {
            prefs.push(TitlePoints::new(term.clone(), PROFILE_TITLE_POINTS));
        }
        if let Some(generalized) = strip_seniority_prefix(&term) {
            if seen.insert(generalized.clone()) {
                prefs.push(TitlePoints::new(generalized, GENERALIZED_TITLE_POINTS));
            }
        }
    }
    for role in &profile.roles {
        let term = phrase::fold(role.trim());
        if !term.is_empty() && seen.insert(term.clone()) {
            prefs.push(TitlePoints::new(term, PROFILE_ROLE_POINTS));
        }
    }
    for (term, points) in BROAD_TITLE_TERMS {
        if seen.insert((*term).to_string()) {
            prefs.push(TitlePoints::new(*term, *points));
        }
    }
    prefs
}

fn strip_seniority_prefix(term: &str) -> Option<String> {
    for prefix in SENIORITY_TITLE_PREFIXES {
        if let Some(rest) = term.strip_prefix(prefix) {
            let rest = rest.trim_start();
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }
    None
}

/// A cross-board pair whose titles and companies read as the same role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateFlag {
    pub first_url: String,
    pub second_url: String,
    pub similarity: f64,
}

/// Final ordered result set for one run, plus duplicate annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResults {
    pub listings: Vec<ScoredListing>,
    pub duplicates: Vec<DuplicateFlag>,
}

impl RankedResults {
    /// Digest view: listings at or above the threshold, in rank order.
    pub fn digest(&self, min_score: f64) -> Vec<&ScoredListing> {
        self.listings
            .iter()
            .filter(|s| s.score >= min_score)
            .collect()
    }
}

/// Deduplicate by `(source, url)` keeping the first occurrence, drop
/// excluded-seniority listings, then stable-sort by score descending.
/// Input order is the tie-break for equal scores.
pub fn rank_and_filter(scored: Vec<ScoredListing>, profile: &Profile) -> RankedResults {
    let mut seen: std::collections::HashSet<(String, String)> = std::collections::HashSet::new();
    let mut listings: Vec<ScoredListing> = Vec::with_capacity(scored.len());
    for item in scored {
        let key = (
            item.listing.source.as_str().to_string(),
            item.listing.url.clone(),
        );
        if !seen.insert(key) {
            continue;
        }
        if profile.excludes(item.seniority) {
            continue;
        }
        listings.push(item);
    }
    listings.sort_by(|a, b| b.score.total_cmp(&a.score));
    let duplicates = flag_duplicates(&listings);
    RankedResults {
        listings,
        duplicates,
    }
}

/// Pairwise similarity over different-board listings. Title carries
/// most of the weight; company breaks near-ties between similar roles
/// at different employers.
fn flag_duplicates(listings: &[ScoredListing]) -> Vec<DuplicateFlag> {
    let mut flags = Vec::new();
    for (i, a) in listings.iter().enumerate() {
        for b in &listings[i + 1..] {
            if a.listing.source == b.listing.source {
                continue;
            }
            let title_sim = jaro_winkler(
                &phrase::fold(&a.listing.title),
                &phrase::fold(&b.listing.title),
            );
            let company_sim = jaro_winkler(
                &phrase::fold(&a.listing.company),
                &phrase::fold(&b.listing.company),
            );
            let similarity = 0.7 * title_sim + 0.3 * company_sim;
            if similarity >= DUPLICATE_FLAG_THRESHOLD {
                flags.push(DuplicateFlag {
                    first_url: a.listing.url.clone(),
                    second_url: b.listing.url.clone(),
                    similarity,
                });
            }
        }
    }
    flags
}
