//! Core domain model for AJH: profiles, canonical listings, scored results.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod phrase;

pub const CRATE_NAME: &str = "ajh-core";

/// Job board a listing was discovered on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BoardId {
    Seek,
    LinkedIn,
    Indeed,
    Prosple,
    GradConnection,
    Other(String),
}

impl BoardId {
    pub fn as_str(&self) -> &str {
        match self {
            BoardId::Seek => "seek",
            BoardId::LinkedIn => "linkedin",
            BoardId::Indeed => "indeed",
            BoardId::Prosple => "prosple",
            BoardId::GradConnection => "gradconnection",
            BoardId::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for BoardId {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "seek" => BoardId::Seek,
            "linkedin" => BoardId::LinkedIn,
            "indeed" => BoardId::Indeed,
            "prosple" => BoardId::Prosple,
            "gradconnection" => BoardId::GradConnection,
            _ => BoardId::Other(value),
        }
    }
}

impl From<BoardId> for String {
    fn from(value: BoardId) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Skill tier set by the profile owner; directly controls per-match points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillTier {
    Peripheral,
    Strong,
    Core,
}

impl SkillTier {
    pub fn points(self) -> f64 {
        match self {
            SkillTier::Core => 5.0,
            SkillTier::Strong => 3.0,
            SkillTier::Peripheral => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub tier: SkillTier,
}

/// Career-level bucket inferred from title text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeniorityLevel {
    Intern,
    Junior,
    Mid,
    Senior,
    Lead,
    Staff,
    Director,
    Executive,
}

impl SeniorityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SeniorityLevel::Intern => "intern",
            SeniorityLevel::Junior => "junior",
            SeniorityLevel::Mid => "mid",
            SeniorityLevel::Senior => "senior",
            SeniorityLevel::Lead => "lead",
            SeniorityLevel::Staff => "staff",
            SeniorityLevel::Director => "director",
            SeniorityLevel::Executive => "executive",
        }
    }
}

impl fmt::Display for SeniorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Company classification against the fixed tier lists. Absence means
/// the company matched no list (rendered as "Unclassified" downstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyTier {
    BigTech,
    AuNotable,
    TopTech,
}

impl CompanyTier {
    pub fn base_points(self) -> f64 {
        match self {
            CompanyTier::BigTech => 12.0,
            CompanyTier::AuNotable => 10.0,
            CompanyTier::TopTech => 8.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CompanyTier::BigTech => "Big Tech",
            CompanyTier::AuNotable => "AU Notable",
            CompanyTier::TopTech => "Top Tech",
        }
    }
}

/// The eight per-category multipliers, each in `[0.0, 2.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeightVector {
    pub skills: f64,
    pub company_tier: f64,
    pub location: f64,
    pub title_match: f64,
    pub sponsorship: f64,
    pub recency: f64,
    pub culture: f64,
    pub quality: f64,
}

impl Default for WeightVector {
    fn default() -> Self {
        Self {
            skills: 1.0,
            company_tier: 1.0,
            location: 1.0,
            title_match: 1.0,
            sponsorship: 1.0,
            recency: 1.0,
            culture: 1.0,
            quality: 1.0,
        }
    }
}

impl WeightVector {
    fn entries(&self) -> [(&'static str, f64); 8] {
        [
            ("skills", self.skills),
            ("companyTier", self.company_tier),
            ("location", self.location),
            ("titleMatch", self.title_match),
            ("sponsorship", self.sponsorship),
            ("recency", self.recency),
            ("culture", self.culture),
            ("quality", self.quality),
        ]
    }

    pub fn validate(&self) -> Result<(), InvalidProfile> {
        for (name, value) in self.entries() {
            if !value.is_finite() {
                return Err(InvalidProfile::NonFiniteWeight { category: name });
            }
            if !(0.0..=2.0).contains(&value) {
                return Err(InvalidProfile::WeightOutOfRange {
                    category: name,
                    value,
                });
            }
        }
        Ok(())
    }
}

fn default_min_score() -> f64 {
    20.0
}

fn default_max_hours() -> u32 {
    24
}

fn default_results_per_search() -> u32 {
    20
}

fn default_exclude_seniority() -> Vec<SeniorityLevel> {
    vec![
        SeniorityLevel::Senior,
        SeniorityLevel::Lead,
        SeniorityLevel::Staff,
        SeniorityLevel::Director,
        SeniorityLevel::Executive,
    ]
}

/// Immutable profile snapshot for one scoring run. Edits produce a new
/// profile and a new result set; historical results are never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub weights: WeightVector,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_max_hours")]
    pub max_hours_since_posted: u32,
    #[serde(default = "default_results_per_search")]
    pub results_per_search: u32,
    #[serde(default = "default_exclude_seniority")]
    pub exclude_seniority: Vec<SeniorityLevel>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            skills: Vec::new(),
            titles: Vec::new(),
            keywords: Vec::new(),
            locations: Vec::new(),
            roles: Vec::new(),
            weights: WeightVector::default(),
            min_score: default_min_score(),
            max_hours_since_posted: default_max_hours(),
            results_per_search: default_results_per_search(),
            exclude_seniority: default_exclude_seniority(),
        }
    }
}

impl Profile {
    /// Structural validation; a failure here aborts the run before any
    /// scoring happens.
    pub fn validate(&self) -> Result<(), InvalidProfile> {
        self.weights.validate()?;
        if !self.min_score.is_finite() {
            return Err(InvalidProfile::NonFiniteMinScore);
        }
        for skill in &self.skills {
            if skill.name.trim().is_empty() {
                return Err(InvalidProfile::EmptySkillName);
            }
        }
        Ok(())
    }

    /// Deduplicate skills by case-insensitive name (highest tier wins)
    /// so a repeated skill cannot double count.
    pub fn normalized(mut self) -> Self {
        let mut by_name: HashMap<String, Skill> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for skill in self.skills.drain(..) {
            let key = skill.name.trim().to_lowercase();
            match by_name.get_mut(&key) {
                Some(existing) => {
                    if skill.tier > existing.tier {
                        existing.tier = skill.tier;
                    }
                }
                None => {
                    order.push(key.clone());
                    by_name.insert(key, skill);
                }
            }
        }
        self.skills = order
            .into_iter()
            .filter_map(|key| by_name.remove(&key))
            .collect();
        self
    }

    pub fn excludes(&self, seniority: SeniorityLevel) -> bool {
        self.exclude_seniority.contains(&seniority)
    }
}

/// Canonical, board-agnostic listing record consumed by the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalListing {
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub date_posted: Option<DateTime<Utc>>,
    pub salary_text: Option<String>,
    pub is_remote: bool,
    pub source: BoardId,
    pub url: String,
}

impl CanonicalListing {
    /// Dedup identity: first occurrence of a `(source, url)` pair wins.
    pub fn identity(&self) -> (&BoardId, &str) {
        (&self.source, self.url.as_str())
    }
}

/// Per-category weighted contributions plus the unweighted penalty total.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub skills: f64,
    pub company_tier: f64,
    pub location: f64,
    pub title_match: f64,
    pub sponsorship: f64,
    pub recency: f64,
    pub culture: f64,
    pub quality: f64,
    pub penalties: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.skills
            + self.company_tier
            + self.location
            + self.title_match
            + self.sponsorship
            + self.recency
            + self.culture
            + self.quality
            - self.penalties
    }
}

/// Result of scoring one `(listing, profile)` pair. Created once and
/// never mutated; a profile edit supersedes the whole result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredListing {
    pub listing: CanonicalListing,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub tier: Option<CompanyTier>,
    pub seniority: SeniorityLevel,
}

#[derive(Debug, Error, PartialEq)]
pub enum InvalidProfile {
    #[error("weight `{category}` is {value}, must be within [0.0, 2.0]")]
    WeightOutOfRange { category: &'static str, value: f64 },
    #[error("weight `{category}` is not a finite number")]
    NonFiniteWeight { category: &'static str },
    #[error("minScore is not a finite number")]
    NonFiniteMinScore,
    #[error("profile contains a skill with an empty name")]
    EmptySkillName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_defaults_apply_to_minimal_json() {
        let profile: Profile = serde_json::from_str(r#"{"skills": []}"#).unwrap();
        assert_eq!(profile.min_score, 20.0);
        assert_eq!(profile.max_hours_since_posted, 24);
        assert_eq!(profile.results_per_search, 20);
        assert_eq!(profile.weights, WeightVector::default());
        assert_eq!(
            profile.exclude_seniority,
            vec![
                SeniorityLevel::Senior,
                SeniorityLevel::Lead,
                SeniorityLevel::Staff,
                SeniorityLevel::Director,
                SeniorityLevel::Executive,
            ]
        );
    }

    #[test]
    fn unknown_profile_fields_are_ignored() {
        let profile: Profile =
            serde_json::from_str(r#"{"minScore": 30, "somethingElse": true}"#).unwrap();
        assert_eq!(profile.min_score, 30.0);
    }

    #[test]
    fn partial_weights_fill_with_neutral_default() {
        let profile: Profile =
            serde_json::from_str(r#"{"weights": {"skills": 2.0, "recency": 0.0}}"#).unwrap();
        assert_eq!(profile.weights.skills, 2.0);
        assert_eq!(profile.weights.recency, 0.0);
        assert_eq!(profile.weights.culture, 1.0);
    }

    #[test]
    fn weight_out_of_range_is_rejected() {
        let profile = Profile {
            weights: WeightVector {
                skills: 2.5,
                ..WeightVector::default()
            },
            ..Profile::default()
        };
        assert_eq!(
            profile.validate(),
            Err(InvalidProfile::WeightOutOfRange {
                category: "skills",
                value: 2.5
            })
        );
    }

    #[test]
    fn unknown_tier_string_fails_deserialization() {
        let result: Result<Profile, _> =
            serde_json::from_str(r#"{"skills": [{"name": "React", "tier": "legendary"}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_skills_collapse_to_highest_tier() {
        let profile = Profile {
            skills: vec![
                Skill {
                    name: "React".into(),
                    tier: SkillTier::Peripheral,
                },
                Skill {
                    name: "react".into(),
                    tier: SkillTier::Core,
                },
                Skill {
                    name: "Python".into(),
                    tier: SkillTier::Strong,
                },
            ],
            ..Profile::default()
        }
        .normalized();

        assert_eq!(profile.skills.len(), 2);
        assert_eq!(profile.skills[0].name, "React");
        assert_eq!(profile.skills[0].tier, SkillTier::Core);
        assert_eq!(profile.skills[1].tier, SkillTier::Strong);
    }

    #[test]
    fn board_id_round_trips_through_strings() {
        let board: BoardId = "Seek".to_string().into();
        assert_eq!(board, BoardId::Seek);
        let custom: BoardId = "some-new-board".to_string().into();
        assert_eq!(custom.as_str(), "some-new-board");
    }
}
