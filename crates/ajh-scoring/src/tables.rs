//! Injected classification data for the scoring engine.
//!
//! All tables are immutable once constructed and passed into the engine
//! by value, so tests can swap in small tables and concurrent callers
//! never share mutable state.

use ajh_core::{phrase, CompanyTier, SeniorityLevel};

/// One title keyword and the points it awards. Declaration order is the
/// tie-break: when two entries both match, the earlier one wins.
#[derive(Debug, Clone)]
pub struct TitlePoints {
    pub term: String,
    pub points: f64,
}

impl TitlePoints {
    pub fn new(term: impl Into<String>, points: f64) -> Self {
        Self {
            term: term.into(),
            points,
        }
    }
}

/// A culture signal phrase and its increment.
#[derive(Debug, Clone)]
pub struct CulturePhrase {
    pub term: String,
    pub points: f64,
}

/// Skill adjacency: when the named profile skill is not found directly,
/// any of the related terms appearing in the listing earns partial credit.
#[derive(Debug, Clone)]
pub struct Adjacency {
    pub skill: String,
    pub related: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScoringTables {
    pub big_tech: Vec<String>,
    pub au_notable: Vec<String>,
    pub top_tech: Vec<String>,
    pub adjacency: Vec<Adjacency>,
    pub title_points: Vec<TitlePoints>,
    pub bad_title_terms: Vec<String>,
    pub sponsorship_phrases: Vec<String>,
    pub culture_phrases: Vec<CulturePhrase>,
    pub benefits_phrases: Vec<String>,
    pub seniority_keywords: Vec<(String, SeniorityLevel)>,
}

impl ScoringTables {
    /// Classify a company name against the three tier lists by
    /// case-insensitive substring. First list to match wins, in the
    /// declared priority order BigTech -> AUNotable -> TopTech.
    pub fn classify_company(&self, company: &str) -> Option<CompanyTier> {
        let folded = phrase::fold(company);
        let hit = |names: &[String]| {
            names
                .iter()
                .any(|name| folded.contains(&name.to_lowercase()))
        };
        if hit(&self.big_tech) {
            Some(CompanyTier::BigTech)
        } else if hit(&self.au_notable) {
            Some(CompanyTier::AuNotable)
        } else if hit(&self.top_tech) {
            Some(CompanyTier::TopTech)
        } else {
            None
        }
    }

    /// Infer seniority from a title. The keyword table is ordered
    /// most-specific first and the first matching entry wins; titles
    /// matching nothing default to mid.
    pub fn detect_seniority(&self, title: &str) -> SeniorityLevel {
        let folded = phrase::fold(title);
        for (keyword, level) in &self.seniority_keywords {
            if phrase::contains_phrase(&folded, keyword) {
                return *level;
            }
        }
        SeniorityLevel::Mid
    }

    pub fn adjacent_terms(&self, skill_name: &str) -> Option<&[String]> {
        self.adjacency
            .iter()
            .find(|entry| entry.skill.eq_ignore_ascii_case(skill_name))
            .map(|entry| entry.related.as_slice())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ScoringTables {
    fn default() -> Self {
        Self {
            big_tech: strings(&[
                "Google",
                "Meta",
                "Apple",
                "Amazon",
                "Microsoft",
                "Netflix",
                "Stripe",
                "Airbnb",
                "Uber",
                "Spotify",
                "Salesforce",
                "Adobe",
                "Oracle",
                "SAP",
                "IBM",
                "Intel",
                "Cisco",
                "Nvidia",
                "AMD",
                "Qualcomm",
                "Samsung",
                "Sony",
            ]),
            au_notable: strings(&[
                "Atlassian",
                "Canva",
                "SafetyCulture",
                "Xero",
                "WiseTech",
                "Afterpay",
                "Zip Co",
                "Culture Amp",
                "Employment Hero",
                "Deputy",
                "Buildkite",
                "Envato",
                "REA Group",
                "Seek",
                "Domain",
                "Carsales",
                "Nearmap",
                "Immutable",
                "Rokt",
                "GO1",
                "Eucalyptus",
                "Linktree",
                "Harrison.ai",
                "Brighte",
                "Lendi",
                "Prospa",
                "Tyro",
                "Swyftx",
                "CommBank",
                "Commonwealth Bank",
                "NAB",
                "Westpac",
                "ANZ",
                "Telstra",
                "Optus",
                "TPG",
                "NBN",
                "BHP",
                "Rio Tinto",
                "Woodside",
                "Maptek",
                "Santos",
                "CSL",
                "Cochlear",
            ]),
            top_tech: strings(&[
                "Shopify",
                "Cloudflare",
                "Vercel",
                "Supabase",
                "MongoDB",
                "Datadog",
                "Figma",
                "Notion",
                "Linear",
                "Anthropic",
                "OpenAI",
                "Coinbase",
                "Palantir",
                "Snowflake",
                "Databricks",
                "Twilio",
                "Okta",
                "HashiCorp",
                "Elastic",
                "Confluent",
                "Zoom",
                "Dropbox",
                "CrowdStrike",
                "Splunk",
                "ServiceNow",
                "Workday",
                "HubSpot",
                "Airtable",
            ]),
            adjacency: vec![
                adjacency("React", &["javascript", "frontend"]),
                adjacency("Next.js", &["react", "javascript"]),
                adjacency("TypeScript", &["javascript"]),
                adjacency("Node.js", &["javascript", "backend"]),
                adjacency("Vue", &["javascript"]),
                adjacency("Angular", &["typescript", "javascript"]),
                adjacency("Django", &["python"]),
                adjacency("Flask", &["python"]),
                adjacency("Kubernetes", &["docker", "devops"]),
                adjacency("Docker", &["devops"]),
                adjacency("AWS", &["cloud"]),
                adjacency("GCP", &["cloud"]),
                adjacency("Azure", &["cloud"]),
                adjacency("PostgreSQL", &["sql"]),
                adjacency("MySQL", &["sql"]),
                adjacency("GraphQL", &["rest api", "api"]),
                adjacency("C#", &[".net"]),
                adjacency("Tailwind", &["css"]),
            ],
            title_points: vec![
                TitlePoints::new("graduate", 18.0),
                TitlePoints::new("full stack", 15.0),
                TitlePoints::new("fullstack", 15.0),
                TitlePoints::new("full-stack", 15.0),
                TitlePoints::new("frontend", 12.0),
                TitlePoints::new("front-end", 12.0),
                TitlePoints::new("front end", 12.0),
                TitlePoints::new("software engineer", 10.0),
                TitlePoints::new("web developer", 8.0),
                TitlePoints::new("ai engineer", 8.0),
                TitlePoints::new("ml engineer", 8.0),
                TitlePoints::new("machine learning", 8.0),
            ],
            bad_title_terms: strings(&[
                "recruiter",
                "recruitment",
                "talent acquisition",
                "sales",
                "account executive",
                "account manager",
                "business development",
                "customer success",
            ]),
            sponsorship_phrases: strings(&[
                "visa sponsorship available",
                "visa sponsorship",
                "sponsorship available",
                "482 visa",
                "tss visa",
                "485 visa",
                "work visa",
                "willing to sponsor",
            ]),
            culture_phrases: vec![
                culture("remote-first", 4.0),
                culture("remote first", 4.0),
                culture("equity", 4.0),
                culture("stock options", 4.0),
                culture("flexible hours", 4.0),
                culture("flexible working", 4.0),
                culture("learning budget", 3.0),
                culture("professional development budget", 3.0),
            ],
            benefits_phrases: strings(&[
                "benefits",
                "perks",
                "annual leave",
                "superannuation",
                "wellness",
            ]),
            seniority_keywords: vec![
                keyword("internship", SeniorityLevel::Intern),
                keyword("intern", SeniorityLevel::Intern),
                keyword("chief", SeniorityLevel::Executive),
                keyword("cto", SeniorityLevel::Executive),
                keyword("vice president", SeniorityLevel::Executive),
                keyword("vp", SeniorityLevel::Executive),
                keyword("executive", SeniorityLevel::Executive),
                keyword("head of", SeniorityLevel::Director),
                keyword("director", SeniorityLevel::Director),
                keyword("staff", SeniorityLevel::Staff),
                keyword("principal", SeniorityLevel::Staff),
                keyword("lead", SeniorityLevel::Lead),
                keyword("senior", SeniorityLevel::Senior),
                keyword("snr", SeniorityLevel::Senior),
                keyword("sr.", SeniorityLevel::Senior),
                keyword("graduate", SeniorityLevel::Junior),
                keyword("junior", SeniorityLevel::Junior),
                keyword("entry level", SeniorityLevel::Junior),
                keyword("entry-level", SeniorityLevel::Junior),
            ],
        }
    }
}

fn adjacency(skill: &str, related: &[&str]) -> Adjacency {
    Adjacency {
        skill: skill.to_string(),
        related: strings(related),
    }
}

fn culture(term: &str, points: f64) -> CulturePhrase {
    CulturePhrase {
        term: term.to_string(),
        points,
    }
}

fn keyword(term: &str, level: SeniorityLevel) -> (String, SeniorityLevel) {
    (term.to_string(), level)
}
