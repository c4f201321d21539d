//! Prosple GraphQL adapter.
//!
//! Prosple serves graduate opportunities through a GraphQL search
//! endpoint. Beyond jobs the feed carries virtual experiences,
//! competitions, and events; those are screened out by opportunity
//! type, and the remainder is filtered to roles open to AU/NZ working
//! rights.

use ajh_core::BoardId;
use ajh_storage::HttpFetcher;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};

use crate::{AdapterError, BoardAdapter, RawListing, SearchQuery};

const GRAPHQL_URL: &str = "https://api.prosple.com/graphql";

const JUNK_TYPES: &[&str] = &["Virtual Experience", "Competition", "Event"];

const ACCEPTED_WORKING_RIGHTS: &[&str] = &["australia", "new zealand"];

#[derive(Debug, Clone, Copy)]
pub struct ProspleAdapter;

#[async_trait]
impl BoardAdapter for ProspleAdapter {
    fn board(&self) -> BoardId {
        BoardId::Prosple
    }

    async fn fetch(&self, http: &HttpFetcher, query: &SearchQuery) -> Result<String, AdapterError> {
        let body = json!({
            "query": "query Search($keywords: String!, $location: String!) { searchOpportunities(keywords: $keywords, location: $location) { results { title overview detailPageUrl postDate employer { name } locations opportunityTypes { label } workingRights } } }",
            "variables": { "keywords": query.keywords, "location": query.location },
        });
        Ok(http.post_json(&self.board(), GRAPHQL_URL, &body).await?)
    }

    fn parse(
        &self,
        payload: &str,
        _fetched_at: DateTime<Utc>,
    ) -> Result<Vec<RawListing>, AdapterError> {
        let response: JsonValue = serde_json::from_str(payload)
            .map_err(|e| AdapterError::unexpected(self.board(), e.to_string()))?;
        let results = response
            .pointer("/data/searchOpportunities/results")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| {
                AdapterError::unexpected(self.board(), "data.searchOpportunities.results missing")
            })?;

        Ok(results
            .iter()
            .filter(|r| !is_junk_type(r))
            .filter(|r| has_au_nz_working_rights(r))
            .map(raw_from_result)
            .collect())
    }
}

fn raw_from_result(result: &JsonValue) -> RawListing {
    RawListing {
        source: Some(BoardId::Prosple),
        title: json_string(result, "title"),
        company: result
            .pointer("/employer/name")
            .and_then(JsonValue::as_str)
            .map(ToString::to_string),
        location: result
            .get("locations")
            .and_then(JsonValue::as_array)
            .map(|locs| {
                locs.iter()
                    .filter_map(JsonValue::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|s| !s.is_empty()),
        description: json_string(result, "overview"),
        salary_text: None,
        date_posted: json_string(result, "postDate")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        url: json_string(result, "detailPageUrl"),
    }
}

fn json_string(value: &JsonValue, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(JsonValue::as_str)
        .map(ToString::to_string)
}

fn is_junk_type(result: &JsonValue) -> bool {
    result
        .get("opportunityTypes")
        .and_then(JsonValue::as_array)
        .map(|types| {
            types
                .iter()
                .filter_map(|t| t.get("label").and_then(JsonValue::as_str))
                .any(|label| JUNK_TYPES.contains(&label))
        })
        .unwrap_or(false)
}

/// An absent working-rights list means the posting did not restrict
/// applicants, so it passes.
fn has_au_nz_working_rights(result: &JsonValue) -> bool {
    let Some(rights) = result.get("workingRights").and_then(JsonValue::as_array) else {
        return true;
    };
    if rights.is_empty() {
        return true;
    }
    rights
        .iter()
        .filter_map(JsonValue::as_str)
        .any(|right| {
            let folded = right.to_lowercase();
            ACCEPTED_WORKING_RIGHTS.iter().any(|ok| folded.contains(ok))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPHQL_RESPONSE: &str = r#"{
  "data": {
    "searchOpportunities": {
      "results": [
        {
          "title": "Graduate Developer Program",
          "overview": "Rotations across platform and product teams.",
          "detailPageUrl": "https://au.prosple.com/opportunities/graduate-developer-program",
          "postDate": "2026-03-01T10:00:00+10:00",
          "employer": {"name": "WiseTech"},
          "locations": ["Sydney", "Remote"],
          "opportunityTypes": [{"label": "Graduate Job"}],
          "workingRights": ["Australian Citizen", "Australian Permanent Resident"]
        },
        {
          "title": "Tech Careers Virtual Experience",
          "detailPageUrl": "https://au.prosple.com/opportunities/virtual-experience",
          "employer": {"name": "BigCorp"},
          "opportunityTypes": [{"label": "Virtual Experience"}]
        },
        {
          "title": "Software Intern",
          "detailPageUrl": "https://au.prosple.com/opportunities/software-intern",
          "employer": {"name": "GlobalCo"},
          "opportunityTypes": [{"label": "Internship"}],
          "workingRights": ["United States Citizen"]
        },
        {
          "title": "Junior Engineer",
          "detailPageUrl": "https://au.prosple.com/opportunities/junior-engineer",
          "employer": {"name": "Xero"},
          "opportunityTypes": [{"label": "Graduate Job"}],
          "workingRights": ["New Zealand Citizen"]
        }
      ]
    }
  }
}"#;

    fn fetched_at() -> DateTime<Utc> {
        "2026-03-02T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn keeps_au_nz_jobs_and_screens_junk_types() {
        let raws = ProspleAdapter.parse(GRAPHQL_RESPONSE, fetched_at()).unwrap();
        let titles: Vec<_> = raws.iter().filter_map(|r| r.title.as_deref()).collect();
        assert_eq!(titles, vec!["Graduate Developer Program", "Junior Engineer"]);
    }

    #[test]
    fn joins_locations_and_converts_offset_dates_to_utc() {
        let raws = ProspleAdapter.parse(GRAPHQL_RESPONSE, fetched_at()).unwrap();
        let first = &raws[0];
        assert_eq!(first.location.as_deref(), Some("Sydney, Remote"));
        assert_eq!(first.company.as_deref(), Some("WiseTech"));
        assert_eq!(
            first.date_posted,
            Some("2026-03-01T00:00:00Z".parse().unwrap())
        );
    }

    #[test]
    fn malformed_response_is_an_unexpected_payload() {
        let err = ProspleAdapter
            .parse(r#"{"data": {}}"#, fetched_at())
            .unwrap_err();
        assert!(matches!(err, AdapterError::UnexpectedPayload { .. }));
    }
}
