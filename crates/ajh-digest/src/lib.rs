//! Digest rendering: the daily email body, its subject line, and a CSV
//! export of the same selection.
//!
//! SMTP delivery is out of scope here; callers get rendered strings
//! and a preview file on disk, and hand them to whatever transport
//! they run.

use std::path::{Path, PathBuf};

use ajh_core::ScoredListing;
use anyhow::Context;
use chrono::NaiveDate;

pub const CRATE_NAME: &str = "ajh-digest";

const MIN_DIGEST_RESULTS: usize = 5;
const THRESHOLD_RELAXATION: f64 = 10.0;

/// Which threshold ended up selecting the digest contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdStage {
    /// The profile's own minimum produced enough results.
    Profile,
    /// The minimum was relaxed by 10 points.
    Relaxed,
    /// Every non-negative score made the digest.
    Floor,
}

#[derive(Debug, Clone)]
pub struct DigestSelection {
    pub listings: Vec<ScoredListing>,
    pub threshold_used: f64,
    pub stage: ThresholdStage,
}

/// Pick the digest contents from a ranked result set. If the profile
/// threshold yields fewer than five listings the threshold relaxes by
/// ten points (not below zero), and if that still comes up short the
/// threshold drops to zero. Penalty-driven negative scores stay out
/// even at the floor.
pub fn select_for_digest(ranked: &[ScoredListing], min_score: f64) -> DigestSelection {
    let at = |threshold: f64| -> Vec<ScoredListing> {
        ranked
            .iter()
            .filter(|s| s.score >= threshold)
            .cloned()
            .collect()
    };

    let primary = at(min_score);
    if primary.len() >= MIN_DIGEST_RESULTS {
        return DigestSelection {
            listings: primary,
            threshold_used: min_score,
            stage: ThresholdStage::Profile,
        };
    }

    let relaxed_threshold = (min_score - THRESHOLD_RELAXATION).max(0.0);
    let relaxed = at(relaxed_threshold);
    if relaxed.len() >= MIN_DIGEST_RESULTS {
        return DigestSelection {
            listings: relaxed,
            threshold_used: relaxed_threshold,
            stage: ThresholdStage::Relaxed,
        };
    }

    DigestSelection {
        listings: at(0.0),
        threshold_used: 0.0,
        stage: ThresholdStage::Floor,
    }
}

pub fn subject_line(count: usize, date: NaiveDate) -> String {
    if count == 0 {
        format!(
            "Job Hunter: No strong matches today ({})",
            date.format("%d %b %Y")
        )
    } else {
        format!(
            "Job Hunter: {count} relevant jobs ({})",
            date.format("%d %b %Y")
        )
    }
}

/// Render the digest as a self-contained HTML document with inline
/// styles, which is all most mail clients reliably support.
pub fn render_html(selection: &DigestSelection, date: NaiveDate) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html><body style=\"font-family:Arial,sans-serif;color:#1f2937;\">\n");
    html.push_str(&format!(
        "<h2 style=\"margin-bottom:4px;\">Job digest for {}</h2>\n",
        date.format("%d %b %Y")
    ));
    html.push_str(&format!(
        "<p style=\"margin-top:0;color:#6b7280;\">{} listings at or above a score of {:.0}{}</p>\n",
        selection.listings.len(),
        selection.threshold_used,
        match selection.stage {
            ThresholdStage::Profile => "",
            ThresholdStage::Relaxed => " (threshold relaxed)",
            ThresholdStage::Floor => " (showing everything at or above zero)",
        }
    ));

    if selection.listings.is_empty() {
        html.push_str("<p>Nothing cleared the bar today. The next run may bring better luck.</p>\n");
    }

    for scored in &selection.listings {
        let listing = &scored.listing;
        html.push_str("<div style=\"border:1px solid #e5e7eb;border-radius:8px;padding:12px;margin:10px 0;\">\n");
        html.push_str(&format!(
            "<a href=\"{}\" style=\"font-size:16px;font-weight:bold;color:#1d4ed8;\">{}</a>\n",
            escape_html(&listing.url),
            escape_html(&listing.title)
        ));
        let mut meta = vec![escape_html(&listing.company)];
        if !listing.location.is_empty() {
            meta.push(escape_html(&listing.location));
        }
        if listing.is_remote {
            meta.push("Remote friendly".to_string());
        }
        if let Some(tier) = scored.tier {
            meta.push(tier.label().to_string());
        }
        if let Some(salary) = &listing.salary_text {
            meta.push(escape_html(salary));
        }
        html.push_str(&format!(
            "<div style=\"color:#4b5563;margin:4px 0;\">{}</div>\n",
            meta.join(" &middot; ")
        ));
        html.push_str(&format!(
            "<div style=\"color:#111827;\">Score {:.1} &middot; via {}</div>\n",
            scored.score, listing.source
        ));
        html.push_str("</div>\n");
    }

    html.push_str("</body></html>\n");
    html
}

/// CSV export of the same selection, RFC 4180 quoting.
pub fn render_csv(listings: &[ScoredListing]) -> String {
    let mut out = String::from("title,company,location,source,score,seniority,url\n");
    for scored in listings {
        let listing = &scored.listing;
        let row = [
            csv_field(&listing.title),
            csv_field(&listing.company),
            csv_field(&listing.location),
            csv_field(listing.source.as_str()),
            format!("{:.1}", scored.score),
            scored.seniority.to_string(),
            csv_field(&listing.url),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

pub fn write_preview(dir: impl AsRef<Path>, html: &str) -> anyhow::Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating digest directory {}", dir.display()))?;
    let path = dir.join("digest_preview.html");
    std::fs::write(&path, html)
        .with_context(|| format!("writing digest preview {}", path.display()))?;
    Ok(path)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn csv_field(text: &str) -> String {
    if text.contains(',') || text.contains('"') || text.contains('\n') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ajh_core::{BoardId, CanonicalListing, ScoreBreakdown, SeniorityLevel};

    fn scored(title: &str, score: f64) -> ScoredListing {
        ScoredListing {
            listing: CanonicalListing {
                title: title.to_string(),
                company: "Acme, Inc".to_string(),
                location: "Sydney NSW".to_string(),
                description: String::new(),
                date_posted: None,
                salary_text: None,
                is_remote: false,
                source: BoardId::Seek,
                url: format!("https://example.com/{}", title.replace(' ', "-")),
            },
            score,
            breakdown: ScoreBreakdown::default(),
            tier: None,
            seniority: SeniorityLevel::Mid,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn profile_threshold_holds_when_enough_results() {
        let ranked: Vec<_> = (0..6).map(|i| scored(&format!("job {i}"), 40.0)).collect();
        let selection = select_for_digest(&ranked, 20.0);
        assert_eq!(selection.stage, ThresholdStage::Profile);
        assert_eq!(selection.threshold_used, 20.0);
        assert_eq!(selection.listings.len(), 6);
    }

    #[test]
    fn threshold_relaxes_by_ten_when_results_are_thin() {
        let mut ranked: Vec<_> = (0..5).map(|i| scored(&format!("mid {i}"), 25.0)).collect();
        ranked.push(scored("top", 40.0));
        let selection = select_for_digest(&ranked, 30.0);
        assert_eq!(selection.stage, ThresholdStage::Relaxed);
        assert_eq!(selection.threshold_used, 20.0);
        assert_eq!(selection.listings.len(), 6);
    }

    #[test]
    fn floor_stage_sends_everything_rather_than_nothing() {
        let ranked = vec![scored("only", 8.0), scored("other", 3.0)];
        let selection = select_for_digest(&ranked, 50.0);
        assert_eq!(selection.stage, ThresholdStage::Floor);
        assert_eq!(selection.threshold_used, 0.0);
        assert_eq!(selection.listings.len(), 2);
    }

    #[test]
    fn floor_stage_still_excludes_negative_scores() {
        let ranked = vec![scored("decent", 5.0), scored("penalized recruiter", -18.0)];
        let selection = select_for_digest(&ranked, 50.0);
        assert_eq!(selection.stage, ThresholdStage::Floor);
        assert_eq!(selection.listings.len(), 1);
        assert_eq!(selection.listings[0].listing.title, "decent");
    }

    #[test]
    fn relaxed_threshold_never_goes_negative() {
        let ranked = vec![scored("one", 1.0)];
        let selection = select_for_digest(&ranked, 5.0);
        // 5 - 10 floors at 0 before falling through to the floor stage.
        assert_eq!(selection.stage, ThresholdStage::Floor);
    }

    #[test]
    fn subject_lines_cover_both_moods() {
        assert_eq!(
            subject_line(7, date()),
            "Job Hunter: 7 relevant jobs (02 Mar 2026)"
        );
        assert_eq!(
            subject_line(0, date()),
            "Job Hunter: No strong matches today (02 Mar 2026)"
        );
    }

    #[test]
    fn html_escapes_listing_text() {
        let mut item = scored("C# <senior> role", 30.0);
        item.listing.company = "A&B Pty".to_string();
        let selection = DigestSelection {
            listings: vec![item],
            threshold_used: 20.0,
            stage: ThresholdStage::Profile,
        };
        let html = render_html(&selection, date());
        assert!(html.contains("C# &lt;senior&gt; role"));
        assert!(html.contains("A&amp;B Pty"));
        assert!(!html.contains("<senior>"));
    }

    #[test]
    fn empty_selection_renders_a_friendly_body() {
        let selection = DigestSelection {
            listings: Vec::new(),
            threshold_used: 20.0,
            stage: ThresholdStage::Profile,
        };
        let html = render_html(&selection, date());
        assert!(html.contains("Nothing cleared the bar"));
    }

    #[test]
    fn csv_quotes_embedded_commas_and_quotes() {
        let mut item = scored("Graduate Engineer", 33.0);
        item.listing.title = "Engineer, \"Platform\"".to_string();
        let csv = render_csv(&[item]);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "title,company,location,source,score,seniority,url"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"Engineer, \"\"Platform\"\"\",\"Acme, Inc\""));
        assert!(row.contains(",33.0,mid,"));
    }

    #[test]
    fn preview_lands_in_the_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_preview(dir.path().join("out"), "<html></html>").unwrap();
        assert!(path.ends_with("digest_preview.html"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<html></html>");
    }
}
