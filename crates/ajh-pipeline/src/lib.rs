//! Run orchestration: fetch board payloads, normalize and filter
//! listings, score them against the profile, persist, and write the
//! run reports.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ajh_adapters::{adapter_for_board, Normalizer, SearchQuery};
use ajh_core::{BoardId, CanonicalListing, Profile, ScoredListing};
use ajh_digest::DigestSelection;
use ajh_scoring::{rank_and_filter, RankedResults, ScoringEngine};
use ajh_storage::{HttpClientConfig, HttpFetcher, PayloadArchive, ResultsStore};
use anyhow::{Context, Result};
use arrow_array::{BooleanArray, Float64Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

const SCORING_CONCURRENCY: usize = 8;

/// Location markers that keep a listing in scope. Anything whose
/// location matches none of these (and is not remote) is discarded
/// before scoring.
const AU_LOCATION_MARKERS: &[&str] = &[
    "adelaide",
    "sydney",
    "melbourne",
    "brisbane",
    "perth",
    "canberra",
    "gold coast",
    "hobart",
    "darwin",
    "remote",
    "australia",
];

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: Option<String>,
    pub artifacts_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub workspace_root: PathBuf,
    pub profile_path: PathBuf,
    pub scheduler_enabled: bool,
    pub cron_morning: String,
    pub cron_evening: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            artifacts_dir: PathBuf::from("./artifacts"),
            reports_dir: PathBuf::from("./reports"),
            workspace_root: PathBuf::from("."),
            profile_path: PathBuf::from("./profile.json"),
            scheduler_enabled: false,
            cron_morning: "0 0 7 * * *".to_string(),
            cron_evening: "0 0 18 * * *".to_string(),
            user_agent: "ajh-bot/0.1".to_string(),
            http_timeout_secs: 20,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            artifacts_dir: env_path("ARTIFACTS_DIR", defaults.artifacts_dir),
            reports_dir: env_path("AJH_REPORTS_DIR", defaults.reports_dir),
            workspace_root: env_path("AJH_WORKSPACE_ROOT", defaults.workspace_root),
            profile_path: env_path("AJH_PROFILE", defaults.profile_path),
            scheduler_enabled: std::env::var("AJH_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            cron_morning: std::env::var("AJH_CRON_MORNING").unwrap_or(defaults.cron_morning),
            cron_evening: std::env::var("AJH_CRON_EVENING").unwrap_or(defaults.cron_evening),
            user_agent: std::env::var("AJH_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("AJH_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
        }
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

/// `sources.yaml`: which boards run and with which searches.
#[derive(Debug, Clone, Deserialize)]
pub struct BoardRegistry {
    pub sources: Vec<BoardConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    pub board: BoardId,
    pub display_name: String,
    pub enabled: bool,
    #[serde(default)]
    pub queries: Vec<SearchQuery>,
}

impl BoardRegistry {
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let path = workspace_root.join("sources.yaml");
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &BoardConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

pub fn load_profile(path: &Path) -> Result<Profile> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let profile: Profile =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    profile.validate().context("validating profile")?;
    Ok(profile.normalized())
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub boards_fetched: usize,
    pub parsed_raw: usize,
    pub dropped_malformed: usize,
    pub dropped_location: usize,
    pub dropped_stale: usize,
    pub ranked: usize,
    pub duplicate_flags: usize,
    pub digest_count: usize,
    pub reports_dir: String,
    pub parquet_manifest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Listings that survived the pre-scoring filters, with drop counts.
#[derive(Debug, Clone, Default)]
pub struct RefinedBatch {
    pub kept: Vec<CanonicalListing>,
    pub dropped_location: usize,
    pub dropped_stale: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
    engine: Arc<ScoringEngine>,
    normalizer: Normalizer,
    archive: PayloadArchive,
    http: HttpFetcher,
    store: Option<ResultsStore>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let archive = PayloadArchive::new(config.artifacts_dir.clone());
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })?;
        Ok(Self {
            config,
            engine: Arc::new(ScoringEngine::default()),
            normalizer: Normalizer::default(),
            archive,
            http,
            store: None,
        })
    }

    pub fn with_store(mut self, store: ResultsStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the configured profile and run a full cycle.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let profile = load_profile(&self.config.profile_path)?;
        self.run_with_profile(Uuid::new_v4(), &profile).await
    }

    pub async fn run_with_profile(
        &self,
        submission_id: Uuid,
        profile: &Profile,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        let registry = BoardRegistry::load(&self.config.workspace_root)?;

        if let Some(store) = &self.store {
            let profile_json =
                serde_json::to_value(profile).context("serializing profile for run record")?;
            store
                .record_run(submission_id, &profile_json, "running")
                .await?;
        }

        let mut boards_fetched = 0usize;
        let mut parsed_raw = 0usize;
        let mut dropped_malformed = 0usize;
        let mut refined_all = RefinedBatch::default();

        for board_config in registry.enabled() {
            let Some(adapter) = adapter_for_board(&board_config.board) else {
                warn!(board = %board_config.board, "no adapter registered, skipping");
                continue;
            };
            for query in &board_config.queries {
                let fetched_at = Utc::now();
                let payload = match adapter.fetch(&self.http, query).await {
                    Ok(payload) => payload,
                    Err(err) => {
                        // One unreachable board must not sink the run.
                        warn!(board = %board_config.board, %err, "fetch failed, skipping query");
                        continue;
                    }
                };
                boards_fetched += 1;
                self.archive
                    .store_payload(&board_config.board, fetched_at, "txt", &payload)
                    .await?;

                let raws = match adapter.parse(&payload, fetched_at) {
                    Ok(raws) => raws,
                    Err(err) => {
                        warn!(board = %board_config.board, %err, "parse failed, skipping payload");
                        continue;
                    }
                };
                parsed_raw += raws.len();

                let outcome = self.normalizer.normalize_batch(raws);
                dropped_malformed += outcome.dropped;

                let refined = self.refine_board_listings(outcome.listings, profile, started_at);
                refined_all.dropped_location += refined.dropped_location;
                refined_all.dropped_stale += refined.dropped_stale;
                refined_all.kept.extend(refined.kept);
            }
        }

        let scored = self
            .score_listings(refined_all.kept, profile, started_at)
            .await?;
        let ranked = rank_and_filter(scored, profile);
        if ranked.listings.is_empty() {
            warn!(%submission_id, "run produced no matching listings");
        }

        if let Some(store) = &self.store {
            store.replace_results(submission_id, &ranked.listings).await?;
            let profile_json =
                serde_json::to_value(profile).context("serializing profile for run record")?;
            store
                .record_run(submission_id, &profile_json, "completed")
                .await?;
        }

        let selection = ajh_digest::select_for_digest(&ranked.listings, profile.min_score);
        let digest_html = ajh_digest::render_html(&selection, started_at.date_naive());
        let finished_at = Utc::now();

        let reports_dir = self
            .write_reports(
                submission_id,
                started_at,
                finished_at,
                &ranked,
                &selection,
                &digest_html,
            )
            .await?;
        let manifest_path = export_parquet_snapshot(&reports_dir, &ranked.listings)?;

        let summary = RunSummary {
            run_id: submission_id,
            started_at,
            finished_at,
            boards_fetched,
            parsed_raw,
            dropped_malformed,
            dropped_location: refined_all.dropped_location,
            dropped_stale: refined_all.dropped_stale,
            ranked: ranked.listings.len(),
            duplicate_flags: ranked.duplicates.len(),
            digest_count: selection.listings.len(),
            reports_dir: reports_dir.display().to_string(),
            parquet_manifest: manifest_path.display().to_string(),
        };

        let summary_json =
            serde_json::to_vec_pretty(&summary).context("serializing run summary")?;
        fs::write(reports_dir.join("run_summary.json"), summary_json)
            .await
            .context("writing run_summary.json")?;

        info!(
            run_id = %summary.run_id,
            ranked = summary.ranked,
            digest = summary.digest_count,
            dropped_malformed = summary.dropped_malformed,
            dropped_location = summary.dropped_location,
            dropped_stale = summary.dropped_stale,
            "run complete"
        );
        Ok(summary)
    }

    /// Scope filter, staleness filter, then the per-search result cap,
    /// in that order.
    pub fn refine_board_listings(
        &self,
        listings: Vec<CanonicalListing>,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> RefinedBatch {
        let mut batch = RefinedBatch::default();
        let max_age = chrono::Duration::hours(i64::from(profile.max_hours_since_posted));
        for listing in listings {
            if !is_in_scope(&listing) {
                batch.dropped_location += 1;
                continue;
            }
            // Listings without a posting date are kept; boards that
            // only expose relative ages already anchor them upstream.
            if let Some(posted) = listing.date_posted {
                if now - posted > max_age {
                    batch.dropped_stale += 1;
                    continue;
                }
            }
            batch.kept.push(listing);
        }
        batch.kept.truncate(profile.results_per_search as usize);
        batch
    }

    /// Score listings concurrently under a small semaphore, keeping
    /// the input order so ranking tie-breaks stay deterministic.
    pub async fn score_listings(
        &self,
        listings: Vec<CanonicalListing>,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredListing>> {
        let total = listings.len();
        let semaphore = Arc::new(Semaphore::new(SCORING_CONCURRENCY));
        let profile = Arc::new(profile.clone());
        let mut join_set = JoinSet::new();

        for (idx, listing) in listings.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let engine = self.engine.clone();
            let profile = profile.clone();
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore not closed");
                (idx, engine.score(&listing, &profile, now))
            });
        }

        let mut slots: Vec<Option<ScoredListing>> = (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            let (idx, scored) = joined.context("scoring task failed")?;
            slots[idx] = Some(scored);
        }
        Ok(slots.into_iter().flatten().collect())
    }

    async fn write_reports(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        ranked: &RankedResults,
        selection: &DigestSelection,
        digest_html: &str,
    ) -> Result<PathBuf> {
        let reports_dir = self.config.reports_dir.join(run_id.to_string());
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        let mut board_counts: BTreeMap<String, usize> = BTreeMap::new();
        for scored in &ranked.listings {
            *board_counts
                .entry(scored.listing.source.as_str().to_string())
                .or_default() += 1;
        }

        let top_lines = ranked
            .listings
            .iter()
            .take(10)
            .map(|s| {
                format!(
                    "- [{:.1}] {} at {} ({})",
                    s.score, s.listing.title, s.listing.company, s.listing.source
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let brief = format!(
            "# Daily Brief\n\n- Run ID: `{run_id}`\n- Started: {started_at}\n- Finished: {finished_at}\n- Ranked listings: {}\n- Digest size: {}\n- Duplicate flags: {}\n\n## Board Counts\n{}\n\n## Top Matches\n{}\n",
            ranked.listings.len(),
            selection.listings.len(),
            ranked.duplicates.len(),
            if board_counts.is_empty() {
                "- none".to_string()
            } else {
                board_counts
                    .iter()
                    .map(|(k, v)| format!("- {k}: {v}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            },
            if top_lines.is_empty() {
                "- no listings matched this run".to_string()
            } else {
                top_lines
            }
        );
        fs::write(reports_dir.join("daily_brief.md"), brief)
            .await
            .context("writing daily_brief.md")?;

        let results_json = serde_json::to_vec_pretty(&serde_json::json!({
            "run_id": run_id,
            "listings": ranked.listings,
            "duplicates": ranked.duplicates,
        }))
        .context("serializing ranked results")?;
        fs::write(reports_dir.join("results.json"), results_json)
            .await
            .context("writing results.json")?;

        fs::write(
            reports_dir.join("digest.csv"),
            ajh_digest::render_csv(&selection.listings),
        )
        .await
        .context("writing digest.csv")?;
        ajh_digest::write_preview(&reports_dir, digest_html)?;

        Ok(reports_dir)
    }

    /// Twice-daily cron trigger, driven by config. The scheduler owns
    /// a handle back into the pipeline, so callers keep it alive for
    /// as long as runs should fire.
    pub async fn maybe_build_scheduler(self: &Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }

        let scheduler = JobScheduler::new().await.context("creating scheduler")?;
        for cron in [&self.config.cron_morning, &self.config.cron_evening] {
            let pipeline = Arc::clone(self);
            let job = Job::new_async(cron.as_str(), move |_id, _lock| {
                let pipeline = Arc::clone(&pipeline);
                Box::pin(async move {
                    match pipeline.run_once().await {
                        Ok(summary) => {
                            info!(run_id = %summary.run_id, ranked = summary.ranked, "scheduled run complete");
                        }
                        Err(err) => warn!(%err, "scheduled run failed"),
                    }
                })
            })
            .with_context(|| format!("creating scheduler job for cron {cron}"))?;
            scheduler.add(job).await.context("adding scheduler job")?;
        }
        Ok(Some(scheduler))
    }
}

/// A listing stays in scope when its location names an Australian
/// city (or the country itself), or when it is remote-friendly.
pub fn is_in_scope(listing: &CanonicalListing) -> bool {
    if listing.is_remote {
        return true;
    }
    let folded = listing.location.to_lowercase();
    AU_LOCATION_MARKERS.iter().any(|m| folded.contains(m))
}

pub async fn run_once_from_env() -> Result<RunSummary> {
    let config = PipelineConfig::from_env();
    let database_url = config.database_url.clone();
    let mut pipeline = Pipeline::new(config)?;
    if let Some(url) = database_url {
        pipeline = pipeline.with_store(ResultsStore::connect(&url).await?);
    }
    pipeline.run_once().await
}

/// Roll the most recent run reports up into one markdown digest for
/// the terminal.
pub fn report_daily_markdown(runs: usize, reports_root: &Path) -> Result<String> {
    let mut dirs = std::fs::read_dir(reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# Recent Runs".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let summary_path = dir.path().join("run_summary.json");
        let Ok(text) = std::fs::read_to_string(&summary_path) else {
            continue;
        };
        let summary: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", summary_path.display()))?;
        let ranked = summary.get("ranked").and_then(|v| v.as_u64()).unwrap_or(0);
        let digest = summary
            .get("digest_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!("- ranked listings: {ranked}"));
        lines.push(format!("- digest size: {digest}"));
        lines.push(format!("- brief: `{}`", dir.path().join("daily_brief.md").display()));
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}

/// Most recently written run directory under the reports root, if any.
pub fn latest_run_dir(reports_root: &Path) -> Result<Option<PathBuf>> {
    if !reports_root.exists() {
        return Ok(None);
    }
    let mut dirs = std::fs::read_dir(reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    Ok(dirs.pop().map(|e| e.path()))
}

/// Ranked listings persisted by a previous run's `results.json`.
pub fn load_run_results(run_dir: &Path) -> Result<Vec<ScoredListing>> {
    let path = run_dir.join("results.json");
    let text =
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let listings = value
        .get("listings")
        .cloned()
        .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
    serde_json::from_value(listings).with_context(|| format!("decoding listings in {}", path.display()))
}

fn export_parquet_snapshot(reports_dir: &Path, listings: &[ScoredListing]) -> Result<PathBuf> {
    let snapshot_dir = reports_dir.join("snapshots");
    std::fs::create_dir_all(&snapshot_dir)
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let parquet_path = snapshot_dir.join("scored_listings.parquet");
    write_scored_listings_parquet(&parquet_path, listings)?;

    let manifest = ParquetManifest {
        schema_version: 1,
        files: vec![manifest_entry("scored_listings", reports_dir, &parquet_path)?],
    };
    let manifest_path = snapshot_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    std::fs::write(&manifest_path, bytes)
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

fn write_scored_listings_parquet(path: &Path, listings: &[ScoredListing]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("rank", DataType::UInt32, false),
        ArrowField::new("source", DataType::Utf8, false),
        ArrowField::new("url", DataType::Utf8, false),
        ArrowField::new("title", DataType::Utf8, false),
        ArrowField::new("company", DataType::Utf8, false),
        ArrowField::new("location", DataType::Utf8, false),
        ArrowField::new("score", DataType::Float64, false),
        ArrowField::new("seniority", DataType::Utf8, false),
        ArrowField::new("tier", DataType::Utf8, true),
        ArrowField::new("is_remote", DataType::Boolean, false),
    ]));

    let ranks = UInt32Array::from((0..listings.len() as u32).collect::<Vec<_>>());
    let sources = StringArray::from(
        listings
            .iter()
            .map(|s| Some(s.listing.source.as_str()))
            .collect::<Vec<_>>(),
    );
    let urls = StringArray::from(
        listings
            .iter()
            .map(|s| Some(s.listing.url.as_str()))
            .collect::<Vec<_>>(),
    );
    let titles = StringArray::from(
        listings
            .iter()
            .map(|s| Some(s.listing.title.as_str()))
            .collect::<Vec<_>>(),
    );
    let companies = StringArray::from(
        listings
            .iter()
            .map(|s| Some(s.listing.company.as_str()))
            .collect::<Vec<_>>(),
    );
    let locations = StringArray::from(
        listings
            .iter()
            .map(|s| Some(s.listing.location.as_str()))
            .collect::<Vec<_>>(),
    );
    let scores = Float64Array::from(listings.iter().map(|s| s.score).collect::<Vec<_>>());
    let seniorities = StringArray::from(
        listings
            .iter()
            .map(|s| Some(s.seniority.as_str()))
            .collect::<Vec<_>>(),
    );
    let tiers = StringArray::from(
        listings
            .iter()
            .map(|s| s.tier.map(|t| t.label()))
            .collect::<Vec<_>>(),
    );
    let remotes =
        BooleanArray::from(listings.iter().map(|s| s.listing.is_remote).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(ranks),
            Arc::new(sources),
            Arc::new(urls),
            Arc::new(titles),
            Arc::new(companies),
            Arc::new(locations),
            Arc::new(scores),
            Arc::new(seniorities),
            Arc::new(tiers),
            Arc::new(remotes),
        ],
    )
    .context("building scored listings record batch")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = hex::encode(hasher.finalize());
    let rel = path
        .strip_prefix(reports_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        sha256,
        bytes: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ajh_core::{ScoreBreakdown, SeniorityLevel, Skill, SkillTier};
    use chrono::Duration as ChronoDuration;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        "2026-03-02T00:00:00Z".parse().unwrap()
    }

    fn listing(title: &str, location: &str) -> CanonicalListing {
        CanonicalListing {
            title: title.to_string(),
            company: "Acme".to_string(),
            location: location.to_string(),
            description: "React and TypeScript".to_string(),
            date_posted: Some(now() - ChronoDuration::hours(2)),
            salary_text: None,
            is_remote: false,
            source: BoardId::Seek,
            url: format!("https://example.com/{}", title.replace(' ', "-")),
        }
    }

    fn profile() -> Profile {
        Profile {
            skills: vec![Skill {
                name: "React".into(),
                tier: SkillTier::Core,
            }],
            locations: vec!["Sydney".into()],
            ..Profile::default()
        }
        .normalized()
    }

    fn pipeline(root: &Path) -> Pipeline {
        Pipeline::new(PipelineConfig {
            artifacts_dir: root.join("artifacts"),
            reports_dir: root.join("reports"),
            workspace_root: root.to_path_buf(),
            profile_path: root.join("profile.json"),
            ..PipelineConfig::default()
        })
        .expect("pipeline")
    }

    #[test]
    fn registry_yaml_round_trips_board_names() {
        let yaml = r#"
sources:
  - board: seek
    display_name: Seek
    enabled: true
    queries:
      - keywords: graduate software engineer
        location: sydney
  - board: linkedin
    display_name: LinkedIn
    enabled: false
"#;
        let registry: BoardRegistry = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(registry.sources.len(), 2);
        assert_eq!(registry.sources[0].board, BoardId::Seek);
        assert_eq!(registry.sources[0].queries.len(), 1);
        assert_eq!(registry.enabled().count(), 1);
    }

    #[test]
    fn scope_filter_keeps_australian_and_remote_listings() {
        let mut auckland = listing("Engineer", "Auckland, New Zealand");
        assert!(!is_in_scope(&auckland));
        auckland.is_remote = true;
        assert!(is_in_scope(&auckland));

        assert!(is_in_scope(&listing("Engineer", "Gold Coast QLD")));
        assert!(is_in_scope(&listing("Engineer", "Sydney NSW")));
        assert!(is_in_scope(&listing("Engineer", "Australia (hybrid)")));
        assert!(!is_in_scope(&listing("Engineer", "London, UK")));
    }

    #[test]
    fn refine_applies_scope_staleness_and_cap_in_order() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let mut p = profile();
        p.results_per_search = 2;

        let mut stale = listing("Old Role", "Sydney NSW");
        stale.date_posted = Some(now() - ChronoDuration::hours(30));
        let mut undated = listing("Undated Role", "Sydney NSW");
        undated.date_posted = None;

        let batch = pipeline.refine_board_listings(
            vec![
                listing("Fresh A", "Sydney NSW"),
                listing("Offshore", "Berlin, Germany"),
                stale,
                undated,
                listing("Fresh B", "Melbourne VIC"),
            ],
            &p,
            now(),
        );

        assert_eq!(batch.dropped_location, 1);
        assert_eq!(batch.dropped_stale, 1);
        // Cap of two applies after the filters.
        assert_eq!(batch.kept.len(), 2);
        assert_eq!(batch.kept[0].title, "Fresh A");
        assert_eq!(batch.kept[1].title, "Undated Role");
    }

    #[tokio::test]
    async fn concurrent_scoring_preserves_input_order() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let p = profile();

        let listings: Vec<_> = (0..40)
            .map(|i| listing(&format!("Role {i:02}"), "Sydney NSW"))
            .collect();
        let scored = pipeline
            .score_listings(listings.clone(), &p, now())
            .await
            .unwrap();

        assert_eq!(scored.len(), 40);
        for (input, output) in listings.iter().zip(&scored) {
            assert_eq!(input.url, output.listing.url);
        }
    }

    #[tokio::test]
    async fn reports_include_brief_digest_and_checksummed_parquet() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let p = profile();

        let scored = pipeline
            .score_listings(
                vec![
                    listing("Graduate Software Engineer", "Sydney NSW"),
                    listing("Web Developer", "Melbourne VIC"),
                ],
                &p,
                now(),
            )
            .await
            .unwrap();
        let ranked = rank_and_filter(scored, &p);
        let selection = ajh_digest::select_for_digest(&ranked.listings, 0.0);
        let html = ajh_digest::render_html(&selection, now().date_naive());

        let run_id = Uuid::new_v4();
        let reports_dir = pipeline
            .write_reports(run_id, now(), now(), &ranked, &selection, &html)
            .await
            .unwrap();
        let manifest_path = export_parquet_snapshot(&reports_dir, &ranked.listings).unwrap();

        assert!(reports_dir.join("daily_brief.md").exists());
        assert!(reports_dir.join("results.json").exists());
        assert!(reports_dir.join("digest.csv").exists());
        assert!(reports_dir.join("digest_preview.html").exists());

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();
        let entry = &manifest["files"][0];
        let parquet_path = reports_dir.join(entry["path"].as_str().unwrap());
        let bytes = std::fs::read(&parquet_path).unwrap();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        assert_eq!(entry["sha256"].as_str().unwrap(), hex::encode(hasher.finalize()));
        assert_eq!(entry["bytes"].as_u64().unwrap(), bytes.len() as u64);
    }

    #[tokio::test]
    async fn empty_run_still_writes_reports() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let p = profile();
        let ranked = rank_and_filter(Vec::new(), &p);
        let selection = ajh_digest::select_for_digest(&ranked.listings, p.min_score);
        let html = ajh_digest::render_html(&selection, now().date_naive());

        let reports_dir = pipeline
            .write_reports(Uuid::new_v4(), now(), now(), &ranked, &selection, &html)
            .await
            .unwrap();
        let brief = std::fs::read_to_string(reports_dir.join("daily_brief.md")).unwrap();
        assert!(brief.contains("no listings matched this run"));
    }

    #[tokio::test]
    async fn report_rollup_reads_recent_run_summaries() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let p = profile();

        let scored = pipeline
            .score_listings(vec![listing("Graduate Engineer", "Sydney NSW")], &p, now())
            .await
            .unwrap();
        let ranked = rank_and_filter(scored, &p);
        let selection = ajh_digest::select_for_digest(&ranked.listings, 0.0);
        let html = ajh_digest::render_html(&selection, now().date_naive());
        let run_id = Uuid::new_v4();
        let reports_dir = pipeline
            .write_reports(run_id, now(), now(), &ranked, &selection, &html)
            .await
            .unwrap();
        let summary_json = serde_json::json!({
            "run_id": run_id,
            "ranked": ranked.listings.len(),
            "digest_count": selection.listings.len(),
        });
        std::fs::write(
            reports_dir.join("run_summary.json"),
            serde_json::to_vec_pretty(&summary_json).unwrap(),
        )
        .unwrap();

        let markdown = report_daily_markdown(5, &dir.path().join("reports")).unwrap();
        assert!(markdown.contains(&run_id.to_string()));
        assert!(markdown.contains("ranked listings: 1"));
    }

    #[tokio::test]
    async fn persisted_results_can_be_reloaded_for_a_fresh_digest() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let p = profile();

        let scored = pipeline
            .score_listings(vec![listing("Graduate Engineer", "Sydney NSW")], &p, now())
            .await
            .unwrap();
        let ranked = rank_and_filter(scored, &p);
        let selection = ajh_digest::select_for_digest(&ranked.listings, 0.0);
        let html = ajh_digest::render_html(&selection, now().date_naive());
        let reports_dir = pipeline
            .write_reports(Uuid::new_v4(), now(), now(), &ranked, &selection, &html)
            .await
            .unwrap();

        let latest = latest_run_dir(&dir.path().join("reports")).unwrap().unwrap();
        assert_eq!(latest, reports_dir);
        let reloaded = load_run_results(&latest).unwrap();
        assert_eq!(reloaded, ranked.listings);
    }

    #[test]
    fn profile_loading_rejects_invalid_weights() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, r#"{"weights": {"skills": 9.0}}"#).unwrap();
        assert!(load_profile(&path).is_err());

        std::fs::write(&path, r#"{"minScore": 25}"#).unwrap();
        let profile = load_profile(&path).unwrap();
        assert_eq!(profile.min_score, 25.0);
    }

    #[test]
    fn parquet_snapshot_handles_unclassified_companies() {
        let dir = tempdir().unwrap();
        let reports_dir = dir.path().join("r");
        std::fs::create_dir_all(&reports_dir).unwrap();
        let scored = ScoredListing {
            listing: listing("Engineer", "Sydney NSW"),
            score: 12.0,
            breakdown: ScoreBreakdown::default(),
            tier: None,
            seniority: SeniorityLevel::Mid,
        };
        let manifest_path = export_parquet_snapshot(&reports_dir, &[scored]).unwrap();
        assert!(manifest_path.exists());
    }
}
