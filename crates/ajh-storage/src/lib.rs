//! Shared infrastructure: polite HTTP fetching, raw payload archival,
//! and the Postgres results store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ajh_core::{BoardId, ScoredListing};
use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::info_span;
use uuid::Uuid;

pub const CRATE_NAME: &str = "ajh-storage";

/// Receipt for one archived board payload.
#[derive(Debug, Clone)]
pub struct StoredPayload {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Hash-addressed archive of raw board payloads, one file per distinct
/// payload body. Writes are atomic (temp file + rename) so a crashed
/// run never leaves a partial artifact behind.
#[derive(Debug, Clone)]
pub struct PayloadArchive {
    root: PathBuf,
}

impl PayloadArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    fn payload_relative_path(
        &self,
        board: &BoardId,
        fetched_at: DateTime<Utc>,
        content_hash: &str,
        extension: &str,
    ) -> PathBuf {
        let day = fetched_at.format("%Y%m%d").to_string();
        let ext = extension.trim_start_matches('.').trim();
        let ext = if ext.is_empty() { "txt" } else { ext };
        PathBuf::from(board.as_str())
            .join(day)
            .join(format!("{content_hash}.{ext}"))
    }

    pub async fn store_payload(
        &self,
        board: &BoardId,
        fetched_at: DateTime<Utc>,
        extension: &str,
        payload: &str,
    ) -> anyhow::Result<StoredPayload> {
        let bytes = payload.as_bytes();
        let content_hash = Self::sha256_hex(bytes);
        let relative_path = self.payload_relative_path(board, fetched_at, &content_hash, extension);
        let absolute_path = self.root.join(&relative_path);
        let parent = absolute_path
            .parent()
            .context("payload path has no parent directory")?;

        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating payload directory {}", parent.display()))?;

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking payload path {}", absolute_path.display()))?
        {
            return Ok(StoredPayload {
                content_hash,
                relative_path,
                absolute_path,
                byte_size: bytes.len(),
                deduplicated: true,
            });
        }

        let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp payload file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp payload file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp payload file {}", temp_path.display()))?;
        drop(file);

        match fs::rename(&temp_path, &absolute_path).await {
            Ok(()) => Ok(StoredPayload {
                content_hash,
                relative_path,
                absolute_path,
                byte_size: bytes.len(),
                deduplicated: false,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(&temp_path).await;
                Ok(StoredPayload {
                    content_hash,
                    relative_path,
                    absolute_path,
                    byte_size: bytes.len(),
                    deduplicated: true,
                })
            }
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!("renaming temp payload into {}", absolute_path.display())
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
    pub per_board_concurrency: usize,
    pub backoff: BackoffPolicy,
    pub token_bucket: Option<TokenBucketConfig>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            global_concurrency: 8,
            per_board_concurrency: 2,
            backoff: BackoffPolicy::default(),
            token_bucket: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenBucketConfig {
    pub capacity: u32,
    pub refill_every: Duration,
}

#[derive(Debug)]
pub struct SimpleTokenBucket {
    capacity: u32,
    refill_every: Duration,
    state: Mutex<TokenBucketState>,
}

#[derive(Debug, Clone, Copy)]
struct TokenBucketState {
    tokens: u32,
    last_refill: Instant,
}

impl SimpleTokenBucket {
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        Self {
            capacity,
            refill_every,
            state: Mutex::new(TokenBucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn take(&self) {
        loop {
            let mut state = self.state.lock().await;
            let elapsed = state.last_refill.elapsed();
            if elapsed >= self.refill_every && self.refill_every.as_millis() > 0 {
                let refills = (elapsed.as_millis() / self.refill_every.as_millis()) as u32;
                state.tokens = state.tokens.saturating_add(refills).min(self.capacity);
                state.last_refill = Instant::now();
            }

            if state.tokens > 0 {
                state.tokens -= 1;
                return;
            }

            let sleep_for = self.refill_every;
            drop(state);
            tokio::time::sleep(sleep_for).await;
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

/// Board-aware HTTP client. A global semaphore bounds total in-flight
/// requests, a per-board semaphore keeps any single board from being
/// hammered, and an optional token bucket spaces requests out on top
/// of that. Retries follow [`BackoffPolicy`] for 5xx/429 and
/// connection-level failures.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_board_limit: usize,
    per_board: Mutex<HashMap<String, Arc<Semaphore>>>,
    token_bucket: Option<Arc<SimpleTokenBucket>>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        let token_bucket = config
            .token_bucket
            .map(|c| Arc::new(SimpleTokenBucket::new(c.capacity, c.refill_every)));

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_board_limit: config.per_board_concurrency.max(1),
            per_board: Mutex::new(HashMap::new()),
            token_bucket,
            backoff: config.backoff,
        })
    }

    async fn per_board_semaphore(&self, board: &BoardId) -> Arc<Semaphore> {
        let mut map = self.per_board.lock().await;
        map.entry(board.as_str().to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_board_limit)))
            .clone()
    }

    pub async fn fetch_bytes(
        &self,
        board: &BoardId,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        self.request(board, url, None).await
    }

    /// GET a text payload, decoding the body as UTF-8 (lossy; board
    /// pages occasionally carry stray bytes).
    pub async fn fetch_text(&self, board: &BoardId, url: &str) -> anyhow::Result<String> {
        let response = self
            .request(board, url, None)
            .await
            .with_context(|| format!("fetching {url}"))?;
        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }

    /// POST a JSON body and return the response text. Used by the
    /// GraphQL boards.
    pub async fn post_json(
        &self,
        board: &BoardId,
        url: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<String> {
        let response = self
            .request(board, url, Some(body))
            .await
            .with_context(|| format!("posting to {url}"))?;
        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }

    async fn request(
        &self,
        board: &BoardId,
        url: &str,
        json_body: Option<&serde_json::Value>,
    ) -> Result<FetchedResponse, FetchError> {
        let _global = self
            .global_limit
            .acquire()
            .await
            .expect("semaphore not closed");
        let per_board = self.per_board_semaphore(board).await;
        let _board = per_board.acquire().await.expect("semaphore not closed");

        if let Some(bucket) = &self.token_bucket {
            bucket.take().await;
        }

        let span = info_span!("board_fetch", board = board.as_str(), url);
        let _guard = span.enter();

        let mut last_request_error: Option<reqwest::Error> = None;
        for attempt in 0..=self.backoff.max_retries {
            let request = match json_body {
                Some(body) => self.client.post(url).json(body),
                None => self.client.get(url),
            };
            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();
                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        return Ok(FetchedResponse {
                            status,
                            final_url,
                            body,
                        });
                    }
                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }

        Err(FetchError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}

/// One persisted run as read back from the database.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub submission_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub profile_json: serde_json::Value,
    pub listings: Vec<ScoredListing>,
}

/// Postgres-backed store for scored runs. A run's result set is
/// replaced wholesale inside one transaction, so readers either see
/// the old set or the new one, never a mix.
#[derive(Debug, Clone)]
pub struct ResultsStore {
    pool: PgPool,
}

impl ResultsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("connecting to results database")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("running results store migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn record_run(
        &self,
        submission_id: Uuid,
        profile_json: &serde_json::Value,
        status: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO runs (submission_id, profile_json, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (submission_id)
            DO UPDATE SET status = EXCLUDED.status, updated_at = NOW()
            "#,
        )
        .bind(submission_id)
        .bind(profile_json)
        .bind(status)
        .execute(&self.pool)
        .await
        .context("recording run status")?;
        Ok(())
    }

    pub async fn replace_results(
        &self,
        submission_id: Uuid,
        listings: &[ScoredListing],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("starting transaction")?;

        sqlx::query("DELETE FROM scored_results WHERE submission_id = $1")
            .bind(submission_id)
            .execute(&mut *tx)
            .await
            .context("clearing previous results")?;

        for (rank, scored) in listings.iter().enumerate() {
            let breakdown =
                serde_json::to_value(scored.breakdown).context("serializing breakdown")?;
            sqlx::query(
                r#"
                INSERT INTO scored_results
                    (submission_id, rank, source, url, title, company, location,
                     score, breakdown_json, seniority, tier, date_posted, is_remote,
                     salary_text, description)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(submission_id)
            .bind(rank as i32)
            .bind(scored.listing.source.as_str())
            .bind(&scored.listing.url)
            .bind(&scored.listing.title)
            .bind(&scored.listing.company)
            .bind(&scored.listing.location)
            .bind(scored.score)
            .bind(breakdown)
            .bind(scored.seniority.as_str())
            .bind(scored.tier.map(|t| t.label()))
            .bind(scored.listing.date_posted)
            .bind(scored.listing.is_remote)
            .bind(scored.listing.salary_text.as_deref())
            .bind(&scored.listing.description)
            .execute(&mut *tx)
            .await
            .context("inserting scored result")?;
        }

        tx.commit().await.context("committing results")?;
        Ok(())
    }

    pub async fn load_run(&self, submission_id: Uuid) -> anyhow::Result<Option<RunRecord>> {
        let run_row = sqlx::query(
            "SELECT submission_id, status, created_at, profile_json FROM runs WHERE submission_id = $1",
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await
        .context("loading run row")?;

        let Some(run_row) = run_row else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT source, url, title, company, location, score, breakdown_json,
                   seniority, tier, date_posted, is_remote, salary_text, description
              FROM scored_results
             WHERE submission_id = $1
             ORDER BY rank ASC
            "#,
        )
        .bind(submission_id)
        .fetch_all(&self.pool)
        .await
        .context("loading scored results")?;

        let mut listings = Vec::with_capacity(rows.len());
        for row in rows {
            listings.push(scored_listing_from_row(&row)?);
        }

        Ok(Some(RunRecord {
            submission_id: run_row.get("submission_id"),
            status: run_row.get("status"),
            created_at: run_row.get("created_at"),
            profile_json: run_row.get("profile_json"),
            listings,
        }))
    }
}

fn scored_listing_from_row(row: &sqlx::postgres::PgRow) -> anyhow::Result<ScoredListing> {
    let breakdown: serde_json::Value = row.get("breakdown_json");
    let breakdown = serde_json::from_value(breakdown).context("decoding breakdown")?;
    let source: String = row.get("source");
    let seniority: String = row.get("seniority");
    let seniority = serde_json::from_value(serde_json::Value::String(seniority))
        .context("decoding seniority")?;
    let tier: Option<String> = row.get("tier");
    let tier = tier.as_deref().and_then(tier_from_label);

    Ok(ScoredListing {
        listing: ajh_core::CanonicalListing {
            title: row.get("title"),
            company: row.get("company"),
            location: row.get("location"),
            description: row.get("description"),
            date_posted: row.get("date_posted"),
            salary_text: row.get("salary_text"),
            is_remote: row.get("is_remote"),
            source: BoardId::from(source),
            url: row.get("url"),
        },
        score: row.get("score"),
        breakdown,
        tier,
        seniority,
    })
}

fn tier_from_label(label: &str) -> Option<ajh_core::CompanyTier> {
    match label {
        "Big Tech" => Some(ajh_core::CompanyTier::BigTech),
        "AU Notable" => Some(ajh_core::CompanyTier::AuNotable),
        "Top Tech" => Some(ajh_core::CompanyTier::TopTech),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn payload_hashing_is_stable() {
        let hash = PayloadArchive::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn repeated_payloads_deduplicate_by_hash_path() {
        let dir = tempdir().expect("tempdir");
        let archive = PayloadArchive::new(dir.path());
        let fetched_at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .expect("ts")
            .with_timezone(&Utc);

        let first = archive
            .store_payload(&BoardId::Seek, fetched_at, "html", "<html>same</html>")
            .await
            .expect("first store");
        let second = archive
            .store_payload(&BoardId::Seek, fetched_at, "html", "<html>same</html>")
            .await
            .expect("second store");

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.relative_path, second.relative_path);
        assert!(first.relative_path.starts_with("seek/20260301"));
        assert!(first.absolute_path.exists());
    }

    #[tokio::test]
    async fn distinct_payloads_land_in_distinct_files() {
        let dir = tempdir().expect("tempdir");
        let archive = PayloadArchive::new(dir.path());
        let fetched_at = Utc::now();

        let a = archive
            .store_payload(&BoardId::LinkedIn, fetched_at, ".json", "{\"a\":1}")
            .await
            .expect("store a");
        let b = archive
            .store_payload(&BoardId::LinkedIn, fetched_at, "json", "{\"b\":2}")
            .await
            .expect("store b");

        assert_ne!(a.content_hash, b.content_hash);
        assert_ne!(a.absolute_path, b.absolute_path);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[test]
    fn rate_limited_and_server_errors_are_retryable() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RetryDisposition::NonRetryable
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            RetryDisposition::NonRetryable
        );
    }

    #[tokio::test]
    async fn token_bucket_exhausts_and_refills() {
        let bucket = SimpleTokenBucket::new(2, Duration::from_millis(10));
        bucket.take().await;
        bucket.take().await;
        let start = Instant::now();
        bucket.take().await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
