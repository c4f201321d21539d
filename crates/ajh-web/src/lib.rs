//! JSON API over the pipeline: submit a profile for a scoring run,
//! poll for results, get a heartbeat.

use std::sync::Arc;
use std::time::Duration;

use ajh_core::Profile;
use ajh_pipeline::{Pipeline, RunSummary};
use ajh_storage::ResultsStore;
use axum::{
    extract::{Path as AxumPath, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

const CALLBACK_ATTEMPTS: u32 = 3;
const CALLBACK_BASE_DELAY: Duration = Duration::from_secs(2);

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub store: Option<ResultsStore>,
    pub worker_secret: Option<String>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            store: None,
            worker_secret: None,
        }
    }

    pub fn with_store(mut self, store: ResultsStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_worker_secret(mut self, secret: impl Into<String>) -> Self {
        self.worker_secret = Some(secret.into());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    #[serde(default)]
    pub submission_id: Option<Uuid>,
    pub profile: Profile,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeAccepted {
    pub submission_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackPayload {
    submission_id: Uuid,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/scrape", post(scrape_handler))
        .route("/api/results/{submission_id}", get(results_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("AJH_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let config = ajh_pipeline::PipelineConfig::from_env();
    let database_url = config.database_url.clone();
    let mut pipeline = Pipeline::new(config)?;
    let mut store = None;
    if let Some(url) = database_url {
        let connected = ResultsStore::connect(&url).await?;
        pipeline = pipeline.with_store(ResultsStore::new(connected.pool().clone()));
        store = Some(connected);
    }
    let mut state = AppState::new(pipeline);
    if let Some(store) = store {
        state = state.with_store(store);
    }
    if let Ok(secret) = std::env::var("WORKER_SECRET") {
        state = state.with_worker_secret(secret);
    }

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health_handler() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

async fn scrape_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ScrapeRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    let Json(request) = match body {
        Ok(json) => json,
        Err(rejection) => {
            return json_error(StatusCode::BAD_REQUEST, &rejection.body_text());
        }
    };

    if let Err(invalid) = request.profile.validate() {
        return json_error(StatusCode::UNPROCESSABLE_ENTITY, &invalid.to_string());
    }
    let profile = request.profile.normalized();
    let submission_id = request.submission_id.unwrap_or_else(Uuid::new_v4);

    let pipeline = Arc::clone(&state.pipeline);
    let callback_url = request.callback_url.clone();
    tokio::spawn(async move {
        let outcome = pipeline.run_with_profile(submission_id, &profile).await;
        let payload = match outcome {
            Ok(summary) => {
                info!(%submission_id, ranked = summary.ranked, "background run complete");
                CallbackPayload {
                    submission_id,
                    status: "completed",
                    summary: Some(summary),
                    error: None,
                }
            }
            Err(err) => {
                warn!(%submission_id, %err, "background run failed");
                CallbackPayload {
                    submission_id,
                    status: "failed",
                    summary: None,
                    error: Some(err.to_string()),
                }
            }
        };
        if let Some(url) = callback_url {
            if let Err(err) = deliver_callback(&url, &payload).await {
                warn!(%submission_id, %err, "callback delivery gave up");
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(ScrapeAccepted {
            submission_id,
            status: "accepted",
        }),
    )
        .into_response()
}

async fn results_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(submission_id): AxumPath<Uuid>,
) -> Response {
    let Some(store) = &state.store else {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "results persistence is not configured",
        );
    };
    match store.load_run(submission_id).await {
        Ok(Some(record)) => Json(serde_json::json!({
            "submissionId": record.submission_id,
            "status": record.status,
            "createdAt": record.created_at,
            "listings": record.listings,
        }))
        .into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "unknown submission"),
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(secret) = &state.worker_secret else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(secret.as_str()) {
        Ok(())
    } else {
        Err(json_error(
            StatusCode::UNAUTHORIZED,
            "missing or invalid bearer token",
        ))
    }
}

/// POST the run outcome back to the submitter. Retries a few times
/// with a doubling delay before giving up.
async fn deliver_callback(url: &str, payload: &CallbackPayload) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let mut delay = CALLBACK_BASE_DELAY;
    for attempt in 1..=CALLBACK_ATTEMPTS {
        match client.post(url).json(payload).send().await {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => {
                warn!(%url, attempt, status = %response.status(), "callback rejected");
            }
            Err(err) => {
                warn!(%url, attempt, %err, "callback request failed");
            }
        }
        if attempt < CALLBACK_ATTEMPTS {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }
    anyhow::bail!("callback to {url} failed after {CALLBACK_ATTEMPTS} attempts")
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ajh_pipeline::PipelineConfig;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn test_state(root: &std::path::Path, secret: Option<&str>) -> AppState {
        let pipeline = Pipeline::new(PipelineConfig {
            artifacts_dir: root.join("artifacts"),
            reports_dir: root.join("reports"),
            workspace_root: root.to_path_buf(),
            profile_path: root.join("profile.json"),
            ..PipelineConfig::default()
        })
        .unwrap();
        let mut state = AppState::new(pipeline);
        if let Some(secret) = secret {
            state = state.with_worker_secret(secret);
        }
        state
    }

    fn scrape_request(token: Option<&str>, body: &str) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri("/api/scrape")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), None));
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn scrape_requires_bearer_token_when_secret_is_set() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), Some("sekrit")));

        let denied = app
            .clone()
            .oneshot(scrape_request(None, r#"{"profile": {}}"#))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .oneshot(scrape_request(Some("other"), r#"{"profile": {}}"#))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn scrape_rejects_invalid_profiles_with_422() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), Some("sekrit")));
        let resp = app
            .oneshot(scrape_request(
                Some("sekrit"),
                r#"{"profile": {"weights": {"skills": 9.0}}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("weight"));
    }

    #[tokio::test]
    async fn scrape_accepts_and_echoes_the_submission_id() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), Some("sekrit")));
        let id = Uuid::new_v4();
        let body = format!(
            r#"{{"submissionId": "{id}", "profile": {{"skills": [{{"name": "React", "tier": "core"}}]}}}}"#
        );
        let resp = app
            .oneshot(scrape_request(Some("sekrit"), &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body = body_json(resp).await;
        assert_eq!(body["submissionId"], id.to_string());
        assert_eq!(body["status"], "accepted");
    }

    #[tokio::test]
    async fn results_without_a_store_returns_service_unavailable() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), None));
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(format!("/api/results/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn malformed_json_body_is_a_bad_request() {
        let dir = tempdir().unwrap();
        let app = app(test_state(dir.path(), None));
        let resp = app
            .oneshot(scrape_request(None, "{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
