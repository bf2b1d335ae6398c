//! HTTP surface of the EPG service.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/?ch=<name>&date=<YYYY-MM-DD>` | Programme list of one channel on one day |
//! | `GET`  | `/health` | Liveness plus index size |
//!
//! Query failures are reported as `{"error": "<message>"}` with status 200; clients tell
//! success from failure by payload shape.
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::cache::EpgCache;
use crate::error::AppError;
use crate::model::EpgResponse;
use crate::query::{QueryError, QueryService};

#[derive(Clone)]
struct AppState {
    query: Arc<QueryService>,
    cache: Arc<EpgCache>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// Channels reachable by name.
    channels: usize,
    programmes: usize,
}

pub fn router(cache: Arc<EpgCache>) -> Router {
    let state = AppState {
        query: Arc::new(QueryService::new(Arc::clone(&cache))),
        cache,
    };
    Router::new()
        .route("/", get(handle_query))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM, letting in-flight requests finish.
pub async fn run_server(addr: SocketAddr, cache: Arc<EpgCache>) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "http server listening");

    axum::serve(listener, router(cache))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http server shut down");
    Ok(())
}

async fn handle_query(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<EpgResponse>, QueryError> {
    state
        .query
        .handle(first_value(&params, "ch"), first_value(&params, "date"))
        .map(Json)
}

/// First value of `key`; repeated keys after it are ignored.
fn first_value<'a>(params: &'a [(String, String)], key: &str) -> &'a str {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let index = state.cache.snapshot();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        channels: index.named_channel_count(),
        programmes: index.programme_count(),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::{json, Value};

    use super::*;
    use crate::model::{CacheIndex, ProgramItem};

    async fn spawn(cache: Arc<EpgCache>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(cache)).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn get_json(url: &str) -> (reqwest::StatusCode, Value) {
        let resp = reqwest::get(url).await.unwrap();
        let status = resp.status();
        let body = resp.text().await.unwrap();
        (status, serde_json::from_str(&body).unwrap())
    }

    fn cache() -> Arc<EpgCache> {
        let mut index = CacheIndex::default();
        index.channel_ids.insert("CCTV1".into(), "c1".into());
        index.programmes.insert(
            "c1".into(),
            HashMap::from([(
                "2024-01-01".into(),
                vec![ProgramItem {
                    start: "12:00".into(),
                    end: "13:00".into(),
                    title: "News".into(),
                }],
            )]),
        );
        Arc::new(EpgCache::new(index))
    }

    #[tokio::test]
    async fn query_returns_programme_list() {
        let base = spawn(cache()).await;
        let (status, body) = get_json(&format!("{base}/?ch=CCTV1&date=2024-01-01")).await;

        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "channel_name": "CCTV1",
                "date": "2024-01-01",
                "epg_data": [{"start": "12:00", "end": "13:00", "title": "News"}]
            })
        );
    }

    #[tokio::test]
    async fn channel_names_are_url_decoded() {
        let mut index = CacheIndex::default();
        index.channel_ids.insert("湖南卫视".into(), "hn".into());
        let base = spawn(Arc::new(EpgCache::new(index))).await;

        let (_, body) = get_json(&format!(
            "{base}/?ch=%E6%B9%96%E5%8D%97%E5%8D%AB%E8%A7%86&date=2024-01-01"
        ))
        .await;
        assert_eq!(body, json!({"error": "no programme data for channel 湖南卫视"}));
    }

    #[tokio::test]
    async fn errors_are_payloads_with_status_ok() {
        let base = spawn(cache()).await;
        let cases = [
            ("/", "missing parameter: both ch and date are required"),
            ("/?ch=CCTV1", "missing parameter: both ch and date are required"),
            ("/?ch=CCTV1&date=2024-1-1", "invalid date format, expected YYYY-MM-DD"),
            ("/?ch=Nope&date=2024-01-01", "channel not found: Nope"),
            (
                "/?ch=CCTV1&date=2024-01-02",
                "no programme data for channel CCTV1 on 2024-01-02",
            ),
        ];
        for (path, message) in cases {
            let (status, body) = get_json(&format!("{base}{path}")).await;
            assert_eq!(status, reqwest::StatusCode::OK, "{path}");
            assert_eq!(body, json!({ "error": message }), "{path}");
        }
    }

    #[tokio::test]
    async fn repeated_keys_use_the_first_value() {
        let base = spawn(cache()).await;

        let (status, body) =
            get_json(&format!("{base}/?ch=CCTV1&ch=X&date=2024-01-01&date=bad")).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(body["channel_name"], "CCTV1");
        assert_eq!(body["epg_data"][0]["title"], "News");

        let (status, body) = get_json(&format!("{base}/?ch=X&ch=CCTV1&date=2024-01-01")).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(body, json!({"error": "channel not found: X"}));
    }

    #[tokio::test]
    async fn unknown_and_valueless_keys_are_tolerated() {
        let base = spawn(cache()).await;
        let (status, body) = get_json(&format!("{base}/?x=1&ch=CCTV1&date&y")).await;
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(
            body,
            json!({"error": "missing parameter: both ch and date are required"})
        );
    }

    #[test]
    fn first_value_skips_later_duplicates() {
        let params = vec![
            ("date".to_string(), "2024-01-01".to_string()),
            ("ch".to_string(), "A".to_string()),
            ("ch".to_string(), "B".to_string()),
        ];
        assert_eq!(first_value(&params, "ch"), "A");
        assert_eq!(first_value(&params, "date"), "2024-01-01");
        assert_eq!(first_value(&params, "missing"), "");
    }

    #[tokio::test]
    async fn health_reports_index_size() {
        let base = spawn(cache()).await;
        let (status, body) = get_json(&format!("{base}/health")).await;

        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["channels"], 1);
        assert_eq!(body["programmes"], 1);
    }
}
