#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;

pub const VALID_USER: &str = "admin";
pub const VALID_PASSWORD: &str = "admin123";
pub const TOKEN: &str = "test-token-1";

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub struct BackendState {
    pub version_id: String,
    pub payload: Vec<u8>,
    pub advertised_digest: String,
    pub chunk_delay: Duration,
    pub download_url: String,
    pub download_hits: AtomicUsize,
}

pub struct Backend {
    pub base_url: String,
    pub state: Arc<BackendState>,
}

impl Backend {
    pub fn download_hits(&self) -> usize {
        self.state.download_hits.load(Ordering::SeqCst)
    }
}

/// Serve the launcher's backend contract on an ephemeral port:
/// POST /login, POST /logout, GET /game/version, GET /game/download.
/// `chunk_delay` slows the download stream so tests can observe an
/// in-flight transfer.
pub async fn spawn_backend(
    version_id: &str,
    payload: Vec<u8>,
    advertised_digest: String,
    chunk_delay: Duration,
) -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let state = Arc::new(BackendState {
        version_id: version_id.to_string(),
        payload,
        advertised_digest,
        chunk_delay,
        download_url: format!("{base_url}/game/download"),
        download_hits: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/game/version", get(version))
        .route("/game/download", get(download))
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Backend { base_url, state }
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    matches!(
        headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
        Some(h) if h == format!("Bearer {TOKEN}")
    )
}

async fn login(Json(body): Json<serde_json::Value>) -> Response {
    if body["username"] == VALID_USER && body["password"] == VALID_PASSWORD {
        Json(serde_json::json!({
            "token": TOKEN,
            "userId": "u-1001",
            "username": VALID_USER,
        }))
        .into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "bad credentials").into_response()
    }
}

async fn logout(headers: HeaderMap) -> StatusCode {
    if bearer_ok(&headers) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::UNAUTHORIZED
    }
}

async fn version(State(s): State<Arc<BackendState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "versionId": s.version_id,
        "releaseTimestamp": "2026-01-15T00:00:00Z",
        "downloadLocator": s.download_url,
        "sizeBytes": s.payload.len(),
        "contentDigest": s.advertised_digest,
    }))
}

async fn download(State(s): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if !bearer_ok(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing or invalid token").into_response();
    }
    s.download_hits.fetch_add(1, Ordering::SeqCst);

    let total = s.payload.len();
    let delay = s.chunk_delay;
    let chunks: Vec<Bytes> = s.payload.chunks(50).map(Bytes::copy_from_slice).collect();
    let stream = futures_util::stream::iter(chunks).then(move |chunk| async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok::<Bytes, Infallible>(chunk)
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, total.to_string())
        .body(Body::from_stream(stream))
        .unwrap()
}
