use std::io::ErrorKind;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::fetch::{FetchError, GatewayClient};
use crate::parser::{self, PassageResult, VerseRecord};
use crate::settings::Settings;

const VOTD_REFERENCE: &str = "John 3:16";

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    catalog: Arc<Catalog>,
    client: GatewayClient,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self> {
        let client = GatewayClient::new(settings.upstream_url.clone())
            .context("failed to build upstream client")?;
        Ok(AppState {
            catalog: Arc::new(settings.catalog()),
            settings: Arc::new(settings),
            client,
        })
    }

    fn resolve_version(&self, requested: Option<&str>) -> Result<String, ApiError> {
        self.catalog
            .resolve(requested, &self.settings.default_version)
            .ok_or(ApiError::InvalidVersion)
    }

    async fn fetch_and_extract(
        &self,
        query: &str,
        version: &str,
    ) -> Result<(String, PassageResult), ApiError> {
        let html = self.client.fetch_passage(query, version).await?;
        let result = parser::extract_passage(&html);
        info!(query, version, verses = result.verses.len(), "extracted passage");
        Ok((html, result))
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Please enter a passage or keyword.")]
    MissingQuery,

    #[error("That translation isn't available. Please choose another.")]
    InvalidVersion,

    #[error("We couldn't complete the request. Please try again.")]
    Upstream(#[from] FetchError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingQuery | ApiError::InvalidVersion => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Upstream(err) = &self {
            warn!(error = %err, "passage retrieval failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PassageParams {
    query: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChapterParams {
    reference: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VersionParams {
    version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PassageResponse {
    verse: String,
    version: String,
    content: Vec<String>,
    verses: Vec<VerseRecord>,
}

#[derive(Debug, Serialize)]
pub struct ChapterResponse {
    reference: String,
    version: String,
    title: String,
    content: Vec<String>,
    verses: Vec<VerseRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayVersions {
    gateway_versions: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnglishVersions {
    english_versions: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/versions", get(versions))
        .route("/api/english-versions", get(english_versions))
        .route("/api/passage", get(passage))
        .route("/api/chapter", get(chapter))
        .route("/api/votd", get(votd))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the configured port, moving up one port at a time while it is taken.
pub async fn bind_with_retry(host: &str, port: u16, attempts: u16) -> Result<TcpListener> {
    let mut candidate = port;
    for attempt in 1..=attempts.max(1) {
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => return Ok(listener),
            Err(err) if err.kind() == ErrorKind::AddrInUse && attempt < attempts => {
                let next = candidate
                    .checked_add(1)
                    .with_context(|| format!("no ports left above {candidate}"))?;
                warn!("Port {} is in use. Trying {}...", candidate, next);
                candidate = next;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to bind {host}:{candidate}"));
            }
        }
    }
    anyhow::bail!("failed to bind {host} after {attempts} attempts")
}

pub async fn serve(settings: Settings) -> Result<()> {
    let listener =
        bind_with_retry(&settings.host, settings.port, settings.max_port_attempts).await?;
    let addr = listener.local_addr()?;
    let state = AppState::new(settings)?;

    info!("Server running on http://{}", addr);
    axum::serve(listener, router(state))
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn versions(State(state): State<AppState>) -> Json<GatewayVersions> {
    Json(GatewayVersions {
        gateway_versions: state.catalog.codes().to_vec(),
    })
}

async fn english_versions(State(state): State<AppState>) -> Json<EnglishVersions> {
    Json(EnglishVersions {
        english_versions: state.catalog.codes().to_vec(),
    })
}

async fn passage(
    State(state): State<AppState>,
    Query(params): Query<PassageParams>,
) -> Result<Json<PassageResponse>, ApiError> {
    let query = require_text(params.query.as_deref())?;
    let version = state.resolve_version(params.version.as_deref())?;
    let (_, result) = state.fetch_and_extract(&query, &version).await?;

    Ok(Json(PassageResponse {
        verse: query,
        version,
        content: result.content,
        verses: result.verses,
    }))
}

async fn chapter(
    State(state): State<AppState>,
    Query(params): Query<ChapterParams>,
) -> Result<Json<ChapterResponse>, ApiError> {
    let reference = require_text(params.reference.as_deref())?;
    let version = state.resolve_version(params.version.as_deref())?;
    let (html, result) = state.fetch_and_extract(&reference, &version).await?;
    let title = parser::extract_title(&html);

    Ok(Json(ChapterResponse {
        reference,
        version,
        title,
        content: result.content,
        verses: result.verses,
    }))
}

async fn votd(
    State(state): State<AppState>,
    Query(params): Query<VersionParams>,
) -> Result<Json<PassageResponse>, ApiError> {
    let version = state.resolve_version(params.version.as_deref())?;
    let (_, result) = state.fetch_and_extract(VOTD_REFERENCE, &version).await?;

    Ok(Json(PassageResponse {
        verse: VOTD_REFERENCE.to_string(),
        version,
        content: result.content,
        verses: result.verses,
    }))
}

fn require_text(raw: Option<&str>) -> Result<String, ApiError> {
    match raw.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(ApiError::MissingQuery),
    }
}
