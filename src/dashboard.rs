//! Minimal read-only HTTP endpoint over the catalog.
//!
//! `GET /dictionary?project=<name>[&version=<id>]` answers `{id, url, sha256}`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::catalog::{Catalog, DictionaryInfo};
use crate::error::{Result, TrainerError};

pub const DEFAULT_PORT: u16 = 25654;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DictionaryQuery {
    pub project: Option<String>,
    /// Kept as text so a non-numeric value is a 400 from us, not a rejection from the extractor.
    pub version: Option<String>,
}

impl DictionaryQuery {
    pub fn latest(project: &str) -> Self {
        Self { project: Some(project.to_string()), version: None }
    }

    pub fn version(project: &str, version: &str) -> Self {
        Self { project: Some(project.to_string()), version: Some(version.to_string()) }
    }
}

/// Looks up the dictionary a query asks for.
pub fn resolve_query(catalog: &Catalog, query: &DictionaryQuery) -> Result<DictionaryInfo> {
    let project = query
        .project
        .as_deref()
        .ok_or_else(|| TrainerError::Validation("Project name should be given.".to_string()))?;
    match query.version.as_deref() {
        Some(v) => {
            if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
                return Err(TrainerError::Validation("Version should be a number.".to_string()));
            }
            let id = v
                .parse::<i64>()
                .map_err(|_| TrainerError::Validation("Version should be a number.".to_string()))?;
            catalog.version(project, id)
        }
        None => catalog.latest(project),
    }
}

/// [`resolve_query`] with errors mapped to response statuses.
pub fn lookup(catalog: &Catalog, query: &DictionaryQuery) -> std::result::Result<DictionaryInfo, (StatusCode, String)> {
    resolve_query(catalog, query).map_err(|e| match e {
        TrainerError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        TrainerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        other => {
            warn!("Dashboard lookup failed: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error.".to_string())
        }
    })
}

async fn dictionary_handler(
    State(catalog): State<Arc<Catalog>>,
    Query(query): Query<DictionaryQuery>,
) -> std::result::Result<Json<DictionaryInfo>, (StatusCode, String)> {
    tokio::task::spawn_blocking(move || lookup(&catalog, &query))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map(Json)
}

pub fn router(catalog: Arc<Catalog>) -> Router {
    Router::new()
        .route("/dictionary", get(dictionary_handler))
        .with_state(catalog)
}

pub async fn serve_on(listener: TcpListener, catalog: Arc<Catalog>) -> Result<()> {
    axum::serve(listener, router(catalog)).await?;
    Ok(())
}

pub async fn serve(addr: &str, catalog: Arc<Catalog>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "dashboard listening");
    serve_on(listener, catalog).await
}
