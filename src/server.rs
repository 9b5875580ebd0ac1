//! HTTP surface
//!
//! Thin axum handlers over the resolver and its collaborators. Every error
//! body is `{"error": "..."}` except the diagnostic probe, which reports its
//! own shape.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::cache::CacheError;
use crate::data::{load_catalog, lookup_district, CatalogError, District, DistrictId, UpstreamClient};
use crate::resolver::{Resolution, ResolveError, Resolver};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub upstream: Arc<UpstreamClient>,
    pub catalog_path: PathBuf,
}

/// Errors surfaced at the HTTP boundary
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("No data available for this district")]
    NoDataAvailable,

    #[error("{0}")]
    BadRequest(&'static str),

    #[error("Failed to load districts")]
    Catalog(#[from] CatalogError),

    #[error("Cache unavailable")]
    Cache(#[from] CacheError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::NoDataAvailable => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Catalog(_) | ServerError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ResolveError> for ServerError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NoDataAvailable { .. } => ServerError::NoDataAvailable,
            ResolveError::Cache(e) => ServerError::Cache(e),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match &self {
            ServerError::Catalog(e) => error!(error = %e, "failed to load districts"),
            ServerError::Cache(e) => error!(error = %e, "cache read failed"),
            _ => {}
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/districts", get(districts))
        .route("/api/data/:district_id", get(district_data))
        .route("/api/geolookup", post(geolookup))
        .route("/api/debug/raw-api", get(debug_raw_api))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn districts(State(state): State<AppState>) -> Result<Json<Vec<District>>, ServerError> {
    Ok(Json(load_catalog(&state.catalog_path)?))
}

async fn district_data(
    State(state): State<AppState>,
    Path(district_id): Path<String>,
) -> Result<Json<Resolution>, ServerError> {
    let district = DistrictId::new(district_id);
    Ok(Json(state.resolver.resolve(&district).await?))
}

/// Accepts any body and checks it by hand so a missing or malformed
/// coordinate is always a 400 with the usual error shape
async fn geolookup(body: Bytes) -> Result<Json<Value>, ServerError> {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let coordinate = |name: &str| body.get(name).and_then(Value::as_f64);

    let (Some(lat), Some(lon)) = (coordinate("lat"), coordinate("lon")) else {
        return Err(ServerError::BadRequest("lat/lon required"));
    };

    Ok(Json(match lookup_district(lat, lon) {
        Some(found) => json!(found),
        None => json!({ "district_id": null }),
    }))
}

async fn debug_raw_api(State(state): State<AppState>) -> Response {
    match state.upstream.probe().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            warn!(error = %e, "upstream probe failed");
            let body = json!({
                "success": false,
                "error": e.to_string(),
                "error_type": e.error_type(),
                "url": state.upstream.base_url(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
