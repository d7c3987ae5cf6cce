use std::net::IpAddr;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{
    dto::{FilterSearchRequest, IpSearchRequest},
    format::{reshape, HostMatch},
};
use crate::{
    auth::extractors::{authorize, AuthUser},
    error::AppError,
    state::AppState,
};

pub fn search_routes() -> Router<AppState> {
    Router::new()
        .route("/perform_ip_search", post(perform_ip_search))
        .route("/perform_filter_search", post(perform_filter_search))
}

#[instrument(skip_all, fields(user_id = user.id))]
pub async fn perform_ip_search(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<IpSearchRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(payload) = payload?;
    let ip = payload
        .ip
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| AppError::Validation("IP address is required".into()))?;
    if ip.parse::<IpAddr>().is_err() {
        return Err(AppError::Validation("Invalid IP address".into()));
    }

    debug!(email = %user.email, ip = %ip, "ip search");
    let record = match state.search.host(&ip).await {
        Ok(r) => r,
        Err(e) => {
            state.metrics.search("ip", "error");
            return Err(AppError::Upstream(format!("Shodan API Error: {e}")));
        }
    };

    match record {
        Some(record) if record.get("ip_str").is_some() => {
            state.metrics.search("ip", "ok");
            Ok(Json(record))
        }
        _ => {
            state.metrics.search("ip", "not_found");
            Err(AppError::NotFound(
                "No information available for that IP.".into(),
            ))
        }
    }
}

/// Filters are checked before the session, so an empty request is a 400
/// whether or not the caller is signed in, and never touches the gate.
#[instrument(skip_all)]
pub async fn perform_filter_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<FilterSearchRequest>, JsonRejection>,
) -> Result<Json<Vec<HostMatch>>, AppError> {
    let Json(payload) = payload?;
    let query = payload.to_query().ok_or_else(|| {
        warn!("filter search without filters");
        AppError::Validation("At least one search filter is required".into())
    })?;
    let user = authorize(&headers, &state).await?;

    debug!(user_id = user.id, email = %user.email, query = %query, "filter search");
    let matches = match state.search.search(&query).await {
        Ok(m) => m,
        Err(e) => {
            state.metrics.search("filter", "error");
            return Err(e.into());
        }
    };
    state.metrics.search("filter", "ok");
    Ok(Json(reshape(matches)))
}
