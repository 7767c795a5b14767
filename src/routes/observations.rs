// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Observation endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{DashboardData, ObservationPatch, ObservationResponse, ObservationSummary, Readings};
use crate::policy::AuthenticatedCaller;
use crate::services::ObservationFilter;
use crate::time_utils::{has_storable_year, parse_timestamp};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/observations",
            get(list_observations).post(create_observation),
        )
        .route("/observations/dashboard", get(dashboard))
        .route(
            "/observations/{id}",
            get(get_observation)
                .put(update_observation)
                .delete(delete_observation),
        )
        .route("/observations/user/{user_id}", get(list_user_observations))
}

/// Paging and filters for observation listings.
#[derive(Debug, Deserialize, Validate)]
pub struct ListParams {
    #[serde(default)]
    skip: u32,
    #[serde(default)]
    #[validate(range(min = 1, max = 1000))]
    limit: Option<u32>,
    /// Inclusive lower bound on observation time
    #[serde(default)]
    start_date: Option<String>,
    /// Inclusive upper bound on observation time
    #[serde(default)]
    end_date: Option<String>,
    /// Admin only
    #[serde(default)]
    observer_id: Option<u64>,
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|value| {
        parse_timestamp(value)
            .filter(|bound| has_storable_year(*bound))
            .ok_or_else(|| AppError::BadRequest(format!("{} is not a valid timestamp", name)))
    })
    .transpose()
}

async fn create_observation(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Json(readings): Json<Readings>,
) -> Result<(StatusCode, Json<ObservationResponse>)> {
    let observation = state.observations.create(&caller, readings).await?;
    Ok((StatusCode::CREATED, Json(observation)))
}

async fn list_observations(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ObservationResponse>>> {
    params.validate()?;

    let filter = ObservationFilter {
        skip: params.skip,
        limit: params.limit,
        start: parse_bound("start_date", params.start_date.as_deref())?,
        end: parse_bound("end_date", params.end_date.as_deref())?,
        observer_id: params.observer_id,
    };

    Ok(Json(state.observations.list(&caller, filter).await?))
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
) -> Result<Json<DashboardData>> {
    Ok(Json(state.observations.dashboard(&caller).await?))
}

async fn get_observation(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<u64>,
) -> Result<Json<ObservationResponse>> {
    Ok(Json(state.observations.get(&caller, id).await?))
}

async fn update_observation(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<u64>,
    Json(patch): Json<ObservationPatch>,
) -> Result<Json<ObservationResponse>> {
    Ok(Json(state.observations.update(&caller, id, patch).await?))
}

async fn delete_observation(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>> {
    state.observations.delete(&caller, id).await?;
    Ok(Json(serde_json::json!({
        "message": "Observation deleted successfully"
    })))
}

async fn list_user_observations(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(user_id): Path<u64>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ObservationSummary>>> {
    params.validate()?;

    let summaries = state
        .observations
        .list_for_user(&caller, user_id, params.skip, params.limit)
        .await?;
    Ok(Json(summaries))
}
