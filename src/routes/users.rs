// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User endpoints: the caller's own profile plus admin management.

use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{UserPatch, UserResponse, UserSettingsUpdate, UserSummary};
use crate::policy::AuthenticatedCaller;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/me", get(get_me).put(update_me))
        .route("/users/me/settings", put(update_settings))
        .route("/users", get(list_users))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(deactivate_user),
        )
        .route("/users/{id}/activate", post(activate_user))
        .route("/users/{id}/make-admin", post(make_admin))
        .route("/users/{id}/remove-admin", delete(remove_admin))
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
) -> Result<Json<UserResponse>> {
    Ok(Json(state.users.me(&caller).await?))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Json(update): Json<UserSettingsUpdate>,
) -> Result<Json<UserResponse>> {
    Ok(Json(state.users.update_settings(&caller, update).await?))
}

/// Only admins may edit their own record, with the usual self-protection.
async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<UserResponse>> {
    Ok(Json(state.users.update(&caller, caller.id, patch).await?))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
) -> Result<Json<Vec<UserSummary>>> {
    Ok(Json(state.users.list(&caller).await?))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<u64>,
) -> Result<Json<UserResponse>> {
    Ok(Json(state.users.get(&caller, id).await?))
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<u64>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<UserResponse>> {
    Ok(Json(state.users.update(&caller, id, patch).await?))
}

async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<u64>,
) -> Result<Json<Value>> {
    state.users.deactivate(&caller, id).await?;
    Ok(Json(json!({ "message": "User deactivated successfully" })))
}

async fn activate_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<u64>,
) -> Result<Json<Value>> {
    state.users.activate(&caller, id).await?;
    Ok(Json(json!({ "message": "User activated successfully" })))
}

async fn make_admin(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<u64>,
) -> Result<Json<Value>> {
    state.users.grant_admin(&caller, id).await?;
    Ok(Json(json!({ "message": "User promoted to admin successfully" })))
}

async fn remove_admin(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(id): Path<u64>,
) -> Result<Json<Value>> {
    state.users.revoke_admin(&caller, id).await?;
    Ok(Json(json!({ "message": "Admin privileges removed successfully" })))
}
