// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer-token authentication middleware.

use crate::error::AppError;
use crate::policy::{self, AuthenticatedCaller};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Cookie that may carry the session token instead of the header.
pub const SESSION_COOKIE: &str = "weather_token";

/// Middleware that resolves the caller for protected routes.
///
/// Inserts an [`AuthenticatedCaller`] extension for the handlers. Missing,
/// invalid and expired tokens, unknown subjects and inactive accounts are
/// all rejected here with their own error kind.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = match jar.get(SESSION_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or(AppError::Unauthenticated)?,
    };

    let subject_id = state.tokens.verify(&token)?;
    let user = state.identity.resolve_from_credential(subject_id).await?;
    let caller = AuthenticatedCaller::from(&user);

    policy::check_caller(Some(&caller)).inspect_err(|_| {
        tracing::warn!(user_id = caller.id, "Inactive account rejected");
    })?;

    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}
