// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes: Google sign-in, local admin login, logout.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::SESSION_COOKIE;
use crate::models::{User, UserResponse};
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// How long a signed OAuth state stays valid.
const STATE_MAX_AGE_MS: u128 = 10 * 60 * 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/google", get(google_login))
        .route("/auth/google/callback", get(google_callback))
        .route("/auth/google/verify", post(google_verify))
        .route("/auth/admin/login", post(admin_login))
        .route("/auth/logout", post(logout))
}

/// Query parameters for starting OAuth flow.
#[derive(Deserialize)]
pub struct GoogleLoginParams {
    /// Frontend origin to return to; must be an allowed origin.
    #[serde(default)]
    frontend_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub authorization_url: String,
    pub state: String,
}

/// Successful login.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GoogleVerifyRequest {
    /// Google ID token from the browser sign-in flow
    #[validate(length(min = 1))]
    pub credential: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdminLoginRequest {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Start OAuth flow - return Google's authorization URL and signed state.
async fn google_login(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GoogleLoginParams>,
) -> Result<Json<AuthorizationResponse>> {
    let frontend_url = match params.frontend_url {
        Some(url) => {
            let url = url.trim_end_matches('/').to_string();
            if url != state.config.frontend_url && !state.config.allowed_origins.contains(&url) {
                return Err(AppError::BadRequest(
                    "frontend_url is not an allowed origin".to_string(),
                ));
            }
            url
        }
        None => state.config.frontend_url.clone(),
    };

    let oauth_state = sign_state(&frontend_url, now_millis()?, &state.config.oauth_state_key)?;
    let authorization_url = state.google.authorization_url(&oauth_state);

    tracing::info!(frontend_url = %frontend_url, "Starting Google OAuth flow");

    Ok(Json(AuthorizationResponse {
        authorization_url,
        state: oauth_state,
    }))
}

/// OAuth callback - exchange code, resolve the user, redirect with a token.
async fn google_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    let frontend_url = params
        .state
        .as_deref()
        .and_then(|s| verify_and_decode_state(s, &state.config.oauth_state_key, now_millis().ok()?));

    let Some(frontend_url) = frontend_url else {
        tracing::warn!("Invalid, expired or missing OAuth state parameter");
        return Ok(callback_redirect(
            &state.config.frontend_url,
            "error",
            "invalid_state",
        ));
    };

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Google");
        return Ok(callback_redirect(&frontend_url, "error", &error));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing authorization code".to_string()))?;

    tracing::info!("Exchanging authorization code for tokens");
    let identity = state.google.exchange_code(&code).await?;

    let user = state
        .identity
        .resolve_or_create_from_external_identity(&identity)
        .await?;

    if !user.is_active {
        tracing::warn!(user_id = user.id, "Inactive account attempted Google login");
        return Ok(callback_redirect(&frontend_url, "error", "account_inactive"));
    }

    let token = state.tokens.issue(user.id)?;
    tracing::info!(user_id = user.id, "Google login successful");

    Ok(callback_redirect(&frontend_url, "token", &token))
}

/// Verify a Google ID token obtained by the frontend.
async fn google_verify(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<GoogleVerifyRequest>,
) -> Result<(CookieJar, Json<TokenResponse>)> {
    body.validate()?;

    let identity = state.google.verify_id_token(&body.credential).await?;
    let user = state
        .identity
        .resolve_or_create_from_external_identity(&identity)
        .await?;

    if !user.is_active {
        tracing::warn!(user_id = user.id, "Inactive account attempted Google login");
        return Err(AppError::AccountInactive);
    }

    tracing::info!(user_id = user.id, "Google login successful");
    login_response(&state, jar, user)
}

/// Admin login with username and password.
async fn admin_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<AdminLoginRequest>,
) -> Result<(CookieJar, Json<TokenResponse>)> {
    body.validate()?;

    let user = state
        .identity
        .resolve_local_admin(&body.username, &body.password)
        .await?;

    login_response(&state, jar, user)
}

/// Logout - tokens are stateless, so this only clears the session cookie.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    let removal = session_cookie(&state, String::new());
    (
        jar.remove(removal),
        Json(serde_json::json!({ "message": "Successfully logged out" })),
    )
}

fn login_response(
    state: &AppState,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Json<TokenResponse>)> {
    let access_token = state.tokens.issue(user.id)?;
    let jar = jar.add(session_cookie(state, access_token.clone()));

    Ok((
        jar,
        Json(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            user: user.into(),
        }),
    ))
}

fn session_cookie(state: &AppState, value: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.frontend_url.starts_with("https://"))
        .build()
}

fn callback_redirect(frontend_url: &str, key: &str, value: &str) -> Redirect {
    Redirect::temporary(&format!(
        "{}/auth/callback?{}={}",
        frontend_url,
        key,
        urlencoding::encode(value)
    ))
}

fn now_millis() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}

fn state_signature(payload: &str, secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Sign "frontend_url|timestamp_hex" and base64 the result for the URL.
fn sign_state(frontend_url: &str, timestamp_ms: u128, secret: &[u8]) -> Result<String> {
    let payload = format!("{}|{:x}", frontend_url, timestamp_ms);
    let signature = state_signature(&payload, secret)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("HMAC init failed")))?;

    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature).as_bytes()))
}

/// Verify HMAC signature and age, and decode the frontend URL from the state.
fn verify_and_decode_state(state: &str, secret: &[u8], now_ms: u128) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // Format is "frontend_url|timestamp_hex|signature_hex"; the URL may not
    // contain '|' so split from the right.
    let mut parts = state_str.rsplitn(3, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let frontend_url = parts.next()?;

    let payload = format!("{}|{}", frontend_url, timestamp_hex);
    let expected = state_signature(&payload, secret)?;

    if !bool::from(expected.as_bytes().ct_eq(signature_hex.as_bytes())) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_ms = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if now_ms.saturating_sub(issued_ms) > STATE_MAX_AGE_MS {
        tracing::warn!("OAuth state expired");
        return None;
    }

    Some(frontend_url.to_string())
}
