// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Loaded once at startup; the JWT signing key is read-only afterwards, so
//! rotating it means restarting the process (which invalidates all sessions).

use std::env;

const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000/auth/google/callback";
const DEFAULT_TOKEN_LIFETIME_MINUTES: i64 = 30;
/// One year.
const MAX_TOKEN_LIFETIME_MINUTES: i64 = 365 * 24 * 60;
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@weather-logger.com";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Google OAuth client ID (public, also the expected ID token audience)
    pub google_client_id: String,
    /// Where Google sends the user back after consent
    pub google_redirect_uri: String,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
    /// GCP project hosting Firestore. `None` selects the in-memory store.
    pub gcp_project_id: Option<String>,
    /// Server port
    pub port: u16,
    /// Deployment environment name (development, production, ...)
    pub environment: String,
    /// Lifetime of issued access tokens
    pub access_token_expire_minutes: i64,
    /// Email of the bootstrap administrator
    pub default_admin_email: String,

    // --- Secrets ---
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,
    /// Password of the bootstrap administrator
    pub default_admin_password: String,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .trim()
            .as_bytes()
            .to_vec();
        if jwt_signing_key.is_empty() {
            return Err(ConfigError::Invalid("JWT_SIGNING_KEY", "must not be empty"));
        }

        let oauth_state_key = env::var("OAUTH_STATE_KEY")
            .map(|v| v.trim().as_bytes().to_vec())
            .ok()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| jwt_signing_key.clone());

        let frontend_url = env::var("FRONTEND_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_FRONTEND_URL.to_string());

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_else(|_| vec![frontend_url.clone()]);

        let access_token_expire_minutes = match env::var("ACCESS_TOKEN_EXPIRE_MINUTES") {
            Ok(raw) => parse_token_lifetime(&raw)?,
            Err(_) => DEFAULT_TOKEN_LIFETIME_MINUTES,
        };

        Ok(Self {
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_ID"))?,
            google_redirect_uri: env::var("GOOGLE_REDIRECT_URI")
                .unwrap_or_else(|_| DEFAULT_REDIRECT_URI.to_string()),
            frontend_url,
            allowed_origins,
            gcp_project_id: env::var("GCP_PROJECT_ID")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            access_token_expire_minutes,
            default_admin_email: env::var("DEFAULT_ADMIN_EMAIL")
                .unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_string()),

            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_SECRET"))?,
            jwt_signing_key,
            oauth_state_key,
            default_admin_password: env::var("DEFAULT_ADMIN_PASSWORD")
                .unwrap_or_else(|_| DEFAULT_ADMIN_PASSWORD.to_string()),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            google_client_id: "test-client-id.apps.googleusercontent.com".to_string(),
            google_redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            allowed_origins: vec![DEFAULT_FRONTEND_URL.to_string()],
            gcp_project_id: None,
            port: 8000,
            environment: "test".to_string(),
            access_token_expire_minutes: DEFAULT_TOKEN_LIFETIME_MINUTES,
            default_admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            google_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key".to_vec(),
            default_admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }

    /// Whether the bootstrap admin still uses the well-known password.
    pub fn uses_default_admin_password(&self) -> bool {
        self.default_admin_password == DEFAULT_ADMIN_PASSWORD
    }
}

fn parse_token_lifetime(raw: &str) -> Result<i64, ConfigError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|m| (1..=MAX_TOKEN_LIFETIME_MINUTES).contains(m))
        .ok_or(ConfigError::Invalid(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            "must be a whole number of minutes between 1 and 525600",
        ))
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
