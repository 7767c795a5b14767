// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Weather Logger: manual weather observations for a small observing station
//!
//! This crate provides the backend API: Google and local-admin sign-in,
//! stateless session tokens, an access policy, and observation and user
//! management on top of Firestore.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Database;
use services::{GoogleVerifier, IdentityResolver, ObservationService, TokenIssuer, UserService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub tokens: TokenIssuer,
    pub google: GoogleVerifier,
    pub identity: IdentityResolver,
    pub observations: ObservationService,
    pub users: UserService,
}

impl AppState {
    pub fn new(config: Config, db: Database, google: GoogleVerifier) -> Self {
        let tokens = TokenIssuer::new(
            &config.jwt_signing_key,
            chrono::Duration::minutes(config.access_token_expire_minutes),
        );

        Self {
            tokens,
            google,
            identity: IdentityResolver::new(db.clone()),
            observations: ObservationService::new(db.clone()),
            users: UserService::new(db.clone()),
            db,
            config,
        }
    }
}
