// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod google;
pub mod identity;
pub mod observations;
pub mod tokens;
pub mod users;

pub use google::{GoogleVerifier, OidcError};
pub use identity::{ExternalIdentity, IdentityResolver};
pub use observations::{ObservationFilter, ObservationService};
pub use tokens::TokenIssuer;
pub use users::UserService;
