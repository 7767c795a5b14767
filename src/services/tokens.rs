// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session token issuance and verification (HS256 JWT).
//!
//! Tokens are stateless: validity is the signature plus the `exp` claim.
//! There is no revocation list; rotating the signing key invalidates every
//! outstanding token.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Signs and verifies session tokens with a process-wide secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(signing_key: &[u8], lifetime: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(signing_key),
            decoding_key: DecodingKey::from_secret(signing_key),
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Issue a token for `subject_id` expiring one lifetime from now.
    pub fn issue(&self, subject_id: u64) -> Result<String, AppError> {
        self.issue_at(subject_id, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(&self, subject_id: u64, now: DateTime<Utc>) -> Result<String, AppError> {
        let expires = now.checked_add_signed(self.lifetime).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Token lifetime overflows the expiry time"))
        })?;
        let claims = Claims {
            sub: subject_id.to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
    }

    /// Verify a token and return its subject id.
    ///
    /// A well-signed token past its expiry is `ExpiredCredential`; every
    /// other failure is `InvalidCredential`.
    pub fn verify(&self, token: &str) -> Result<u64, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::ExpiredCredential,
                _ => {
                    tracing::debug!(error = %e, "Token rejected");
                    AppError::InvalidCredential
                }
            }
        })?;

        data.claims
            .sub
            .parse()
            .map_err(|_| AppError::InvalidCredential)
    }
}
