// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::patch::{apply, deserialize_some};
use crate::time_utils::rfc3339_seconds;

/// User profile stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Locally allocated id (also used as document ID)
    pub id: u64,
    /// Google account subject (`sub`), unique when present
    pub google_id: Option<String>,
    /// Email address, unique across all users
    pub email: String,
    /// Name from the Google profile, refreshed on every Google login
    pub google_name: Option<String>,
    /// Name assigned by an administrator
    pub display_name: Option<String>,
    /// Name chosen by the user in their settings
    pub formal_name: Option<String>,
    /// Profile picture URL from Google
    pub profile_picture: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
    /// Argon2 PHC string; only set for accounts with local password login
    pub password_hash: Option<String>,
    #[serde(with = "rfc3339_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "rfc3339_seconds::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Name shown next to this user's observations.
    ///
    /// Self-chosen formal name wins, then the admin-assigned name, then Google's.
    pub fn observer_name(&self) -> Option<String> {
        [&self.formal_name, &self.display_name, &self.google_name]
            .into_iter()
            .flatten()
            .find(|name| !name.is_empty())
            .cloned()
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Fields needed to create a user. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub google_id: Option<String>,
    pub email: String,
    pub google_name: Option<String>,
    pub display_name: Option<String>,
    pub profile_picture: Option<String>,
    pub is_admin: bool,
    pub password_hash: Option<String>,
}

impl NewUser {
    pub fn into_user(self, id: u64, now: DateTime<Utc>) -> User {
        User {
            id,
            google_id: self.google_id,
            email: self.email,
            google_name: self.google_name,
            display_name: self.display_name,
            formal_name: None,
            profile_picture: self.profile_picture,
            is_admin: self.is_admin,
            is_active: true,
            password_hash: self.password_hash,
            created_at: now,
            updated_at: None,
        }
    }
}

/// Administrator edit of a user record. Absent fields stay unchanged;
/// an explicit `null` display name clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    #[serde(default, deserialize_with = "deserialize_some")]
    pub display_name: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
}

impl UserPatch {
    /// True if applying this patch to `user` would strip their own access.
    pub fn demotes(&self) -> bool {
        self.is_active == Some(false) || self.is_admin == Some(false)
    }
}

impl From<UserPatch> for UserUpdate {
    fn from(patch: UserPatch) -> Self {
        Self {
            display_name: patch.display_name,
            is_active: patch.is_active,
            is_admin: patch.is_admin,
            ..Default::default()
        }
    }
}

/// Self-service settings update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserSettingsUpdate {
    /// New formal name. An empty string clears it.
    pub formal_name: Option<String>,
}

impl From<UserSettingsUpdate> for UserUpdate {
    fn from(settings: UserSettingsUpdate) -> Self {
        let formal_name = settings.formal_name.map(|name| {
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        });
        Self {
            formal_name,
            ..Default::default()
        }
    }
}

/// Field-scoped change to a stored user.
///
/// Stores apply it to the record as it exists at write time, so fields not
/// named here keep any concurrent change. Email, Google id and password hash
/// are not reachable through it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserUpdate {
    pub google_name: Option<Option<String>>,
    pub profile_picture: Option<Option<String>>,
    pub display_name: Option<Option<String>>,
    pub formal_name: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
}

impl UserUpdate {
    pub fn apply_to(&self, user: &mut User, now: DateTime<Utc>) {
        apply(&mut user.google_name, self.google_name.clone());
        apply(&mut user.profile_picture, self.profile_picture.clone());
        apply(&mut user.display_name, self.display_name.clone());
        apply(&mut user.formal_name, self.formal_name.clone());
        apply(&mut user.is_active, self.is_active);
        apply(&mut user.is_admin, self.is_admin);
        user.updated_at = Some(now);
    }

    /// Stored field names written by this update, `updated_at` included.
    pub fn field_paths(&self) -> Vec<&'static str> {
        [
            ("google_name", self.google_name.is_some()),
            ("profile_picture", self.profile_picture.is_some()),
            ("display_name", self.display_name.is_some()),
            ("formal_name", self.formal_name.is_some()),
            ("is_active", self.is_active.is_some()),
            ("is_admin", self.is_admin.is_some()),
            ("updated_at", true),
        ]
        .into_iter()
        .filter_map(|(path, written)| written.then_some(path))
        .collect()
    }
}

/// Full user view returned by the API. Never exposes the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub email: String,
    pub google_id: Option<String>,
    pub google_name: Option<String>,
    pub display_name: Option<String>,
    pub formal_name: Option<String>,
    pub profile_picture: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            google_id: user.google_id,
            google_name: user.google_name,
            display_name: user.display_name,
            formal_name: user.formal_name,
            profile_picture: user.profile_picture,
            is_admin: user.is_admin,
            is_active: user.is_active,
            created_at: crate::time_utils::format_utc_rfc3339(user.created_at),
            updated_at: user.updated_at.map(crate::time_utils::format_utc_rfc3339),
        }
    }
}

/// Compact user entry for admin listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserSummary {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub email: String,
    pub display_name: Option<String>,
    pub google_name: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            google_name: user.google_name,
            is_admin: user.is_admin,
            is_active: user.is_active,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_user(id: u64, is_admin: bool) -> User {
    User {
        id,
        google_id: Some(format!("google-{id}")),
        email: format!("user{id}@example.com"),
        google_name: Some(format!("Google User {id}")),
        display_name: None,
        formal_name: None,
        profile_picture: None,
        is_admin,
        is_active: true,
        password_hash: None,
        created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        updated_at: None,
    }
}
