// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! [`Database`] fronts two backends with identical semantics: Firestore for
//! deployments and an in-process store for tests and local development.
//! Both enforce the unique constraints on user email and Google id and report
//! violations as [`AppError::Conflict`].

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use memory::MemoryDb;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{NewUser, Observation, Readings, User, UserUpdate};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const OBSERVATIONS: &str = "observations";
    /// Unique index: Google subject -> user id
    pub const USER_GOOGLE_IDS: &str = "user_google_ids";
    /// Unique index: email -> user id
    pub const USER_EMAILS: &str = "user_emails";
    /// Id allocation counters
    pub const COUNTERS: &str = "counters";
}

/// Filtered range scan over observations, newest first.
#[derive(Debug, Clone, Default)]
pub struct ObservationQuery {
    pub observer_id: Option<u64>,
    /// Inclusive lower bound on observation time
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on observation time
    pub end: Option<DateTime<Utc>>,
    pub skip: u32,
    pub limit: Option<u32>,
}

/// Storage handle shared by all requests.
#[derive(Clone)]
pub enum Database {
    Firestore(FirestoreDb),
    Memory(MemoryDb),
}

macro_rules! dispatch {
    ($self:ident, $db:ident => $call:expr) => {
        match $self {
            Database::Firestore($db) => $call,
            Database::Memory($db) => $call,
        }
    };
}

impl Database {
    /// Connect to Firestore if a project is configured, otherwise use memory.
    pub async fn connect(project_id: Option<&str>) -> Result<Self, AppError> {
        match project_id {
            Some(project_id) => Ok(Self::Firestore(FirestoreDb::new(project_id).await?)),
            None => {
                tracing::warn!("No GCP project configured, using in-memory store");
                Ok(Self::in_memory())
            }
        }
    }

    /// Fresh, empty in-process store.
    pub fn in_memory() -> Self {
        Self::Memory(MemoryDb::default())
    }

    // ─── User Operations ─────────────────────────────────────────

    pub async fn get_user(&self, id: u64) -> Result<Option<User>, AppError> {
        dispatch!(self, db => db.get_user(id).await)
    }

    pub async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, AppError> {
        dispatch!(self, db => db.find_user_by_google_id(google_id).await)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        dispatch!(self, db => db.find_user_by_email(email).await)
    }

    /// Admin accounts with a password hash, ordered by id ascending.
    pub async fn list_password_admins(&self) -> Result<Vec<User>, AppError> {
        let mut admins = dispatch!(self, db => db.list_admins().await)?;
        admins.retain(User::has_password);
        admins.sort_by_key(|user| user.id);
        Ok(admins)
    }

    /// All users, newest first.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        dispatch!(self, db => db.list_users().await)
    }

    /// Insert a user, allocating its id.
    ///
    /// Fails with [`AppError::Conflict`] if the email or Google id is taken.
    pub async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        dispatch!(self, db => db.create_user(new_user).await)
    }

    /// Attach a Google identity to an existing account that has none.
    pub async fn link_google_id(&self, user: &User, google_id: &str) -> Result<User, AppError> {
        dispatch!(self, db => db.link_google_id(user, google_id).await)
    }

    /// Atomically apply a field-scoped change and return the stored result.
    ///
    /// Only the fields named in `update` are written, so concurrent changes
    /// to other fields are never overwritten.
    pub async fn update_user(&self, id: u64, update: &UserUpdate) -> Result<User, AppError> {
        dispatch!(self, db => db.update_user(id, update).await)
    }

    // ─── Observation Operations ──────────────────────────────────

    pub async fn create_observation(
        &self,
        observer_id: u64,
        readings: Readings,
    ) -> Result<Observation, AppError> {
        dispatch!(self, db => db.create_observation(observer_id, readings).await)
    }

    pub async fn get_observation(&self, id: u64) -> Result<Option<Observation>, AppError> {
        dispatch!(self, db => db.get_observation(id).await)
    }

    /// Atomically change an existing observation.
    ///
    /// `change` sees the record as stored and may reject it; it can run more
    /// than once under contention. Fails with [`AppError::NotFound`] if the
    /// observation is gone, including when it is deleted concurrently.
    pub async fn update_observation<F>(&self, id: u64, change: F) -> Result<Observation, AppError>
    where
        F: Fn(&mut Observation) -> Result<(), AppError> + Send,
    {
        dispatch!(self, db => db.update_observation(id, change).await)
    }

    /// Permanently delete an observation. Returns `false` if it did not exist.
    pub async fn delete_observation(&self, id: u64) -> Result<bool, AppError> {
        dispatch!(self, db => db.delete_observation(id).await)
    }

    pub async fn query_observations(
        &self,
        query: &ObservationQuery,
    ) -> Result<Vec<Observation>, AppError> {
        dispatch!(self, db => db.query_observations(query).await)
    }
}
