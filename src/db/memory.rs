// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store used for tests and local development.
//!
//! All tables live behind one lock, so each operation is atomic.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::db::ObservationQuery;
use crate::error::AppError;
use crate::models::{NewUser, Observation, Readings, User, UserUpdate};
use crate::time_utils::truncate_to_seconds;

#[derive(Default)]
struct Tables {
    users: BTreeMap<u64, User>,
    google_ids: HashMap<String, u64>,
    emails: HashMap<String, u64>,
    observations: BTreeMap<u64, Observation>,
    last_user_id: u64,
    last_observation_id: u64,
}

/// In-memory database.
#[derive(Clone, Default)]
pub struct MemoryDb {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryDb {
    // ─── User Operations ─────────────────────────────────────────

    pub async fn get_user(&self, id: u64) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    pub async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .google_ids
            .get(google_id)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .emails
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    pub async fn list_admins(&self) -> Result<Vec<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|user| user.is_admin)
            .cloned()
            .collect())
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(users)
    }

    pub async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;

        if tables.emails.contains_key(&new_user.email) {
            return Err(AppError::Conflict(format!(
                "email {} already registered",
                new_user.email
            )));
        }
        if let Some(google_id) = &new_user.google_id {
            if tables.google_ids.contains_key(google_id) {
                return Err(AppError::Conflict(
                    "Google account already registered".to_string(),
                ));
            }
        }

        tables.last_user_id += 1;
        let user = new_user.into_user(tables.last_user_id, chrono::Utc::now());

        tables.emails.insert(user.email.clone(), user.id);
        if let Some(google_id) = &user.google_id {
            tables.google_ids.insert(google_id.clone(), user.id);
        }
        tables.users.insert(user.id, user.clone());

        Ok(user)
    }

    pub async fn link_google_id(&self, user: &User, google_id: &str) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;

        if tables.google_ids.contains_key(google_id) {
            return Err(AppError::Conflict(
                "Google account already registered".to_string(),
            ));
        }

        let stored = tables
            .users
            .get_mut(&user.id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.id)))?;
        if stored.google_id.is_some() {
            return Err(AppError::Conflict(format!(
                "user {} is already linked to a Google account",
                user.id
            )));
        }

        stored.google_id = Some(google_id.to_string());
        let linked = stored.clone();
        tables.google_ids.insert(google_id.to_string(), user.id);

        Ok(linked)
    }

    pub async fn update_user(&self, id: u64, update: &UserUpdate) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        update.apply_to(stored, truncate_to_seconds(chrono::Utc::now()));
        Ok(stored.clone())
    }

    // ─── Observation Operations ──────────────────────────────────

    pub async fn create_observation(
        &self,
        observer_id: u64,
        readings: Readings,
    ) -> Result<Observation, AppError> {
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&observer_id) {
            return Err(AppError::NotFound(format!("User {} not found", observer_id)));
        }

        tables.last_observation_id += 1;
        let observation = Observation {
            id: tables.last_observation_id,
            observer_id,
            readings,
            created_at: chrono::Utc::now(),
            updated_at: None,
        };
        tables
            .observations
            .insert(observation.id, observation.clone());

        Ok(observation)
    }

    pub async fn get_observation(&self, id: u64) -> Result<Option<Observation>, AppError> {
        Ok(self.tables.read().await.observations.get(&id).cloned())
    }

    pub async fn update_observation<F>(&self, id: u64, change: F) -> Result<Observation, AppError>
    where
        F: Fn(&mut Observation) -> Result<(), AppError> + Send,
    {
        let mut tables = self.tables.write().await;
        let stored = tables
            .observations
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Observation {} not found", id)))?;

        // Work on a copy so a rejected change leaves the record untouched.
        let mut updated = stored.clone();
        change(&mut updated)?;
        *stored = updated.clone();
        Ok(updated)
    }

    pub async fn delete_observation(&self, id: u64) -> Result<bool, AppError> {
        Ok(self.tables.write().await.observations.remove(&id).is_some())
    }

    pub async fn query_observations(
        &self,
        query: &ObservationQuery,
    ) -> Result<Vec<Observation>, AppError> {
        let tables = self.tables.read().await;

        let mut matches: Vec<&Observation> = tables
            .observations
            .values()
            .filter(|o| query.observer_id.is_none_or(|id| o.observer_id == id))
            .filter(|o| {
                query
                    .start
                    .is_none_or(|start| o.readings.observation_time >= start)
            })
            .filter(|o| query.end.is_none_or(|end| o.readings.observation_time <= end))
            .collect();

        matches.sort_by(|a, b| {
            b.readings
                .observation_time
                .cmp(&a.readings.observation_time)
                .then(b.id.cmp(&a.id))
        });

        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(matches
            .into_iter()
            .skip(query.skip as usize)
            .take(limit)
            .cloned()
            .collect())
    }
}
