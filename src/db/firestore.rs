// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile storage, keyed by numeric id)
//! - Unique indexes on user email and Google id
//! - Observations (keyed by numeric id)
//!
//! Firestore has no unique constraints or auto-increment ids. Both are built
//! from documents written with an `Exists(false)` precondition inside a
//! transaction: if any precondition fails the whole commit is rejected.

use serde::{Deserialize, Serialize};

use crate::db::{collections, ObservationQuery};
use crate::error::AppError;
use crate::models::{NewUser, Observation, Readings, User, UserUpdate};
use crate::time_utils::{format_utc_rfc3339, truncate_to_seconds};

/// Attempts at allocating an id before giving up under contention.
const MAX_ALLOCATION_ATTEMPTS: usize = 5;

/// Attempts at a contended read-modify-write.
const MAX_WRITE_ATTEMPTS: usize = 5;

const OBSERVATION_TIME_FIELD: &str = "readings.observation_time";

/// Last allocated id for a collection.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Counter {
    value: u64,
}

/// Unique index entry pointing at a user document.
#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    user_id: u64,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client. All operations fail with a database error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    pub async fn get_user(&self, id: u64) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    pub async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, AppError> {
        match self.get_index(collections::USER_GOOGLE_IDS, google_id).await? {
            Some(entry) => self.get_user(entry.user_id).await,
            None => Ok(None),
        }
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        match self.get_index(collections::USER_EMAILS, email).await? {
            Some(entry) => self.get_user(entry.user_id).await,
            None => Ok(None),
        }
    }

    pub async fn list_admins(&self) -> Result<Vec<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| q.for_all([q.field("is_admin").eq(true)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .order_by([
                ("created_at", firestore::FirestoreQueryDirection::Descending),
                ("id", firestore::FirestoreQueryDirection::Descending),
            ])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    pub async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            self.check_user_unique(&new_user).await?;

            let id = self.next_id(collections::USERS).await?;
            let user = new_user.clone().into_user(id, chrono::Utc::now());

            let client = self.get_client()?;
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            self.add_create(&mut transaction, collections::USERS, &id.to_string(), &user)?;
            self.add_create(
                &mut transaction,
                collections::USER_EMAILS,
                &urlencoding::encode(&user.email),
                &IndexEntry { user_id: id },
            )?;
            if let Some(google_id) = &user.google_id {
                self.add_create(
                    &mut transaction,
                    collections::USER_GOOGLE_IDS,
                    &urlencoding::encode(google_id),
                    &IndexEntry { user_id: id },
                )?;
            }
            self.add_counter(&mut transaction, collections::USERS, id)?;

            match transaction.commit().await {
                Ok(_) => {
                    tracing::info!(user_id = id, "User created");
                    return Ok(user);
                }
                Err(e) => {
                    // A unique index taken in the meantime is a conflict;
                    // anything else is treated as an id race and retried.
                    self.check_user_unique(&new_user).await?;
                    tracing::debug!(attempt, error = %e, "User insert lost id race, retrying");
                }
            }
        }

        Err(AppError::Database(
            "Failed to allocate user id under contention".to_string(),
        ))
    }

    pub async fn link_google_id(&self, user: &User, google_id: &str) -> Result<User, AppError> {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let Some(mut linked) = self
            .read_in_transaction::<User>(&transaction, collections::USERS, user.id)
            .await?
        else {
            let _ = transaction.rollback().await;
            return Err(AppError::NotFound(format!("User {} not found", user.id)));
        };
        if linked.google_id.is_some() {
            let _ = transaction.rollback().await;
            return Err(AppError::Conflict(format!(
                "user {} is already linked to a Google account",
                user.id
            )));
        }
        linked.google_id = Some(google_id.to_string());

        self.add_create(
            &mut transaction,
            collections::USER_GOOGLE_IDS,
            &urlencoding::encode(google_id),
            &IndexEntry { user_id: user.id },
        )?;
        self.add_field_update(
            &mut transaction,
            collections::USERS,
            user.id,
            ["google_id"],
            &linked,
        )?;

        transaction.commit().await.map_err(|e| {
            tracing::debug!(user_id = user.id, error = %e, "Google id link rejected");
            AppError::Conflict("Google account already registered".to_string())
        })?;

        Ok(linked)
    }

    /// Apply a field-scoped change to the user as stored at commit time.
    pub async fn update_user(&self, id: u64, update: &UserUpdate) -> Result<User, AppError> {
        let paths = update.field_paths();

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let client = self.get_client()?;
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            let Some(mut user) = self
                .read_in_transaction::<User>(&transaction, collections::USERS, id)
                .await?
            else {
                let _ = transaction.rollback().await;
                return Err(AppError::NotFound(format!("User {} not found", id)));
            };

            update.apply_to(&mut user, truncate_to_seconds(chrono::Utc::now()));
            self.add_field_update(
                &mut transaction,
                collections::USERS,
                id,
                paths.iter().copied(),
                &user,
            )?;

            match transaction.commit().await {
                Ok(_) => return Ok(user),
                Err(e) => {
                    tracing::debug!(attempt, user_id = id, error = %e, "User update contended, retrying");
                }
            }
        }

        Err(AppError::Database(format!(
            "Failed to update user {} under contention",
            id
        )))
    }

    // ─── Observation Operations ──────────────────────────────────

    pub async fn create_observation(
        &self,
        observer_id: u64,
        readings: Readings,
    ) -> Result<Observation, AppError> {
        if self.get_user(observer_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", observer_id)));
        }

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let id = self.next_id(collections::OBSERVATIONS).await?;
            let observation = Observation {
                id,
                observer_id,
                readings: readings.clone(),
                created_at: chrono::Utc::now(),
                updated_at: None,
            };

            let client = self.get_client()?;
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            self.add_create(
                &mut transaction,
                collections::OBSERVATIONS,
                &id.to_string(),
                &observation,
            )?;
            self.add_counter(&mut transaction, collections::OBSERVATIONS, id)?;

            match transaction.commit().await {
                Ok(_) => return Ok(observation),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "Observation insert lost id race, retrying");
                }
            }
        }

        Err(AppError::Database(
            "Failed to allocate observation id under contention".to_string(),
        ))
    }

    pub async fn get_observation(&self, id: u64) -> Result<Option<Observation>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::OBSERVATIONS)
            .obj()
            .one(&id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Read-modify-write of one observation inside a transaction.
    ///
    /// `change` may run more than once if the commit is contended. The write
    /// requires the document to still exist, so an update racing a delete
    /// cannot bring the observation back.
    pub async fn update_observation<F>(&self, id: u64, change: F) -> Result<Observation, AppError>
    where
        F: Fn(&mut Observation) -> Result<(), AppError> + Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let client = self.get_client()?;
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            let Some(mut observation) = self
                .read_in_transaction::<Observation>(&transaction, collections::OBSERVATIONS, id)
                .await?
            else {
                let _ = transaction.rollback().await;
                return Err(AppError::NotFound(format!("Observation {} not found", id)));
            };

            if let Err(e) = change(&mut observation) {
                let _ = transaction.rollback().await;
                return Err(e);
            }
            self.add_field_update(
                &mut transaction,
                collections::OBSERVATIONS,
                id,
                ["readings", "updated_at"],
                &observation,
            )?;

            match transaction.commit().await {
                Ok(_) => return Ok(observation),
                Err(e) => {
                    // Deleted since the read: the precondition failed.
                    if self.get_observation(id).await?.is_none() {
                        return Err(AppError::NotFound(format!("Observation {} not found", id)));
                    }
                    tracing::debug!(attempt, observation_id = id, error = %e, "Observation update contended, retrying");
                }
            }
        }

        Err(AppError::Database(format!(
            "Failed to update observation {} under contention",
            id
        )))
    }

    pub async fn delete_observation(&self, id: u64) -> Result<bool, AppError> {
        if self.get_observation(id).await?.is_none() {
            return Ok(false);
        }

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::OBSERVATIONS)
            .document_id(id.to_string())
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(true)
    }

    /// Range scan over observations, newest first.
    ///
    /// Times are stored as fixed-width RFC 3339 strings, so string bounds
    /// give chronological filtering.
    pub async fn query_observations(
        &self,
        query: &ObservationQuery,
    ) -> Result<Vec<Observation>, AppError> {
        let observer_id = query.observer_id;
        let start = query.start.map(format_utc_rfc3339);
        let end = query.end.map(format_utc_rfc3339);

        let mut select = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::OBSERVATIONS)
            .filter(move |q| {
                q.for_all([
                    observer_id.and_then(|id| q.field("observer_id").eq(id)),
                    start
                        .clone()
                        .and_then(|s| q.field(OBSERVATION_TIME_FIELD).greater_than_or_equal(s)),
                    end.clone()
                        .and_then(|e| q.field(OBSERVATION_TIME_FIELD).less_than_or_equal(e)),
                ])
            })
            .order_by([
                (
                    OBSERVATION_TIME_FIELD,
                    firestore::FirestoreQueryDirection::Descending,
                ),
                ("id", firestore::FirestoreQueryDirection::Descending),
            ])
            .offset(query.skip);

        if let Some(limit) = query.limit {
            select = select.limit(limit);
        }

        select
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Helper Methods ────────────────────────────────────────────

    async fn get_index(&self, collection: &str, key: &str) -> Result<Option<IndexEntry>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(urlencoding::encode(key).as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Fail with a conflict if the email or Google id is already indexed.
    async fn check_user_unique(&self, new_user: &NewUser) -> Result<(), AppError> {
        if self
            .get_index(collections::USER_EMAILS, &new_user.email)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "email {} already registered",
                new_user.email
            )));
        }
        if let Some(google_id) = &new_user.google_id {
            if self
                .get_index(collections::USER_GOOGLE_IDS, google_id)
                .await?
                .is_some()
            {
                return Err(AppError::Conflict(
                    "Google account already registered".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Candidate id for the next document in `collection`.
    ///
    /// Not reserved: the insert must carry an `Exists(false)` precondition
    /// on the new document so a concurrent allocation fails the commit.
    async fn next_id(&self, collection: &str) -> Result<u64, AppError> {
        let counter: Option<Counter> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::COUNTERS)
            .obj()
            .one(collection)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(counter.unwrap_or_default().value + 1)
    }

    /// Read a document through the transaction so a concurrent write to it
    /// fails the commit.
    async fn read_in_transaction<T>(
        &self,
        transaction: &firestore::FirestoreTransaction<'_>,
        collection: &str,
        id: u64,
    ) -> Result<Option<T>, AppError>
    where
        for<'de> T: Deserialize<'de> + Send,
    {
        self.get_client()?
            .clone_with_consistency_selector(firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ))
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(&id.to_string())
            .await
            .map_err(|e| AppError::Database(format!("Failed to read in transaction: {}", e)))
    }

    /// Add a write of only `paths` from `object` to an existing document.
    fn add_field_update<T, P>(
        &self,
        transaction: &mut firestore::FirestoreTransaction<'_>,
        collection: &str,
        id: u64,
        paths: P,
        object: &T,
    ) -> Result<(), AppError>
    where
        T: Serialize + Sync + Send,
        for<'de> T: Deserialize<'de>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        self.get_client()?
            .fluent()
            .update()
            .fields(paths)
            .in_col(collection)
            .precondition(firestore::FirestoreWritePrecondition::Exists(true))
            .document_id(id.to_string())
            .object(object)
            .add_to_transaction(transaction)
            .map_err(|e| {
                AppError::Database(format!(
                    "Failed to add {} update to transaction: {}",
                    collection, e
                ))
            })?;
        Ok(())
    }

    /// Add a create-only write of `object` to the transaction.
    fn add_create<T>(
        &self,
        transaction: &mut firestore::FirestoreTransaction<'_>,
        collection: &str,
        document_id: &str,
        object: &T,
    ) -> Result<(), AppError>
    where
        T: Serialize + Sync + Send,
        for<'de> T: Deserialize<'de>,
    {
        self.get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .precondition(firestore::FirestoreWritePrecondition::Exists(false))
            .document_id(document_id)
            .object(object)
            .add_to_transaction(transaction)
            .map_err(|e| {
                AppError::Database(format!(
                    "Failed to add {} write to transaction: {}",
                    collection, e
                ))
            })?;
        Ok(())
    }

    fn add_counter(
        &self,
        transaction: &mut firestore::FirestoreTransaction<'_>,
        collection: &str,
        value: u64,
    ) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::COUNTERS)
            .document_id(collection)
            .object(&Counter { value })
            .add_to_transaction(transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add counter to transaction: {}", e))
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_client_reports_database_error() {
        let db = FirestoreDb::new_mock();

        let err = db.get_user(1).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[test]
    fn test_counter_defaults_to_zero() {
        assert_eq!(Counter::default().value, 0);
    }
}
