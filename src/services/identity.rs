// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity resolution: turns a token subject, a Google identity or a local
//! admin login into a stored [`User`].

use std::sync::OnceLock;

use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};

use crate::config::Config;
use crate::db::Database;
use crate::error::AppError;
use crate::models::{NewUser, User, UserUpdate};

/// Reserved login name matching any admin account with a password.
pub const ADMIN_USERNAME: &str = "admin";

/// Lookups retried after losing a find-or-create race.
const MAX_RESOLVE_ATTEMPTS: usize = 3;

/// Identity asserted by Google after token verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Google subject (`sub`)
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Resolves callers against the user store.
#[derive(Clone)]
pub struct IdentityResolver {
    db: Database,
}

impl IdentityResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Look up the user named by a verified token subject.
    ///
    /// Does not check `is_active`; that is left to the access policy.
    pub async fn resolve_from_credential(&self, subject_id: u64) -> Result<User, AppError> {
        self.db
            .get_user(subject_id)
            .await?
            .ok_or(AppError::CallerNotFound)
    }

    /// Find the user for a Google identity, creating one on first login.
    ///
    /// Name and picture are refreshed from Google on every call. A first
    /// login whose verified email already belongs to an account without a
    /// Google id links to that account.
    pub async fn resolve_or_create_from_external_identity(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<User, AppError> {
        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            if let Some(user) = self.db.find_user_by_google_id(&identity.subject).await? {
                return self.refresh_profile(user, identity).await;
            }

            let result = match self.db.find_user_by_email(&identity.email).await? {
                // Created concurrently since the lookup above.
                Some(user) if user.google_id.as_deref() == Some(identity.subject.as_str()) => {
                    Ok(user)
                }
                Some(user) if user.google_id.is_some() => {
                    tracing::warn!(
                        user_id = user.id,
                        "Email already linked to a different Google account"
                    );
                    return Err(AppError::Conflict(
                        "email is registered to a different Google account".to_string(),
                    ));
                }
                Some(user) => {
                    tracing::info!(user_id = user.id, "Linking Google account to existing user");
                    self.db.link_google_id(&user, &identity.subject).await
                }
                None => {
                    self.db
                        .create_user(NewUser {
                            google_id: Some(identity.subject.clone()),
                            email: identity.email.clone(),
                            google_name: identity.name.clone(),
                            display_name: None,
                            profile_picture: identity.picture.clone(),
                            is_admin: false,
                            password_hash: None,
                        })
                        .await
                }
            };

            match result {
                Ok(user) => return self.refresh_profile(user, identity).await,
                Err(AppError::Conflict(msg)) => {
                    // Lost a race with a concurrent first login; look again.
                    tracing::debug!(attempt, reason = %msg, "Find-or-create conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Database(
            "Could not resolve external identity after repeated conflicts".to_string(),
        ))
    }

    /// Write Google's name and picture without touching any other field.
    async fn refresh_profile(
        &self,
        user: User,
        identity: &ExternalIdentity,
    ) -> Result<User, AppError> {
        if user.google_name == identity.name && user.profile_picture == identity.picture {
            return Ok(user);
        }

        let update = UserUpdate {
            google_name: Some(identity.name.clone()),
            profile_picture: Some(identity.picture.clone()),
            ..Default::default()
        };
        let user = self.db.update_user(user.id, &update).await?;

        tracing::debug!(user_id = user.id, "Refreshed Google profile");
        Ok(user)
    }

    /// Authenticate a local admin login.
    ///
    /// `username` is either the reserved literal `admin`, matching the
    /// lowest-id admin with a password, or an admin's email or display name.
    /// An email match takes precedence over a display name match. The
    /// inactive check happens only after the password verifies.
    pub async fn resolve_local_admin(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, AppError> {
        let candidate = self.find_admin_candidate(username).await?;

        let stored_hash = candidate
            .as_ref()
            .and_then(|user| user.password_hash.clone())
            .unwrap_or_else(|| dummy_hash().to_string());

        let verified = verify_password(password.to_string(), stored_hash).await?;

        let user = match candidate {
            Some(user) if verified => user,
            _ => {
                tracing::warn!(username, "Admin login failed");
                return Err(AppError::InvalidCredentials);
            }
        };

        if !user.is_active {
            tracing::warn!(user_id = user.id, "Admin login for inactive account");
            return Err(AppError::AccountInactive);
        }

        tracing::info!(user_id = user.id, "Admin logged in");
        Ok(user)
    }

    async fn find_admin_candidate(&self, username: &str) -> Result<Option<User>, AppError> {
        let mut admins = self.db.list_password_admins().await?;

        if username == ADMIN_USERNAME {
            return Ok(admins.into_iter().next());
        }

        let by_email = admins.iter().position(|user| user.email == username);
        let index = by_email.or_else(|| {
            admins
                .iter()
                .position(|user| user.display_name.as_deref() == Some(username))
        });
        Ok(index.map(|i| admins.swap_remove(i)))
    }

    /// Create the bootstrap admin if no admin with a password exists.
    ///
    /// Returns the new user, or `None` if an admin was already present.
    pub async fn ensure_default_admin(&self, config: &Config) -> Result<Option<User>, AppError> {
        if !self.db.list_password_admins().await?.is_empty() {
            tracing::info!("Admin user already exists");
            return Ok(None);
        }

        let password_hash = hash_password(&config.default_admin_password)?;
        let user = self
            .db
            .create_user(NewUser {
                google_id: None,
                email: config.default_admin_email.clone(),
                google_name: Some("Administrator".to_string()),
                display_name: Some("Administrator".to_string()),
                profile_picture: None,
                is_admin: true,
                password_hash: Some(password_hash),
            })
            .await?;

        if config.uses_default_admin_password() {
            tracing::warn!(
                email = %user.email,
                "Default admin created with the default password; change it"
            );
        } else {
            tracing::info!(email = %user.email, "Default admin created");
        }

        Ok(Some(user))
    }
}

/// Hash a password as an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut rand_core::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))
}

/// Verify off the async runtime; Argon2 is deliberately slow.
async fn verify_password(password: String, stored_hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || match PasswordHash::new(&stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is malformed");
            false
        }
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Password verification task failed: {}", e)))
}

/// Hash checked when no account matched, so failures cost the same.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| {
        let salt = SaltString::generate(&mut rand_core::OsRng);
        Argon2::default()
            .hash_password(b"weather-logger-dummy", &salt)
            .map(|hash| hash.to_string())
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(subject: &str, email: &str, name: &str) -> ExternalIdentity {
        ExternalIdentity {
            subject: subject.to_string(),
            email: email.to_string(),
            name: Some(name.to_string()),
            picture: None,
        }
    }

    async fn seed_admin(
        db: &Database,
        email: &str,
        password: &str,
        is_active: bool,
    ) -> User {
        let user = db
            .create_user(NewUser {
                google_id: None,
                email: email.to_string(),
                google_name: None,
                display_name: Some(format!("Admin {email}")),
                profile_picture: None,
                is_admin: true,
                password_hash: Some(hash_password(password).unwrap()),
            })
            .await
            .unwrap();
        if is_active {
            return user;
        }
        db.update_user(
            user.id,
            &UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_subject_is_caller_not_found() {
        let resolver = IdentityResolver::new(Database::in_memory());
        assert!(matches!(
            resolver.resolve_from_credential(99).await,
            Err(AppError::CallerNotFound)
        ));
    }

    #[tokio::test]
    async fn test_inactive_user_still_resolves_from_credential() {
        let db = Database::in_memory();
        let admin = seed_admin(&db, "a@example.com", "pw", false).await;
        let resolver = IdentityResolver::new(db);

        let user = resolver.resolve_from_credential(admin.id).await.unwrap();
        assert!(!user.is_active);
    }

    #[tokio::test]
    async fn test_external_identity_is_idempotent_and_last_name_wins() {
        let db = Database::in_memory();
        let resolver = IdentityResolver::new(db.clone());

        let first = resolver
            .resolve_or_create_from_external_identity(&identity("g-1", "o@example.com", "Old"))
            .await
            .unwrap();
        assert!(!first.is_admin);
        assert!(first.is_active);
        assert!(!first.has_password());

        let second = resolver
            .resolve_or_create_from_external_identity(&identity("g-1", "o@example.com", "New"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.google_name.as_deref(), Some("New"));
        assert_eq!(db.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_keeps_assigned_names() {
        let db = Database::in_memory();
        let resolver = IdentityResolver::new(db.clone());

        let user = resolver
            .resolve_or_create_from_external_identity(&identity("g-1", "o@example.com", "Old"))
            .await
            .unwrap();
        db.update_user(
            user.id,
            &UserUpdate {
                formal_name: Some(Some("Dr. Observer".to_string())),
                display_name: Some(Some("Station 4".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let refreshed = resolver
            .resolve_or_create_from_external_identity(&identity("g-1", "o@example.com", "New"))
            .await
            .unwrap();

        assert_eq!(refreshed.formal_name.as_deref(), Some("Dr. Observer"));
        assert_eq!(refreshed.display_name.as_deref(), Some("Station 4"));
    }

    #[tokio::test]
    async fn test_stale_login_refresh_keeps_deactivation() {
        let db = Database::in_memory();
        let resolver = IdentityResolver::new(db.clone());
        let user = resolver
            .resolve_or_create_from_external_identity(&identity("g-1", "o@example.com", "Old"))
            .await
            .unwrap();

        // Login looked the user up, then an admin deactivated them
        let snapshot = db.find_user_by_google_id("g-1").await.unwrap().unwrap();
        db.update_user(
            user.id,
            &UserUpdate {
                is_active: Some(false),
                is_admin: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let refreshed = resolver
            .refresh_profile(snapshot, &identity("g-1", "o@example.com", "New"))
            .await
            .unwrap();

        assert_eq!(refreshed.google_name.as_deref(), Some("New"));
        let stored = db.get_user(user.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(stored.is_admin);
        assert_eq!(stored.google_name.as_deref(), Some("New"));
    }

    #[tokio::test]
    async fn test_concurrent_first_logins_create_one_user() {
        let db = Database::in_memory();
        let resolver = IdentityResolver::new(db.clone());

        let mut handles = Vec::new();
        for i in 0..8 {
            let resolver = resolver.clone();
            handles.push(tokio::spawn(async move {
                resolver
                    .resolve_or_create_from_external_identity(&identity(
                        "g-race",
                        "race@example.com",
                        &format!("Name {i}"),
                    ))
                    .await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(db.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_google_login_links_existing_email() {
        let db = Database::in_memory();
        let admin = seed_admin(&db, "boss@example.com", "pw", true).await;
        let resolver = IdentityResolver::new(db.clone());

        let user = resolver
            .resolve_or_create_from_external_identity(&identity("g-boss", "boss@example.com", "B"))
            .await
            .unwrap();

        assert_eq!(user.id, admin.id);
        assert_eq!(user.google_id.as_deref(), Some("g-boss"));
        assert!(user.is_admin);
    }

    #[tokio::test]
    async fn test_google_login_with_email_of_other_google_account_conflicts() {
        let db = Database::in_memory();
        let resolver = IdentityResolver::new(db);

        resolver
            .resolve_or_create_from_external_identity(&identity("g-1", "o@example.com", "A"))
            .await
            .unwrap();
        let err = resolver
            .resolve_or_create_from_external_identity(&identity("g-2", "o@example.com", "B"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_local_admin_login() {
        let db = Database::in_memory();
        let admin = seed_admin(&db, "boss@example.com", "admin", true).await;
        let resolver = IdentityResolver::new(db);

        let by_literal = resolver.resolve_local_admin("admin", "admin").await.unwrap();
        assert_eq!(by_literal.id, admin.id);

        let by_email = resolver
            .resolve_local_admin("boss@example.com", "admin")
            .await
            .unwrap();
        assert_eq!(by_email.id, admin.id);

        let by_name = resolver
            .resolve_local_admin("Admin boss@example.com", "admin")
            .await
            .unwrap();
        assert_eq!(by_name.id, admin.id);
    }

    #[tokio::test]
    async fn test_local_admin_name_cannot_shadow_email() {
        let db = Database::in_memory();
        let first = seed_admin(&db, "first@example.com", "one", true).await;
        let second = seed_admin(&db, "second@example.com", "two", true).await;
        db.update_user(
            first.id,
            &UserUpdate {
                formal_name: Some(Some("second@example.com".to_string())),
                display_name: Some(Some("second@example.com".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let resolver = IdentityResolver::new(db);

        let user = resolver
            .resolve_local_admin("second@example.com", "two")
            .await
            .unwrap();
        assert_eq!(user.id, second.id);
    }

    #[tokio::test]
    async fn test_local_admin_formal_name_is_not_a_username() {
        let db = Database::in_memory();
        let admin = seed_admin(&db, "boss@example.com", "pw", true).await;
        db.update_user(
            admin.id,
            &UserUpdate {
                formal_name: Some(Some("Dr. Boss".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let resolver = IdentityResolver::new(db);

        assert!(matches!(
            resolver.resolve_local_admin("Dr. Boss", "pw").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_local_admin_wrong_password_or_no_admin() {
        let db = Database::in_memory();
        let resolver = IdentityResolver::new(db.clone());

        assert!(matches!(
            resolver.resolve_local_admin("admin", "admin").await,
            Err(AppError::InvalidCredentials)
        ));

        seed_admin(&db, "boss@example.com", "admin", true).await;
        assert!(matches!(
            resolver.resolve_local_admin("admin", "wrong").await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            resolver.resolve_local_admin("BOSS@example.com", "admin").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_local_admin_literal_picks_lowest_id() {
        let db = Database::in_memory();
        let first = seed_admin(&db, "first@example.com", "one", true).await;
        seed_admin(&db, "second@example.com", "two", true).await;
        let resolver = IdentityResolver::new(db);

        let user = resolver.resolve_local_admin("admin", "one").await.unwrap();
        assert_eq!(user.id, first.id);
        assert!(matches!(
            resolver.resolve_local_admin("admin", "two").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_inactive_admin_checked_after_password() {
        let db = Database::in_memory();
        seed_admin(&db, "gone@example.com", "pw", false).await;
        let resolver = IdentityResolver::new(db);

        assert!(matches!(
            resolver.resolve_local_admin("gone@example.com", "bad").await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            resolver.resolve_local_admin("gone@example.com", "pw").await,
            Err(AppError::AccountInactive)
        ));
    }

    #[tokio::test]
    async fn test_ensure_default_admin_runs_once() {
        let db = Database::in_memory();
        let resolver = IdentityResolver::new(db.clone());
        let config = Config::test_default();

        let created = resolver.ensure_default_admin(&config).await.unwrap();
        assert!(created.is_some());
        assert!(resolver
            .ensure_default_admin(&config)
            .await
            .unwrap()
            .is_none());

        let admin = resolver
            .resolve_local_admin("admin", &config.default_admin_password)
            .await
            .unwrap();
        assert_eq!(admin.email, config.default_admin_email);
        assert_eq!(admin.display_name.as_deref(), Some("Administrator"));
    }
}
