// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User resource operations: own profile, settings and admin management.

use crate::db::Database;
use crate::error::AppError;
use crate::models::{User, UserPatch, UserResponse, UserSettingsUpdate, UserSummary, UserUpdate};
use crate::policy::{authorize, Action, AuthenticatedCaller};

#[derive(Clone)]
pub struct UserService {
    db: Database,
}

impl UserService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn me(&self, caller: &AuthenticatedCaller) -> Result<UserResponse, AppError> {
        crate::policy::check_caller(Some(caller))?;
        Ok(self.load(caller.id).await?.into())
    }

    /// Set or clear the caller's own formal name.
    pub async fn update_settings(
        &self,
        caller: &AuthenticatedCaller,
        update: UserSettingsUpdate,
    ) -> Result<UserResponse, AppError> {
        authorize(Some(caller), Action::UpdateOwnSettings)?;

        let user = self.apply(caller.id, &update.into()).await?;

        tracing::info!(user_id = caller.id, "User settings updated");
        Ok(user.into())
    }

    pub async fn list(&self, caller: &AuthenticatedCaller) -> Result<Vec<UserSummary>, AppError> {
        authorize(Some(caller), Action::ListUsers)?;
        Ok(self
            .db
            .list_users()
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    pub async fn get(
        &self,
        caller: &AuthenticatedCaller,
        user_id: u64,
    ) -> Result<UserResponse, AppError> {
        authorize(Some(caller), Action::ReadUser { target_id: user_id })?;
        Ok(self.load(user_id).await?.into())
    }

    /// Admin edit of a user record.
    pub async fn update(
        &self,
        caller: &AuthenticatedCaller,
        user_id: u64,
        patch: UserPatch,
    ) -> Result<UserResponse, AppError> {
        authorize(
            Some(caller),
            Action::EditUser {
                target_id: user_id,
                demotes: patch.demotes(),
            },
        )
        .inspect_err(|deny| tracing::warn!(caller_id = caller.id, user_id, %deny, "User edit denied"))?;

        let user = self.apply(user_id, &patch.into()).await?;

        tracing::info!(user_id, caller_id = caller.id, "User updated");
        Ok(user.into())
    }

    /// Soft delete: the record stays but the account can no longer sign in.
    pub async fn deactivate(&self, caller: &AuthenticatedCaller, user_id: u64) -> Result<(), AppError> {
        let update = UserUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        self.set_flag(caller, user_id, Action::DeactivateUser { target_id: user_id }, update)
            .await
    }

    pub async fn activate(&self, caller: &AuthenticatedCaller, user_id: u64) -> Result<(), AppError> {
        let update = UserUpdate {
            is_active: Some(true),
            ..Default::default()
        };
        self.set_flag(caller, user_id, Action::ActivateUser { target_id: user_id }, update)
            .await
    }

    pub async fn grant_admin(&self, caller: &AuthenticatedCaller, user_id: u64) -> Result<(), AppError> {
        let update = UserUpdate {
            is_admin: Some(true),
            ..Default::default()
        };
        self.set_flag(caller, user_id, Action::GrantAdmin { target_id: user_id }, update)
            .await
    }

    pub async fn revoke_admin(&self, caller: &AuthenticatedCaller, user_id: u64) -> Result<(), AppError> {
        let update = UserUpdate {
            is_admin: Some(false),
            ..Default::default()
        };
        self.set_flag(caller, user_id, Action::RevokeAdmin { target_id: user_id }, update)
            .await
    }

    async fn set_flag(
        &self,
        caller: &AuthenticatedCaller,
        user_id: u64,
        action: Action,
        update: UserUpdate,
    ) -> Result<(), AppError> {
        authorize(Some(caller), action).inspect_err(|deny| {
            tracing::warn!(caller_id = caller.id, ?action, %deny, "User management denied")
        })?;

        self.apply(user_id, &update).await?;

        tracing::info!(user_id, caller_id = caller.id, ?action, "User flags changed");
        Ok(())
    }

    async fn load(&self, user_id: u64) -> Result<User, AppError> {
        self.db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn apply(&self, user_id: u64, update: &UserUpdate) -> Result<User, AppError> {
        self.db.update_user(user_id, update).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound("User not found".to_string()),
            e => e,
        })
    }
}
