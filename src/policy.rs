// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access policy: a pure function of (caller, action) to allow or deny.
//!
//! Rules are evaluated in order:
//! 1. The caller must be resolved and active.
//! 2. Admins may not deactivate themselves or drop their own admin flag.
//! 3. Admin-only actions require `is_admin`.
//! 4. Record-level observation access requires admin or ownership.
//! 5. Creation and own-settings updates are open to any active caller.

use crate::error::AppError;
use crate::models::User;

/// Resolved identity for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedCaller {
    pub id: u64,
    pub is_admin: bool,
    pub is_active: bool,
}

impl From<&User> for AuthenticatedCaller {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            is_admin: user.is_admin,
            is_active: user.is_active,
        }
    }
}

/// Something a caller is attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateObservation,
    /// List observations, optionally for an explicit observer
    ListObservations { observer_id: Option<u64> },
    ReadObservation { observer_id: u64 },
    UpdateObservation { observer_id: u64 },
    DeleteObservation { observer_id: u64 },
    /// Per-user observation listing across accounts
    ListUserObservations,
    UpdateOwnSettings,
    ListUsers,
    ReadUser { target_id: u64 },
    /// Admin edit of a user record; `demotes` if it clears is_active or is_admin
    EditUser { target_id: u64, demotes: bool },
    DeactivateUser { target_id: u64 },
    ActivateUser { target_id: u64 },
    GrantAdmin { target_id: u64 },
    RevokeAdmin { target_id: u64 },
}

impl Action {
    fn is_admin_only(&self) -> bool {
        match self {
            Action::CreateObservation
            | Action::ReadObservation { .. }
            | Action::UpdateObservation { .. }
            | Action::DeleteObservation { .. }
            | Action::UpdateOwnSettings => false,
            // Listing your own observations is not an override.
            Action::ListObservations { observer_id } => observer_id.is_some(),
            Action::ListUserObservations
            | Action::ListUsers
            | Action::ReadUser { .. }
            | Action::EditUser { .. }
            | Action::DeactivateUser { .. }
            | Action::ActivateUser { .. }
            | Action::GrantAdmin { .. }
            | Action::RevokeAdmin { .. } => true,
        }
    }

    /// Reason string if this action would strip `caller_id` of their own access.
    fn self_demotion(&self, caller_id: u64) -> Option<&'static str> {
        match *self {
            Action::DeactivateUser { target_id } if target_id == caller_id => {
                Some("cannot deactivate your own account")
            }
            Action::RevokeAdmin { target_id } if target_id == caller_id => {
                Some("cannot remove your own admin privileges")
            }
            Action::EditUser {
                target_id,
                demotes: true,
            } if target_id == caller_id => {
                Some("cannot deactivate yourself or remove your own admin privileges")
            }
            _ => None,
        }
    }

    fn record_owner(&self) -> Option<u64> {
        match *self {
            Action::ReadObservation { observer_id }
            | Action::UpdateObservation { observer_id }
            | Action::DeleteObservation { observer_id } => Some(observer_id),
            _ => None,
        }
    }
}

/// Why an action was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Deny {
    #[error("authentication required")]
    Unauthenticated,
    #[error("account is inactive")]
    InactiveAccount,
    #[error("not enough permissions")]
    Forbidden,
    #[error("{0}")]
    SelfModificationForbidden(&'static str),
}

impl From<Deny> for AppError {
    fn from(deny: Deny) -> Self {
        match deny {
            Deny::Unauthenticated => AppError::Unauthenticated,
            Deny::InactiveAccount => AppError::AccountInactive,
            Deny::Forbidden => AppError::Forbidden,
            Deny::SelfModificationForbidden(reason) => {
                AppError::SelfModificationForbidden(reason.to_string())
            }
        }
    }
}

/// Rule 1: the caller must exist and be active.
pub fn check_caller(caller: Option<&AuthenticatedCaller>) -> Result<&AuthenticatedCaller, Deny> {
    let caller = caller.ok_or(Deny::Unauthenticated)?;
    if !caller.is_active {
        return Err(Deny::InactiveAccount);
    }
    Ok(caller)
}

/// Decide whether `caller` may perform `action`.
pub fn authorize(caller: Option<&AuthenticatedCaller>, action: Action) -> Result<(), Deny> {
    let caller = check_caller(caller)?;

    if caller.is_admin {
        // Checked before the blanket admin pass.
        return match action.self_demotion(caller.id) {
            Some(reason) => Err(Deny::SelfModificationForbidden(reason)),
            None => Ok(()),
        };
    }

    if action.is_admin_only() {
        return Err(Deny::Forbidden);
    }

    match action.record_owner() {
        Some(owner) if owner != caller.id => Err(Deny::Forbidden),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: AuthenticatedCaller = AuthenticatedCaller {
        id: 1,
        is_admin: true,
        is_active: true,
    };
    const ALICE: AuthenticatedCaller = AuthenticatedCaller {
        id: 7,
        is_admin: false,
        is_active: true,
    };
    const BOB: AuthenticatedCaller = AuthenticatedCaller {
        id: 9,
        is_admin: false,
        is_active: true,
    };

    #[test]
    fn test_missing_caller_is_unauthenticated() {
        assert_eq!(
            authorize(None, Action::CreateObservation),
            Err(Deny::Unauthenticated)
        );
    }

    #[test]
    fn test_inactive_caller_is_distinct_from_missing() {
        let inactive = AuthenticatedCaller {
            is_active: false,
            ..ADMIN
        };
        assert_eq!(
            authorize(Some(&inactive), Action::ListUsers),
            Err(Deny::InactiveAccount)
        );
    }

    #[test]
    fn test_observation_ownership() {
        let own = Action::ReadObservation { observer_id: 7 };
        assert_eq!(authorize(Some(&ALICE), own), Ok(()));
        assert_eq!(authorize(Some(&BOB), own), Err(Deny::Forbidden));
        assert_eq!(authorize(Some(&ADMIN), own), Ok(()));

        assert_eq!(
            authorize(Some(&BOB), Action::DeleteObservation { observer_id: 7 }),
            Err(Deny::Forbidden)
        );
        assert_eq!(
            authorize(Some(&BOB), Action::UpdateObservation { observer_id: 7 }),
            Err(Deny::Forbidden)
        );
    }

    #[test]
    fn test_observer_override_is_admin_only() {
        assert_eq!(
            authorize(Some(&ALICE), Action::ListObservations { observer_id: None }),
            Ok(())
        );
        assert_eq!(
            authorize(
                Some(&ALICE),
                Action::ListObservations {
                    observer_id: Some(9)
                }
            ),
            Err(Deny::Forbidden)
        );
        assert_eq!(
            authorize(
                Some(&ADMIN),
                Action::ListObservations {
                    observer_id: Some(9)
                }
            ),
            Ok(())
        );
    }

    #[test]
    fn test_user_management_is_admin_only() {
        for action in [
            Action::ListUsers,
            Action::ListUserObservations,
            Action::ReadUser { target_id: 9 },
            Action::ActivateUser { target_id: 9 },
            Action::GrantAdmin { target_id: 7 },
            Action::EditUser {
                target_id: 7,
                demotes: false,
            },
        ] {
            assert_eq!(authorize(Some(&ALICE), action), Err(Deny::Forbidden));
            assert_eq!(authorize(Some(&ADMIN), action), Ok(()));
        }
    }

    #[test]
    fn test_self_protection_applies_to_admin() {
        assert!(matches!(
            authorize(Some(&ADMIN), Action::DeactivateUser { target_id: 1 }),
            Err(Deny::SelfModificationForbidden(_))
        ));
        assert!(matches!(
            authorize(Some(&ADMIN), Action::RevokeAdmin { target_id: 1 }),
            Err(Deny::SelfModificationForbidden(_))
        ));
        assert!(matches!(
            authorize(
                Some(&ADMIN),
                Action::EditUser {
                    target_id: 1,
                    demotes: true
                }
            ),
            Err(Deny::SelfModificationForbidden(_))
        ));

        // Other targets and harmless self-edits pass.
        assert_eq!(
            authorize(Some(&ADMIN), Action::DeactivateUser { target_id: 7 }),
            Ok(())
        );
        assert_eq!(
            authorize(
                Some(&ADMIN),
                Action::EditUser {
                    target_id: 1,
                    demotes: false
                }
            ),
            Ok(())
        );
    }

    #[test]
    fn test_non_admin_self_demotion_is_forbidden() {
        assert_eq!(
            authorize(
                Some(&ALICE),
                Action::EditUser {
                    target_id: 7,
                    demotes: true
                }
            ),
            Err(Deny::Forbidden)
        );
        assert_eq!(
            authorize(Some(&ALICE), Action::DeactivateUser { target_id: 7 }),
            Err(Deny::Forbidden)
        );
    }

    #[test]
    fn test_any_active_caller_may_create_and_update_settings() {
        assert_eq!(authorize(Some(&BOB), Action::CreateObservation), Ok(()));
        assert_eq!(authorize(Some(&BOB), Action::UpdateOwnSettings), Ok(()));
    }

    #[test]
    fn test_deny_maps_to_app_error() {
        assert!(matches!(
            AppError::from(Deny::InactiveAccount),
            AppError::AccountInactive
        ));
        assert!(matches!(
            AppError::from(Deny::SelfModificationForbidden("x")),
            AppError::SelfModificationForbidden(_)
        ));
    }
}
