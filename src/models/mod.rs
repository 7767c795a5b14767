// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod observation;
pub mod patch;
pub mod user;

pub use observation::{
    DashboardData, Observation, ObservationPatch, ObservationResponse, ObservationSummary,
    Readings,
};
pub use user::{
    NewUser, User, UserPatch, UserResponse, UserSettingsUpdate, UserSummary, UserUpdate,
};
