// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Observation resource operations.
//!
//! Every operation takes the resolved caller explicitly and consults the
//! access policy before touching the store.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use validator::Validate;

use crate::db::{Database, ObservationQuery};
use crate::error::AppError;
use crate::models::{
    DashboardData, Observation, ObservationPatch, ObservationResponse, ObservationSummary,
    Readings,
};
use crate::policy::{authorize, Action, AuthenticatedCaller};
use crate::time_utils::{format_utc_rfc3339, truncate_to_seconds};

/// Default page size for listings.
pub const DEFAULT_LIMIT: u32 = 100;
/// Largest page a caller may request.
pub const MAX_LIMIT: u32 = 1000;

/// Filters for an observation listing.
#[derive(Debug, Clone, Default)]
pub struct ObservationFilter {
    pub skip: u32,
    pub limit: Option<u32>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Only honoured for admins
    pub observer_id: Option<u64>,
}

#[derive(Clone)]
pub struct ObservationService {
    db: Database,
}

impl ObservationService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a new observation. The observer is always the caller.
    pub async fn create(
        &self,
        caller: &AuthenticatedCaller,
        mut readings: Readings,
    ) -> Result<ObservationResponse, AppError> {
        authorize(Some(caller), Action::CreateObservation)?;
        readings.validate()?;
        readings.observation_time = truncate_to_seconds(readings.observation_time);

        let observation = self.db.create_observation(caller.id, readings).await?;

        tracing::info!(
            observation_id = observation.id,
            observer_id = caller.id,
            "Observation created"
        );

        self.respond(observation).await
    }

    /// List observations newest first.
    ///
    /// Non-admins only ever see their own records.
    pub async fn list(
        &self,
        caller: &AuthenticatedCaller,
        filter: ObservationFilter,
    ) -> Result<Vec<ObservationResponse>, AppError> {
        let requested = filter.observer_id.filter(|id| *id != caller.id);
        authorize(
            Some(caller),
            Action::ListObservations {
                observer_id: requested,
            },
        )?;

        let observer_id = if caller.is_admin {
            filter.observer_id
        } else {
            Some(caller.id)
        };

        let observations = self
            .db
            .query_observations(&ObservationQuery {
                observer_id,
                start: filter.start,
                end: filter.end,
                skip: filter.skip,
                limit: Some(filter.limit.unwrap_or(DEFAULT_LIMIT)),
            })
            .await?;

        let mut names: HashMap<u64, Option<String>> = HashMap::new();
        let mut responses = Vec::with_capacity(observations.len());
        for observation in observations {
            let name = match names.get(&observation.observer_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self.observer_name(observation.observer_id).await?;
                    names.insert(observation.observer_id, name.clone());
                    name
                }
            };
            responses.push(ObservationResponse::new(observation, name));
        }

        Ok(responses)
    }

    /// Latest observation overall with 24 hour precipitation.
    pub async fn dashboard(&self, caller: &AuthenticatedCaller) -> Result<DashboardData, AppError> {
        crate::policy::check_caller(Some(caller))?;

        let latest = self
            .db
            .query_observations(&ObservationQuery {
                limit: Some(1),
                ..Default::default()
            })
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("No observations found".to_string()))?;

        let end = latest.readings.observation_time;
        let window = self
            .db
            .query_observations(&ObservationQuery {
                start: end.checked_sub_signed(Duration::hours(24)),
                end: Some(end),
                ..Default::default()
            })
            .await?;

        Ok(DashboardData {
            observation_time: format_utc_rfc3339(end),
            temperature: latest.readings.temperature,
            wet_bulb_temperature: latest.readings.wet_bulb_temperature,
            precipitation_24h: sum_precipitation(&window),
            current_evaporation_level: latest.readings.current_evaporation_level,
            evaporation_pan_temp: latest.readings.evaporation_pan_temp,
            observer_name: self.observer_name(latest.observer_id).await?,
        })
    }

    pub async fn get(
        &self,
        caller: &AuthenticatedCaller,
        id: u64,
    ) -> Result<ObservationResponse, AppError> {
        let observation = self.load(id).await?;
        authorize(
            Some(caller),
            Action::ReadObservation {
                observer_id: observation.observer_id,
            },
        )
        .inspect_err(|_| tracing::warn!(caller_id = caller.id, observation_id = id, "Read denied"))?;

        self.respond(observation).await
    }

    /// Merge a partial update into an observation's readings.
    pub async fn update(
        &self,
        caller: &AuthenticatedCaller,
        id: u64,
        patch: ObservationPatch,
    ) -> Result<ObservationResponse, AppError> {
        // The observer never changes, so ownership can be checked up front.
        let current = self.load(id).await?;
        authorize(
            Some(caller),
            Action::UpdateObservation {
                observer_id: current.observer_id,
            },
        )
        .inspect_err(|_| {
            tracing::warn!(caller_id = caller.id, observation_id = id, "Update denied")
        })?;

        let observation = self
            .db
            .update_observation(id, |observation| {
                let mut readings = observation.readings.clone();
                patch.clone().apply_to(&mut readings);
                readings.validate()?;
                readings.observation_time = truncate_to_seconds(readings.observation_time);

                observation.readings = readings;
                observation.updated_at = Some(truncate_to_seconds(Utc::now()));
                Ok(())
            })
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::NotFound("Observation not found".to_string()),
                e => e,
            })?;
        tracing::info!(observation_id = id, caller_id = caller.id, "Observation updated");

        self.respond(observation).await
    }

    /// Permanently delete an observation.
    pub async fn delete(&self, caller: &AuthenticatedCaller, id: u64) -> Result<(), AppError> {
        let observation = self.load(id).await?;
        authorize(
            Some(caller),
            Action::DeleteObservation {
                observer_id: observation.observer_id,
            },
        )
        .inspect_err(|_| {
            tracing::warn!(caller_id = caller.id, observation_id = id, "Delete denied")
        })?;

        if !self.db.delete_observation(id).await? {
            return Err(AppError::NotFound("Observation not found".to_string()));
        }

        tracing::info!(observation_id = id, caller_id = caller.id, "Observation deleted");
        Ok(())
    }

    /// Summaries of one user's observations (admin only).
    pub async fn list_for_user(
        &self,
        caller: &AuthenticatedCaller,
        user_id: u64,
        skip: u32,
        limit: Option<u32>,
    ) -> Result<Vec<ObservationSummary>, AppError> {
        authorize(Some(caller), Action::ListUserObservations)?;

        let observations = self
            .db
            .query_observations(&ObservationQuery {
                observer_id: Some(user_id),
                skip,
                limit: Some(limit.unwrap_or(DEFAULT_LIMIT)),
                ..Default::default()
            })
            .await?;

        Ok(observations.into_iter().map(Into::into).collect())
    }

    async fn load(&self, id: u64) -> Result<Observation, AppError> {
        self.db
            .get_observation(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Observation not found".to_string()))
    }

    async fn observer_name(&self, observer_id: u64) -> Result<Option<String>, AppError> {
        Ok(self
            .db
            .get_user(observer_id)
            .await?
            .and_then(|user| user.observer_name()))
    }

    async fn respond(&self, observation: Observation) -> Result<ObservationResponse, AppError> {
        let name = self.observer_name(observation.observer_id).await?;
        Ok(ObservationResponse::new(observation, name))
    }
}

/// Sum of reported precipitation, or `None` if nothing was reported.
fn sum_precipitation(observations: &[Observation]) -> Option<f64> {
    observations
        .iter()
        .filter_map(|o| o.readings.precipitation)
        .fold(None, |acc, mm| Some(acc.unwrap_or(0.0) + mm))
}
