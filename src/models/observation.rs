// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Manual weather observation model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::patch::{apply, deserialize_some};
use crate::time_utils::{format_utc_rfc3339, has_storable_year, rfc3339_seconds};

/// The readings an observer enters on the form.
///
/// Used as the create request body and embedded in the stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Readings {
    /// When the observation was taken
    #[serde(with = "rfc3339_seconds")]
    #[validate(custom(function = "validate_observation_time"))]
    pub observation_time: DateTime<Utc>,

    /// Dry-bulb temperature (°C)
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Wet-bulb temperature (°C)
    #[serde(default)]
    pub wet_bulb_temperature: Option<f64>,
    /// Precipitation (mm)
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub precipitation: Option<f64>,

    // ─── Evaporation Pan ─────────────────────────────────────────
    /// Pan water temperature (°C)
    #[serde(default)]
    pub evaporation_pan_temp: Option<f64>,
    /// Pan water level (mm)
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub current_evaporation_level: Option<f64>,

    // ─── Sky ─────────────────────────────────────────────────────
    #[serde(default)]
    pub current_weather_code: Option<String>,
    /// Total cloud cover in oktas
    #[serde(default)]
    #[validate(range(min = 0, max = 8))]
    pub total_cloud_amount: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0, max = 9))]
    pub high_cloud_type_code: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0, max = 8))]
    pub high_cloud_amount: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0, max = 9))]
    pub middle_cloud_type_code: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0, max = 8))]
    pub middle_cloud_amount: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0, max = 9))]
    pub low_cloud_type_code: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0, max = 8))]
    pub low_cloud_amount: Option<i32>,

    // ─── Pan Maintenance Sections ────────────────────────────────
    /// Readings taken after the pan was cleaned
    #[serde(default)]
    pub has_cleaned_evaporation_pan: bool,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub cleaned_evaporation_level: Option<f64>,
    #[serde(default)]
    pub cleaned_evaporation_temp: Option<f64>,

    /// Readings taken after water was added
    #[serde(default)]
    pub has_added_evaporation_water: bool,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub added_evaporation_level: Option<f64>,
    #[serde(default)]
    pub added_evaporation_temp: Option<f64>,

    /// Readings taken after water was removed
    #[serde(default)]
    pub has_reduced_evaporation_water: bool,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub reduced_evaporation_level: Option<f64>,
    #[serde(default)]
    pub reduced_evaporation_temp: Option<f64>,

    #[serde(default)]
    pub notes: Option<String>,
}

fn validate_observation_time(time: &DateTime<Utc>) -> Result<(), ValidationError> {
    if has_storable_year(*time) {
        Ok(())
    } else {
        Err(ValidationError::new("year_out_of_range")
            .with_message("year must be between 1 and 9999".into()))
    }
}

/// Stored observation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Locally allocated id (also used as document ID)
    pub id: u64,
    /// User who recorded it. Set at creation and never changed.
    pub observer_id: u64,
    pub readings: Readings,
    #[serde(with = "rfc3339_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "rfc3339_seconds::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial update of an observation's readings.
///
/// There is deliberately no `observer_id` here: the observer of record is
/// immutable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservationPatch {
    #[serde(default, with = "rfc3339_seconds::option")]
    pub observation_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub temperature: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub wet_bulb_temperature: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub precipitation: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub evaporation_pan_temp: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub current_evaporation_level: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub current_weather_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub total_cloud_amount: Option<Option<i32>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub high_cloud_type_code: Option<Option<i32>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub high_cloud_amount: Option<Option<i32>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub middle_cloud_type_code: Option<Option<i32>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub middle_cloud_amount: Option<Option<i32>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub low_cloud_type_code: Option<Option<i32>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub low_cloud_amount: Option<Option<i32>>,
    pub has_cleaned_evaporation_pan: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub cleaned_evaporation_level: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub cleaned_evaporation_temp: Option<Option<f64>>,
    pub has_added_evaporation_water: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub added_evaporation_level: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub added_evaporation_temp: Option<Option<f64>>,
    pub has_reduced_evaporation_water: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub reduced_evaporation_level: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub reduced_evaporation_temp: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub notes: Option<Option<String>>,
}

impl ObservationPatch {
    /// Merge supplied fields into `readings`, field by field.
    pub fn apply_to(self, readings: &mut Readings) {
        apply(&mut readings.observation_time, self.observation_time);
        apply(&mut readings.temperature, self.temperature);
        apply(&mut readings.wet_bulb_temperature, self.wet_bulb_temperature);
        apply(&mut readings.precipitation, self.precipitation);
        apply(&mut readings.evaporation_pan_temp, self.evaporation_pan_temp);
        apply(
            &mut readings.current_evaporation_level,
            self.current_evaporation_level,
        );
        apply(&mut readings.current_weather_code, self.current_weather_code);
        apply(&mut readings.total_cloud_amount, self.total_cloud_amount);
        apply(&mut readings.high_cloud_type_code, self.high_cloud_type_code);
        apply(&mut readings.high_cloud_amount, self.high_cloud_amount);
        apply(
            &mut readings.middle_cloud_type_code,
            self.middle_cloud_type_code,
        );
        apply(&mut readings.middle_cloud_amount, self.middle_cloud_amount);
        apply(&mut readings.low_cloud_type_code, self.low_cloud_type_code);
        apply(&mut readings.low_cloud_amount, self.low_cloud_amount);
        apply(
            &mut readings.has_cleaned_evaporation_pan,
            self.has_cleaned_evaporation_pan,
        );
        apply(
            &mut readings.cleaned_evaporation_level,
            self.cleaned_evaporation_level,
        );
        apply(
            &mut readings.cleaned_evaporation_temp,
            self.cleaned_evaporation_temp,
        );
        apply(
            &mut readings.has_added_evaporation_water,
            self.has_added_evaporation_water,
        );
        apply(
            &mut readings.added_evaporation_level,
            self.added_evaporation_level,
        );
        apply(
            &mut readings.added_evaporation_temp,
            self.added_evaporation_temp,
        );
        apply(
            &mut readings.has_reduced_evaporation_water,
            self.has_reduced_evaporation_water,
        );
        apply(
            &mut readings.reduced_evaporation_level,
            self.reduced_evaporation_level,
        );
        apply(
            &mut readings.reduced_evaporation_temp,
            self.reduced_evaporation_temp,
        );
        apply(&mut readings.notes, self.notes);
    }
}

/// Observation as returned by the API (readings flattened).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationResponse {
    pub id: u64,
    pub observer_id: u64,
    pub observer_name: Option<String>,
    #[serde(flatten)]
    pub readings: Readings,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl ObservationResponse {
    pub fn new(observation: Observation, observer_name: Option<String>) -> Self {
        Self {
            id: observation.id,
            observer_id: observation.observer_id,
            observer_name,
            readings: observation.readings,
            created_at: format_utc_rfc3339(observation.created_at),
            updated_at: observation.updated_at.map(format_utc_rfc3339),
        }
    }
}

/// Short form used by the per-user admin listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationSummary {
    pub id: u64,
    pub observation_time: String,
    pub temperature: Option<f64>,
    pub wet_bulb_temperature: Option<f64>,
    pub precipitation: Option<f64>,
    pub observer_id: u64,
}

impl From<Observation> for ObservationSummary {
    fn from(observation: Observation) -> Self {
        Self {
            id: observation.id,
            observation_time: format_utc_rfc3339(observation.readings.observation_time),
            temperature: observation.readings.temperature,
            wet_bulb_temperature: observation.readings.wet_bulb_temperature,
            precipitation: observation.readings.precipitation,
            observer_id: observation.observer_id,
        }
    }
}

/// Latest conditions for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    pub observation_time: String,
    pub temperature: Option<f64>,
    pub wet_bulb_temperature: Option<f64>,
    /// Sum of precipitation over the 24 hours ending at `observation_time`
    pub precipitation_24h: Option<f64>,
    pub current_evaporation_level: Option<f64>,
    pub evaporation_pan_temp: Option<f64>,
    pub observer_name: Option<String>,
}

#[cfg(test)]
pub(crate) fn test_readings(observation_time: DateTime<Utc>) -> Readings {
    Readings {
        observation_time,
        temperature: Some(21.5),
        wet_bulb_temperature: Some(18.0),
        precipitation: Some(0.0),
        evaporation_pan_temp: None,
        current_evaporation_level: None,
        current_weather_code: None,
        total_cloud_amount: Some(4),
        high_cloud_type_code: None,
        high_cloud_amount: None,
        middle_cloud_type_code: None,
        middle_cloud_amount: None,
        low_cloud_type_code: None,
        low_cloud_amount: None,
        has_cleaned_evaporation_pan: false,
        cleaned_evaporation_level: None,
        cleaned_evaporation_temp: None,
        has_added_evaporation_water: false,
        added_evaporation_level: None,
        added_evaporation_temp: None,
        has_reduced_evaporation_water: false,
        reduced_evaporation_level: None,
        reduced_evaporation_temp: None,
        notes: None,
    }
}
