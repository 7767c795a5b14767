// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Helpers for partial updates.
//!
//! Nullable fields use `Option<Option<T>>`: the outer `None` means "not
//! supplied", `Some(None)` means "set to null".

use serde::{Deserialize, Deserializer};

/// Deserialize a present field (even `null`) as `Some`.
///
/// Combine with `#[serde(default)]` so a missing field stays `None`.
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Overwrite `slot` only if a value was supplied.
pub fn apply<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}
