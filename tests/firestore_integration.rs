// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running and
//! FIRESTORE_EMULATOR_HOST to point at it. Emulator state outlives a test
//! run, so every test works on freshly named users.

use chrono::{DateTime, Duration, Utc};
use weather_logger::db::{Database, ObservationQuery};
use weather_logger::error::AppError;
use weather_logger::models::{NewUser, Readings, UserUpdate};
use weather_logger::services::identity::ExternalIdentity;
use weather_logger::services::IdentityResolver;

mod common;
use common::{test_firestore_db, unique_suffix};

fn new_user(email: String, google_id: Option<String>) -> NewUser {
    NewUser {
        google_id,
        email,
        google_name: Some("Test".to_string()),
        display_name: None,
        profile_picture: None,
        is_admin: false,
        password_hash: None,
    }
}

fn readings(time: DateTime<Utc>, precipitation: Option<f64>) -> Readings {
    serde_json::from_value(serde_json::json!({
        "observation_time": weather_logger::time_utils::format_utc_rfc3339(time),
        "temperature": 20.0,
        "precipitation": precipitation,
    }))
    .unwrap()
}

fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_103_200, 0).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// USER TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_user_unique_constraints() {
    require_emulator!();

    let db = test_firestore_db().await;
    let n = unique_suffix();
    let email = format!("user{}@example.com", n);
    let google_id = format!("sub-{}", n);

    let user = db
        .create_user(new_user(email.clone(), Some(google_id.clone())))
        .await
        .unwrap();

    assert_eq!(db.get_user(user.id).await.unwrap().unwrap().email, email);
    assert_eq!(
        db.find_user_by_email(&email).await.unwrap().unwrap().id,
        user.id
    );
    assert_eq!(
        db.find_user_by_google_id(&google_id).await.unwrap().unwrap().id,
        user.id
    );

    let dup_email = db.create_user(new_user(email.clone(), None)).await;
    assert!(matches!(dup_email, Err(AppError::Conflict(_))));

    let dup_google = db
        .create_user(new_user(format!("other{}@example.com", n), Some(google_id)))
        .await;
    assert!(matches!(dup_google, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_link_google_id() {
    require_emulator!();

    let db = test_firestore_db().await;
    let n = unique_suffix();
    let user = db
        .create_user(new_user(format!("link{}@example.com", n), None))
        .await
        .unwrap();

    let linked = db
        .link_google_id(&user, &format!("sub-link-{}", n))
        .await
        .unwrap();
    assert_eq!(linked.google_id, Some(format!("sub-link-{}", n)));

    let again = db.link_google_id(&linked, &format!("sub-other-{}", n)).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_profile_update_keeps_flag_changes() {
    require_emulator!();

    let db = test_firestore_db().await;
    let n = unique_suffix();
    let snapshot = db
        .create_user(new_user(format!("flags{}@example.com", n), None))
        .await
        .unwrap();

    db.update_user(
        snapshot.id,
        &UserUpdate {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let refreshed = db
        .update_user(
            snapshot.id,
            &UserUpdate {
                google_name: Some(Some("New".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(snapshot.is_active);
    assert!(!refreshed.is_active);
    let stored = db.get_user(snapshot.id).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert_eq!(stored.google_name.as_deref(), Some("New"));
    assert_eq!(stored.email, snapshot.email);

    let missing = db.update_user(u64::MAX - 1, &UserUpdate::default()).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_concurrent_first_login_creates_one_user() {
    require_emulator!();

    let db = test_firestore_db().await;
    let n = unique_suffix();
    let identity = ExternalIdentity {
        subject: format!("sub-race-{}", n),
        email: format!("race{}@example.com", n),
        name: Some("Racer".to_string()),
        picture: None,
    };

    let resolver = IdentityResolver::new(db.clone());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let resolver = resolver.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                resolver
                    .resolve_or_create_from_external_identity(&identity)
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// OBSERVATION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_observation_crud_and_range_query() {
    require_emulator!();

    let db: Database = test_firestore_db().await;
    let observer = db
        .create_user(new_user(format!("obs{}@example.com", unique_suffix()), None))
        .await
        .unwrap();

    let t0 = base_time();
    let mut ids = Vec::new();
    for hours in [0, 6, 12, 18] {
        let observation = db
            .create_observation(observer.id, readings(t0 + Duration::hours(hours), Some(1.0)))
            .await
            .unwrap();
        ids.push(observation.id);
    }

    let newest_first = db
        .query_observations(&ObservationQuery {
            observer_id: Some(observer.id),
            ..Default::default()
        })
        .await
        .unwrap();
    let times: Vec<_> = newest_first
        .iter()
        .map(|o| o.readings.observation_time)
        .collect();
    assert_eq!(
        times,
        vec![
            t0 + Duration::hours(18),
            t0 + Duration::hours(12),
            t0 + Duration::hours(6),
            t0
        ]
    );

    let ranged = db
        .query_observations(&ObservationQuery {
            observer_id: Some(observer.id),
            start: Some(t0 + Duration::hours(6)),
            end: Some(t0 + Duration::hours(12)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(ranged.len(), 2);

    let page = db
        .query_observations(&ObservationQuery {
            observer_id: Some(observer.id),
            skip: 1,
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].readings.observation_time, t0 + Duration::hours(12));

    db.update_observation(ids[0], |observation| {
        observation.readings.notes = Some("updated".to_string());
        Ok(())
    })
    .await
    .unwrap();
    assert_eq!(
        db.get_observation(ids[0])
            .await
            .unwrap()
            .unwrap()
            .readings
            .notes
            .as_deref(),
        Some("updated")
    );

    assert!(db.delete_observation(ids[0]).await.unwrap());
    assert!(db.get_observation(ids[0]).await.unwrap().is_none());
    assert!(!db.delete_observation(ids[0]).await.unwrap());

    // An edit arriving after the delete must not recreate the document
    let late = db
        .update_observation(ids[0], |observation| {
            observation.readings.notes = Some("late".to_string());
            Ok(())
        })
        .await;
    assert!(matches!(late, Err(AppError::NotFound(_))));
    assert!(db.get_observation(ids[0]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_observation_requires_existing_observer() {
    require_emulator!();

    let db = test_firestore_db().await;
    let result = db
        .create_observation(u64::MAX - 1, readings(base_time(), None))
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}
