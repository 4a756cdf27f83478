use evento::models::{CreateRegistrationRequest, User};
use evento::services::RegistrationServiceError;
use evento::test_utils::test_helpers;
use evento::AppState;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;

async fn set_limits(
    pool: &SqlitePool,
    event_id: i64,
    capacity: i64,
    max_qr_codes: Option<i64>,
    max_codes_per_user: Option<i64>,
) {
    sqlx::query(
        "UPDATE events SET capacity = ?, max_qr_codes = ?, max_codes_per_user = ? WHERE id = ?",
    )
    .bind(capacity)
    .bind(max_qr_codes)
    .bind(max_codes_per_user)
    .bind(event_id)
    .execute(pool)
    .await
    .unwrap();
}

async fn user(state: &AppState, pool: &SqlitePool, name: &str) -> User {
    let id = test_helpers::insert_test_user(
        pool,
        name,
        &format!("{}@example.com", name),
        "password123",
        true,
    )
    .await
    .unwrap();
    state.user_service.get_user(id).await.unwrap()
}

fn request(event_id: i64) -> CreateRegistrationRequest {
    CreateRegistrationRequest {
        event: event_id,
        attendee_metadata: None,
    }
}

async fn registration_count(pool: &SqlitePool, event_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM registrations WHERE event_id = ?")
        .bind(event_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_per_user_limit() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let state = test_helpers::test_state(pool.clone());
    let host = user(&state, &pool, "host").await;
    let guest = user(&state, &pool, "guest").await;
    let event_id = test_helpers::create_test_event(&pool, host.id, "Workshop").await.unwrap();
    set_limits(&pool, event_id, 0, None, Some(2)).await;

    let service = &state.registration_service;
    service.create(&guest, request(event_id)).await.unwrap();
    service.create(&guest, request(event_id)).await.unwrap();

    let result = service.create(&guest, request(event_id)).await;
    assert!(matches!(
        result,
        Err(RegistrationServiceError::PerUserLimitReached(2))
    ));

    // Another user is unaffected
    service.create(&host, request(event_id)).await.unwrap();
    assert_eq!(registration_count(&pool, event_id).await, 3);
}

#[tokio::test]
async fn test_stricter_total_limit_wins() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let state = test_helpers::test_state(pool.clone());
    let host = user(&state, &pool, "host").await;
    let a = user(&state, &pool, "alice").await;
    let b = user(&state, &pool, "bruno").await;
    let event_id = test_helpers::create_test_event(&pool, host.id, "Tasting").await.unwrap();
    // Capacity 10 but only 2 codes may ever be issued
    set_limits(&pool, event_id, 10, Some(2), None).await;

    let service = &state.registration_service;
    service.create(&a, request(event_id)).await.unwrap();
    service.create(&b, request(event_id)).await.unwrap();

    let result = service.create(&host, request(event_id)).await;
    assert!(matches!(result, Err(RegistrationServiceError::EventFull)));
    assert_eq!(registration_count(&pool, event_id).await, 2);
}

#[tokio::test]
async fn test_rejects_non_object_metadata() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let state = test_helpers::test_state(pool.clone());
    let host = user(&state, &pool, "host").await;
    let event_id = test_helpers::create_test_event(&pool, host.id, "Meetup").await.unwrap();

    let result = state
        .registration_service
        .create(
            &host,
            CreateRegistrationRequest {
                event: event_id,
                attendee_metadata: Some(json!(["not", "an", "object"])),
            },
        )
        .await;
    assert!(matches!(result, Err(RegistrationServiceError::InvalidMetadata)));
}

#[tokio::test]
async fn test_ticket_email_is_logged() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let state = test_helpers::test_state(pool.clone());
    let host = user(&state, &pool, "host").await;
    let event_id = test_helpers::create_test_event(&pool, host.id, "Concert").await.unwrap();

    let registration = state
        .registration_service
        .create(
            &host,
            CreateRegistrationRequest {
                event: event_id,
                attendee_metadata: Some(json!({ "name": "Host Person" })),
            },
        )
        .await
        .unwrap();

    let (recipient, success): (String, bool) = sqlx::query_as(
        "SELECT recipient, success FROM email_logs WHERE registration_id = ?",
    )
    .bind(registration.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(recipient, "host@example.com");
    assert!(success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_respect_limits() {
    let (pool, _db_file) = test_helpers::create_test_db_file(4).await.unwrap();
    let state = Arc::new(test_helpers::test_state(pool.clone()));
    let host = user(&state, &pool, "host").await;
    let guest = Arc::new(user(&state, &pool, "guest").await);
    let event_id = test_helpers::create_test_event(&pool, host.id, "Rush").await.unwrap();
    set_limits(&pool, event_id, 0, None, Some(3)).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let state = state.clone();
        let guest = guest.clone();
        handles.push(tokio::spawn(async move {
            state.registration_service.create(&guest, request(event_id)).await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(RegistrationServiceError::PerUserLimitReached(3)) => {}
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    assert_eq!(created, 3);
    assert_eq!(registration_count(&pool, event_id).await, 3);
}
