use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use notification_cell::{
    notification_routes, InMemoryNotificationStore, NewNotification, Notification,
    NotificationCellState, NotificationRepository,
};
use shared_utils::test_utils::{TestConfig, TestUser};

async fn test_app() -> (Router, Arc<InMemoryNotificationStore>, String) {
    let config = TestConfig::default();
    let store = Arc::new(InMemoryNotificationStore::new());
    for message in ["first", "second"] {
        store
            .insert(Notification::from_new(NewNotification {
                recipient_username: "amna".into(),
                message: message.into(),
                appointment_id: None,
            }))
            .await
            .unwrap();
    }
    let state = NotificationCellState {
        config: config.to_arc(),
        repository: store.clone(),
    };
    (notification_routes(state), store, config.jwt_secret)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() { Value::Null } else { serde_json::from_slice(&body).unwrap() };
    (status, json)
}

#[tokio::test]
async fn test_owner_reads_and_clears_notifications() {
    let (app, store, secret) = test_app().await;
    let bearer = TestUser::patient("amna").bearer(&secret);

    let (status, body) = send(
        &app,
        Request::builder().uri("/amna").header("Authorization", &bearer).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notifications"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/amna/unread-count")
            .header("Authorization", &bearer)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unread_count"], 2);

    let (status, body) = send(
        &app,
        Request::builder()
            .method("PUT")
            .uri("/amna/mark-read")
            .header("Authorization", &bearer)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 2);
    assert_eq!(store.unread_count("amna").await.unwrap(), 0);
}

#[tokio::test]
async fn test_other_users_cannot_read_notifications() {
    let (app, _, secret) = test_app().await;

    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/amna")
            .header("Authorization", TestUser::therapist("drsara").bearer(&secret))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/amna/unread-count")
            .header("Authorization", TestUser::admin("ops").bearer(&secret))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unread_count"], 2);
}
