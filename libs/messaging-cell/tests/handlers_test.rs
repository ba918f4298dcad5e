use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tower::ServiceExt;

use appointment_cell::{
    Appointment, AppointmentRepository, AppointmentStatus, InMemoryAppointmentStore, PartyRole,
};
use messaging_cell::{
    message_routes, ChatRoomHub, InMemoryMessageStore, MessageCipher, MessagingCellState,
    MessagingService,
};
use shared_models::scheduling::SessionType;
use shared_utils::test_utils::{TestConfig, TestUser};

struct TestApp {
    router: Router,
    appointments: Arc<InMemoryAppointmentStore>,
    secret: String,
}

fn test_app() -> TestApp {
    let config = TestConfig::default();
    let app_config = config.to_arc();
    let appointments = Arc::new(InMemoryAppointmentStore::new());
    let messaging = Arc::new(MessagingService::new(
        Arc::new(InMemoryMessageStore::new()),
        appointments.clone(),
        MessageCipher::new(&app_config.message_encryption_key).unwrap(),
        ChatRoomHub::new(app_config.chat_room_capacity),
    ));
    TestApp {
        router: message_routes(MessagingCellState {
            config: app_config,
            messaging,
        }),
        appointments,
        secret: config.jwt_secret,
    }
}

async fn book(store: &InMemoryAppointmentStore) -> Appointment {
    store
        .reserve(Appointment::new(
            "amna",
            "drsara",
            NaiveDate::from_ymd_opt(2026, 10, 21).unwrap(),
            "11:00 AM".parse().unwrap(),
            SessionType::Online,
            PartyRole::Patient,
        ))
        .await
        .unwrap()
}

async fn accept(store: &InMemoryAppointmentStore, appointment: &Appointment) {
    let mut accepted = appointment.clone();
    accepted.status = AppointmentStatus::Accepted;
    store.update(appointment.version, accepted).await.unwrap();
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn request(method: &str, uri: &str, bearer: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", bearer);
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn test_requires_token() {
    let app = test_app();

    let (status, _) = send(
        &app.router,
        Request::builder().uri("/unread-count/amna").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_conversation_over_http() {
    let app = test_app();
    let amna = TestUser::patient("amna").bearer(&app.secret);
    let drsara = TestUser::therapist("drsara").bearer(&app.secret);
    let appointment = book(&app.appointments).await;

    let (status, body) = send(
        &app.router,
        request("POST", "/", &amna, Some(json!({ "appointmentId": appointment.id, "message": "Hello" }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Cannot send message. Appointment not accepted.");

    accept(&app.appointments, &appointment).await;

    let (status, body) = send(
        &app.router,
        request("POST", "/", &amna, Some(json!({ "appointment_id": appointment.id, "content": "Hello" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"]["content"], "Hello");
    assert_eq!(body["message"]["receiver_username"], "drsara");

    let (status, body) = send(&app.router, request("GET", &format!("/{}", appointment.id), &drsara, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app.router, request("GET", "/unread-count/drsara", &drsara, None)).await;
    assert_eq!(body["unread_count"], 1);

    let (status, body) = send(
        &app.router,
        request(
            "PUT",
            "/mark-read",
            &drsara,
            Some(json!({ "appointment_id": appointment.id, "username": "drsara" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "updated": 1 }));

    let (_, body) = send(&app.router, request("GET", "/unread-count/drsara", &drsara, None)).await;
    assert_eq!(body["unread_count"], 0);
}

#[tokio::test]
async fn test_other_users_history_is_forbidden() {
    let app = test_app();
    let appointment = book(&app.appointments).await;
    let bilal = TestUser::patient("bilal").bearer(&app.secret);

    let (status, _) = send(&app.router, request("GET", &format!("/{}", appointment.id), &bilal, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app.router, request("GET", "/unread-count/amna", &bilal, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_appointment_is_not_found() {
    let app = test_app();
    let admin = TestUser::admin("ops").bearer(&app.secret);

    let (status, body) = send(
        &app.router,
        request("GET", "/5d1e3c2b-9a8f-4e7d-8c6b-1a2b3c4d5e6f", &admin, None),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Appointment not found");
}
