use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tokio::sync::mpsc::UnboundedReceiver;

use appointment_cell::{
    AppointmentBookingService, AppointmentError, AppointmentStatus, CancelAppointmentRequest,
    CreateAppointmentRequest, InMemoryAppointmentStore, PartyRole, RescheduleAppointmentRequest,
    spawn_finish_sweeper, PATIENT_HISTORY_PAGE_SIZE,
};
use notification_cell::{
    InMemoryNotificationStore, NewNotification, NotificationDispatcher, NotificationRepository,
};
use shared_models::auth::{User, UserRole};
use shared_models::scheduling::SessionType;
use shared_utils::clock::Clock;
use shared_utils::test_utils::{TestConfig, TestUser};
use user_cell::{AvailabilitySlot, CarePlanUpdate, InMemoryUserDirectory, UserProfile, UserService};

struct Harness {
    service: Arc<AppointmentBookingService>,
    notifications: UnboundedReceiver<NewNotification>,
    clock: Arc<Mutex<NaiveDateTime>>,
}

impl Harness {
    fn advance(&self, by: Duration) {
        let mut now = self.clock.lock().unwrap();
        *now += by;
    }
}

/// Monday 2026-10-19, 9:00 AM clinic time.
fn now() -> NaiveDateTime {
    date(19).and_hms_opt(9, 0, 0).unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
}

fn profiles(patients: &[&str], availability: Vec<AvailabilitySlot>) -> Vec<UserProfile> {
    let mut therapist = UserProfile::new("drsara", UserRole::Therapist);
    therapist.first_name = Some("Sara".into());
    therapist.last_name = Some("Malik".into());
    therapist.availability = availability;

    let mut all = vec![therapist];
    for patient in patients {
        let mut profile = UserProfile::new(patient, UserRole::Patient);
        profile.first_name = Some("Amna".into());
        profile.last_name = Some("Raza".into());
        all.push(profile);
    }
    all
}

fn harness_with(profiles: Vec<UserProfile>, at: NaiveDateTime) -> Harness {
    let config = TestConfig::default().to_app_config();
    let users = Arc::new(UserService::new(Arc::new(InMemoryUserDirectory::with_profiles(profiles))));
    let (notifier, notifications) = NotificationDispatcher::channel();
    let current = Arc::new(Mutex::new(at));
    let reader = Arc::clone(&current);
    let clock: Clock = Arc::new(move || *reader.lock().unwrap());
    let service = AppointmentBookingService::with_clock(
        &config,
        Arc::new(InMemoryAppointmentStore::new()),
        users,
        notifier,
        clock,
    );
    Harness {
        service: Arc::new(service),
        notifications,
        clock: current,
    }
}

fn harness() -> Harness {
    harness_with(profiles(&["amna", "bilal"], vec![]), now())
}

fn patient(username: &str) -> User {
    TestUser::patient(username).to_user()
}

fn therapist() -> User {
    TestUser::therapist("drsara").to_user()
}

fn request(patient: &str, day: u32, time: &str) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        patient_username: patient.to_string(),
        therapist_username: "drsara".to_string(),
        date: date(day),
        time: time.parse().unwrap(),
        session_type: SessionType::Online,
        initiator_role: None,
    }
}

fn drain(receiver: &mut UnboundedReceiver<NewNotification>) -> Vec<NewNotification> {
    let mut all = Vec::new();
    while let Ok(notification) = receiver.try_recv() {
        all.push(notification);
    }
    all
}

#[tokio::test]
async fn test_booking_notifies_both_parties() {
    let mut h = harness();

    let appointment = h.service.create_appointment(&patient("amna"), request("amna", 20, "2:00 PM")).await.unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(appointment.initiator_role, PartyRole::Patient);

    let sent = drain(&mut h.notifications);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].recipient_username, "amna");
    assert_eq!(sent[0].message, "Appointment created! (Date: 2026-10-20, Time: 2:00 PM, Pending)");
    assert_eq!(sent[1].recipient_username, "drsara");
    assert_eq!(sent[1].message, "New appointment request from Amna Raza. (Date: 2026-10-20, Time: 2:00 PM)");
}

#[tokio::test]
async fn test_equal_slot_spellings_conflict() {
    let h = harness();

    h.service.create_appointment(&patient("amna"), request("amna", 20, "14:00")).await.unwrap();
    let second = h.service.create_appointment(&patient("bilal"), request("bilal", 20, "02:00 pm")).await;

    assert_matches!(second, Err(AppointmentError::SlotTaken { .. }));
}

#[tokio::test]
async fn test_slot_with_seconds_conflicts_with_its_label() {
    let h = harness();

    let first = h.service.create_appointment(&patient("amna"), request("amna", 20, "14:00:30")).await.unwrap();
    let second = h.service.create_appointment(&patient("bilal"), request("bilal", 20, "2:00 PM")).await;

    assert_eq!(first.time.label(), "2:00 PM");
    assert_matches!(second, Err(AppointmentError::SlotTaken { .. }));
    assert_eq!(h.service.booked_times("drsara", date(20)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_one_open_appointment_per_pair() {
    let h = harness();

    h.service.create_appointment(&patient("amna"), request("amna", 20, "2:00 PM")).await.unwrap();
    let again = h.service.create_appointment(&patient("amna"), request("amna", 21, "3:00 PM")).await;

    assert_matches!(again, Err(AppointmentError::DuplicateBooking));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_have_exactly_one_winner() {
    let patients: Vec<String> = (0..24).map(|i| format!("patient{:02}", i)).collect();
    let names: Vec<&str> = patients.iter().map(String::as_str).collect();
    let h = harness_with(profiles(&names, vec![]), now());

    let handles: Vec<_> = patients
        .iter()
        .map(|username| {
            let service = Arc::clone(&h.service);
            let caller = patient(username);
            let req = request(username, 22, "10:00 AM");
            tokio::spawn(async move { service.create_appointment(&caller, req).await })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let winners = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
    let slot_taken = results
        .iter()
        .filter(|r| matches!(r, Ok(Err(AppointmentError::SlotTaken { .. }))))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(slot_taken, patients.len() - 1);
    assert_eq!(h.service.booked_times("drsara", date(22)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_past_slots_are_rejected() {
    let h = harness();

    let result = h.service.create_appointment(&patient("amna"), request("amna", 19, "8:00 AM")).await;
    assert_matches!(result, Err(AppointmentError::InvalidTime));
}

#[tokio::test]
async fn test_patients_cannot_book_for_someone_else() {
    let h = harness();

    let result = h.service.create_appointment(&patient("bilal"), request("amna", 20, "2:00 PM")).await;
    assert_matches!(result, Err(AppointmentError::Unauthorized(_)));

    let unknown = h.service.create_appointment(&patient("zara"), request("zara", 20, "2:00 PM")).await;
    assert_matches!(unknown, Err(AppointmentError::ValidationError(_)));
}

#[tokio::test]
async fn test_published_availability_is_enforced() {
    let availability = vec![AvailabilitySlot {
        day: chrono::Weekday::Tue,
        start: "9:00 AM".parse().unwrap(),
        end: "12:00 PM".parse().unwrap(),
        session_type: SessionType::Online,
    }];
    let h = harness_with(profiles(&["amna", "bilal"], availability), now());

    let outside = h.service.create_appointment(&patient("amna"), request("amna", 20, "2:00 PM")).await;
    assert_matches!(outside, Err(AppointmentError::OutsideAvailability { .. }));

    h.service.create_appointment(&patient("amna"), request("amna", 20, "10:00 AM")).await.unwrap();

    let open: Vec<String> = h
        .service
        .open_slots("drsara", date(20), SessionType::Online)
        .await
        .unwrap()
        .iter()
        .map(|slot| slot.label())
        .collect();
    assert_eq!(open, vec!["9:00 AM", "11:00 AM"]);
}

#[tokio::test]
async fn test_accept_is_reserved_for_the_counterparty() {
    let h = harness();
    let appointment = h.service.create_appointment(&patient("amna"), request("amna", 20, "2:00 PM")).await.unwrap();

    let own = h.service.accept_appointment(&patient("amna"), appointment.id).await;
    assert_matches!(own, Err(AppointmentError::Unauthorized(_)));

    let accepted = h.service.accept_appointment(&therapist(), appointment.id).await.unwrap();
    assert_eq!(accepted.status, AppointmentStatus::Accepted);
    assert_eq!(accepted.version, appointment.version + 1);

    let twice = h.service.reject_appointment(&therapist(), appointment.id).await;
    assert_matches!(
        twice,
        Err(AppointmentError::InvalidStatusTransition { from: AppointmentStatus::Accepted, .. })
    );
}

#[tokio::test]
async fn test_reschedule_returns_to_pending_with_new_initiator() {
    let mut h = harness();
    let appointment = h.service.create_appointment(&patient("amna"), request("amna", 20, "2:00 PM")).await.unwrap();
    h.service.accept_appointment(&therapist(), appointment.id).await.unwrap();
    drain(&mut h.notifications);

    let moved = h
        .service
        .reschedule_appointment(
            &therapist(),
            appointment.id,
            RescheduleAppointmentRequest {
                new_date: date(21),
                new_time: "15:00".parse().unwrap(),
                reason: Some("Conference".into()),
                acting_role: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(moved.status, AppointmentStatus::Pending);
    assert_eq!(moved.initiator_role, PartyRole::Therapist);
    assert_eq!(moved.time.label(), "3:00 PM");
    assert_eq!(moved.reason.as_deref(), Some("Conference"));

    let sent = drain(&mut h.notifications);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].message, "Appointment was rescheduled to 2026-10-21 at 3:00 PM. Reason: Conference");

    // The old slot is free again, and the patient now has to answer.
    assert!(h.service.booked_times("drsara", date(20)).await.unwrap().is_empty());
    assert_matches!(
        h.service.accept_appointment(&therapist(), appointment.id).await,
        Err(AppointmentError::Unauthorized(_))
    );
    h.service.accept_appointment(&patient("amna"), appointment.id).await.unwrap();
}

#[tokio::test]
async fn test_canceled_slot_can_be_rebooked() {
    let h = harness();
    let appointment = h.service.create_appointment(&patient("amna"), request("amna", 20, "2:00 PM")).await.unwrap();

    let canceled = h
        .service
        .cancel_appointment(&patient("amna"), appointment.id, CancelAppointmentRequest::default())
        .await
        .unwrap();
    assert_eq!(canceled.status, AppointmentStatus::Canceled);

    h.service.create_appointment(&patient("bilal"), request("bilal", 20, "2:00 PM")).await.unwrap();
}

#[tokio::test]
async fn test_finished_appointments_are_immutable() {
    let h = harness();
    let appointment = h.service.create_appointment(&patient("amna"), request("amna", 20, "2:00 PM")).await.unwrap();
    h.service.accept_appointment(&therapist(), appointment.id).await.unwrap();
    let finished = h.service.finish_appointment(&therapist(), appointment.id).await.unwrap();
    assert_eq!(finished.status, AppointmentStatus::Finished);

    let reschedule = h
        .service
        .reschedule_appointment(
            &patient("amna"),
            appointment.id,
            RescheduleAppointmentRequest {
                new_date: date(23),
                new_time: "11:00 AM".parse().unwrap(),
                reason: None,
                acting_role: None,
            },
        )
        .await;
    assert_matches!(reschedule, Err(AppointmentError::InvalidStatusTransition { .. }));
    assert_matches!(
        h.service
            .cancel_appointment(&patient("amna"), appointment.id, CancelAppointmentRequest::default())
            .await,
        Err(AppointmentError::InvalidStatusTransition { .. })
    );

    let stored = h.service.get_appointment(&patient("amna"), appointment.id).await.unwrap();
    assert_eq!(stored.status, AppointmentStatus::Finished);
    assert_eq!(stored.date, date(20));
    assert_eq!(stored.time.label(), "2:00 PM");
}

#[tokio::test]
async fn test_listing_finishes_overdue_sessions() {
    let mut h = harness();
    let appointment = h.service.create_appointment(&patient("amna"), request("amna", 20, "2:00 PM")).await.unwrap();
    h.service.accept_appointment(&therapist(), appointment.id).await.unwrap();

    // Session runs 2:00-3:00 PM on the 20th.
    h.advance(Duration::hours(29) + Duration::minutes(30));
    let views = h.service.list_appointments(&patient("amna"), "amna", PartyRole::Patient).await.unwrap();
    assert_eq!(views[0].appointment.status, AppointmentStatus::Accepted);
    assert_eq!(views[0].therapist_full_name, "Dr. Sara Malik");
    assert_eq!(views[0].available_actions.len(), 3);

    drain(&mut h.notifications);
    h.advance(Duration::minutes(30));
    let views = h.service.list_appointments(&patient("amna"), "amna", PartyRole::Patient).await.unwrap();
    assert_eq!(views[0].appointment.status, AppointmentStatus::Finished);
    assert!(views[0].available_actions.is_empty());

    let sent = drain(&mut h.notifications);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].message, "Appointment on 2026-10-20 at 2:00 PM has been marked as finished.");
}

#[tokio::test]
async fn test_sweeper_pass_only_touches_accepted_sessions() {
    let h = harness();
    let accepted = h.service.create_appointment(&patient("amna"), request("amna", 19, "10:00 AM")).await.unwrap();
    h.service.accept_appointment(&therapist(), accepted.id).await.unwrap();
    let pending = h.service.create_appointment(&patient("bilal"), request("bilal", 19, "11:00 AM")).await.unwrap();

    h.advance(Duration::hours(5));
    assert_eq!(h.service.finish_overdue().await.unwrap(), 1);
    assert_eq!(h.service.finish_overdue().await.unwrap(), 0);

    let admin = TestUser::admin("ops").to_user();
    assert_eq!(
        h.service.get_appointment(&admin, accepted.id).await.unwrap().status,
        AppointmentStatus::Finished
    );
    assert_eq!(
        h.service.get_appointment(&admin, pending.id).await.unwrap().status,
        AppointmentStatus::Pending
    );
}

#[tokio::test]
async fn test_session_notes_are_therapist_only() {
    let h = harness();
    let appointment = h.service.create_appointment(&patient("amna"), request("amna", 20, "2:00 PM")).await.unwrap();

    assert_matches!(
        h.service.add_session_note(&patient("amna"), appointment.id, "hello").await,
        Err(AppointmentError::Unauthorized(_))
    );
    assert_matches!(
        h.service.add_session_note(&therapist(), appointment.id, "   ").await,
        Err(AppointmentError::ValidationError(_))
    );

    h.service.add_session_note(&therapist(), appointment.id, "Discussed sleep routine").await.unwrap();
    let updated = h.service.add_session_note(&therapist(), appointment.id, "Follow up in two weeks").await.unwrap();
    assert_eq!(updated.session_notes.len(), 2);
    assert_eq!(updated.status, AppointmentStatus::Pending);

    assert_matches!(
        h.service.delete_session_note(&therapist(), appointment.id, 5).await,
        Err(AppointmentError::InvalidNoteIndex)
    );
    let trimmed = h.service.delete_session_note(&therapist(), appointment.id, 0).await.unwrap();
    assert_eq!(trimmed.session_notes[0].note, "Follow up in two weeks");
}

#[tokio::test]
async fn test_patient_history_is_paginated() {
    let h = harness();
    for hour in 9..15 {
        let time = format!("{:02}:00", hour);
        let appointment = h.service.create_appointment(&patient("amna"), request("amna", 20, &time)).await.unwrap();
        h.service
            .cancel_appointment(&patient("amna"), appointment.id, CancelAppointmentRequest::default())
            .await
            .unwrap();
    }
    h.service.create_appointment(&patient("bilal"), request("bilal", 21, "9:00 AM")).await.unwrap();

    let first = h.service.patient_appointments(&therapist(), "drsara", "amna", 1).await.unwrap();
    assert_eq!(first.total, 6);
    assert_eq!(first.total_pages, 2);
    assert_eq!(first.appointments.len(), PATIENT_HISTORY_PAGE_SIZE);
    assert!(first.appointments.iter().all(|view| view.appointment.patient_username == "amna"));

    let second = h.service.patient_appointments(&therapist(), "drsara", "amna", 2).await.unwrap();
    assert_eq!(second.appointments.len(), 1);
    let on_second = second.appointments[0].appointment.id;
    assert!(first.appointments.iter().all(|view| view.appointment.id != on_second));

    let patients = h.service.list_patients(&therapist(), "drsara").await.unwrap();
    let names: Vec<&str> = patients.iter().map(|p| p.username.as_str()).collect();
    assert_eq!(names, vec!["amna", "bilal"]);

    assert_matches!(
        h.service.patient_appointments(&patient("amna"), "drsara", "amna", 1).await,
        Err(AppointmentError::Unauthorized(_))
    );
}

#[tokio::test]
async fn test_only_a_treating_therapist_writes_the_care_plan() {
    let mut all = profiles(&["amna", "bilal"], vec![]);
    all.push(UserProfile::new("drkhan", UserRole::Therapist));
    let h = harness_with(all, now());
    h.service.create_appointment(&patient("amna"), request("amna", 20, "2:00 PM")).await.unwrap();

    let update = CarePlanUpdate {
        therapy_plan: Some(vec!["Journal daily".into()]),
        past_session_summary: None,
    };

    let stranger = TestUser::therapist("drkhan").to_user();
    assert_matches!(
        h.service.manage_patient(&stranger, "amna", update.clone()).await,
        Err(AppointmentError::Unauthorized(_))
    );
    assert_matches!(
        h.service.manage_patient(&patient("amna"), "amna", update.clone()).await,
        Err(AppointmentError::Unauthorized(_))
    );

    let profile = h.service.manage_patient(&therapist(), "amna", update).await.unwrap();
    assert_eq!(profile.therapy_plan, vec!["Journal daily"]);
}

#[tokio::test]
async fn test_queued_notifications_are_stored_after_shutdown() {
    let config = TestConfig::default().to_app_config();
    let store = Arc::new(InMemoryNotificationStore::new());
    let (notifier, worker) = NotificationDispatcher::spawn(store.clone(), 1);
    let users = Arc::new(UserService::new(Arc::new(InMemoryUserDirectory::with_profiles(profiles(&["amna"], vec![])))));
    let fixed = now();
    let service = Arc::new(AppointmentBookingService::with_clock(
        &config,
        Arc::new(InMemoryAppointmentStore::new()),
        users,
        notifier,
        Arc::new(move || fixed),
    ));
    let sweeper = spawn_finish_sweeper(Arc::clone(&service), std::time::Duration::from_secs(3600));

    service.create_appointment(&patient("amna"), request("amna", 20, "2:00 PM")).await.unwrap();

    sweeper.abort();
    let _ = sweeper.await;
    drop(service);
    tokio::time::timeout(std::time::Duration::from_secs(5), worker)
        .await
        .expect("worker exits once every dispatcher is dropped")
        .unwrap();

    assert_eq!(store.unread_count("amna").await.unwrap(), 1);
    assert_eq!(store.unread_count("drsara").await.unwrap(), 1);
}
