use super::*;
use shared::appointment::AppointmentEventType;

#[test]
fn test_create_appointment() {
    let manager = create_test_manager();
    let date = next_monday();

    let response = manager.execute_command(create_cmd("chair-1", &date, "09:00", 2, vec![]));

    assert!(response.success);
    let appointment_id = response.appointment_id.unwrap();
    let snapshot = manager.get_snapshot(&appointment_id).unwrap().unwrap();

    assert_eq!(snapshot.status, AppointmentStatus::Pending);
    assert_eq!(snapshot.chair_id.as_deref(), Some("chair-1"));
    assert_eq!(snapshot.chair_name.as_deref(), Some("Window Chair"));
    assert_eq!(snapshot.store_id.as_deref(), Some("store-1"));
    assert_eq!(snapshot.provider_id.as_deref(), Some("provider-1"));
    assert_eq!(snapshot.date, date);
    assert_eq!(snapshot.start_time, "09:00");
    assert_eq!(snapshot.end_time, "11:00");
    assert_eq!(snapshot.slot_count, 2);
    assert_eq!(snapshot.total_price, 100.0);
    assert_eq!(snapshot.store_decision, PartyDecision::Pending);
    assert_eq!(snapshot.provider_decision, PartyDecision::Pending);
    assert!(snapshot.responsibility.store);
    assert!(snapshot.responsibility.provider);
    assert!(snapshot.pending_expires_at > snapshot.created_at);
}

#[test]
fn test_idempotency() {
    let manager = create_test_manager();
    let cmd = create_cmd("chair-1", &next_monday(), "09:00", 1, vec![]);

    let response1 = manager.execute_command(cmd.clone());
    assert!(response1.success);
    assert!(response1.appointment_id.is_some());

    // Execute same command again
    let response2 = manager.execute_command(cmd);
    assert!(response2.success);
    assert_eq!(response2.appointment_id, None); // Duplicate returns no id

    // Should still only have one appointment
    let active = manager.get_active_appointments().unwrap();
    assert_eq!(active.len(), 1);
}

#[test]
fn test_unknown_chair() {
    let manager = create_test_manager();

    let response =
        manager.execute_command(create_cmd("chair-99", &next_monday(), "09:00", 1, vec![]));

    assert!(!response.success);
    assert_eq!(error_code(&response), CommandErrorCode::ValidationError);
}

#[test]
fn test_inactive_chair() {
    let manager = create_test_manager();

    let response =
        manager.execute_command(create_cmd("chair-3", &next_monday(), "09:00", 1, vec![]));

    assert!(!response.success);
    assert_eq!(error_code(&response), CommandErrorCode::SlotUnavailable);
}

#[test]
fn test_closed_day() {
    let manager = create_test_manager();
    // No working hours seeded for Tuesdays
    let tuesday = future_date(2);

    let response = manager.execute_command(create_cmd("chair-1", &tuesday, "09:00", 1, vec![]));

    assert!(!response.success);
    assert_eq!(error_code(&response), CommandErrorCode::SlotUnavailable);
}

#[test]
fn test_unknown_offering() {
    let manager = create_test_manager();

    let response = manager.execute_command(create_cmd(
        "chair-1",
        &next_monday(),
        "09:00",
        1,
        vec!["facial".to_string()],
    ));

    assert!(!response.success);
    assert_eq!(error_code(&response), CommandErrorCode::ValidationError);
}

#[test]
fn test_inactive_offering() {
    let manager = create_test_manager();

    let response = manager.execute_command(create_cmd(
        "chair-1",
        &next_monday(),
        "09:00",
        1,
        vec!["perm".to_string()],
    ));

    assert!(!response.success);
    assert_eq!(error_code(&response), CommandErrorCode::ValidationError);
}

#[test]
fn test_offerings_recorded_under_rent_pricing() {
    let manager = create_test_manager();

    let response = manager.execute_command(create_cmd(
        "chair-1",
        &next_monday(),
        "09:00",
        2,
        vec!["cut".to_string()],
    ));

    assert!(response.success);
    let snapshot = manager
        .get_snapshot(&response.appointment_id.unwrap())
        .unwrap()
        .unwrap();
    // Rent pricing charges per slot; offerings are recorded but not billed
    assert_eq!(snapshot.offering_ids, vec!["cut".to_string()]);
    assert_eq!(snapshot.total_price, 100.0);
}

#[test]
fn test_double_booking_rejected() {
    let manager = create_test_manager();
    let date = next_monday();
    book(&manager, &date, "09:00", 2);

    // 10:00 falls inside the booked 09:00-11:00 block
    let response = manager.execute_command(create_cmd("chair-1", &date, "10:00", 1, vec![]));

    assert!(!response.success);
    assert_eq!(error_code(&response), CommandErrorCode::SlotUnavailable);
}

#[test]
fn test_adjacent_booking_allowed() {
    let manager = create_test_manager();
    let date = next_monday();
    book(&manager, &date, "09:00", 2);

    let response = manager.execute_command(create_cmd("chair-1", &date, "11:00", 1, vec![]));

    assert!(response.success, "adjacent block rejected: {:?}", response.error);
}

#[test]
fn test_day_bookings_indexed() {
    let manager = create_test_manager();
    let date = next_monday();
    let first = book(&manager, &date, "09:00", 1);
    let second = book(&manager, &date, "14:00", 2);

    let mut ids: Vec<String> = manager
        .get_day_bookings("chair-1", &date)
        .unwrap()
        .into_iter()
        .map(|s| s.appointment_id)
        .collect();
    ids.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(ids, expected);

    // Other days stay empty
    assert!(
        manager
            .get_day_bookings("chair-1", &future_date(3))
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_sequence_and_event_log() {
    let manager = create_test_manager();
    let appointment_id = book(&manager, &next_monday(), "09:00", 1);
    let resp = manager.execute_command(decision_cmd(
        "store-1",
        &appointment_id,
        DecisionParty::Store,
        PartyDecision::Approved,
    ));
    assert!(resp.success);

    assert_eq!(manager.get_current_sequence().unwrap(), 2);

    let events = manager.get_events_since(0).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].sequence, 1);
    assert_eq!(events[0].event_type, AppointmentEventType::AppointmentCreated);
    assert_eq!(events[1].sequence, 2);
    assert_eq!(events[1].event_type, AppointmentEventType::DecisionSubmitted);

    let history = manager.get_events_for_appointment(&appointment_id).unwrap();
    assert_eq!(history.len(), 2);
}

#[test]
fn test_event_broadcast() {
    let manager = create_test_manager();
    let mut rx = manager.subscribe();

    let appointment_id = book(&manager, &next_monday(), "09:00", 1);

    let event = rx.try_recv().unwrap();
    assert_eq!(event.event_type, AppointmentEventType::AppointmentCreated);
    assert_eq!(event.appointment_id, appointment_id);
}
