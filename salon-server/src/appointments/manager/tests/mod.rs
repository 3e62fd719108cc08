use super::*;
use chrono::{Datelike, Duration, Utc};
use shared::CommandErrorCode;
use shared::appointment::{DecisionParty, PartyDecision, RequesterRole};
use shared::models::{Chair, PricingMode, ServiceOffering, WorkingHours};

fn create_test_manager() -> AppointmentsManager {
    let storage = AppointmentStorage::open_in_memory().unwrap();
    let mut manager = AppointmentsManager::with_storage(storage);
    manager.set_catalog_service(Arc::new(test_catalog()));
    manager
}

/// Catalog with one dual-party chair, one store-only chair and one
/// deactivated chair, all open Mondays 09:00-17:00.
fn test_catalog() -> CatalogService {
    let catalog = CatalogService::new();
    catalog.upsert_chair(Chair {
        id: "chair-1".to_string(),
        name: "Window Chair".to_string(),
        store_id: Some("store-1".to_string()),
        provider_id: Some("provider-1".to_string()),
        pricing_mode: PricingMode::Rent,
        pricing_value: 50.0,
        is_active: true,
    });
    catalog.upsert_chair(Chair {
        id: "chair-2".to_string(),
        name: "Corner Chair".to_string(),
        store_id: Some("store-1".to_string()),
        provider_id: None,
        pricing_mode: PricingMode::Rent,
        pricing_value: 40.0,
        is_active: true,
    });
    catalog.upsert_chair(Chair {
        id: "chair-3".to_string(),
        name: "Retired Chair".to_string(),
        store_id: Some("store-1".to_string()),
        provider_id: None,
        pricing_mode: PricingMode::Rent,
        pricing_value: 40.0,
        is_active: false,
    });
    for chair_id in ["chair-1", "chair-2", "chair-3"] {
        catalog.set_working_hours(
            chair_id,
            vec![WorkingHours {
                chair_id: chair_id.to_string(),
                day_of_week: 1,
                open_time: "09:00".to_string(),
                close_time: "17:00".to_string(),
                is_closed: false,
            }],
        );
    }
    catalog.upsert_offering(ServiceOffering {
        id: "cut".to_string(),
        name: "Haircut".to_string(),
        owner_id: "provider-1".to_string(),
        price: 30.0,
        duration_minutes: Some(60),
        is_active: true,
    });
    catalog.upsert_offering(ServiceOffering {
        id: "perm".to_string(),
        name: "Perm".to_string(),
        owner_id: "provider-1".to_string(),
        price: 80.0,
        duration_minutes: Some(120),
        is_active: false,
    });
    catalog
}

/// Next occurrence of the given weekday (0 = Sunday), at least a week out
/// so every slot of the day lies in the future regardless of wall clock.
fn future_date(target_weekday: u8) -> String {
    let today = Utc::now().date_naive();
    let current = today.weekday().num_days_from_sunday() as i64;
    let days_ahead = (target_weekday as i64 - current).rem_euclid(7) + 7;
    (today + Duration::days(days_ahead))
        .format("%Y-%m-%d")
        .to_string()
}

fn next_monday() -> String {
    future_date(1)
}

fn create_cmd(
    chair_id: &str,
    date: &str,
    start_time: &str,
    slot_count: u32,
    offering_ids: Vec<String>,
) -> AppointmentCommand {
    AppointmentCommand::new(
        "cust-1",
        "Alice Customer",
        AppointmentCommandPayload::CreateAppointment {
            chair_id: chair_id.to_string(),
            customer_id: "cust-1".to_string(),
            customer_name: "Alice Customer".to_string(),
            requester_role: RequesterRole::Customer,
            date: date.to_string(),
            start_time: start_time.to_string(),
            slot_count,
            offering_ids,
        },
    )
}

fn decision_cmd(
    operator_id: &str,
    appointment_id: &str,
    party: DecisionParty,
    decision: PartyDecision,
) -> AppointmentCommand {
    AppointmentCommand::new(
        operator_id,
        operator_id,
        AppointmentCommandPayload::SubmitDecision {
            appointment_id: appointment_id.to_string(),
            party,
            decision,
        },
    )
}

/// Book on chair-1 and return the new appointment id
fn book(manager: &AppointmentsManager, date: &str, start_time: &str, slot_count: u32) -> String {
    let resp = manager.execute_command(create_cmd("chair-1", date, start_time, slot_count, vec![]));
    assert!(resp.success, "booking failed: {:?}", resp.error);
    resp.appointment_id.unwrap()
}

fn error_code(resp: &CommandResponse) -> CommandErrorCode {
    resp.error.as_ref().expect("expected an error").code.clone()
}

mod test_core;
