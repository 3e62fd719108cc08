// salon-server/tests/booking_flow.rs
// 集成测试: 内存总线上的预约与聊天全流程
//
// A real server (temp databases, seeded catalog, background tasks) talks to
// real chairbook-client instances over the in-process transport, so every
// command crosses the same processors and relays a TCP client would hit.

use std::sync::Arc;
use std::time::Duration;

use chairbook_client::{ChatThreadSynchronizer, ClientConfig, ClientError, MessageClient};
use salon_server::core::BackgroundTasks;
use salon_server::{Config, ServerState};
use shared::appointment::{
    AppointmentCommand, AppointmentCommandPayload, AppointmentSnapshot, AppointmentStatus,
    DecisionParty, PartyDecision, RequesterRole,
};
use shared::message::{BusMessage, EventType, ResponsePayload, SyncPayload};
use shared::models::{Chair, ChairDay, PricingMode, ServiceOffering, WorkingHours};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;

/// Far-future Monday so the grid check against the real clock never trips
const BOOKING_DATE: &str = "2031-05-05";

struct TestServer {
    state: Arc<ServerState>,
    _tasks: BackgroundTasks,
    _work_dir: TempDir,
}

fn start_server() -> TestServer {
    let work_dir = TempDir::new().unwrap();
    let config = Config::with_overrides(work_dir.path().to_string_lossy(), 0);
    let state = Arc::new(ServerState::initialize(config).unwrap());
    seed_catalog(&state);
    let tasks = state.start_background_tasks();
    TestServer {
        state,
        _tasks: tasks,
        _work_dir: work_dir,
    }
}

/// One rent-mode chair, open 09:00-17:00 every day of the week
fn seed_catalog(state: &ServerState) {
    state.catalog.upsert_chair(Chair {
        id: "chair-1".to_string(),
        name: "Window Chair".to_string(),
        store_id: Some("store-1".to_string()),
        provider_id: Some("provider-1".to_string()),
        pricing_mode: PricingMode::Rent,
        pricing_value: 50.0,
        is_active: true,
    });
    let hours = (0..7)
        .map(|day| WorkingHours {
            chair_id: "chair-1".to_string(),
            day_of_week: day,
            open_time: "09:00".to_string(),
            close_time: "17:00".to_string(),
            is_closed: false,
        })
        .collect();
    state.catalog.set_working_hours("chair-1", hours);
    state.catalog.upsert_offering(ServiceOffering {
        id: "cut".to_string(),
        name: "Haircut".to_string(),
        owner_id: "store-1".to_string(),
        price: 25.0,
        duration_minutes: Some(60),
        is_active: true,
    });
}

async fn connect(state: &Arc<ServerState>, client_id: &str) -> MessageClient {
    let config = ClientConfig::new("in-process")
        .with_client_id(client_id)
        .with_timeout(5);
    let client = MessageClient::memory(config, state.bus.sender(), state.bus.sender_to_server());
    client.handshake().await.unwrap();
    client
}

async fn execute(
    client: &MessageClient,
    action: &str,
    command: &AppointmentCommand,
) -> ResponsePayload {
    client
        .send_command(action, Some(serde_json::to_value(command).unwrap()))
        .await
        .unwrap()
}

async fn snapshot_of(client: &MessageClient, appointment_id: &str) -> AppointmentSnapshot {
    let response = client
        .send_command(
            "appointments.get",
            Some(serde_json::json!({ "appointment_id": appointment_id })),
        )
        .await
        .unwrap();
    assert!(response.success, "{}", response.message);
    serde_json::from_value(response.data.unwrap()).unwrap()
}

async fn day_of(client: &MessageClient, date: &str) -> ChairDay {
    let response = client
        .send_command(
            "availability.day",
            Some(serde_json::json!({ "chair_id": "chair-1", "date": date })),
        )
        .await
        .unwrap();
    assert!(response.success, "{}", response.message);
    serde_json::from_value(response.data.unwrap()).unwrap()
}

fn booked(day: &ChairDay, start: &str) -> bool {
    day.slots
        .iter()
        .find(|slot| slot.start == start)
        .unwrap()
        .is_booked
}

fn create_command(start_time: &str, slot_count: u32) -> AppointmentCommand {
    AppointmentCommand::new(
        "cust-1",
        "Alice Wu",
        AppointmentCommandPayload::CreateAppointment {
            chair_id: "chair-1".to_string(),
            customer_id: "cust-1".to_string(),
            customer_name: "Alice Wu".to_string(),
            requester_role: RequesterRole::Customer,
            date: BOOKING_DATE.to_string(),
            start_time: start_time.to_string(),
            slot_count,
            offering_ids: vec!["cut".to_string()],
        },
    )
}

fn approval_command(appointment_id: &str, party: DecisionParty) -> AppointmentCommand {
    AppointmentCommand::new(
        "desk-1",
        "Front Desk",
        AppointmentCommandPayload::SubmitDecision {
            appointment_id: appointment_id.to_string(),
            party,
            decision: PartyDecision::Approved,
        },
    )
}

fn cancel_command(appointment_id: &str, reason: Option<&str>) -> AppointmentCommand {
    AppointmentCommand::new(
        "cust-1",
        "Alice Wu",
        AppointmentCommandPayload::CancelAppointment {
            appointment_id: appointment_id.to_string(),
            cancelling_user_id: "cust-1".to_string(),
            reason: reason.map(String::from),
        },
    )
}

fn created_appointment_id(response: &ResponsePayload) -> String {
    assert!(response.success, "{}", response.message);
    response.data.as_ref().unwrap()["appointment_id"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Wait for the next sync push matching a resource/action pair
async fn wait_for_sync(
    pushes: &mut broadcast::Receiver<BusMessage>,
    resource: &str,
    action: &str,
) -> SyncPayload {
    timeout(Duration::from_secs(5), async {
        loop {
            let msg = pushes.recv().await.unwrap();
            if msg.event_type != EventType::Sync {
                continue;
            }
            let payload: SyncPayload = msg.parse_payload().unwrap();
            if payload.resource == resource && payload.action == action {
                return payload;
            }
        }
    })
    .await
    .expect("sync push should arrive")
}

#[tokio::test]
async fn test_booking_lifecycle_over_the_bus() {
    let server = start_server();
    let client = connect(&server.state, "conn-cust").await;
    let mut pushes = client.subscribe();

    // Seeded catalog is visible over the wire
    let chairs = client.send_command("catalog.chairs", None).await.unwrap();
    assert!(chairs.success, "{}", chairs.message);
    assert_eq!(chairs.data.unwrap().as_array().unwrap().len(), 1);

    // 09:00-17:00 gives eight hourly slots, all free
    let day = day_of(&client, BOOKING_DATE).await;
    assert_eq!(day.slots.len(), 8);
    assert!(!booked(&day, "10:00"));

    // Book 10:00-12:00
    let created = execute(&client, "create_appointment", &create_command("10:00", 2)).await;
    let appointment_id = created_appointment_id(&created);

    let push = wait_for_sync(&mut pushes, "appointments", "created").await;
    assert_eq!(push.id, appointment_id);
    assert_eq!(push.version, 1);

    let snapshot = snapshot_of(&client, &appointment_id).await;
    assert_eq!(snapshot.status, AppointmentStatus::Pending);
    assert_eq!(snapshot.end_time, "12:00");
    // RENT 50.0 x 2 slots; the selected offering does not change the total
    assert_eq!(snapshot.total_price, 100.0);

    // The block now occupies the calendar
    let day = day_of(&client, BOOKING_DATE).await;
    assert!(booked(&day, "10:00"));
    assert!(booked(&day, "11:00"));
    assert!(!booked(&day, "12:00"));

    // A second booking over the same block is refused
    let overlap = execute(&client, "create_appointment", &create_command("11:00", 1)).await;
    assert!(!overlap.success);
    assert_eq!(overlap.error_code.as_deref(), Some("SLOT_UNAVAILABLE"));

    // Store approval alone keeps the appointment pending
    let stored = execute(
        &client,
        "submit_decision",
        &approval_command(&appointment_id, DecisionParty::Store),
    )
    .await;
    assert!(stored.success, "{}", stored.message);
    let snapshot = snapshot_of(&client, &appointment_id).await;
    assert_eq!(snapshot.status, AppointmentStatus::Pending);
    assert_eq!(snapshot.store_decision, PartyDecision::Approved);

    // Provider approval completes the pair
    let approved = execute(
        &client,
        "submit_decision",
        &approval_command(&appointment_id, DecisionParty::Provider),
    )
    .await;
    assert!(approved.success, "{}", approved.message);
    let snapshot = snapshot_of(&client, &appointment_id).await;
    assert_eq!(snapshot.status, AppointmentStatus::Approved);
    assert!(snapshot.approved_at.is_some());

    // The scheduled end is years away, so completion is premature
    let complete = AppointmentCommand::new(
        "desk-1",
        "Front Desk",
        AppointmentCommandPayload::CompleteAppointment {
            appointment_id: appointment_id.clone(),
        },
    );
    let early = execute(&client, "complete_appointment", &complete).await;
    assert!(!early.success);
    assert_eq!(early.error_code.as_deref(), Some("INVALID_TRANSITION"));

    // Cancelling releases the block
    let cancelled = execute(
        &client,
        "cancel_appointment",
        &cancel_command(&appointment_id, Some("change of plans")),
    )
    .await;
    assert!(cancelled.success, "{}", cancelled.message);

    // created + two decisions + cancel = four events on the global log
    let push = wait_for_sync(&mut pushes, "appointments", "cancelled").await;
    assert_eq!(push.id, appointment_id);
    assert_eq!(push.version, 4);

    let snapshot = snapshot_of(&client, &appointment_id).await;
    assert_eq!(snapshot.status, AppointmentStatus::Cancelled);
    assert_eq!(snapshot.cancelled_by.as_deref(), Some("cust-1"));

    let day = day_of(&client, BOOKING_DATE).await;
    assert!(!booked(&day, "10:00"));
    assert!(!booked(&day, "11:00"));

    // Storage agrees with the wire: four events from four accepted commands,
    // one snapshot, nothing left active. Refused commands left no trace.
    let storage = server.state.manager.storage();
    let stats = storage.get_stats().unwrap();
    assert_eq!(stats.event_count, 4);
    assert_eq!(stats.current_sequence, 4);
    assert_eq!(stats.processed_command_count, 4);
    assert_eq!(stats.snapshot_count, 1);
    assert_eq!(stats.active_appointment_count, 0);
    assert_eq!(storage.get_all_snapshots().unwrap().len(), 1);

    // Replaying the event log reproduces the stored snapshot exactly
    let stored = storage.get_snapshot(&appointment_id).unwrap().unwrap();
    let rebuilt = server.state.manager.rebuild_snapshot(&appointment_id).unwrap();
    assert_eq!(rebuilt, stored);

    client.close().await.unwrap();
    server.state.bus.shutdown();
}

#[tokio::test]
async fn test_chat_thread_follows_appointment_over_the_bus() {
    let server = start_server();
    let customer = connect(&server.state, "conn-cust").await;
    let provider = connect(&server.state, "conn-prov").await;

    let created = execute(&customer, "create_appointment", &create_command("13:00", 1)).await;
    let appointment_id = created_appointment_id(&created);

    // No thread exists until someone writes
    let none = customer
        .send_command(
            "chat.thread_by_appointment",
            Some(serde_json::json!({ "appointment_id": appointment_id, "viewer": "cust-1" })),
        )
        .await
        .unwrap();
    assert!(none.success, "{}", none.message);
    assert!(none.data.unwrap().is_null());

    // The first message materializes the thread
    let sent = customer
        .send_command(
            "send_message",
            Some(serde_json::json!({
                "appointment_id": appointment_id,
                "sender_user_id": "cust-1",
                "text": "see you at one"
            })),
        )
        .await
        .unwrap();
    assert!(sent.success, "{}", sent.message);

    // The provider opens it by appointment and finds the history
    let mut provider_pushes = provider.subscribe();
    let mut chat =
        ChatThreadSynchronizer::open_for_appointment(provider.clone(), "provider-1", &appointment_id)
            .await
            .unwrap();
    assert_eq!(chat.messages().len(), 1);
    assert_eq!(chat.messages()[0].text, "see you at one");
    assert_eq!(chat.thread().status, Some(AppointmentStatus::Pending));
    assert!(chat.can_send());

    let reply = chat.send_message("on my way").await.unwrap();
    assert_eq!(reply.sender_user_id, "provider-1");
    assert_eq!(chat.messages().len(), 2);

    // The customer cancels; the push feed closes the provider's composer
    let cancelled = execute(
        &customer,
        "cancel_appointment",
        &cancel_command(&appointment_id, None),
    )
    .await;
    assert!(cancelled.success, "{}", cancelled.message);

    timeout(Duration::from_secs(5), async {
        while chat.can_send() {
            let msg = provider_pushes.recv().await.unwrap();
            chat.handle_event(&msg).await.unwrap();
        }
    })
    .await
    .expect("cancellation sync should close the thread");

    assert_eq!(
        chat.appointment().map(|s| s.status),
        Some(AppointmentStatus::Cancelled)
    );
    let err = chat.send_message("too late").await.unwrap_err();
    assert!(matches!(err, ClientError::ThreadClosed(_)));

    // The server refuses a raw send as well
    let refused = customer
        .send_command(
            "send_message",
            Some(serde_json::json!({
                "appointment_id": appointment_id,
                "sender_user_id": "cust-1",
                "text": "hello?"
            })),
        )
        .await
        .unwrap();
    assert!(!refused.success);
    assert_eq!(refused.error_code.as_deref(), Some("SEND_NOT_ALLOWED"));

    customer.close().await.unwrap();
    provider.close().await.unwrap();
    server.state.bus.shutdown();
}
