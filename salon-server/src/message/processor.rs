//! 消息处理器架构
//!
//! Incoming bus messages are routed by event type to a registered
//! [`MessageProcessor`]. Each processor owns one event type:
//!
//! | Processor | EventType | 职责 |
//! |-----------|-----------|------|
//! | [`HandshakeProcessor`] | `Handshake` | protocol version check, session info |
//! | [`RequestCommandProcessor`] | `RequestCommand` | command/query dispatch |
//! | [`TypingProcessor`] | `Typing` | typing indicator relay |
//!
//! Processors answer over the bus themselves: replies carry the request's
//! `request_id` as `correlation_id` and the request's `source` as `target`,
//! so only the asking client picks them up. A failed business operation is
//! still a *successful* processing run (the error travels inside the
//! response payload); `Err` from [`MessageProcessor::process`] is reserved
//! for infrastructure faults and drives the retry machinery.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use shared::CommandError;
use shared::appointment::{AppointmentCommand, AppointmentCommandPayload, SyncRequest, SyncResponse};
use shared::message::{
    BusMessage, EventType, HandshakePayload, PROTOCOL_VERSION, RequestCommandPayload,
    ResponsePayload, TypingPayload,
};
use shared::models::{ChatMessageInput, Participant};

use crate::core::state::ServerState;
use crate::utils::{AppError, AppResult};

// ========== Processing Result ==========

/// Result of processing a message
#[derive(Debug, Clone)]
pub enum ProcessResult {
    /// Successfully processed
    Success { message: Option<String> },
    /// Processing failed but can be retried
    Retry { reason: String, retry_count: u32 },
    /// Processing failed permanently
    Failed { reason: String },
    /// Message was skipped (not applicable)
    Skipped { reason: String },
}

impl ProcessResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessResult::Success { .. })
    }

    pub fn should_retry(&self) -> bool {
        matches!(self, ProcessResult::Retry { .. })
    }
}

// ========== Processor Trait ==========

/// Trait for message processors
///
/// Implementations handle one event type each.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    /// The event type this processor handles
    fn event_type(&self) -> EventType;

    /// Process a message
    async fn process(&self, message: &BusMessage) -> Result<ProcessResult, AppError>;

    /// Check if this message is a duplicate (already processed)
    fn is_duplicate(&self, _message: &BusMessage) -> bool {
        false
    }

    /// Maximum retry attempts for infrastructure failures
    fn max_retries(&self) -> u32 {
        3
    }

    /// Base delay between retries in milliseconds
    fn retry_delay_ms(&self) -> u64 {
        1000
    }
}

// ========== Handshake Processor ==========

/// Answers client handshakes with protocol/session information
pub struct HandshakeProcessor {
    state: Arc<ServerState>,
}

impl HandshakeProcessor {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl MessageProcessor for HandshakeProcessor {
    fn event_type(&self) -> EventType {
        EventType::Handshake
    }

    async fn process(&self, message: &BusMessage) -> Result<ProcessResult, AppError> {
        let payload: HandshakePayload = message
            .parse_payload()
            .map_err(|e| AppError::validation(format!("Malformed handshake: {}", e)))?;

        if payload.version != PROTOCOL_VERSION {
            tracing::warn!(
                client = ?payload.client_name,
                client_version = payload.version,
                server_version = PROTOCOL_VERSION,
                "Rejected handshake with protocol mismatch"
            );
            let response = ResponsePayload::error(
                format!(
                    "Unsupported protocol version {} (server speaks {})",
                    payload.version, PROTOCOL_VERSION
                ),
                Some("PROTOCOL_MISMATCH".to_string()),
            );
            respond(&self.state, message, response).await;
            return Ok(ProcessResult::Success {
                message: Some("handshake rejected".to_string()),
            });
        }

        let server_sequence = self.state.manager.storage().get_current_sequence()?;
        tracing::info!(
            client = ?payload.client_name,
            client_id = ?payload.client_id,
            "Client handshake accepted"
        );

        let response = ResponsePayload::success(
            "Welcome",
            Some(serde_json::json!({
                "server_version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
                "epoch": self.state.manager.epoch(),
                "server_sequence": server_sequence,
            })),
        );
        respond(&self.state, message, response).await;
        Ok(ProcessResult::Success { message: None })
    }
}

// ========== Request Command Processor ==========

/// Dispatches client requests to the domain services.
///
/// Lifecycle mutations are flat verbs (`create_appointment`,
/// `submit_decision`, `complete_appointment`, `cancel_appointment`,
/// `send_message`, `mark_thread_read`, `notify_typing`); the query
/// surface is namespaced (`appointments.*`, `availability.*`,
/// `catalog.*`, `chat.*`).
pub struct RequestCommandProcessor {
    state: Arc<ServerState>,
}

impl RequestCommandProcessor {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    async fn try_dispatch(
        &self,
        action: &str,
        params: Option<serde_json::Value>,
    ) -> AppResult<ResponsePayload> {
        let state = &self.state;
        match action {
            // ----- appointment lifecycle -----
            "create_appointment" | "submit_decision" | "complete_appointment"
            | "cancel_appointment" => {
                let command: AppointmentCommand = parse_params(params)?;
                let kind = command_action(&command.payload);
                if kind != action {
                    return Err(AppError::validation(format!(
                        "Action {} does not match command payload ({})",
                        action, kind
                    )));
                }
                let response = state.manager.execute_command(command);
                if response.success {
                    Ok(ResponsePayload::success(
                        "Command accepted",
                        Some(serde_json::to_value(&response)?),
                    ))
                } else {
                    let (message, code) = match &response.error {
                        Some(e) => (e.message.clone(), e.code.as_str().to_string()),
                        None => ("Command failed".to_string(), "INTERNAL_ERROR".to_string()),
                    };
                    Ok(ResponsePayload::error(message, Some(code)))
                }
            }

            // ----- appointment reads -----
            "appointments.get" => {
                let p: AppointmentParams = parse_params(params)?;
                let snapshot = state
                    .manager
                    .storage()
                    .get_snapshot(&p.appointment_id)?
                    .ok_or_else(|| AppError::AppointmentNotFound(p.appointment_id.clone()))?;
                data_response("Appointment", &snapshot)
            }
            "appointments.active" => {
                let active = state.manager.storage().get_active_appointments()?;
                data_response("Active appointments", &active)
            }
            "appointments.sync" => {
                let request: SyncRequest = parse_params(params)?;
                let response = self.sync_appointments(request)?;
                data_response("Sync", &response)
            }

            // ----- availability -----
            "availability.calendar" => data_response("Calendar", &state.availability.calendar()),
            "availability.day" => {
                let p: ChairDayParams = parse_params(params)?;
                let day = state.availability.resolve_day(&p.chair_id, &p.date)?;
                data_response("Chair availability", &day)
            }
            "availability.all" => {
                let p: DateParams = parse_params(params)?;
                let days = state.availability.resolve_all(&p.date)?;
                data_response("Availability", &days)
            }

            // ----- catalog -----
            "catalog.chairs" => data_response("Chairs", &state.catalog.list_active_chairs()),
            "catalog.offerings" => {
                data_response("Offerings", &state.catalog.list_active_offerings())
            }

            // ----- chat -----
            "send_message" => {
                let p: SendMessageParams = parse_params(params)?;
                let input = ChatMessageInput {
                    sender_user_id: p.sender_user_id,
                    text: p.text,
                };
                // An appointment id wins over a thread id: appointment
                // threads are looked up through the binding so the send
                // gate sees the live appointment status.
                let message = match (p.appointment_id.as_deref(), p.thread_id.as_deref()) {
                    (Some(appointment_id), _) => {
                        state.chat.send_to_appointment(appointment_id, input)?
                    }
                    (None, Some(thread_id)) => state.chat.send_to_thread(thread_id, input)?,
                    (None, None) => {
                        return Err(AppError::validation(
                            "send_message needs an appointment_id or a thread_id",
                        ));
                    }
                };
                data_response("Message sent", &message)
            }
            "mark_thread_read" => {
                let p: MarkReadParams = parse_params(params)?;
                state.chat.mark_read(&p.thread_id, &p.user_id)?;
                Ok(ResponsePayload::success("Read mark advanced", None))
            }
            "notify_typing" => {
                let p: TypingPayload = parse_params(params)?;
                state.chat.notify_typing(p)?;
                Ok(ResponsePayload::success("Typing state relayed", None))
            }
            "chat.threads" => {
                let p: UserParams = parse_params(params)?;
                data_response("Threads", &state.chat.threads_for_user(&p.user_id)?)
            }
            "chat.thread" => {
                let p: ThreadParams = parse_params(params)?;
                let thread = state.chat.get_thread(&p.thread_id, p.viewer.as_deref())?;
                data_response("Thread", &thread)
            }
            "chat.thread_by_appointment" => {
                let p: ThreadByAppointmentParams = parse_params(params)?;
                let thread = state
                    .chat
                    .thread_by_appointment(&p.appointment_id, p.viewer.as_deref())?;
                data_response("Thread", &thread)
            }
            "chat.messages" => {
                let p: ThreadParams = parse_params(params)?;
                data_response("Messages", &state.chat.get_messages(&p.thread_id)?)
            }
            "chat.create_favorite" => {
                let p: FavoriteThreadParams = parse_params(params)?;
                let thread = state.chat.create_favorite_thread(&p.title, p.participants)?;
                data_response("Thread created", &thread)
            }

            _ => Ok(ResponsePayload::error(
                format!("Unknown action: {}", action),
                Some("VALIDATION_ERROR".to_string()),
            )),
        }
    }

    /// Compose the catch-up reply for a reconnecting client.
    ///
    /// The event log is append-only and never pruned, so any gap behind the
    /// server head is replayable. A client claiming a sequence AHEAD of the
    /// server must have talked to a different epoch; it gets
    /// `requires_full_sync` and rebuilds from the snapshots.
    fn sync_appointments(&self, request: SyncRequest) -> AppResult<SyncResponse> {
        let storage = self.state.manager.storage();
        let server_sequence = storage.get_current_sequence()?;
        let active_appointments = storage.get_active_appointments()?;

        if request.since_sequence > server_sequence {
            tracing::warn!(
                client_sequence = request.since_sequence,
                server_sequence,
                "Client is ahead of server; forcing full sync"
            );
            return Ok(SyncResponse {
                events: Vec::new(),
                active_appointments,
                server_sequence,
                requires_full_sync: true,
            });
        }

        Ok(SyncResponse {
            events: storage.get_events_since(request.since_sequence)?,
            active_appointments,
            server_sequence,
            requires_full_sync: false,
        })
    }
}

#[async_trait]
impl MessageProcessor for RequestCommandProcessor {
    fn event_type(&self) -> EventType {
        EventType::RequestCommand
    }

    async fn process(&self, message: &BusMessage) -> Result<ProcessResult, AppError> {
        let payload: RequestCommandPayload = message
            .parse_payload()
            .map_err(|e| AppError::validation(format!("Malformed request: {}", e)))?;

        tracing::debug!(action = %payload.action, "Processing client request");

        let response = match self.try_dispatch(&payload.action, payload.params).await {
            Ok(response) => response,
            Err(e) => error_response(e),
        };

        let outcome = if response.success {
            ProcessResult::Success { message: None }
        } else {
            // delivered as a business error; nothing to retry
            ProcessResult::Success {
                message: Some(format!("{} rejected", payload.action)),
            }
        };
        respond(&self.state, message, response).await;
        Ok(outcome)
    }
}

// ========== Typing Processor ==========

/// Relays typing indicators to the other thread participants.
///
/// Typing state is transient: nothing is persisted and a stale message is
/// worthless, so failures skip instead of retrying.
pub struct TypingProcessor {
    state: Arc<ServerState>,
}

impl TypingProcessor {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl MessageProcessor for TypingProcessor {
    fn event_type(&self) -> EventType {
        EventType::Typing
    }

    async fn process(&self, message: &BusMessage) -> Result<ProcessResult, AppError> {
        let payload: TypingPayload = message
            .parse_payload()
            .map_err(|e| AppError::validation(format!("Malformed typing payload: {}", e)))?;

        match self.state.chat.notify_typing(payload) {
            Ok(()) => Ok(ProcessResult::Success { message: None }),
            Err(e) => Ok(ProcessResult::Skipped {
                reason: e.to_string(),
            }),
        }
    }

    fn max_retries(&self) -> u32 {
        0
    }
}

// ========== Helpers ==========

/// Flat action verb for a command payload, used to cross-check the
/// request action against what the client actually serialized.
fn command_action(payload: &AppointmentCommandPayload) -> &'static str {
    match payload {
        AppointmentCommandPayload::CreateAppointment { .. } => "create_appointment",
        AppointmentCommandPayload::SubmitDecision { .. } => "submit_decision",
        AppointmentCommandPayload::CompleteAppointment { .. } => "complete_appointment",
        AppointmentCommandPayload::CancelAppointment { .. } => "cancel_appointment",
    }
}

/// Publish a response correlated to the request
async fn respond(state: &ServerState, request: &BusMessage, payload: ResponsePayload) {
    match BusMessage::response(&payload) {
        Ok(msg) => {
            let mut msg = msg.with_correlation_id(request.request_id);
            if let Some(source) = &request.source {
                msg = msg.with_target(source);
            }
            if let Err(e) = state.bus.publish(msg).await {
                tracing::warn!("Failed to publish response: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("Failed to build response message: {}", e);
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<serde_json::Value>) -> AppResult<T> {
    let value = params.ok_or_else(|| AppError::validation("Missing params"))?;
    serde_json::from_value(value)
        .map_err(|e| AppError::validation(format!("Malformed params: {}", e)))
}

fn data_response<T: Serialize>(message: &str, data: &T) -> AppResult<ResponsePayload> {
    Ok(ResponsePayload::success(
        message,
        Some(serde_json::to_value(data)?),
    ))
}

fn error_response(err: AppError) -> ResponsePayload {
    let e = CommandError::from(err);
    ResponsePayload::error(e.message, Some(e.code.as_str().to_string()))
}

// ========== Param Structs ==========

#[derive(Debug, serde::Deserialize)]
struct AppointmentParams {
    appointment_id: String,
}

#[derive(Debug, serde::Deserialize)]
struct ChairDayParams {
    chair_id: String,
    date: String,
}

#[derive(Debug, serde::Deserialize)]
struct DateParams {
    date: String,
}

#[derive(Debug, serde::Deserialize)]
struct SendMessageParams {
    #[serde(default)]
    appointment_id: Option<String>,
    #[serde(default)]
    thread_id: Option<String>,
    sender_user_id: String,
    text: String,
}

#[derive(Debug, serde::Deserialize)]
struct MarkReadParams {
    thread_id: String,
    user_id: String,
}

#[derive(Debug, serde::Deserialize)]
struct UserParams {
    user_id: String,
}

#[derive(Debug, serde::Deserialize)]
struct ThreadParams {
    thread_id: String,
    #[serde(default)]
    viewer: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ThreadByAppointmentParams {
    appointment_id: String,
    #[serde(default)]
    viewer: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct FavoriteThreadParams {
    title: String,
    participants: Vec<Participant>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointments::{AppointmentStorage, AppointmentsManager};
    use crate::catalog::CatalogService;
    use crate::chat::{ChatService, ChatStorage};
    use crate::core::config::Config;
    use crate::core::state::ResourceVersions;
    use crate::message::MessageBus;
    use crate::scheduling::SlotAvailabilityResolver;
    use shared::models::{Chair, ParticipantRole, PricingMode};

    fn test_state() -> Arc<ServerState> {
        let catalog = Arc::new(CatalogService::new());
        let mut manager = AppointmentsManager::with_storage(
            AppointmentStorage::open_in_memory().expect("in-memory appointment store"),
        );
        manager.set_catalog_service(catalog.clone());
        let manager = Arc::new(manager);
        let chat = Arc::new(ChatService::with_storage(
            ChatStorage::open_in_memory().expect("in-memory chat store"),
            manager.clone(),
        ));
        let availability =
            SlotAvailabilityResolver::new(catalog.clone(), manager.clone(), chrono_tz::UTC);

        Arc::new(ServerState {
            config: Config::with_overrides("unused", 0),
            manager,
            catalog,
            chat,
            availability,
            bus: Arc::new(MessageBus::new()),
            resource_versions: Arc::new(ResourceVersions::new()),
        })
    }

    fn request(action: &str, params: Option<serde_json::Value>) -> BusMessage {
        let payload = RequestCommandPayload {
            action: action.to_string(),
            params,
        };
        let mut msg = BusMessage::request_command(&payload).unwrap();
        msg.source = Some("client-1".to_string());
        msg
    }

    async fn dispatch(state: &Arc<ServerState>, msg: &BusMessage) -> ResponsePayload {
        let mut rx = state.bus.subscribe();
        let processor = RequestCommandProcessor::new(state.clone());
        processor.process(msg).await.unwrap();

        let reply = rx.try_recv().expect("a response should be published");
        assert_eq!(reply.event_type, EventType::Response);
        assert_eq!(reply.correlation_id, Some(msg.request_id));
        assert_eq!(reply.target.as_deref(), Some("client-1"));
        reply.parse_payload().unwrap()
    }

    #[tokio::test]
    async fn test_handshake_accepted() {
        let state = test_state();
        let mut rx = state.bus.subscribe();
        let processor = HandshakeProcessor::new(state.clone());

        let payload = HandshakePayload {
            version: PROTOCOL_VERSION,
            client_name: Some("chairbook-client".to_string()),
            client_version: Some("0.1.0".to_string()),
            client_id: Some("client-1".to_string()),
        };
        let mut msg = BusMessage::handshake(&payload).unwrap();
        msg.source = Some("client-1".to_string());

        let result = processor.process(&msg).await.unwrap();
        assert!(result.is_success());

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.correlation_id, Some(msg.request_id));
        let response: ResponsePayload = reply.parse_payload().unwrap();
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["protocol_version"], PROTOCOL_VERSION);
        assert_eq!(data["server_sequence"], 0);
        assert!(data["epoch"].is_string());
    }

    #[tokio::test]
    async fn test_handshake_protocol_mismatch() {
        let state = test_state();
        let mut rx = state.bus.subscribe();
        let processor = HandshakeProcessor::new(state.clone());

        let payload = HandshakePayload {
            version: PROTOCOL_VERSION + 1,
            client_name: None,
            client_version: None,
            client_id: None,
        };
        let msg = BusMessage::handshake(&payload).unwrap();
        processor.process(&msg).await.unwrap();

        let response: ResponsePayload = rx.try_recv().unwrap().parse_payload().unwrap();
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("PROTOCOL_MISMATCH"));
    }

    #[tokio::test]
    async fn test_unknown_action_rejected() {
        let state = test_state();
        let msg = request("orders.create", None);
        let response = dispatch(&state, &msg).await;
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("VALIDATION_ERROR"));
        assert!(response.message.contains("Unknown action"));
    }

    #[tokio::test]
    async fn test_missing_params_rejected() {
        let state = test_state();
        let msg = request("appointments.get", None);
        let response = dispatch(&state, &msg).await;
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("VALIDATION_ERROR"));
    }

    #[tokio::test]
    async fn test_appointment_lookup_not_found() {
        let state = test_state();
        let msg = request(
            "appointments.get",
            Some(serde_json::json!({ "appointment_id": "missing" })),
        );
        let response = dispatch(&state, &msg).await;
        assert!(!response.success);
        assert_eq!(
            response.error_code.as_deref(),
            Some("APPOINTMENT_NOT_FOUND")
        );
    }

    #[tokio::test]
    async fn test_catalog_chairs_query() {
        let state = test_state();
        state.catalog.upsert_chair(Chair {
            id: "chair-1".to_string(),
            name: "Window Chair".to_string(),
            store_id: Some("store-1".to_string()),
            provider_id: Some("provider-1".to_string()),
            pricing_mode: PricingMode::Rent,
            pricing_value: 12.0,
            is_active: true,
        });

        let msg = request("catalog.chairs", None);
        let response = dispatch(&state, &msg).await;
        assert!(response.success);
        let chairs = response.data.unwrap();
        assert_eq!(chairs.as_array().unwrap().len(), 1);
        assert_eq!(chairs[0]["id"], "chair-1");
    }

    #[tokio::test]
    async fn test_sync_from_zero_is_incremental() {
        let state = test_state();
        let msg = request(
            "appointments.sync",
            Some(serde_json::json!({ "since_sequence": 0 })),
        );
        let response = dispatch(&state, &msg).await;
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["requires_full_sync"], false);
        assert_eq!(data["server_sequence"], 0);
    }

    #[tokio::test]
    async fn test_sync_ahead_of_server_forces_full_sync() {
        let state = test_state();
        let msg = request(
            "appointments.sync",
            Some(serde_json::json!({ "since_sequence": 42 })),
        );
        let response = dispatch(&state, &msg).await;
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["requires_full_sync"], true);
        assert_eq!(data["events"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_chat_round_trip_over_dispatch() {
        let state = test_state();

        let create = request(
            "chat.create_favorite",
            Some(serde_json::json!({
                "title": "Regulars",
                "participants": [
                    { "user_id": "cust-1", "display_name": "Alice", "role": "CUSTOMER" }
                ]
            })),
        );
        let created = dispatch(&state, &create).await;
        assert!(created.success, "{}", created.message);
        let thread_id = created.data.unwrap()["thread_id"]
            .as_str()
            .unwrap()
            .to_string();

        let send = request(
            "send_message",
            Some(serde_json::json!({
                "thread_id": thread_id,
                "sender_user_id": "cust-1",
                "text": "see you tomorrow"
            })),
        );
        let sent = dispatch(&state, &send).await;
        assert!(sent.success, "{}", sent.message);

        let list = request(
            "chat.messages",
            Some(serde_json::json!({ "thread_id": thread_id })),
        );
        let messages = dispatch(&state, &list).await;
        assert!(messages.success);
        let data = messages.data.unwrap();
        assert_eq!(data.as_array().unwrap().len(), 1);
        assert_eq!(data[0]["text"], "see you tomorrow");
    }

    #[tokio::test]
    async fn test_create_appointment_unknown_chair_rejected() {
        let state = test_state();
        let command = AppointmentCommand::new(
            "cust-1",
            "Alice",
            AppointmentCommandPayload::CreateAppointment {
                chair_id: "chair-99".to_string(),
                customer_id: "cust-1".to_string(),
                customer_name: "Alice".to_string(),
                requester_role: shared::appointment::RequesterRole::Customer,
                date: "2031-05-05".to_string(),
                start_time: "09:00".to_string(),
                slot_count: 1,
                offering_ids: vec![],
            },
        );
        let msg = request(
            "create_appointment",
            Some(serde_json::to_value(&command).unwrap()),
        );
        let response = dispatch(&state, &msg).await;
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("VALIDATION_ERROR"));
        assert!(response.message.contains("chair-99"));
    }

    #[tokio::test]
    async fn test_command_action_payload_mismatch_rejected() {
        let state = test_state();
        let command = AppointmentCommand::new(
            "cust-1",
            "Alice",
            AppointmentCommandPayload::CompleteAppointment {
                appointment_id: "apt-1".to_string(),
            },
        );
        let msg = request(
            "cancel_appointment",
            Some(serde_json::to_value(&command).unwrap()),
        );
        let response = dispatch(&state, &msg).await;
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("VALIDATION_ERROR"));
        assert!(response.message.contains("complete_appointment"));
    }

    #[tokio::test]
    async fn test_send_message_requires_a_route() {
        let state = test_state();
        let msg = request(
            "send_message",
            Some(serde_json::json!({
                "sender_user_id": "cust-1",
                "text": "hello"
            })),
        );
        let response = dispatch(&state, &msg).await;
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("VALIDATION_ERROR"));
    }

    #[tokio::test]
    async fn test_notify_typing_action_unknown_thread() {
        let state = test_state();
        let msg = request(
            "notify_typing",
            Some(serde_json::json!({
                "thread_id": "missing",
                "typing_user_id": "cust-1",
                "typing_user_name": "Alice",
                "is_typing": true
            })),
        );
        let response = dispatch(&state, &msg).await;
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("THREAD_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_typing_unknown_thread_skipped() {
        let state = test_state();
        let processor = TypingProcessor::new(state.clone());

        let payload = TypingPayload {
            thread_id: "missing".to_string(),
            typing_user_id: "cust-1".to_string(),
            typing_user_name: "Alice".to_string(),
            is_typing: true,
        };
        let msg = BusMessage::typing(&payload).unwrap();

        let result = processor.process(&msg).await.unwrap();
        assert!(matches!(result, ProcessResult::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_typing_relayed_for_known_thread() {
        let state = test_state();
        let processor = TypingProcessor::new(state.clone());
        let mut chat_events = state.chat.subscribe();

        let thread = state
            .chat
            .create_favorite_thread(
                "Regulars",
                vec![Participant {
                    user_id: "cust-1".to_string(),
                    display_name: "Alice".to_string(),
                    image_url: None,
                    role: ParticipantRole::Customer,
                    provider_kind: None,
                }],
            )
            .unwrap();

        let payload = TypingPayload {
            thread_id: thread.thread_id.clone(),
            typing_user_id: "cust-1".to_string(),
            typing_user_name: "Alice".to_string(),
            is_typing: true,
        };
        let msg = BusMessage::typing(&payload).unwrap();
        let result = processor.process(&msg).await.unwrap();
        assert!(result.is_success());
        assert!(chat_events.try_recv().is_ok());
    }
}
