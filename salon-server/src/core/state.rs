//! Shared server state
//!
//! One [`ServerState`] is built at startup and handed (behind `Arc`) to the
//! message handler, the background tasks and the bus processors. It owns the
//! long-lived services:
//!
//! | 字段 | 职责 |
//! |------|------|
//! | `manager` | appointment event sourcing (commands → events → snapshots) |
//! | `catalog` | chairs, working hours, service offerings |
//! | `chat` | threads and messages, status-coupled send permission |
//! | `availability` | slot grid projection over catalog + bookings |
//! | `bus` | transport-agnostic message bus |

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use shared::appointment::{AppointmentEvent, AppointmentEventType};

use crate::appointments::{AppointmentsManager, PendingExpirySweeper};
use crate::catalog::CatalogService;
use crate::chat::{ChatEvent, ChatService};
use crate::core::config::Config;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::message::{BusMessage, MessageBus, MessageHandler, SyncPayload, TransportConfig};
use crate::scheduling::SlotAvailabilityResolver;
use crate::utils::{AppError, AppResult};

// ========== Resource Versions ==========

/// Per-resource monotonic version counters for sync broadcasts
///
/// Appointment pushes do NOT use these: their version is the event's global
/// sequence, so clients can detect gaps and re-sync. These counters cover
/// the remaining resources (threads, catalog) where "newer wins" is enough.
#[derive(Debug, Default)]
pub struct ResourceVersions {
    versions: DashMap<String, u64>,
}

impl ResourceVersions {
    pub fn new() -> Self {
        Self {
            versions: DashMap::new(),
        }
    }

    /// Increment and return the version for a resource
    pub fn increment(&self, resource: &str) -> u64 {
        let mut entry = self.versions.entry(resource.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Current version of a resource (0 if never bumped)
    pub fn get(&self, resource: &str) -> u64 {
        self.versions.get(resource).map(|v| *v).unwrap_or(0)
    }
}

// ========== Server State ==========

/// Shared state for the whole server
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub manager: Arc<AppointmentsManager>,
    pub catalog: Arc<CatalogService>,
    pub chat: Arc<ChatService>,
    pub availability: SlotAvailabilityResolver,
    pub bus: Arc<MessageBus>,
    pub resource_versions: Arc<ResourceVersions>,
}

impl ServerState {
    /// Build the full service graph from configuration.
    ///
    /// Opens (or creates) the two databases under `work_dir`, loads the
    /// catalog seed, and wires the availability resolver and the bus.
    pub fn initialize(config: Config) -> AppResult<Self> {
        let work_dir = std::path::Path::new(&config.work_dir);
        std::fs::create_dir_all(work_dir)
            .map_err(|e| AppError::internal(format!("Failed to create work dir: {}", e)))?;

        let catalog = Arc::new(CatalogService::new());
        catalog.load_seed_file(&work_dir.join("catalog.json"))?;

        let mut manager = AppointmentsManager::new(
            work_dir.join("appointments.redb"),
            config.timezone,
            config.pending_ttl_millis(),
        )
        .map_err(|e| AppError::internal(format!("Failed to open appointment store: {}", e)))?;
        manager.set_catalog_service(catalog.clone());
        let manager = Arc::new(manager);

        let chat = Arc::new(ChatService::new(work_dir.join("chat.redb"), manager.clone())?);

        let availability =
            SlotAvailabilityResolver::new(catalog.clone(), manager.clone(), config.timezone);

        let bus = Arc::new(MessageBus::from_config(TransportConfig {
            tcp_listen_addr: format!("0.0.0.0:{}", config.message_tcp_port),
            ..TransportConfig::default()
        }));

        tracing::info!(
            work_dir = %config.work_dir,
            timezone = %config.timezone,
            "Server state initialized"
        );

        Ok(Self {
            config,
            manager,
            catalog,
            chat,
            availability,
            bus,
            resource_versions: Arc::new(ResourceVersions::new()),
        })
    }

    /// Broadcast a versioned sync message for a resource
    pub async fn broadcast_sync<T: Serialize>(
        &self,
        resource: &str,
        action: &str,
        id: &str,
        data: Option<&T>,
    ) {
        let version = self.resource_versions.increment(resource);
        let payload = SyncPayload {
            resource: resource.to_string(),
            version,
            action: action.to_string(),
            id: id.to_string(),
            data: data.and_then(|d| serde_json::to_value(d).ok()),
        };

        match BusMessage::sync(&payload) {
            Ok(msg) => {
                if let Err(e) = self.bus.publish(msg).await {
                    tracing::warn!("Failed to broadcast {} sync: {}", resource, e);
                }
            }
            Err(e) => {
                tracing::error!("Failed to build {} sync message: {}", resource, e);
            }
        }
    }

    /// Start the long-running background tasks.
    ///
    /// The returned registry adopts the bus shutdown token, so shutting it
    /// down stops the bus listener and connections as well. Registered:
    /// 1. the message handler (client commands → processors)
    /// 2. appointment event relay (event stream → chat mirror + sync push)
    /// 3. chat event relay (chat events → bus messages)
    /// 4. pending-appointment expiry sweeper
    pub fn start_background_tasks(self: &Arc<Self>) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new(self.bus.shutdown_token().clone());

        let handler = MessageHandler::with_default_processors(
            self.bus.subscribe_to_clients(),
            tasks.shutdown_token(),
            self.clone(),
        );
        tasks.spawn("message_handler", TaskKind::Worker, async move {
            handler.run().await;
        });

        let state = self.clone();
        let mut events = self.manager.subscribe();
        let shutdown = tasks.shutdown_token();
        tasks.spawn("appointment_event_relay", TaskKind::Listener, async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => state.relay_appointment_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("Appointment relay lagged, {} events dropped", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::info!("Appointment event relay stopped");
        });

        let state = self.clone();
        let mut chat_events = self.chat.subscribe();
        let shutdown = tasks.shutdown_token();
        tasks.spawn("chat_event_relay", TaskKind::Listener, async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = chat_events.recv() => match received {
                        Ok(event) => state.relay_chat_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("Chat relay lagged, {} events dropped", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::info!("Chat event relay stopped");
        });

        let sweeper = PendingExpirySweeper::new(
            self.manager.clone(),
            tasks.shutdown_token(),
            Duration::from_secs(self.config.expiry_sweep_seconds),
        );
        tasks.spawn("pending_expiry_sweeper", TaskKind::Periodic, sweeper.run());

        tasks.log_summary();
        tasks
    }

    /// Mirror one appointment event onto the chat thread and push it to
    /// clients as an `appointments` sync message.
    ///
    /// The sync version is the event's global sequence, so a client that
    /// sees a gap knows to run the catch-up protocol.
    async fn relay_appointment_event(&self, event: AppointmentEvent) {
        if let Err(e) = self.chat.sync_thread_status(&event.appointment_id) {
            tracing::warn!(
                appointment_id = %event.appointment_id,
                "Failed to mirror appointment status onto chat thread: {}", e
            );
        }

        let snapshot = match self.manager.get_snapshot(&event.appointment_id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    appointment_id = %event.appointment_id,
                    "Snapshot lookup failed during sync push: {}", e
                );
                None
            }
        };

        let payload = SyncPayload {
            resource: "appointments".to_string(),
            version: event.sequence,
            action: sync_action(&event.event_type).to_string(),
            id: event.appointment_id.clone(),
            data: snapshot.and_then(|s| serde_json::to_value(&s).ok()),
        };

        match BusMessage::sync(&payload) {
            Ok(msg) => {
                if let Err(e) = self.bus.publish(msg).await {
                    tracing::warn!("Failed to push appointment sync: {}", e);
                }
            }
            Err(e) => {
                tracing::error!("Failed to build appointment sync message: {}", e);
            }
        }
    }

    /// Turn chat-layer events into bus messages
    async fn relay_chat_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::NewMessage(payload) => match BusMessage::new_message(&payload) {
                Ok(msg) => {
                    if let Err(e) = self.bus.publish(msg).await {
                        tracing::warn!("Failed to push chat message: {}", e);
                    }
                }
                Err(e) => tracing::error!("Failed to build chat message: {}", e),
            },
            ChatEvent::Typing(payload) => match BusMessage::typing(&payload) {
                Ok(msg) => {
                    if let Err(e) = self.bus.publish(msg).await {
                        tracing::warn!("Failed to push typing state: {}", e);
                    }
                }
                Err(e) => tracing::error!("Failed to build typing message: {}", e),
            },
            ChatEvent::ThreadUpdated(thread) => {
                self.broadcast_sync("threads", "updated", &thread.thread_id, Some(&thread))
                    .await;
            }
        }
    }
}

fn sync_action(event_type: &AppointmentEventType) -> &'static str {
    match event_type {
        AppointmentEventType::AppointmentCreated => "created",
        AppointmentEventType::DecisionSubmitted => "decision_submitted",
        AppointmentEventType::AppointmentCompleted => "completed",
        AppointmentEventType::AppointmentCancelled => "cancelled",
        AppointmentEventType::AppointmentExpired => "expired",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_versions_increment() {
        let versions = ResourceVersions::new();
        assert_eq!(versions.get("threads"), 0);
        assert_eq!(versions.increment("threads"), 1);
        assert_eq!(versions.increment("threads"), 2);
        assert_eq!(versions.increment("catalog"), 1);
        assert_eq!(versions.get("threads"), 2);
    }
}
