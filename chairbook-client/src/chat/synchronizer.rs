//! Chat thread synchronizer
//!
//! Holds the live state of one open thread: the thread itself, its
//! messages (newest first), the participant roster, typing indicators and
//! the latest snapshot of the bound appointment. Bus pushes are applied
//! through [`ChatThreadSynchronizer::handle_event`]; everything else goes
//! through explicit requests.
//!
//! Two rules shape the whole module:
//!
//! 1. the send gate is recomputed from the freshest appointment status on
//!    every call, never cached;
//! 2. nothing is appended locally until the server has accepted it, so
//!    the local history only ever contains server-acknowledged messages.

use serde::Serialize;
use std::time::Instant;

use crate::error::{ClientError, ClientResult};
use crate::message::MessageClient;
use shared::appointment::{AppointmentSnapshot, AppointmentStatus};
use shared::message::{
    BusMessage, EventType, NewMessagePayload, ResponsePayload, SyncPayload, TypingPayload,
};
use shared::models::{ChatMessage, ChatThread, Participant};

use super::participants::ParticipantDirectory;
use super::typing::TypingTracker;

/// Wire code the server answers with when a thread refuses new messages
const SEND_NOT_ALLOWED: &str = "SEND_NOT_ALLOWED";

/// Preview length mirrored onto the thread after a new message
const PREVIEW_CHARS: usize = 80;

// Params mirror the server's deserialization shapes

#[derive(Debug, Serialize)]
struct SendMessageParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    appointment_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
    sender_user_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct MarkReadParams<'a> {
    thread_id: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ThreadParams<'a> {
    thread_id: &'a str,
    viewer: &'a str,
}

#[derive(Debug, Serialize)]
struct ThreadByAppointmentParams<'a> {
    appointment_id: &'a str,
    viewer: &'a str,
}

#[derive(Debug, Serialize)]
struct AppointmentParams<'a> {
    appointment_id: &'a str,
}

/// Live view over one chat thread
pub struct ChatThreadSynchronizer {
    client: MessageClient,
    /// Signed-in user this view belongs to
    viewer: String,
    thread: ChatThread,
    /// Newest first; ties broken by message id
    messages: Vec<ChatMessage>,
    /// Latest known snapshot of the bound appointment
    appointment: Option<AppointmentSnapshot>,
    directory: ParticipantDirectory,
    typing: TypingTracker,
    connected: bool,
}

impl ChatThreadSynchronizer {
    /// Open a thread by id: fetch it, its history and (when bound) the
    /// appointment snapshot, then advance the viewer's read mark.
    pub async fn open(client: MessageClient, viewer: &str, thread_id: &str) -> ClientResult<Self> {
        let params = serde_json::to_value(ThreadParams { thread_id, viewer })?;
        let thread: ChatThread = fetch(&client, "chat.thread", params).await?;
        Self::from_thread(client, viewer, thread).await
    }

    /// Open the thread bound to an appointment
    pub async fn open_for_appointment(
        client: MessageClient,
        viewer: &str,
        appointment_id: &str,
    ) -> ClientResult<Self> {
        let params = serde_json::to_value(ThreadByAppointmentParams {
            appointment_id,
            viewer,
        })?;
        let thread: Option<ChatThread> =
            fetch(&client, "chat.thread_by_appointment", params).await?;
        let thread = thread.ok_or_else(|| ClientError::Command {
            action: "chat.thread_by_appointment".to_string(),
            code: "THREAD_NOT_FOUND".to_string(),
            message: format!("No thread bound to appointment {}", appointment_id),
        })?;
        Self::from_thread(client, viewer, thread).await
    }

    async fn from_thread(
        client: MessageClient,
        viewer: &str,
        thread: ChatThread,
    ) -> ClientResult<Self> {
        let mut directory = ParticipantDirectory::new();
        directory.replace(thread.participants.clone());

        let params = serde_json::to_value(ThreadParams {
            thread_id: &thread.thread_id,
            viewer,
        })?;
        let messages: Vec<ChatMessage> = fetch(&client, "chat.messages", params).await?;

        let appointment = match &thread.appointment_id {
            Some(appointment_id) => {
                let params = serde_json::to_value(AppointmentParams { appointment_id })?;
                Some(fetch(&client, "appointments.get", params).await?)
            }
            None => None,
        };

        let typing = TypingTracker::new(client.config().typing_expiry());
        let mut sync = Self {
            client,
            viewer: viewer.to_string(),
            thread,
            messages,
            appointment,
            directory,
            typing,
            connected: true,
        };
        sync.sort_messages();
        if sync.thread.unread_count > 0 {
            sync.mark_read().await?;
        }
        Ok(sync)
    }

    // ========== Send Gate ==========

    /// Whether the composer should accept input right now.
    ///
    /// Favorite threads always accept. Appointment threads accept only
    /// while the appointment is Pending or Approved, read from the latest
    /// snapshot on every call.
    pub fn can_send(&self) -> bool {
        self.connected && self.thread_accepts_messages()
    }

    fn thread_accepts_messages(&self) -> bool {
        if self.thread.is_favorite_thread {
            return true;
        }
        let status = self
            .appointment
            .as_ref()
            .map(|snapshot| snapshot.status)
            .or(self.thread.status);
        matches!(
            status,
            Some(AppointmentStatus::Pending) | Some(AppointmentStatus::Approved)
        )
    }

    // ========== Messages ==========

    /// Send a message to this thread.
    ///
    /// Nothing is appended locally until the server accepts; the returned
    /// message is the server's copy with its authoritative timestamp.
    pub async fn send_message(&mut self, text: &str) -> ClientResult<ChatMessage> {
        if !self.connected {
            return Err(ClientError::Connection(
                "Not connected to the server".to_string(),
            ));
        }
        if !self.thread_accepts_messages() {
            return Err(ClientError::ThreadClosed(self.thread.thread_id.clone()));
        }

        // Appointment-bound threads route by appointment id so the server
        // re-checks the live status on the way in
        let (appointment_id, thread_id) = if self.thread.is_appointment_bound() {
            (self.thread.appointment_id.as_deref(), None)
        } else {
            (None, Some(self.thread.thread_id.as_str()))
        };
        let params = serde_json::to_value(SendMessageParams {
            appointment_id,
            thread_id,
            sender_user_id: &self.viewer,
            text,
        })?;

        let response = self.client.send_command("send_message", Some(params)).await?;
        if !response.success {
            if response.error_code.as_deref() == Some(SEND_NOT_ALLOWED) {
                return Err(ClientError::ThreadClosed(self.thread.thread_id.clone()));
            }
            return Err(command_error("send_message", response));
        }

        let data = response.data.unwrap_or(serde_json::Value::Null);
        let message: ChatMessage = serde_json::from_value(data)?;
        self.insert_message(message.clone());

        if self.typing.finish_local() {
            self.publish_typing(false).await;
        }
        Ok(message)
    }

    /// Advance the viewer's read mark. Idempotent.
    pub async fn mark_read(&mut self) -> ClientResult<()> {
        let params = serde_json::to_value(MarkReadParams {
            thread_id: &self.thread.thread_id,
            user_id: &self.viewer,
        })?;
        let response = self
            .client
            .send_command("mark_thread_read", Some(params))
            .await?;
        if !response.success {
            return Err(command_error("mark_thread_read", response));
        }
        self.thread.unread_count = 0;
        Ok(())
    }

    // ========== Bus Pushes ==========

    /// Feed one bus push through the synchronizer.
    ///
    /// Frames for other threads are ignored. The caller loops over
    /// [`MessageClient::subscribe`] and forwards everything it receives.
    pub async fn handle_event(&mut self, msg: &BusMessage) -> ClientResult<()> {
        match msg.event_type {
            EventType::NewMessage => {
                let payload: NewMessagePayload = msg.parse_payload()?;
                if payload.thread_id != self.thread.thread_id {
                    return Ok(());
                }
                self.apply_new_message(payload).await?;
            }
            EventType::Typing => {
                let payload: TypingPayload = msg.parse_payload()?;
                if payload.thread_id != self.thread.thread_id
                    || payload.typing_user_id == self.viewer
                {
                    return Ok(());
                }
                self.typing.apply_remote(&payload, Instant::now());
            }
            EventType::Sync => {
                let payload: SyncPayload = msg.parse_payload()?;
                self.apply_sync(payload)?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn apply_new_message(&mut self, payload: NewMessagePayload) -> ClientResult<()> {
        // Our own sends come back over the broadcast too
        if self
            .messages
            .iter()
            .any(|m| m.message_id == payload.message_id)
        {
            return Ok(());
        }

        // Detects unknown senders and arms the roster refresh
        let _ = self.directory.resolve(&payload.sender_user_id);
        let foreign = payload.sender_user_id != self.viewer;

        self.thread.last_message_preview =
            Some(payload.text.chars().take(PREVIEW_CHARS).collect());
        self.thread.last_message_at = Some(payload.created_at);
        self.insert_message(ChatMessage {
            message_id: payload.message_id,
            thread_id: payload.thread_id,
            sender_user_id: payload.sender_user_id,
            text: payload.text,
            created_at: payload.created_at,
        });

        if self.directory.take_scheduled_refresh() {
            self.refresh_participants().await;
        }

        if foreign {
            // The viewer is looking at the thread, so the message is read
            if let Err(e) = self.mark_read().await {
                tracing::warn!("Read mark not advanced: {}", e);
            }
        }
        Ok(())
    }

    fn apply_sync(&mut self, payload: SyncPayload) -> ClientResult<()> {
        match payload.resource.as_str() {
            "appointments" => {
                if self.thread.appointment_id.as_deref() != Some(payload.id.as_str()) {
                    return Ok(());
                }
                if let Some(data) = payload.data {
                    let snapshot: AppointmentSnapshot = serde_json::from_value(data)?;
                    // Mirror the status onto the thread the way the server does
                    self.thread.status = Some(snapshot.status);
                    self.appointment = Some(snapshot);
                }
            }
            "threads" => {
                if payload.id != self.thread.thread_id {
                    return Ok(());
                }
                if let Some(data) = payload.data {
                    let mut thread: ChatThread = serde_json::from_value(data)?;
                    // Unread counts are per viewer; the broadcast copy is not ours
                    thread.unread_count = self.thread.unread_count;
                    self.directory.replace(thread.participants.clone());
                    self.thread = thread;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Refetch the thread to pick up participants we could not resolve
    async fn refresh_participants(&mut self) {
        match self.fetch_thread().await {
            Ok(thread) => {
                self.directory.replace(thread.participants.clone());
                self.thread = thread;
            }
            Err(e) => {
                tracing::warn!("Participant refresh failed: {}", e);
                self.directory.refresh_failed();
            }
        }
    }

    async fn fetch_thread(&self) -> ClientResult<ChatThread> {
        let params = serde_json::to_value(ThreadParams {
            thread_id: &self.thread.thread_id,
            viewer: &self.viewer,
        })?;
        fetch(&self.client, "chat.thread", params).await
    }

    // ========== Typing ==========

    /// Record composer input. Publishes "started" on the first keystroke
    /// after idle and returns the generation to arm a quiet timer with
    /// (duration [`crate::ClientConfig::typing_quiet`]); feed it back
    /// through [`Self::typing_quiet_elapsed`].
    pub async fn note_typing_input(&mut self) -> u64 {
        let update = self.typing.note_input();
        if update.emit_started {
            self.publish_typing(true).await;
        }
        update.generation
    }

    /// The quiet timer armed with `generation` fired
    pub async fn typing_quiet_elapsed(&mut self, generation: u64) {
        if self.typing.quiet_elapsed(generation) {
            self.publish_typing(false).await;
        }
    }

    /// Display names of other participants typing right now
    pub fn typing_users(&mut self) -> Vec<String> {
        self.typing.active_remote(Instant::now())
    }

    /// Typing signals are best effort: a lost one self-heals through the
    /// expiry window on the other side.
    async fn publish_typing(&mut self, is_typing: bool) {
        let payload = TypingPayload {
            thread_id: self.thread.thread_id.clone(),
            typing_user_id: self.viewer.clone(),
            typing_user_name: self.directory.resolve(&self.viewer).display_name,
            is_typing,
        };
        match BusMessage::typing(&payload) {
            Ok(msg) => {
                if let Err(e) = self.client.send(msg).await {
                    tracing::debug!("Typing signal not delivered: {}", e);
                }
            }
            Err(e) => tracing::debug!("Typing payload not serialized: {}", e),
        }
    }

    // ========== Accessors ==========

    pub fn thread(&self) -> &ChatThread {
        &self.thread
    }

    /// Messages newest first
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn appointment(&self) -> Option<&AppointmentSnapshot> {
        self.appointment.as_ref()
    }

    /// Resolve a sender id for rendering
    pub fn resolve_sender(&mut self, user_id: &str) -> Participant {
        self.directory.resolve(user_id)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Flip the connection flag; a downed connection closes the send gate
    pub fn set_connected(&mut self, up: bool) {
        self.connected = up;
    }

    /// Leave the thread: flush an outstanding typing indicator
    pub async fn close(&mut self) {
        if self.typing.finish_local() {
            self.publish_typing(false).await;
        }
    }

    fn insert_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.sort_messages();
    }

    fn sort_messages(&mut self) {
        // Newest first; equal timestamps settle on the message id
        self.messages.sort_unstable_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.message_id.cmp(&a.message_id))
        });
    }
}

/// Run a query action and deserialize its data
async fn fetch<T: serde::de::DeserializeOwned>(
    client: &MessageClient,
    action: &str,
    params: serde_json::Value,
) -> ClientResult<T> {
    let response = client.send_command(action, Some(params)).await?;
    if !response.success {
        return Err(command_error(action, response));
    }
    let data = response.data.unwrap_or(serde_json::Value::Null);
    Ok(serde_json::from_value(data)?)
}

fn command_error(action: &str, response: ResponsePayload) -> ClientError {
    ClientError::Command {
        action: action.to_string(),
        code: response
            .error_code
            .unwrap_or_else(|| "INTERNAL_ERROR".to_string()),
        message: response.message,
    }
}
