//! Message bus client implementation
//!
//! One background read loop owns the inbound side of the transport and
//! splits traffic two ways:
//!
//! 1. frames carrying a `correlation_id` we are waiting on complete the
//!    matching [`MessageClient::request`] call;
//! 2. everything else fans out to [`MessageClient::subscribe`] receivers.
//!
//! Frames targeted at a different client id are dropped before either path.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::message::MessageError;
use crate::message::transport::{MemoryTransport, TcpTransport, TlsTransport, Transport};
use shared::message::{
    BusMessage, HandshakePayload, PROTOCOL_VERSION, RequestCommandPayload, ResponsePayload,
};

/// Capacity of the push fan-out channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Transport variants a client can run over
#[derive(Debug, Clone)]
enum ClientTransport {
    Tcp(TcpTransport),
    Tls(TlsTransport),
    Memory(MemoryTransport),
}

impl ClientTransport {
    async fn read_message(&self) -> Result<BusMessage, MessageError> {
        match self {
            ClientTransport::Tcp(t) => t.read_message().await,
            ClientTransport::Tls(t) => t.read_message().await,
            ClientTransport::Memory(t) => t.read_message().await,
        }
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), MessageError> {
        match self {
            ClientTransport::Tcp(t) => t.write_message(msg).await,
            ClientTransport::Tls(t) => t.write_message(msg).await,
            ClientTransport::Memory(t) => t.write_message(msg).await,
        }
    }

    async fn close(&self) -> Result<(), MessageError> {
        match self {
            ClientTransport::Tcp(t) => t.close().await,
            ClientTransport::Tls(t) => t.close().await,
            ClientTransport::Memory(t) => t.close().await,
        }
    }
}

/// Message bus client
///
/// Clones share the connection, the pending-request table and the push
/// fan-out, so one connection can serve several call sites.
#[derive(Debug, Clone)]
pub struct MessageClient {
    config: ClientConfig,
    transport: ClientTransport,
    /// Requests awaiting their correlated response
    pending: Arc<Mutex<HashMap<Uuid, oneshot::Sender<BusMessage>>>>,
    event_tx: broadcast::Sender<BusMessage>,
    shutdown: CancellationToken,
}

impl MessageClient {
    /// Connect over TCP (or TLS when configured), start the read loop and
    /// complete the protocol handshake.
    pub async fn connect(config: ClientConfig) -> Result<Self, MessageError> {
        let transport = match (&config.tls_server_name, &config.tls_ca_path) {
            (Some(name), Some(ca)) => {
                ClientTransport::Tls(TlsTransport::connect(&config.server_addr, name, ca).await?)
            }
            (None, None) => ClientTransport::Tcp(TcpTransport::connect(&config.server_addr).await?),
            _ => {
                return Err(MessageError::Connection(
                    "TLS needs both a server name and a CA bundle".to_string(),
                ));
            }
        };

        let client = Self::with_transport(config, transport);
        client.spawn_read_loop();
        client.handshake().await?;
        Ok(client)
    }

    /// Attach to an in-process server over its broadcast channel pair.
    ///
    /// No handshake is performed; embedders that want the protocol check
    /// call [`MessageClient::handshake`] themselves.
    #[cfg(any(test, feature = "in-process"))]
    pub fn memory(
        config: ClientConfig,
        server_broadcast_tx: &broadcast::Sender<BusMessage>,
        client_to_server_tx: &broadcast::Sender<BusMessage>,
    ) -> Self {
        let transport = ClientTransport::Memory(MemoryTransport::new(
            server_broadcast_tx,
            client_to_server_tx,
        ));
        let client = Self::with_transport(config, transport);
        client.spawn_read_loop();
        client
    }

    fn with_transport(config: ClientConfig, transport: ClientTransport) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            transport,
            pending: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
            shutdown: CancellationToken::new(),
        }
    }

    fn spawn_read_loop(&self) {
        let transport = self.transport.clone();
        let pending = self.pending.clone();
        let event_tx = self.event_tx.clone();
        let shutdown = self.shutdown.clone();
        let client_id = self.config.client_id.clone();

        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    read = transport.read_message() => match read {
                        Ok(msg) => msg,
                        Err(e) => {
                            tracing::warn!("Read loop terminated: {}", e);
                            break;
                        }
                    },
                };

                // Frames addressed to another client are not ours to see
                if let Some(target) = &msg.target
                    && target != &client_id
                {
                    continue;
                }

                if let Some(correlation_id) = msg.correlation_id
                    && let Some(waiter) = pending.lock().remove(&correlation_id)
                {
                    let _ = waiter.send(msg);
                    continue;
                }

                // Unsolicited push: sync signals, chat messages, typing
                let _ = event_tx.send(msg);
            }
            tracing::debug!("Message read loop stopped");
        });
    }

    /// Send the protocol handshake and verify the server's answer
    pub async fn handshake(&self) -> Result<(), MessageError> {
        let payload = HandshakePayload {
            version: PROTOCOL_VERSION,
            client_name: Some(self.config.client_name.clone()),
            client_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            client_id: Some(self.config.client_id.clone()),
        };
        let reply = self.request(BusMessage::handshake(&payload)?).await?;
        let response: ResponsePayload = reply.parse_payload()?;
        if !response.success {
            return Err(MessageError::Handshake(response.message));
        }
        tracing::info!(server = ?response.data, "Connected to the salon message bus");
        Ok(())
    }

    /// Fire-and-forget send; stamps this client as the source
    pub async fn send(&self, mut msg: BusMessage) -> Result<(), MessageError> {
        msg.source = Some(self.config.client_id.clone());
        self.transport.write_message(&msg).await
    }

    /// Send and wait for the correlated response
    pub async fn request(&self, msg: BusMessage) -> Result<BusMessage, MessageError> {
        let request_id = msg.request_id;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);

        if let Err(e) = self.send(msg).await {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout(), rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(MessageError::Connection(
                "Connection closed before the reply arrived".to_string(),
            )),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(MessageError::Timeout(format!(
                    "No reply to {} within {:?}",
                    request_id,
                    self.config.request_timeout()
                )))
            }
        }
    }

    /// Dispatch a named action and parse the server's response payload.
    ///
    /// Business rejections come back as `success = false` with the wire
    /// error code set; `Err` is reserved for transport faults.
    pub async fn send_command(
        &self,
        action: &str,
        params: Option<serde_json::Value>,
    ) -> Result<ResponsePayload, MessageError> {
        let payload = RequestCommandPayload {
            action: action.to_string(),
            params,
        };
        let reply = self.request(BusMessage::request_command(&payload)?).await?;
        Ok(reply.parse_payload()?)
    }

    /// Subscribe to unsolicited pushes (sync, new messages, typing)
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stop the read loop and close the connection.
    ///
    /// Pending requests are woken with a connection error.
    pub async fn close(&self) -> Result<(), MessageError> {
        self.shutdown.cancel();
        self.pending.lock().clear();
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::message::{EventType, SyncPayload};

    fn memory_client(
        timeout: u64,
    ) -> (
        MessageClient,
        broadcast::Sender<BusMessage>,
        broadcast::Receiver<BusMessage>,
    ) {
        let (server_tx, _server_rx) = broadcast::channel(64);
        let (client_tx, inbound) = broadcast::channel(64);
        let config = ClientConfig::new("memory")
            .with_client_id("client-1")
            .with_timeout(timeout);
        let client = MessageClient::memory(config, &server_tx, &client_tx);
        (client, server_tx, inbound)
    }

    /// Answers every RequestCommand with a success response
    fn spawn_echo_server(
        server_tx: broadcast::Sender<BusMessage>,
        mut inbound: broadcast::Receiver<BusMessage>,
    ) {
        tokio::spawn(async move {
            while let Ok(msg) = inbound.recv().await {
                if msg.event_type != EventType::RequestCommand {
                    continue;
                }
                let payload: RequestCommandPayload = msg.parse_payload().unwrap();
                let response = ResponsePayload::success(format!("did {}", payload.action), None);
                let reply = BusMessage::response(&response)
                    .unwrap()
                    .with_correlation_id(msg.request_id)
                    .with_target(msg.source.as_deref().unwrap_or_default());
                let _ = server_tx.send(reply);
            }
        });
    }

    #[tokio::test]
    async fn test_send_command_round_trip() {
        let (client, server_tx, inbound) = memory_client(5);
        spawn_echo_server(server_tx, inbound);

        let response = client.send_command("catalog.chairs", None).await.unwrap();
        assert!(response.success);
        assert_eq!(response.message, "did catalog.chairs");
    }

    #[tokio::test]
    async fn test_responses_do_not_leak_into_push_stream() {
        let (client, server_tx, inbound) = memory_client(5);
        let mut events = client.subscribe();
        spawn_echo_server(server_tx, inbound);

        client.send_command("catalog.chairs", None).await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_frames_for_other_clients_are_dropped() {
        let (client, server_tx, _inbound) = memory_client(5);
        let mut events = client.subscribe();

        let sync = SyncPayload {
            resource: "appointments".to_string(),
            version: 1,
            action: "created".to_string(),
            id: "apt-1".to_string(),
            data: None,
        };
        let foreign = BusMessage::sync(&sync).unwrap().with_target("client-2");
        let broadcasted = BusMessage::sync(&sync).unwrap();
        server_tx.send(foreign).unwrap();
        server_tx.send(broadcasted.clone()).unwrap();

        let delivered = events.recv().await.unwrap();
        assert_eq!(delivered.request_id, broadcasted.request_id);
        // The targeted frame was dropped, not queued behind it
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out_without_reply() {
        let (client, _server_tx, _inbound) = memory_client(1);
        let err = client.send_command("catalog.chairs", None).await.unwrap_err();
        assert!(matches!(err, MessageError::Timeout(_)));
        // The abandoned waiter was cleaned up
        assert!(client.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_close_wakes_pending_requests() {
        let (client, _server_tx, _inbound) = memory_client(30);

        let waiter = {
            let client = client.clone();
            tokio::spawn(async move { client.send_command("catalog.chairs", None).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        client.close().await.unwrap();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, MessageError::Connection(_)));
    }

    #[tokio::test]
    async fn test_handshake_accepts_and_rejects() {
        let (client, server_tx, mut inbound) = memory_client(5);
        tokio::spawn(async move {
            while let Ok(msg) = inbound.recv().await {
                if msg.event_type != EventType::Handshake {
                    continue;
                }
                let hello: HandshakePayload = msg.parse_payload().unwrap();
                let response = if hello.version == PROTOCOL_VERSION {
                    ResponsePayload::success("Welcome", None)
                } else {
                    ResponsePayload::error(
                        "Unsupported protocol",
                        Some("PROTOCOL_MISMATCH".to_string()),
                    )
                };
                let reply = BusMessage::response(&response)
                    .unwrap()
                    .with_correlation_id(msg.request_id)
                    .with_target(msg.source.as_deref().unwrap_or_default());
                let _ = server_tx.send(reply);
            }
        });

        client.handshake().await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejection_is_an_error() {
        let (client, server_tx, mut inbound) = memory_client(5);
        tokio::spawn(async move {
            while let Ok(msg) = inbound.recv().await {
                let response = ResponsePayload::error(
                    "Unsupported protocol",
                    Some("PROTOCOL_MISMATCH".to_string()),
                );
                let reply = BusMessage::response(&response)
                    .unwrap()
                    .with_correlation_id(msg.request_id)
                    .with_target(msg.source.as_deref().unwrap_or_default());
                let _ = server_tx.send(reply);
            }
        });

        let err = client.handshake().await.unwrap_err();
        assert!(matches!(err, MessageError::Handshake(_)));
    }
}
