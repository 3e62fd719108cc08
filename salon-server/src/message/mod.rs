//! Transport layer and message bus
//!
//! Pluggable transport architecture:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           MessageBus                     │
//! │  ┌───────────────────────────────────┐  │
//! │  │  broadcast::Sender<BusMessage>    │  │
//! │  └───────────────────────────────────┘  │
//! └────────────────┬────────────────────────┘
//!                  │
//!         ┌────────┴────────┐
//!         │ Transport Trait │  ◄── 可插拔
//!         └────────┬────────┘
//!                  │
//!     ┌────────────┼────────────┐
//!     ▼            ▼            ▼
//! TcpTransport  TlsTransport  MemoryTransport
//! (TCP)        (TLS)          (同进程)
//! ```
//!
//! # Wire format
//!
//! `[event_type: u8] [length: u32 LE] [envelope: JSON]`
//!
//! The envelope is the full [`BusMessage`] including `request_id`,
//! `correlation_id` and `target`, so request/response correlation survives
//! the network hop, not just the in-process path. The leading tag byte lets
//! a reader reject unknown event types before parsing the body.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf, split};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio_rustls::{TlsAcceptor, server::TlsStream};
use tokio_util::sync::CancellationToken;

pub mod handler;
pub mod processor;

pub use handler::MessageHandler;
pub use processor::{MessageProcessor, ProcessResult};
pub use shared::message::{
    BusMessage, EventType, HandshakePayload, NewMessagePayload, NotificationPayload,
    RequestCommandPayload, ResponsePayload, SyncPayload, TypingPayload,
};

use crate::utils::AppError;

/// 单帧上限,防止畸形长度字段导致超额分配
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

// ========== Transport Trait ==========

#[async_trait]
pub trait Transport: Send + Sync {
    async fn read_message(&self) -> Result<BusMessage, AppError>;
    async fn write_message(&self, msg: &BusMessage) -> Result<(), AppError>;
}

// Helper functions
async fn read_from_stream<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<BusMessage, AppError> {
    // Read event type (1 byte)
    let mut type_buf = [0u8; 1];
    reader
        .read_exact(&mut type_buf)
        .await
        .map_err(|e| AppError::transport(format!("Read type failed: {}", e)))?;

    let event_type = EventType::try_from(type_buf[0])
        .map_err(|_| AppError::transport(format!("Invalid event type: {}", type_buf[0])))?;

    // Read envelope length (4 bytes)
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| AppError::transport(format!("Read len failed: {}", e)))?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(AppError::transport(format!("Frame too large: {} bytes", len)));
    }

    // Read envelope
    let mut envelope = vec![0u8; len];
    reader
        .read_exact(&mut envelope)
        .await
        .map_err(|e| AppError::transport(format!("Read envelope failed: {}", e)))?;

    let msg: BusMessage = serde_json::from_slice(&envelope)
        .map_err(|e| AppError::transport(format!("Malformed envelope: {}", e)))?;
    if msg.event_type != event_type {
        return Err(AppError::transport(format!(
            "Frame tag {} disagrees with envelope type {}",
            event_type, msg.event_type
        )));
    }

    Ok(msg)
}

async fn write_to_stream<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg: &BusMessage,
) -> Result<(), AppError> {
    let envelope = serde_json::to_vec(msg)
        .map_err(|e| AppError::transport(format!("Serialize envelope failed: {}", e)))?;

    let mut data = Vec::with_capacity(5 + envelope.len());
    data.push(msg.event_type as u8);
    data.extend_from_slice(&(envelope.len() as u32).to_le_bytes());
    data.extend_from_slice(&envelope);

    writer
        .write_all(&data)
        .await
        .map_err(|e| AppError::transport(format!("Write failed: {}", e)))?;
    Ok(())
}

// ========== TCP Transport ==========

/// TCP transport implementation
#[derive(Debug, Clone)]
pub struct TcpTransport {
    reader: Arc<Mutex<OwnedReadHalf>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl TcpTransport {
    pub async fn connect(addr: &str) -> Result<Self, AppError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| AppError::transport(format!("TCP connect failed: {}", e)))?;
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read_message(&self) -> Result<BusMessage, AppError> {
        let mut reader = self.reader.lock().await;
        read_from_stream(&mut *reader).await
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), AppError> {
        let mut writer = self.writer.lock().await;
        write_to_stream(&mut *writer, msg).await
    }
}

// ========== TLS Transport ==========

#[derive(Debug, Clone)]
pub struct TlsTransport {
    reader: Arc<Mutex<ReadHalf<TlsStream<TcpStream>>>>,
    writer: Arc<Mutex<WriteHalf<TlsStream<TcpStream>>>>,
}

impl TlsTransport {
    pub fn new(stream: TlsStream<TcpStream>) -> Self {
        let (reader, writer) = split(stream);
        Self {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
        }
    }
}

#[async_trait]
impl Transport for TlsTransport {
    async fn read_message(&self) -> Result<BusMessage, AppError> {
        let mut reader = self.reader.lock().await;
        read_from_stream(&mut *reader).await
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), AppError> {
        let mut writer = self.writer.lock().await;
        write_to_stream(&mut *writer, msg).await
    }
}

// ========== Memory Transport (In-Process) ==========

/// In-process transport for same-process clients
///
/// Rides the bus's broadcast channels directly; nothing is framed or copied
/// onto a socket.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    rx: Arc<Mutex<broadcast::Receiver<BusMessage>>>,
    tx: Option<Arc<broadcast::Sender<BusMessage>>>,
}

impl MemoryTransport {
    /// Receive-only view of the server's broadcasts
    pub fn new(tx: &broadcast::Sender<BusMessage>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(tx.subscribe())),
            tx: None,
        }
    }

    /// Full client view: receives broadcasts, writes go to the server
    pub fn with_client_sender(
        broadcast_tx: &broadcast::Sender<BusMessage>,
        client_tx: &broadcast::Sender<BusMessage>,
    ) -> Self {
        Self {
            rx: Arc::new(Mutex::new(broadcast_tx.subscribe())),
            tx: Some(Arc::new(client_tx.clone())),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read_message(&self) -> Result<BusMessage, AppError> {
        let mut rx = self.rx.lock().await;
        rx.recv()
            .await
            .map_err(|e| AppError::transport(e.to_string()))
    }

    async fn write_message(&self, msg: &BusMessage) -> Result<(), AppError> {
        if let Some(tx) = &self.tx {
            tx.send(msg.clone())
                .map_err(|e| AppError::transport(e.to_string()))?;
        }
        Ok(())
    }
}

// ========== Message Bus ==========

/// Configuration for the transport layer
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tcp_listen_addr: String,
    /// Capacity of the broadcast channels
    pub channel_capacity: usize,
    /// TLS configuration (optional; plain TCP without it)
    pub tls_config: Option<Arc<rustls::ServerConfig>>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tcp_listen_addr: "0.0.0.0:8081".to_string(),
            channel_capacity: 1024,
            tls_config: None,
        }
    }
}

/// Unified message bus with pluggable transport
///
/// Two broadcast channels: `client_tx` carries client→server traffic (the
/// [`MessageHandler`] subscribes to it), `server_tx` carries server→client
/// broadcasts which every connection forwards to its socket. Targeted
/// messages (RPC responses) are broadcast too; clients drop what is not
/// addressed or correlated to them.
#[derive(Debug, Clone)]
pub struct MessageBus {
    client_tx: broadcast::Sender<BusMessage>,
    server_tx: broadcast::Sender<BusMessage>,
    config: TransportConfig,
    shutdown_token: CancellationToken,
}

impl MessageBus {
    /// Create a new message bus with default configuration
    pub fn new() -> Self {
        Self::from_config(TransportConfig::default())
    }

    /// Create a new message bus from configuration
    pub fn from_config(config: TransportConfig) -> Self {
        let capacity = config.channel_capacity;
        let (client_tx, _) = broadcast::channel(capacity);
        let (server_tx, _) = broadcast::channel(capacity);
        Self {
            client_tx,
            server_tx,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Publish a message FROM SERVER to all subscribers
    pub async fn publish(&self, msg: BusMessage) -> Result<(), AppError> {
        self.server_tx
            .send(msg)
            .map_err(|e| AppError::transport(e.to_string()))?;
        Ok(())
    }

    /// Subscribe to messages FROM CLIENTS (server use only)
    pub fn subscribe_to_clients(&self) -> broadcast::Receiver<BusMessage> {
        self.client_tx.subscribe()
    }

    /// Subscribe to broadcasts FROM SERVER (clients use this)
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.server_tx.subscribe()
    }

    /// Receive-only in-process transport
    pub fn memory_transport(&self) -> MemoryTransport {
        MemoryTransport::new(&self.server_tx)
    }

    /// In-process transport that can also send to the server
    pub fn client_memory_transport(&self) -> MemoryTransport {
        MemoryTransport::with_client_sender(&self.server_tx, &self.client_tx)
    }

    /// The server→client broadcast sender
    pub fn sender(&self) -> &broadcast::Sender<BusMessage> {
        &self.server_tx
    }

    /// The client→server sender
    pub fn sender_to_server(&self) -> &broadcast::Sender<BusMessage> {
        &self.client_tx
    }

    /// Shutdown token (for tasks that follow the bus lifecycle)
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    /// Gracefully shut down the bus and everything hanging off its token
    pub fn shutdown(&self) {
        tracing::info!("Shutting down message bus");
        self.shutdown_token.cancel();
    }

    /// Run the TCP accept loop until shutdown.
    ///
    /// Each connection gets two tasks: one forwarding server broadcasts to
    /// the socket, one reading client frames and publishing them to
    /// `client_tx`. With a TLS config the socket is wrapped before framing;
    /// without one the listener speaks plain TCP (the caller decides whether
    /// that is acceptable for its environment).
    pub async fn start_tcp_server(
        &self,
        tls_config_override: Option<Arc<rustls::ServerConfig>>,
    ) -> Result<(), AppError> {
        let listener = TcpListener::bind(&self.config.tcp_listen_addr)
            .await
            .map_err(|e| AppError::transport(format!("Failed to bind: {}", e)))?;

        tracing::info!(
            "Message bus TCP server listening on {}",
            self.config.tcp_listen_addr
        );

        let server_tx = self.server_tx.clone();
        let client_tx = self.client_tx.clone();
        let shutdown_token = self.shutdown_token.clone();

        let final_tls_config = tls_config_override.or(self.config.tls_config.clone());
        let tls_acceptor = match final_tls_config {
            Some(tls_config) => {
                tracing::info!("Message bus TLS enabled");
                Some(TlsAcceptor::from(tls_config))
            }
            None => {
                tracing::warn!("TLS not configured; accepting plain TCP connections");
                None
            }
        };

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    tracing::info!("Message bus TCP server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            tracing::info!("Client connected: {}", addr);

                            let tls_acceptor = tls_acceptor.clone();
                            let server_tx = server_tx.clone();
                            let client_tx = client_tx.clone();
                            let shutdown_token = shutdown_token.clone();

                            tokio::spawn(async move {
                                let transport: Arc<dyn Transport> = if let Some(acceptor) = tls_acceptor {
                                    match acceptor.accept(stream).await {
                                        Ok(tls_stream) => Arc::new(TlsTransport::new(tls_stream)),
                                        Err(e) => {
                                            tracing::error!("Client {} TLS handshake failed: {}", addr, e);
                                            return;
                                        }
                                    }
                                } else {
                                    Arc::new(TcpTransport::from_stream(stream))
                                };

                                let mut rx = server_tx.subscribe();
                                let transport_clone = transport.clone();
                                let client_shutdown = shutdown_token.clone();

                                // server → client forwarding
                                tokio::spawn(async move {
                                    loop {
                                        tokio::select! {
                                            _ = client_shutdown.cancelled() => {
                                                break;
                                            }

                                            msg_result = rx.recv() => {
                                                match msg_result {
                                                    Ok(msg) => {
                                                        if let Err(e) = transport_clone.write_message(&msg).await {
                                                            tracing::info!("Client {} disconnected: {}", addr, e);
                                                            break;
                                                        }
                                                    }
                                                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                                        // the client must catch up over the sync
                                                        // protocol once it notices the gap
                                                        tracing::warn!(
                                                            "Client {} forwarder lagged, {} messages dropped",
                                                            addr, skipped
                                                        );
                                                    }
                                                    Err(broadcast::error::RecvError::Closed) => {
                                                        break;
                                                    }
                                                }
                                            }
                                        }
                                    }
                                });

                                // client → server reads
                                loop {
                                    tokio::select! {
                                        _ = shutdown_token.cancelled() => {
                                            break;
                                        }
                                        read_result = transport.read_message() => {
                                            match read_result {
                                                Ok(msg) => {
                                                    if let Err(e) = client_tx.send(msg) {
                                                        tracing::warn!("Failed to publish client message: {}", e);
                                                    }
                                                }
                                                Err(e) => {
                                                    tracing::info!("Client {} read error: {}", addr, e);
                                                    break;
                                                }
                                            }
                                        }
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
