//! Client configuration

use std::time::Duration;
use uuid::Uuid;

/// Configuration for connecting to a salon server
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Message bus address, e.g. "127.0.0.1:8081"
    pub server_addr: String,

    /// Human-readable name sent in the handshake
    pub client_name: String,

    /// Unique id for this connection. Responses the server addresses to it
    /// are delivered here; frames targeted elsewhere are dropped.
    pub client_id: String,

    /// Request timeout in seconds
    pub timeout: u64,

    /// TLS server name to verify; enables TLS when set
    pub tls_server_name: Option<String>,

    /// Path to the PEM CA bundle that signed the server certificate
    pub tls_ca_path: Option<String>,

    /// How long a remote typing indicator stays visible without a refresh
    pub typing_expiry_seconds: u64,

    /// Quiet seconds after the last keystroke before "stopped typing" goes out
    pub typing_quiet_seconds: u64,
}

impl ClientConfig {
    /// Create a configuration with a fresh client id and default windows
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            client_name: "chairbook-client".to_string(),
            client_id: Uuid::new_v4().to_string(),
            timeout: 10,
            tls_server_name: None,
            tls_ca_path: None,
            typing_expiry_seconds: 5,
            typing_quiet_seconds: 3,
        }
    }

    /// Set the client name shown in server logs
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Pin the client id (defaults to a random UUID)
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Enable TLS against the given server name, trusting the CA bundle
    pub fn with_tls(
        mut self,
        server_name: impl Into<String>,
        ca_path: impl Into<String>,
    ) -> Self {
        self.tls_server_name = Some(server_name.into());
        self.tls_ca_path = Some(ca_path.into());
        self
    }

    /// Tune the typing indicator windows
    pub fn with_typing_windows(mut self, expiry_seconds: u64, quiet_seconds: u64) -> Self {
        self.typing_expiry_seconds = expiry_seconds;
        self.typing_quiet_seconds = quiet_seconds;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn typing_expiry(&self) -> Duration {
        Duration::from_secs(self.typing_expiry_seconds)
    }

    pub fn typing_quiet(&self) -> Duration {
        Duration::from_secs(self.typing_quiet_seconds)
    }

    /// Connect a message client with this configuration
    pub async fn build_message_client(
        &self,
    ) -> Result<super::MessageClient, super::MessageError> {
        super::MessageClient::connect(self.clone()).await
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:8081")
    }
}
