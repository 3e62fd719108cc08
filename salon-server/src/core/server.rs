//! Server Implementation
//!
//! 服务器启动和生命周期管理。The message bus TCP listener is the only
//! outward surface; everything else runs as background tasks off the
//! shared state.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::core::config::Config;
use crate::core::state::ServerState;
use crate::utils::{AppError, AppResult};

/// Chairbook server
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Create server with existing state (for tests and embedding)
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    pub async fn run(&self) -> AppResult<()> {
        let state = match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(self.config.clone())?,
        };
        let state = Arc::new(state);

        // TLS is optional in development, mandatory in production.
        let tls_config = load_tls_config(&state.config)?;
        if tls_config.is_none() {
            if state.config.is_production() {
                return Err(AppError::validation(
                    "Refusing to start without TLS in production; set TLS_CERT_PATH and TLS_KEY_PATH",
                ));
            }
            tracing::warn!("TLS not configured, message bus will accept plain TCP");
        }

        let tasks = state.start_background_tasks();

        let bus = state.bus.clone();
        let tcp_server = tokio::spawn(async move {
            if let Err(e) = bus.start_tcp_server(tls_config).await {
                tracing::error!("Message bus TCP server failed: {}", e);
            }
        });

        tracing::info!(
            port = state.config.message_tcp_port,
            environment = %state.config.environment,
            "Chairbook server running, press Ctrl+C to stop"
        );

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| AppError::internal(format!("Failed to listen for shutdown: {}", e)))?;
        tracing::info!("Shutdown signal received");

        // The registry holds the bus shutdown token, so this also stops the
        // TCP accept loop and the per-connection forwarders.
        tasks.shutdown().await;
        let _ = tcp_server.await;
        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Load the TLS server config from the configured PEM paths.
///
/// `Ok(None)` means TLS is simply not configured; setting only one of the
/// two paths is treated as a misconfiguration rather than silently running
/// in plain text.
fn load_tls_config(config: &Config) -> AppResult<Option<Arc<rustls::ServerConfig>>> {
    let (cert_path, key_path) = match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert), Some(key)) => (cert, key),
        (None, None) => return Ok(None),
        _ => {
            return Err(AppError::validation(
                "TLS requires both TLS_CERT_PATH and TLS_KEY_PATH",
            ));
        }
    };

    let cert_pem = std::fs::read(cert_path)
        .map_err(|e| AppError::internal(format!("Read TLS cert {}: {}", cert_path, e)))?;
    let mut cursor = std::io::Cursor::new(&cert_pem);
    let mut certs: Vec<CertificateDer<'static>> = Vec::new();
    for cert in rustls_pemfile::certs(&mut cursor) {
        certs.push(cert.map_err(|e| AppError::internal(format!("Parse TLS cert: {}", e)))?);
    }
    if certs.is_empty() {
        return Err(AppError::internal(format!(
            "No certificates found in {}",
            cert_path
        )));
    }

    let key_pem = std::fs::read(key_path)
        .map_err(|e| AppError::internal(format!("Read TLS key {}: {}", key_path, e)))?;
    let mut cursor = std::io::Cursor::new(&key_pem);
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut cursor)
        .map_err(|e| AppError::internal(format!("Parse TLS key: {}", e)))?
        .ok_or_else(|| AppError::internal(format!("No private key found in {}", key_path)))?;

    let tls = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| AppError::internal(format!("Build TLS config: {}", e)))?;

    tracing::info!(cert = %cert_path, "TLS enabled for message bus");
    Ok(Some(Arc::new(tls)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config::with_overrides("unused", 0)
    }

    #[test]
    fn test_no_tls_paths_is_plain() {
        let mut config = base_config();
        config.tls_cert_path = None;
        config.tls_key_path = None;
        assert!(load_tls_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_half_configured_tls_is_rejected() {
        let mut config = base_config();
        config.tls_cert_path = Some("/tmp/cert.pem".to_string());
        config.tls_key_path = None;
        assert!(load_tls_config(&config).is_err());
    }

    #[test]
    fn test_missing_cert_file_is_an_error() {
        let mut config = base_config();
        config.tls_cert_path = Some("/nonexistent/cert.pem".to_string());
        config.tls_key_path = Some("/nonexistent/key.pem".to_string());
        assert!(load_tls_config(&config).is_err());
    }
}
