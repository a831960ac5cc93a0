//! `SignalingServer` builder and accept loop.
//!
//! The signaling server is the relay-facing surface of a
//! [`StreamManager`]: it decodes relay events from WebSocket frames and
//! invokes the manager. It adds no semantics of its own.

use std::sync::Arc;

use depthcast_device::DeviceDriver;
use depthcast_protocol::JsonCodec;
use depthcast_transport::{RtcEngine, Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{DepthcastError, ManagerConfig, StreamManager};

/// Builder for configuring and starting a signaling server.
///
/// # Example
///
/// ```rust,ignore
/// use depthcast::prelude::*;
///
/// let server = SignalingServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(driver, engine)
///     .await?;
/// server.run().await
/// ```
pub struct SignalingServerBuilder {
    bind_addr: String,
    manager_config: ManagerConfig,
}

impl SignalingServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            manager_config: ManagerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the stream manager configuration.
    pub fn manager_config(mut self, config: ManagerConfig) -> Self {
        self.manager_config = config;
        self
    }

    /// Binds the listener and starts a fresh [`StreamManager`] for
    /// `driver` and `engine`.
    pub async fn build<D: DeviceDriver, E: RtcEngine>(
        self,
        driver: Arc<D>,
        engine: E,
    ) -> Result<SignalingServer<D, E>, DepthcastError> {
        let Self {
            bind_addr,
            manager_config,
        } = self;
        let manager = StreamManager::new(driver, engine, manager_config);
        manager.start();
        Self::bind_to(&bind_addr, manager).await
    }

    /// Binds the listener in front of an existing manager, for hosts that
    /// also expose the manager some other way.
    pub async fn serve<D: DeviceDriver, E: RtcEngine>(
        self,
        manager: StreamManager<D, E>,
    ) -> Result<SignalingServer<D, E>, DepthcastError> {
        Self::bind_to(&self.bind_addr, manager).await
    }

    async fn bind_to<D: DeviceDriver, E: RtcEngine>(
        bind_addr: &str,
        manager: StreamManager<D, E>,
    ) -> Result<SignalingServer<D, E>, DepthcastError> {
        let transport = WebSocketTransport::bind(bind_addr).await?;
        Ok(SignalingServer {
            transport,
            manager,
            codec: JsonCodec,
        })
    }
}

impl Default for SignalingServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound signaling server.
///
/// Call [`run()`](Self::run) to start accepting relay connections.
pub struct SignalingServer<D: DeviceDriver, E: RtcEngine> {
    transport: WebSocketTransport,
    manager: StreamManager<D, E>,
    codec: JsonCodec,
}

impl<D: DeviceDriver, E: RtcEngine> SignalingServer<D, E> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    pub fn manager(&self) -> &StreamManager<D, E> {
        &self.manager
    }

    /// Runs the accept loop.
    ///
    /// Spawns a handler task for each relay connection. Runs until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), DepthcastError> {
        tracing::info!("depthcast signaling server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let manager = self.manager.clone();
                    let codec = self.codec;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, manager, codec).await {
                            tracing::debug!(error = %e, "relay connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
