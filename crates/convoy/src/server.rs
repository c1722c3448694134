//! `ConvoyServer` builder and accept loop.
//!
//! This is the entry point for running a Convoy server. It ties the
//! layers together: transport → protocol → hub (sessions + roster).

use std::net::SocketAddr;
use std::time::Duration;

use convoy_protocol::{Codec, JsonCodec};
use convoy_session::{AccountStore, SessionConfig};
use convoy_transport::{Transport, WebSocketTransport};

use crate::ConvoyError;
use crate::handler::handle_connection;
use crate::hub::{HubHandle, spawn_hub};

/// Default per-connection read-idle limit. A connection that sends
/// nothing for this long is closed through the normal departure path.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Builder for configuring and starting a Convoy server.
///
/// # Example
///
/// ```rust,ignore
/// use convoy::prelude::*;
///
/// let server = ConvoyServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(my_accounts)
///     .await?;
/// server.run().await
/// ```
pub struct ConvoyServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    idle_timeout: Duration,
}

impl ConvoyServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_config: SessionConfig::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the session configuration (idle expiry, sweep cadence).
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets the per-connection read-idle limit.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Builds and starts the server with the given account store.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport` as defaults.
    pub async fn build<A: AccountStore>(
        self,
        accounts: A,
    ) -> Result<ConvoyServer<JsonCodec>, ConvoyError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let (hub, hub_task) = spawn_hub(accounts, self.session_config);

        Ok(ConvoyServer {
            transport,
            hub,
            hub_task,
            codec: JsonCodec,
            idle_timeout: self.idle_timeout,
        })
    }
}

impl Default for ConvoyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Convoy server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ConvoyServer<C: Codec + Clone> {
    transport: WebSocketTransport,
    hub: HubHandle,
    hub_task: tokio::task::JoinHandle<()>,
    codec: C,
    idle_timeout: Duration,
}

impl<C: Codec + Clone> ConvoyServer<C> {
    /// Creates a new builder.
    pub fn builder() -> ConvoyServerBuilder {
        ConvoyServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ConvoyError> {
        Ok(self.transport.local_addr()?)
    }

    /// Runs the server accept loop.
    ///
    /// Each accepted connection gets its own handler task. Runs until
    /// the process is terminated; returns an error only if the gateway
    /// hub stops, which nothing can recover from.
    pub async fn run(mut self) -> Result<(), ConvoyError> {
        tracing::info!("convoy server running");

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let hub = self.hub.clone();
                        let codec = self.codec.clone();
                        let idle_timeout = self.idle_timeout;
                        tokio::spawn(async move {
                            if let Err(error) =
                                handle_connection(conn, hub, codec, idle_timeout).await
                            {
                                tracing::debug!(
                                    error = %error,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(error) => {
                        tracing::error!(error = %error, "accept failed");
                    }
                },
                _ = &mut self.hub_task => {
                    tracing::error!("gateway hub stopped; shutting down");
                    return Err(ConvoyError::HubStopped);
                }
            }
        }
    }
}
