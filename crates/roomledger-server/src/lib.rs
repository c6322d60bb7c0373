//! Roomledger production server.
//!
//! This crate wraps the sans-IO ledger from `roomledger-core` with:
//! - Tokio for the async runtime and TCP transport
//! - A read/write lock serializing every ledger operation
//! - An async notification dispatcher with configurable retry
//! - System time and OS randomness
//!
//! ## Architecture
//!
//! ```text
//! roomledger-server
//!   ├─ SystemEnv          (production Environment impl)
//!   ├─ LedgerService      (lock + commit, events enqueued in commit order)
//!   ├─ Dispatcher         (NotificationSink delivery, DeliveryPolicy)
//!   ├─ protocol           (length-prefixed CBOR frames)
//!   └─ Server             (TCP accept loop, one task per connection)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
pub mod dispatch;
mod error;
pub mod protocol;
mod service;
mod system_env;

use std::net::SocketAddr;

use bytes::BytesMut;
pub use client::LedgerClient;
pub use dispatch::{
    ChannelSink, DeliveryPolicy, DispatchHandle, NotificationSink, SinkError, TracingSink,
    spawn_dispatcher,
};
pub use error::ServerError;
pub use protocol::{
    DEFAULT_MAX_FRAME_BYTES, MAX_PAGE_LIMIT, ProtocolError, Request, Response, ResponseBody,
};
use roomledger_core::{Environment, ErrorKind, LedgerConfig};
pub use service::LedgerService;
pub use system_env::SystemEnv;
use tokio::net::{TcpListener, TcpStream};

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "127.0.0.1:4455")
    pub bind_address: String,
    /// Ledger configuration (General room owner, cooldown)
    pub ledger: LedgerConfig,
    /// Largest accepted request payload in bytes; responses are capped at
    /// [`protocol::response_limit`] of this
    pub max_frame_bytes: usize,
    /// How notification sink failures are handled
    pub delivery: DeliveryPolicy,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:4455".to_string(),
            ledger: LedgerConfig::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            delivery: DeliveryPolicy::default(),
        }
    }
}

/// Production Roomledger server.
///
/// Wraps `LedgerService` with a TCP listener and the system environment.
pub struct Server {
    /// Shared ledger
    service: LedgerService<SystemEnv>,
    /// Bound listener
    listener: TcpListener,
    /// Frame size limits
    limits: FrameLimits,
}

/// Per-direction frame caps for one connection.
#[derive(Debug, Clone, Copy)]
struct FrameLimits {
    request: usize,
    response: usize,
}

impl FrameLimits {
    fn new(max_frame_bytes: usize) -> Self {
        Self { request: max_frame_bytes, response: protocol::response_limit(max_frame_bytes) }
    }
}

impl Server {
    /// Create and bind a server that logs every ledger event.
    ///
    /// # Errors
    ///
    /// Returns error if binding to the address fails.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        Self::bind_with_sink(config, TracingSink).await
    }

    /// Create and bind a server delivering ledger events to `sink`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The frame limit is zero
    /// - Binding to the address fails
    pub async fn bind_with_sink<S: NotificationSink>(
        config: ServerRuntimeConfig,
        sink: S,
    ) -> Result<Self, ServerError> {
        if config.max_frame_bytes == 0 {
            return Err(ServerError::Config("max_frame_bytes must be positive".to_string()));
        }

        let env = SystemEnv::new();
        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            ServerError::Transport(format!("failed to bind {}: {e}", config.bind_address))
        })?;

        // The dispatcher outlives `run` until every service clone is gone.
        let (notifier, _dispatcher) = spawn_dispatcher(env.clone(), sink, config.delivery);
        let service = LedgerService::new(env, config.ledger, notifier);

        Ok(Self { service, listener, limits: FrameLimits::new(config.max_frame_bytes) })
    }

    /// Handle to the ledger this server exposes.
    pub fn service(&self) -> &LedgerService<SystemEnv> {
        &self.service
    }

    /// Run the server, accepting connections and processing requests.
    ///
    /// This method runs until the task is aborted or the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.listener.local_addr()?);

        let Self { service, listener, limits } = self;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let service = service.clone();

                    tokio::spawn(async move {
                        let result = handle_connection(stream, peer, service, limits);
                        if let Err(e) = result.await {
                            tracing::debug!("Connection error: {}", e);
                        }
                    });
                },
                Err(e) if is_transient(&e) => {
                    tracing::error!("Accept error: {}", e);
                },
                Err(e) => return Err(ServerError::from(e)),
            }
        }
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }
}

/// Accept failures that affect a single connection, not the listener.
fn is_transient(e: &std::io::Error) -> bool {
    use std::io::ErrorKind as Io;
    matches!(e.kind(), Io::ConnectionAborted | Io::ConnectionReset | Io::Interrupted)
}

/// Serve one TCP connection: read a request, execute it, write the response.
async fn handle_connection<E: Environment>(
    mut stream: TcpStream,
    peer: SocketAddr,
    service: LedgerService<E>,
    limits: FrameLimits,
) -> Result<(), ServerError> {
    let conn_id = service.env().random_u64();
    tracing::debug!(conn_id, %peer, "New connection");

    let mut buf = BytesMut::with_capacity(4096);

    loop {
        let frame = protocol::read_frame(&mut stream, &mut buf, limits.request).await;
        let request: Request = match frame {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(ProtocolError::Decode(e)) => {
                tracing::warn!(conn_id, "Request decode error: {}", e);
                let reply = Response::Err {
                    kind: ErrorKind::InvalidInput,
                    message: format!("malformed request: {e}"),
                    retry_after_secs: None,
                };
                protocol::write_frame(&mut stream, &reply, limits.response).await?;
                continue;
            },
            Err(e) => return Err(e.into()),
        };

        let op = request.op();
        let response = service.handle(request).await;
        if let Response::Err { kind, .. } = &response {
            tracing::debug!(conn_id, op, ?kind, "Request rejected");
        }

        match protocol::write_frame(&mut stream, &response, limits.response).await {
            Ok(()) => {},
            // Only a room index longer than a full page budget gets here.
            Err(ProtocolError::FrameTooLarge { size, max }) => {
                tracing::warn!(conn_id, op, size, max, "Response exceeds frame limit");
                let reply = Response::Err {
                    kind: ErrorKind::InvalidInput,
                    message: format!("response of {size} bytes exceeds frame limit {max}"),
                    retry_after_secs: None,
                };
                protocol::write_frame(&mut stream, &reply, limits.response).await?;
            },
            Err(e) => return Err(e.into()),
        }
    }

    tracing::debug!(conn_id, "Connection closed");
    Ok(())
}
