//! Tracegate services.
//!
//! Resource nodes and the directed-mechanism coordinator, served over TCP
//! with one newline-delimited JSON request and response per connection.
//!
//! # Architecture
//!
//! [`ResourceNode`] is a pure state machine (see [`tracegate_core`] for the
//! admission rules it applies). [`Server`] owns the accept loop and hands each
//! decoded request to a [`RequestHandler`]: either a [`NodeService`] wrapping
//! a node behind its mutex, or a [`Coordinator`].
//!
//! # Components
//!
//! - [`ResourceNode`] / [`NodeService`]: one resource's state, trace and
//!   admission handlers
//! - [`Coordinator`]: collect, evaluate, commit under a decision lock
//! - [`Server`]: accept loop, one task per connection
//! - [`TcpTransport`]: listening socket and line framing
//! - [`SystemEnv`]: production clock

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
mod coordinator;
mod error;
mod node;
mod system_env;
mod transport;

use std::{future::Future, net::SocketAddr, sync::Arc};

pub use config::{CoordinatorConfig, NodeConfig};
pub use coordinator::{CollectError, Coordinator, CoordinatorError, DirectedOutcome};
pub use error::ServerError;
pub use node::{NodeError, NodeReply, NodeService, ResourceNode};
pub use system_env::SystemEnv;
use tokio::{io::AsyncWriteExt, net::TcpStream};
use tracegate_proto::{MAX_LINE_BYTES, Request, Response, decode_request, encode_line};
pub use transport::{TcpTransport, read_line};

/// Answers decoded requests.
///
/// Handlers never fail: refusals are reported in the [`Response`].
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle one request.
    fn handle(&self, request: Request) -> impl Future<Output = Response> + Send;
}

/// TCP server for one handler.
pub struct Server<H: RequestHandler> {
    handler: Arc<H>,
    transport: TcpTransport,
}

impl<H: RequestHandler> Server<H> {
    /// Bind `address` and serve `handler` on it.
    pub async fn bind(address: &str, handler: H) -> Result<Self, ServerError> {
        let transport = TcpTransport::bind(address).await?;
        Ok(Self { handler: Arc::new(handler), transport })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Accept connections until the process exits.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        loop {
            match self.transport.accept().await {
                Ok((stream, peer)) => {
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, handler).await {
                            tracing::error!("Connection error from {}: {}", peer, e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }
}

impl Server<NodeService<SystemEnv>> {
    /// Bind a resource node from configuration.
    pub async fn node(config: NodeConfig) -> Result<Self, ServerError> {
        let node = ResourceNode::new(config.resource_id, config.agents);
        Self::bind(&config.bind_address, NodeService::new(node, SystemEnv::new())).await
    }
}

impl Server<Coordinator<SystemEnv>> {
    /// Bind a coordinator from configuration.
    pub async fn coordinator(config: CoordinatorConfig) -> Result<Self, ServerError> {
        let coordinator = Coordinator::new(
            config.nodes,
            config.constraints,
            config.request_timeout,
            SystemEnv::new(),
        );
        Self::bind(&config.bind_address, coordinator).await
    }
}

/// Serve a single request on one connection, then close it.
///
/// Undecodable input is answered with `{ok:false, error}` naming the request
/// type when it could be read.
async fn handle_connection<H: RequestHandler>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
) -> Result<(), ServerError> {
    let Some(line) = read_line(&mut stream, MAX_LINE_BYTES).await? else {
        tracing::debug!("{} closed without a request", peer);
        return Ok(());
    };

    let response = match decode_request(&line) {
        Ok(request) => {
            tracing::debug!(kind = request.kind(), %peer, "request");
            handler.handle(request).await
        },
        Err(e) => {
            tracing::warn!(%peer, error = %e, "malformed request");
            Response::error(e.to_string())
        },
    };

    stream.write_all(&encode_line(&response)?).await?;
    stream.shutdown().await?;
    Ok(())
}
