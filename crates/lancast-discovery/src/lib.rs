//! # Lancast Discovery
//!
//! LAN peer discovery and message correlation over UDP.
//!
//! Nodes announce their presence on a multicast group, maintain a live-peer
//! table with TTL expiry, and exchange unicast command/response envelopes
//! with request correlation: send a request, await its matching response or
//! time out.
//!
//! ## Architecture
//!
//! - **Envelope**: the JSON wire message and its three intents
//!   (announce, directed, response).
//! - **Transport**: one multicast socket per eligible interface plus one
//!   unicast socket; receive loops feed the dispatcher.
//! - **Device registry**: concurrent peer table, refreshed by announces,
//!   pruned by TTL sweeps.
//! - **Correlation table**: task id to single-slot waiter; delivers each
//!   response to exactly one requester.
//! - **Dispatcher**: classifies inbound envelopes as announce, awaited
//!   response, or registered command.
//! - **Scheduler**: periodic announcer and registry sweeper.
//! - **Discovery**: the public instance tying the above together.
//!
//! The crate emits structured [`tracing`] events and configures no
//! subscriber; delivery is best-effort UDP with no ordering, encryption, or
//! NAT traversal.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use lancast_discovery::{handler_fn, Discovery, DiscoveryConfig, Envelope};
//!
//! # async fn run() -> Result<(), lancast_discovery::DiscoveryError> {
//! let node = Arc::new(Discovery::new("workstation", "1.0.0", DiscoveryConfig::default()));
//!
//! // Serve "ping" with a "pong" reply.
//! let responder = node.clone();
//! node.register_handler("ping", handler_fn(move |source, request| {
//!     let responder = responder.clone();
//!     async move {
//!         let reply = Envelope::reply(&request, source.to_string(), "pong", None);
//!         let _ = responder.send(reply).await;
//!     }
//! }));
//!
//! node.start().await?;
//!
//! // Ask a discovered peer and await its answer.
//! if let Some(peer) = node.devices().first() {
//!     let request = Envelope::directed(peer.addr(), "ping", None);
//!     let response = node.request_response(request, Duration::from_secs(2)).await?;
//!     println!("{} answered {}", response.from_id, response.command);
//! }
//!
//! node.stop();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod registry;
pub(crate) mod scheduler;
pub mod service;
pub mod transport;

// Wire protocol
pub use envelope::{
    AnnouncePayload, Envelope, Intent, ANNOUNCE_COMMAND, MAX_DATAGRAM_LEN,
};

// Peer table
pub use registry::{Device, DeviceRegistry};

// Request correlation
pub use correlation::{CorrelationTable, ResponseWaiter};

// Inbound pipeline
pub use dispatcher::{handler_fn, CommandHandler, Dispatcher, HandlerRegistry};

// Transport
pub use transport::interfaces::MulticastCandidate;
pub use transport::Transport;

// Configuration
pub use config::{
    DiscoveryConfig, DEFAULT_ANNOUNCE_INTERVAL, DEFAULT_DEVICE_TTL, DEFAULT_MULTICAST_GROUP,
};

// Errors
pub use error::{DiscoveryError, DiscoveryResult};

// Public API surface
pub use service::Discovery;
