//! Error types for the discovery subsystem.

use thiserror::Error;

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Errors surfaced by the discovery subsystem.
///
/// Only `NoInterfaces` is fatal, and only at startup. Errors arising inside
/// the background receive loops are logged and swallowed so that a single bad
/// datagram or socket hiccup never terminates discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No up, non-loopback, IPv4 interface was usable for multicast.
    #[error("no multicast-capable interface available")]
    NoInterfaces,

    /// Socket setup failed.
    #[error("socket bind failed: {source}")]
    Bind {
        #[source]
        source: std::io::Error,
    },

    /// Inbound datagram could not be decoded into an envelope.
    #[error("envelope decode failed: {source}")]
    EnvelopeDecode {
        #[from]
        source: serde_json::Error,
    },

    /// Encoded envelope exceeds the datagram ceiling.
    #[error("encoded envelope is {size} bytes, exceeds the {max} byte datagram ceiling")]
    EnvelopeTooLarge { size: usize, max: usize },

    /// A send could not be completed. For multicast fan-out this carries the
    /// last per-socket failure; earlier failures are logged individually.
    #[error("send failed: {reason}")]
    Send { reason: String },

    /// A directed or response envelope was missing its destination.
    #[error("directed envelope is missing a destination")]
    MissingDestination,

    /// Wire intent string not recognized.
    #[error("unknown intent: {intent}")]
    UnknownIntent { intent: String },

    /// No handler registered for a received command. Logged by the
    /// dispatcher, never propagated into the receive loop.
    #[error("no handler registered for command: {command}")]
    UnknownCommand { command: String },

    /// `request_response` deadline elapsed before the matching response.
    /// The expected outcome for unreachable peers, not a bug.
    #[error("request timed out: {task_id}")]
    RequestTimeout { task_id: String },

    /// Operation requires a started instance.
    #[error("discovery is not started")]
    NotStarted,

    /// `start` was called on an already started instance.
    #[error("discovery is already started")]
    AlreadyStarted,
}
