//! Error types for the bridge runtime.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::component::ComponentId;
use crate::elements::ElementId;

/// Result type for bridge operations.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Errors that can occur while dispatching, requesting or navigating.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A history entry, element or component was not found.
    #[error("{0} not found")]
    NotFound(String),

    /// No handler is registered for the path.
    #[error("no handler registered for {path}")]
    HandlerNotFound { path: String },

    /// Payload shape does not match the requested type.
    #[error("decoding payload into {target} failed: {source}")]
    Decode {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Value could not be turned into a payload.
    #[error("encoding payload failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Path does not follow `/<segment>[/<segment>...][?query]`.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Location could not be parsed as a URL.
    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A handler is already registered for the path.
    #[error("handler already registered for {path}")]
    DuplicateHandler { path: String },

    /// Response carried a correlation id nobody is waiting for.
    #[error("protocol anomaly: no pending request with id {id}")]
    ProtocolAnomaly { id: u64 },

    /// Handler panicked while running on the dispatch worker.
    #[error("handler for {path} failed: {message}")]
    HandlerFailure { path: String, message: String },

    /// Native bridge is gone.
    #[error("native transport closed: {0}")]
    TransportTerminal(String),

    /// Bridge is shutting down.
    #[error("bridge has been shut down")]
    Shutdown,

    /// Native side did not reply in time.
    #[error("request {path} timed out after {}ms", .after.as_millis())]
    Timeout { path: String, after: Duration },

    /// Dispatch queue is at capacity.
    #[error("dispatch queue full (cap={capacity})")]
    QueueFull { capacity: usize },

    /// Blocking on the dispatch worker from the dispatch worker.
    #[error("synchronous dispatch of {path} from the dispatch worker would deadlock")]
    WouldDeadlock { path: String },

    /// Component is already mounted in the markup engine.
    #[error("component {component} is already mounted")]
    AlreadyMounted { component: ComponentId },

    /// Loading a component into a page failed.
    #[error("loading {url} in page {page} failed: {source}")]
    Mount {
        page: ElementId,
        url: String,
        #[source]
        source: Box<BridgeError>,
    },

    /// Error reported by the native side in a reply.
    #[error("native request {path} failed: {message}")]
    Native { path: String, message: String },

    /// Unrecoverable programmer error; stops the dispatch worker.
    #[error("fatal: {0}")]
    Fatal(String),

    /// Driver run loop already started.
    #[error("driver is already running")]
    AlreadyRunning,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BridgeError {
    pub fn not_found(what: impl Into<String>) -> Self {
        BridgeError::NotFound(what.into())
    }

    /// Stable snake_case code used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::NotFound(_) => "not_found",
            BridgeError::HandlerNotFound { .. } => "handler_not_found",
            BridgeError::Decode { .. } => "decode_error",
            BridgeError::Encode(_) => "encode_error",
            BridgeError::InvalidPath { .. } => "invalid_path",
            BridgeError::InvalidUrl { .. } => "invalid_url",
            BridgeError::DuplicateHandler { .. } => "duplicate_handler",
            BridgeError::ProtocolAnomaly { .. } => "protocol_anomaly",
            BridgeError::HandlerFailure { .. } => "handler_failure",
            BridgeError::TransportTerminal(_) => "transport_terminal",
            BridgeError::Shutdown => "shutdown",
            BridgeError::Timeout { .. } => "timeout",
            BridgeError::QueueFull { .. } => "queue_full",
            BridgeError::WouldDeadlock { .. } => "would_deadlock",
            BridgeError::AlreadyMounted { .. } => "already_mounted",
            BridgeError::Mount { .. } => "mount_error",
            BridgeError::Native { .. } => "native_error",
            BridgeError::Fatal(_) => "fatal",
            BridgeError::AlreadyRunning => "already_running",
            BridgeError::Io(_) => "io_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BridgeError::NotFound(_) | BridgeError::HandlerNotFound { .. }
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Fatal(_))
    }

    pub(crate) fn decode<T>(source: serde_json::Error) -> Self {
        BridgeError::Decode {
            target: std::any::type_name::<T>(),
            source,
        }
    }
}
