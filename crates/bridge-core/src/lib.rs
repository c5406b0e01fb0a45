//! Core contract shared between the bridge runtime, backends and frontend ports.
//!
//! This crate defines the port protocol (commands and events), the session
//! lifecycle, the backend traits, and common error/channel abstractions.

/// Backend traits implemented by identity/document-store adapters.
pub mod backend;
/// Async command/event channel primitives.
pub mod channel;
/// Stable bridge error type and HTTP classification helpers.
pub mod error;
/// Conversions from backend results to port events.
pub mod normalization;
/// Backoff policy used by background loops.
pub mod retry;
/// Session lifecycle state machine.
pub mod state_machine;
/// Frontend-facing protocol types (commands, events, payloads).
pub mod types;

pub use backend::{AuthStateStream, IdentityBackend, MessageStore, SnapshotStream};
pub use channel::{BridgeChannelError, BridgeChannels, EventStream, recv_event};
pub use error::{BridgeError, BridgeErrorCategory, classify_http_status};
pub use normalization::{
    FailureOrigin, credential_event, messages_from_snapshot, normalize_failure,
};
pub use retry::RetryPolicy;
pub use state_machine::{SessionStateMachine, SessionTransition};
pub use types::{
    AuthError, AuthUser, BridgeCommand, BridgeEvent, BridgeInitConfig, Credential, Document,
    ErrorReportPolicy, MessageBatch, MessageRecord, SaveRequest, SessionState, Snapshot,
};
