use serde::{Deserialize, Serialize};

/// Session state tracked by the bridge runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No authenticated user. Initial state.
    #[default]
    SignedOut,
    /// A user session is established or was restored from persistence.
    SignedIn {
        /// Opaque backend user identifier.
        uid: String,
    },
}

impl SessionState {
    /// Signed-in user id, if any.
    pub fn uid(&self) -> Option<&str> {
        match self {
            Self::SignedOut => None,
            Self::SignedIn { uid } => Some(uid.as_str()),
        }
    }
}

/// How a failure that the frontend never asked about is reported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReportPolicy {
    /// Log locally and keep the frontend unaware.
    #[default]
    Log,
    /// Log and forward on the `signInError` channel.
    Surface,
}

/// Runtime tuning supplied when the bridge is spawned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeInitConfig {
    /// Capacity of the frontend command queue.
    pub command_buffer: usize,
    /// Capacity of the event fan-out buffer.
    ///
    /// A port writer that falls this many events behind loses the oldest
    /// ones, `signInInfo` and `signInError` included. The default leaves room
    /// for a few hundred large message batches queued behind a slow stdout.
    pub event_buffer: usize,
    /// Reporting policy for id-token retrieval failures after auth-state changes.
    pub token_refresh_errors: ErrorReportPolicy,
    /// Reporting policy for sign-out failures.
    pub sign_out_errors: ErrorReportPolicy,
}

impl Default for BridgeInitConfig {
    fn default() -> Self {
        Self {
            command_buffer: 64,
            event_buffer: 256,
            token_refresh_errors: ErrorReportPolicy::Log,
            sign_out_errors: ErrorReportPolicy::Log,
        }
    }
}

/// Authenticated identity handed to the frontend on `signInInfo`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    /// Backend id token for the user.
    pub token: String,
    /// Account email, empty when the provider supplied none.
    pub email: String,
    /// Opaque backend user identifier.
    pub uid: String,
}

/// Error payload sent on `signInError`.
///
/// Used for both authentication and persistence failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthError {
    /// Backend error code, forwarded untouched.
    pub code: String,
    /// Human-readable backend message.
    pub message: String,
}

/// One document of a user's message collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRecord {
    pub content: String,
}

/// Frontend request to persist a new message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveRequest {
    /// Owner of the target collection.
    pub uid: String,
    /// Message body.
    pub content: String,
}

/// Full replacement list of message contents for the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MessageBatch {
    pub messages: Vec<String>,
}

/// Backend user as reported by auth-state notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Document as delivered inside a live-query snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Document id (last path segment).
    pub id: String,
    /// Decoded field values.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    /// Non-empty string `content` field, if the document defines one.
    pub fn content(&self) -> Option<&str> {
        self.fields
            .get("content")
            .and_then(|value| value.as_str())
            .filter(|content| !content.is_empty())
    }
}

/// Current full result set of a live query, in backend iteration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

/// Inbound frontend commands, one variant per port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "port", content = "payload", rename_all = "camelCase")]
pub enum BridgeCommand {
    /// Start the interactive popup sign-in flow.
    SignIn,
    /// End the backend session. Fire-and-forget.
    SignOut,
    /// Persist a message into `users/{uid}/messages`.
    SaveMessage(SaveRequest),
}

impl BridgeCommand {
    /// Port name as seen by the frontend.
    pub fn port(&self) -> &'static str {
        match self {
            Self::SignIn => "signIn",
            Self::SignOut => "signOut",
            Self::SaveMessage(_) => "saveMessage",
        }
    }
}

/// Outbound notifications, one variant per port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "port", content = "payload", rename_all = "camelCase")]
pub enum BridgeEvent {
    /// Successful sign-in or restored session.
    SignInInfo(Credential),
    /// Authentication or persistence failure.
    SignInError(AuthError),
    /// Message set changed; carries the full current list.
    ReceiveMessages(MessageBatch),
}

impl BridgeEvent {
    /// Port name as seen by the frontend.
    pub fn port(&self) -> &'static str {
        match self {
            Self::SignInInfo(_) => "signInInfo",
            Self::SignInError(_) => "signInError",
            Self::ReceiveMessages(_) => "receiveMessages",
        }
    }
}
