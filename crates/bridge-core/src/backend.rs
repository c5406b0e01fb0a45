use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::{
    error::BridgeError,
    types::{AuthUser, MessageRecord, Snapshot},
};

/// Live auth-state feed. Holds the current user, `None` when signed out.
pub type AuthStateStream = watch::Receiver<Option<AuthUser>>;

/// Live-query feed for one message collection. Dropping the receiver closes
/// the underlying listener.
pub type SnapshotStream = mpsc::Receiver<Result<Snapshot, BridgeError>>;

/// Identity provider side of the backend.
#[async_trait]
pub trait IdentityBackend: Send + Sync + 'static {
    /// Run the interactive popup flow and establish a session.
    ///
    /// On success the auth-state feed also reports the new user.
    async fn sign_in_with_popup(&self) -> Result<AuthUser, BridgeError>;

    /// Terminate the current session and clear any persisted copy.
    async fn sign_out(&self) -> Result<(), BridgeError>;

    /// Id token for `user`, refreshed when the cached one is close to expiry.
    async fn id_token(&self, user: &AuthUser) -> Result<String, BridgeError>;

    /// Subscribe to auth-state changes, starting with the current state.
    fn auth_state(&self) -> AuthStateStream;
}

/// Document store side of the backend, scoped to `users/{uid}/messages`.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Insert one message document.
    async fn add_message(&self, uid: &str, record: MessageRecord) -> Result<(), BridgeError>;

    /// Open a live query over the user's messages. The first item is the
    /// initial result set; later items follow each change.
    async fn watch_messages(&self, uid: &str) -> Result<SnapshotStream, BridgeError>;
}
