use crate::{
    error::BridgeError,
    types::{AuthUser, BridgeEvent, Credential, ErrorReportPolicy, MessageBatch, Snapshot},
};

/// Which operation produced a failure; decides how it reaches the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOrigin {
    /// Popup sign-in or its follow-up token fetch.
    SignIn,
    /// Message insert.
    SaveMessage,
    /// Id-token fetch after an auth-state notification.
    TokenRefresh,
    /// Session termination.
    SignOut,
}

impl FailureOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignIn => "sign_in",
            Self::SaveMessage => "save_message",
            Self::TokenRefresh => "token_refresh",
            Self::SignOut => "sign_out",
        }
    }
}

/// Build the `signInInfo` event for an authenticated user and its id token.
pub fn credential_event(user: &AuthUser, token: String) -> BridgeEvent {
    BridgeEvent::SignInInfo(Credential {
        token,
        email: user.email.clone().unwrap_or_default(),
        uid: user.uid.clone(),
    })
}

/// Convert a snapshot into the full `receiveMessages` batch.
///
/// Documents without a non-empty string `content` are skipped; order follows
/// the snapshot.
pub fn messages_from_snapshot(snapshot: &Snapshot) -> MessageBatch {
    MessageBatch {
        messages: snapshot
            .documents
            .iter()
            .filter_map(|doc| doc.content().map(ToOwned::to_owned))
            .collect(),
    }
}

/// Route a failure to the `signInError` port, or `None` when it stays local.
///
/// Sign-in and save failures always reach the frontend; token-refresh and
/// sign-out failures follow their configured policy.
pub fn normalize_failure(
    origin: FailureOrigin,
    error: BridgeError,
    policy: ErrorReportPolicy,
) -> Option<BridgeEvent> {
    let surfaced = match origin {
        FailureOrigin::SignIn | FailureOrigin::SaveMessage => true,
        FailureOrigin::TokenRefresh | FailureOrigin::SignOut => {
            policy == ErrorReportPolicy::Surface
        }
    };

    surfaced.then(|| BridgeEvent::SignInError(error.into()))
}
