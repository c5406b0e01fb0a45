use crate::types::{AuthUser, SessionState};

/// Outcome of feeding one auth-state notification into the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    /// SignedOut -> SignedIn.
    SignedIn { uid: String },
    /// SignedIn -> SignedIn, either the same user re-authenticated or another
    /// user replaced the session.
    Reauthenticated { previous_uid: String, uid: String },
    /// SignedIn -> SignedOut.
    SignedOut { previous_uid: String },
    /// SignedOut -> SignedOut; nothing to do.
    Unchanged,
}

impl SessionTransition {
    /// Whether any live subscription must be closed.
    pub fn closes_subscription(&self) -> bool {
        matches!(self, Self::Reauthenticated { .. } | Self::SignedOut { .. })
    }

    /// User whose message subscription must be opened.
    pub fn opens_subscription_for(&self) -> Option<&str> {
        match self {
            Self::SignedIn { uid } | Self::Reauthenticated { uid, .. } => Some(uid.as_str()),
            Self::SignedOut { .. } | Self::Unchanged => None,
        }
    }
}

/// Two-state session lifecycle: `SignedOut` and `SignedIn(uid)`.
#[derive(Debug, Clone, Default)]
pub struct SessionStateMachine {
    state: SessionState,
}

impl SessionStateMachine {
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Apply an auth-state notification. Every user notification counts as a
    /// fresh session, so a repeated sign-in always replaces the subscription.
    pub fn on_auth_state(&mut self, user: Option<&AuthUser>) -> SessionTransition {
        let previous = std::mem::take(&mut self.state);

        match (previous, user) {
            (SessionState::SignedOut, None) => SessionTransition::Unchanged,
            (SessionState::SignedOut, Some(user)) => {
                self.state = SessionState::SignedIn {
                    uid: user.uid.clone(),
                };
                SessionTransition::SignedIn {
                    uid: user.uid.clone(),
                }
            }
            (SessionState::SignedIn { uid: previous_uid }, Some(user)) => {
                self.state = SessionState::SignedIn {
                    uid: user.uid.clone(),
                };
                SessionTransition::Reauthenticated {
                    previous_uid,
                    uid: user.uid.clone(),
                }
            }
            (SessionState::SignedIn { uid: previous_uid }, None) => {
                SessionTransition::SignedOut { previous_uid }
            }
        }
    }
}
