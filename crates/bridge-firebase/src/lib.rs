//! Firebase backend for the bridge and the runtime that drives it.
//!
//! `FirebaseBackend` talks to Firebase Auth (Identity Toolkit + Secure Token)
//! and Cloud Firestore over REST. `spawn_runtime` owns the session lifecycle
//! and turns port commands into backend calls and backend results into port
//! events.

/// Firebase Auth client, popup seam and session persistence.
pub mod auth;
/// `IdentityBackend` + `MessageStore` implementation over Firebase REST.
pub mod backend;
/// Project settings, endpoints and listener tuning.
pub mod config;
mod error_map;
/// Firestore REST client and polling live query.
pub mod firestore;
/// Command/event runtime with the session and its subscription.
pub mod runtime;
#[cfg(test)]
mod test_http;

pub use auth::{FirebaseAuth, IdpResponse, PopupHandler, PopupRequest};
pub use backend::FirebaseBackend;
pub use config::{FirebaseConfig, FirebaseEndpoints, ListenerConfig};
pub use error_map::popup_closed_error;
pub use firestore::FirestoreClient;
pub use runtime::{BridgeRuntimeHandle, spawn_runtime};
