use std::sync::Arc;

use async_trait::async_trait;
use bridge_core::{
    AuthStateStream, AuthUser, BridgeError, IdentityBackend, MessageRecord, MessageStore,
    SnapshotStream,
};
use bridge_platform::SecretStore;
use tracing::info;

use crate::{
    auth::{FirebaseAuth, PopupHandler},
    config::{FirebaseConfig, FirebaseEndpoints, ListenerConfig},
    firestore::FirestoreClient,
};

/// Firebase Auth + Cloud Firestore behind the bridge backend traits.
pub struct FirebaseBackend {
    auth: Arc<FirebaseAuth>,
    firestore: FirestoreClient,
}

impl FirebaseBackend {
    pub fn new(
        config: FirebaseConfig,
        endpoints: FirebaseEndpoints,
        listener: ListenerConfig,
        popup: Arc<dyn PopupHandler>,
        store: Arc<dyn SecretStore>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;

        let http = reqwest::Client::new();
        let auth = Arc::new(FirebaseAuth::new(
            http.clone(),
            config.clone(),
            endpoints.clone(),
            popup,
            store,
        )?);
        let firestore = FirestoreClient::new(http, Arc::clone(&auth), &config, &endpoints, listener);

        info!(
            project_id = %config.project_id,
            firestore = %endpoints.firestore,
            "firebase backend ready"
        );
        Ok(Self { auth, firestore })
    }

    pub fn auth(&self) -> &FirebaseAuth {
        &self.auth
    }
}

#[async_trait]
impl IdentityBackend for FirebaseBackend {
    async fn sign_in_with_popup(&self) -> Result<AuthUser, BridgeError> {
        self.auth.sign_in_with_popup().await
    }

    async fn sign_out(&self) -> Result<(), BridgeError> {
        self.auth.sign_out().await
    }

    async fn id_token(&self, user: &AuthUser) -> Result<String, BridgeError> {
        self.auth.id_token(user).await
    }

    fn auth_state(&self) -> AuthStateStream {
        self.auth.auth_state()
    }
}

#[async_trait]
impl MessageStore for FirebaseBackend {
    async fn add_message(&self, uid: &str, record: MessageRecord) -> Result<(), BridgeError> {
        self.firestore.create_document(uid, &record).await
    }

    async fn watch_messages(&self, uid: &str) -> Result<SnapshotStream, BridgeError> {
        Ok(self.firestore.watch(uid))
    }
}
