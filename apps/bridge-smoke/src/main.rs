use std::{env, sync::Arc};

use bridge_core::{BridgeError, IdentityBackend};
use bridge_firebase::{
    FirebaseBackend, FirebaseConfig, FirebaseEndpoints, IdpResponse, ListenerConfig, PopupHandler,
    PopupRequest, popup_closed_error,
};
use bridge_platform::InMemorySecretStore;

struct NoPopup;

#[async_trait::async_trait]
impl PopupHandler for NoPopup {
    async fn open(&self, _request: &PopupRequest) -> Result<IdpResponse, BridgeError> {
        Err(popup_closed_error())
    }
}

#[tokio::main]
async fn main() {
    let var = |key: &str| env::var(key).unwrap_or_default();
    let config = FirebaseConfig {
        api_key: var("FIREBRIDGE_API_KEY"),
        auth_domain: var("FIREBRIDGE_AUTH_DOMAIN"),
        database_url: var("FIREBRIDGE_DATABASE_URL"),
        project_id: var("FIREBRIDGE_PROJECT_ID"),
        storage_bucket: var("FIREBRIDGE_STORAGE_BUCKET"),
        messaging_sender_id: var("FIREBRIDGE_MESSAGING_SENDER_ID"),
        app_id: var("FIREBRIDGE_APP_ID"),
    };

    let endpoints = match FirebaseEndpoints::with_emulators(
        env::var("FIREBASE_AUTH_EMULATOR_HOST").ok().as_deref(),
        env::var("FIRESTORE_EMULATOR_HOST").ok().as_deref(),
    ) {
        Ok(endpoints) => endpoints,
        Err(err) => {
            eprintln!("Invalid emulator endpoints: {err}");
            std::process::exit(1);
        }
    };

    match FirebaseBackend::new(
        config,
        endpoints.clone(),
        ListenerConfig::default(),
        Arc::new(NoPopup),
        Arc::new(InMemorySecretStore::default()),
    ) {
        Ok(backend) => {
            println!("Firebase backend initialized.");
            println!("Auth endpoint: {}", endpoints.identity_toolkit);
            println!("Firestore endpoint: {}", endpoints.firestore);
            println!(
                "Signed in at start: {}",
                backend.auth_state().borrow().is_some()
            );
            println!("Run firebridge-host with FIREBRIDGE_POPUP_COMMAND set for live sign-in.");
        }
        Err(err) => {
            eprintln!("Failed to initialize backend: {err}");
            std::process::exit(1);
        }
    }
}
