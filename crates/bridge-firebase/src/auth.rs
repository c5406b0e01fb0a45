use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bridge_core::{AuthStateStream, AuthUser, BridgeError, BridgeErrorCategory};
use bridge_platform::{ScopedSecretStore, SecretStore, SecretStoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::{FirebaseConfig, FirebaseEndpoints, endpoint},
    error_map::{
        is_session_terminal, map_auth_rest_error, map_auth_transport_error, no_current_user_error,
    },
};

const SECRET_SERVICE: &str = "firebridge";
const GOOGLE_PROVIDER_ID: &str = "google.com";
/// Refresh id tokens this long before Firebase would reject them.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Parameters handed to the popup helper.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PopupRequest {
    pub provider_id: String,
    pub auth_domain: String,
    pub api_key: String,
    pub app_id: String,
    /// Correlates the popup result with this attempt.
    pub event_id: String,
    pub scopes: Vec<String>,
}

/// Identity-provider response captured by the popup, as accepted by
/// `accounts:signInWithIdp`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdpResponse {
    /// URL the IdP redirected back to.
    pub request_uri: String,
    /// Form-encoded IdP credential, e.g. `id_token=...&providerId=google.com`.
    pub post_body: String,
}

/// Interactive popup surface. Failing with `auth/popup-closed-by-user` is the
/// expected outcome of a dismissed popup.
#[async_trait]
pub trait PopupHandler: Send + Sync + 'static {
    async fn open(&self, request: &PopupRequest) -> Result<IdpResponse, BridgeError>;
}

/// Session data kept across launches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct PersistedSession {
    uid: String,
    email: Option<String>,
    display_name: Option<String>,
    refresh_token: String,
}

impl PersistedSession {
    fn user(&self) -> AuthUser {
        AuthUser {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedIdToken {
    token: String,
    expires_at: Instant,
}

impl CachedIdToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Debug)]
struct ActiveSession {
    persisted: PersistedSession,
    id_token: Option<CachedIdToken>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpRequest<'a> {
    request_uri: &'a str,
    post_body: &'a str,
    return_secure_token: bool,
    return_idp_credential: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpResponse {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct RefreshTokenResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

/// Firebase Auth over the Identity Toolkit and Secure Token REST APIs.
pub struct FirebaseAuth {
    http: reqwest::Client,
    config: FirebaseConfig,
    endpoints: FirebaseEndpoints,
    popup: Arc<dyn PopupHandler>,
    store: ScopedSecretStore<Arc<dyn SecretStore>>,
    session: Mutex<Option<ActiveSession>>,
    state_tx: watch::Sender<Option<AuthUser>>,
}

impl FirebaseAuth {
    /// Build the client and restore any persisted session.
    pub fn new(
        http: reqwest::Client,
        config: FirebaseConfig,
        endpoints: FirebaseEndpoints,
        popup: Arc<dyn PopupHandler>,
        store: Arc<dyn SecretStore>,
    ) -> Result<Self, BridgeError> {
        let store = ScopedSecretStore::new(store, SECRET_SERVICE);
        let restored = load_session(&store, &config.persistence_key())?;

        let initial_user = restored.as_ref().map(PersistedSession::user);
        if let Some(user) = &initial_user {
            info!(uid = %user.uid, "restored persisted auth session");
        }
        let (state_tx, _) = watch::channel(initial_user);

        Ok(Self {
            http,
            config,
            endpoints,
            popup,
            store,
            session: Mutex::new(restored.map(|persisted| ActiveSession {
                persisted,
                id_token: None,
            })),
            state_tx,
        })
    }

    pub fn auth_state(&self) -> AuthStateStream {
        self.state_tx.subscribe()
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.state_tx.borrow().clone()
    }

    /// Popup flow: ask the helper for an IdP credential, exchange it for a
    /// Firebase session, persist it and publish the new user.
    pub async fn sign_in_with_popup(&self) -> Result<AuthUser, BridgeError> {
        let request = PopupRequest {
            provider_id: GOOGLE_PROVIDER_ID.to_owned(),
            auth_domain: self.config.auth_domain.clone(),
            api_key: self.config.api_key.clone(),
            app_id: self.config.app_id.clone(),
            event_id: Uuid::new_v4().to_string(),
            scopes: vec!["openid".to_owned(), "email".to_owned(), "profile".to_owned()],
        };
        debug!(event_id = %request.event_id, "opening sign-in popup");
        let idp = self.popup.open(&request).await?;

        let url = endpoint(&self.endpoints.identity_toolkit, &["accounts:signInWithIdp"]);
        let response = self
            .http
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&SignInWithIdpRequest {
                request_uri: &idp.request_uri,
                post_body: &idp.post_body,
                return_secure_token: true,
                return_idp_credential: true,
            })
            .send()
            .await
            .map_err(map_auth_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_auth_rest_error(status.as_u16(), &body));
        }
        let signed_in: SignInWithIdpResponse =
            response.json().await.map_err(map_auth_transport_error)?;

        let persisted = PersistedSession {
            uid: signed_in.local_id,
            email: signed_in.email,
            display_name: signed_in.display_name,
            refresh_token: signed_in.refresh_token,
        };
        let user = persisted.user();
        let id_token = CachedIdToken {
            token: signed_in.id_token,
            expires_at: Instant::now() + parse_expires_in(&signed_in.expires_in),
        };

        self.store_session(&persisted)?;
        *self.session.lock().await = Some(ActiveSession {
            persisted,
            id_token: Some(id_token),
        });

        info!(uid = %user.uid, "popup sign-in complete");
        self.state_tx.send_replace(Some(user.clone()));
        Ok(user)
    }

    /// Drop the local session. In-memory state is cleared even when the
    /// persisted copy cannot be removed.
    pub async fn sign_out(&self) -> Result<(), BridgeError> {
        let previous = self.session.lock().await.take();
        let removal = self
            .store
            .delete(&self.config.persistence_key())
            .map_err(|err| map_secret_store_error("delete_session", err));

        if let Some(previous) = previous {
            info!(uid = %previous.persisted.uid, "signed out");
        }
        self.state_tx.send_replace(None);
        removal
    }

    /// Cached id token for `user`, refreshed when close to expiry.
    pub async fn id_token(&self, user: &AuthUser) -> Result<String, BridgeError> {
        let mut guard = self.session.lock().await;
        let session = match guard.as_mut() {
            Some(session) if session.persisted.uid == user.uid => session,
            _ => return Err(no_current_user_error()),
        };

        if let Some(cached) = &session.id_token
            && cached.is_fresh(Instant::now())
        {
            return Ok(cached.token.clone());
        }

        match self.refresh(&session.persisted.refresh_token).await {
            Ok(refreshed) => {
                if refreshed.refresh_token != session.persisted.refresh_token {
                    session.persisted.refresh_token = refreshed.refresh_token;
                    if let Err(err) = self.store_session(&session.persisted) {
                        warn!(error = %err, "failed persisting rotated refresh token");
                    }
                }
                session.id_token = Some(CachedIdToken {
                    token: refreshed.id_token.clone(),
                    expires_at: Instant::now() + parse_expires_in(&refreshed.expires_in),
                });
                Ok(refreshed.id_token)
            }
            Err(err) if is_session_terminal(&err.code) => {
                warn!(uid = %user.uid, code = %err.code, "session can no longer be refreshed");
                *guard = None;
                drop(guard);
                if let Err(store_err) = self.store.delete(&self.config.persistence_key()) {
                    warn!(error = %store_err, "failed clearing dead session");
                }
                self.state_tx.send_replace(None);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Token for whoever is signed in right now, `None` when signed out.
    pub async fn current_token(&self) -> Result<Option<String>, BridgeError> {
        match self.current_user() {
            Some(user) => self.id_token(&user).await.map(Some),
            None => Ok(None),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshTokenResponse, BridgeError> {
        let url = endpoint(&self.endpoints.secure_token, &["token"]);
        let response = self
            .http
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(map_auth_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_auth_rest_error(status.as_u16(), &body));
        }
        response.json().await.map_err(map_auth_transport_error)
    }

    fn store_session(&self, session: &PersistedSession) -> Result<(), BridgeError> {
        let encoded = serde_json::to_string(session).map_err(|err| {
            BridgeError::new(
                BridgeErrorCategory::Serialization,
                "auth/internal-error",
                err.to_string(),
            )
        })?;
        self.store
            .set(&self.config.persistence_key(), &encoded)
            .map_err(|err| map_secret_store_error("set_session", err))
    }
}

fn load_session(
    store: &ScopedSecretStore<Arc<dyn SecretStore>>,
    key: &str,
) -> Result<Option<PersistedSession>, BridgeError> {
    let Some(raw) = store
        .get_optional(key)
        .map_err(|err| map_secret_store_error("get_session", err))?
    else {
        return Ok(None);
    };

    match serde_json::from_str::<PersistedSession>(&raw) {
        Ok(session) => Ok(Some(session)),
        Err(err) => {
            warn!(error = %err, "discarding unreadable persisted session");
            Ok(None)
        }
    }
}

fn parse_expires_in(raw: &str) -> Duration {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .unwrap_or(Duration::ZERO)
}

fn map_secret_store_error(operation: &str, err: SecretStoreError) -> BridgeError {
    BridgeError::new(
        BridgeErrorCategory::Storage,
        "auth/internal-error",
        format!("session persistence failed during {operation}: {err}"),
    )
}

#[cfg(test)]
mod tests {
    use bridge_platform::InMemorySecretStore;

    use super::*;
    use crate::{
        error_map::popup_closed_error,
        test_http::{StubResponse, StubServer, direct_client},
    };

    struct DismissedPopup;

    #[async_trait]
    impl PopupHandler for DismissedPopup {
        async fn open(&self, _request: &PopupRequest) -> Result<IdpResponse, BridgeError> {
            Err(popup_closed_error())
        }
    }

    fn config() -> FirebaseConfig {
        FirebaseConfig {
            api_key: "key-123".into(),
            auth_domain: "demo.firebaseapp.com".into(),
            project_id: "demo-project".into(),
            ..FirebaseConfig::default()
        }
    }

    fn auth_with_store(store: Arc<dyn SecretStore>) -> FirebaseAuth {
        auth_at(store, FirebaseEndpoints::production())
    }

    fn auth_at(store: Arc<dyn SecretStore>, endpoints: FirebaseEndpoints) -> FirebaseAuth {
        FirebaseAuth::new(
            direct_client(),
            config(),
            endpoints,
            Arc::new(DismissedPopup),
            store,
        )
        .expect("auth should build")
    }

    fn auth_against(stub: &StubServer, store: Arc<dyn SecretStore>) -> FirebaseAuth {
        let endpoints = FirebaseEndpoints::with_emulators(Some(&stub.host()), None)
            .expect("stub endpoints");
        auth_at(store, endpoints)
    }

    fn stored_session(store: &Arc<dyn SecretStore>) -> Option<PersistedSession> {
        store
            .get_secret(SECRET_SERVICE, &config().persistence_key())
            .ok()
            .map(|raw| serde_json::from_str(&raw).expect("stored session is JSON"))
    }

    fn signed_in_user() -> AuthUser {
        AuthUser {
            uid: "u1".into(),
            email: Some("u1@example.org".into()),
            display_name: None,
        }
    }

    const U1_SESSION: &str =
        r#"{"uid":"u1","email":"u1@example.org","displayName":null,"refreshToken":"r1"}"#;

    fn persist(store: &Arc<dyn SecretStore>, raw: &str) {
        store
            .set_secret(SECRET_SERVICE, &config().persistence_key(), raw)
            .expect("seed session");
    }

    #[test]
    fn starts_signed_out_without_persisted_session() {
        let auth = auth_with_store(Arc::new(InMemorySecretStore::default()));
        assert_eq!(auth.current_user(), None);
        assert_eq!(*auth.auth_state().borrow(), None);
    }

    #[test]
    fn restores_persisted_session_on_startup() {
        let store: Arc<dyn SecretStore> = Arc::new(InMemorySecretStore::default());
        persist(
            &store,
            r#"{"uid":"u1","email":"u1@example.org","displayName":null,"refreshToken":"r1"}"#,
        );

        let auth = auth_with_store(store);
        let user = auth.current_user().expect("session should be restored");
        assert_eq!(user.uid, "u1");
        assert_eq!(user.email.as_deref(), Some("u1@example.org"));
    }

    #[test]
    fn ignores_corrupt_persisted_session() {
        let store: Arc<dyn SecretStore> = Arc::new(InMemorySecretStore::default());
        persist(&store, "not json");
        assert_eq!(auth_with_store(store).current_user(), None);
    }

    #[tokio::test]
    async fn dismissed_popup_keeps_provider_code() {
        let auth = auth_with_store(Arc::new(InMemorySecretStore::default()));
        let err = auth
            .sign_in_with_popup()
            .await
            .expect_err("dismissed popup must fail");
        assert_eq!(err.code, "auth/popup-closed-by-user");
        assert_eq!(auth.current_user(), None);
    }

    #[tokio::test]
    async fn sign_out_clears_state_and_persistence() {
        let store: Arc<dyn SecretStore> = Arc::new(InMemorySecretStore::default());
        persist(
            &store,
            r#"{"uid":"u1","email":null,"displayName":null,"refreshToken":"r1"}"#,
        );
        let auth = auth_with_store(Arc::clone(&store));
        let mut state = auth.auth_state();
        assert!(state.borrow_and_update().is_some());

        auth.sign_out().await.expect("sign out should work");
        assert!(state.has_changed().expect("sender alive"));
        assert_eq!(*state.borrow_and_update(), None);
        assert_eq!(
            store.get_secret(SECRET_SERVICE, &config().persistence_key()),
            Err(SecretStoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn token_for_other_user_is_rejected() {
        let auth = auth_with_store(Arc::new(InMemorySecretStore::default()));
        let stranger = AuthUser {
            uid: "nobody".into(),
            email: None,
            display_name: None,
        };
        let err = auth
            .id_token(&stranger)
            .await
            .expect_err("no session means no token");
        assert_eq!(err.code, "auth/no-current-user");
        assert_eq!(auth.current_token().await.expect("signed out is fine"), None);
    }

    #[tokio::test]
    async fn refresh_persists_rotated_token_and_caches_id_token() {
        let stub = StubServer::start(vec![StubResponse::json(
            200,
            r#"{"id_token":"id-1","refresh_token":"r2","expires_in":"3600"}"#,
        )])
        .await;
        let store: Arc<dyn SecretStore> = Arc::new(InMemorySecretStore::default());
        persist(&store, U1_SESSION);
        let auth = auth_against(&stub, Arc::clone(&store));

        let token = auth.id_token(&signed_in_user()).await.expect("refresh should work");
        assert_eq!(token, "id-1");
        assert_eq!(
            stored_session(&store).expect("session kept").refresh_token,
            "r2"
        );

        let again = auth.id_token(&signed_in_user()).await.expect("cached token");
        assert_eq!(again, "id-1");

        let requests = stub.requests();
        assert_eq!(requests.len(), 1, "fresh token must come from the cache");
        assert_eq!(requests[0].method, "POST");
        assert_eq!(
            requests[0].target,
            "/securetoken.googleapis.com/v1/token?key=key-123"
        );
        assert!(requests[0].body.contains("grant_type=refresh_token"));
        assert!(requests[0].body.contains("refresh_token=r1"));
    }

    #[tokio::test]
    async fn disabled_user_clears_session_and_signs_out() {
        let stub = StubServer::start(vec![StubResponse::json(
            400,
            r#"{"error":{"code":400,"message":"USER_DISABLED","status":"INVALID_ARGUMENT"}}"#,
        )])
        .await;
        let store: Arc<dyn SecretStore> = Arc::new(InMemorySecretStore::default());
        persist(&store, U1_SESSION);
        let auth = auth_against(&stub, Arc::clone(&store));
        let mut state = auth.auth_state();
        assert!(state.borrow_and_update().is_some());

        let err = auth
            .id_token(&signed_in_user())
            .await
            .expect_err("disabled user cannot refresh");
        assert_eq!(err.code, "auth/user-disabled");
        assert!(state.has_changed().expect("sender alive"));
        assert_eq!(*state.borrow_and_update(), None);
        assert_eq!(stored_session(&store), None);
        assert_eq!(auth.current_token().await.expect("signed out is fine"), None);
    }

    #[tokio::test]
    async fn transient_refresh_failure_keeps_session() {
        let stub = StubServer::start(vec![StubResponse::json(
            503,
            r#"{"error":{"code":503,"message":"BACKEND_ERROR"}}"#,
        )])
        .await;
        let store: Arc<dyn SecretStore> = Arc::new(InMemorySecretStore::default());
        persist(&store, U1_SESSION);
        let auth = auth_against(&stub, Arc::clone(&store));

        auth.id_token(&signed_in_user())
            .await
            .expect_err("server error must fail");
        assert_eq!(auth.current_user(), Some(signed_in_user()));
        assert_eq!(
            stored_session(&store).expect("session kept").refresh_token,
            "r1"
        );
    }

    #[test]
    fn cached_token_goes_stale_inside_refresh_margin() {
        let now = Instant::now();
        let fresh = CachedIdToken {
            token: "t".into(),
            expires_at: now + Duration::from_secs(3600),
        };
        let stale = CachedIdToken {
            token: "t".into(),
            expires_at: now + Duration::from_secs(60),
        };
        assert!(fresh.is_fresh(now));
        assert!(!stale.is_fresh(now));
    }

    #[test]
    fn expires_in_parses_seconds() {
        assert_eq!(parse_expires_in("3600"), Duration::from_secs(3600));
        assert_eq!(parse_expires_in("junk"), Duration::ZERO);
    }
}
