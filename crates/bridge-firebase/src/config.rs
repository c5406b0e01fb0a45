use std::{sync::LazyLock, time::Duration};

use bridge_core::{BridgeError, BridgeErrorCategory};
use url::Url;

const IDENTITY_TOOLKIT_BASE: &str = "https://identitytoolkit.googleapis.com/v1/";
const SECURE_TOKEN_BASE: &str = "https://securetoken.googleapis.com/v1/";
const FIRESTORE_BASE: &str = "https://firestore.googleapis.com/v1/";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

static PRODUCTION_ENDPOINTS: LazyLock<FirebaseEndpoints> = LazyLock::new(|| FirebaseEndpoints {
    identity_toolkit: Url::parse(IDENTITY_TOOLKIT_BASE).expect("identity toolkit base URL is valid"),
    secure_token: Url::parse(SECURE_TOKEN_BASE).expect("secure token base URL is valid"),
    firestore: Url::parse(FIRESTORE_BASE).expect("firestore base URL is valid"),
});

/// Firebase web-app connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub database_url: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
}

impl FirebaseConfig {
    /// Check the fields the REST clients cannot work without.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.api_key.trim().is_empty() {
            return Err(BridgeError::new(
                BridgeErrorCategory::Config,
                "auth/invalid-api-key",
                "Firebase: Error (auth/invalid-api-key).",
            ));
        }
        if self.project_id.trim().is_empty() {
            return Err(BridgeError::new(
                BridgeErrorCategory::Config,
                "invalid-argument",
                "projectId must be set to reach Firestore",
            ));
        }
        Ok(())
    }

    /// Key under which Firebase web clients persist the signed-in user.
    pub fn persistence_key(&self) -> String {
        format!("firebase:authUser:{}:[DEFAULT]", self.api_key)
    }
}

/// REST endpoint roots. Each URL ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseEndpoints {
    pub identity_toolkit: Url,
    pub secure_token: Url,
    pub firestore: Url,
}

impl FirebaseEndpoints {
    /// Production endpoints.
    pub fn production() -> Self {
        PRODUCTION_ENDPOINTS.clone()
    }

    /// Redirect auth and/or Firestore traffic to local emulators given as
    /// `host:port`, the format of `FIREBASE_AUTH_EMULATOR_HOST` and
    /// `FIRESTORE_EMULATOR_HOST`.
    pub fn with_emulators(
        auth_emulator_host: Option<&str>,
        firestore_emulator_host: Option<&str>,
    ) -> Result<Self, BridgeError> {
        let mut endpoints = Self::production();

        if let Some(host) = auth_emulator_host {
            endpoints.identity_toolkit =
                parse_base(&format!("http://{host}/identitytoolkit.googleapis.com/v1/"))?;
            endpoints.secure_token =
                parse_base(&format!("http://{host}/securetoken.googleapis.com/v1/"))?;
        }
        if let Some(host) = firestore_emulator_host {
            endpoints.firestore = parse_base(&format!("http://{host}/v1/"))?;
        }

        Ok(endpoints)
    }
}

impl Default for FirebaseEndpoints {
    fn default() -> Self {
        Self::production()
    }
}

/// Live-query polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerConfig {
    pub poll_interval: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Append path segments to an endpoint root.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty();
        path.extend(segments);
    }
    url
}

fn parse_base(raw: &str) -> Result<Url, BridgeError> {
    Url::parse(raw).map_err(|err| {
        BridgeError::new(
            BridgeErrorCategory::Config,
            "invalid-argument",
            format!("invalid emulator endpoint '{raw}': {err}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FirebaseConfig {
        FirebaseConfig {
            api_key: "key-123".into(),
            project_id: "demo-project".into(),
            ..FirebaseConfig::default()
        }
    }

    #[test]
    fn validates_required_fields() {
        config().validate().expect("config should validate");

        let err = FirebaseConfig {
            api_key: " ".into(),
            ..config()
        }
        .validate()
        .expect_err("blank api key must fail");
        assert_eq!(err.code, "auth/invalid-api-key");

        let err = FirebaseConfig {
            project_id: String::new(),
            ..config()
        }
        .validate()
        .expect_err("missing project id must fail");
        assert_eq!(err.category, BridgeErrorCategory::Config);
    }

    #[test]
    fn persistence_key_matches_web_sdk_layout() {
        assert_eq!(
            config().persistence_key(),
            "firebase:authUser:key-123:[DEFAULT]"
        );
    }

    #[test]
    fn production_roots_end_with_slash() {
        let endpoints = FirebaseEndpoints::production();
        for root in [
            &endpoints.identity_toolkit,
            &endpoints.secure_token,
            &endpoints.firestore,
        ] {
            assert_eq!(root.scheme(), "https");
            assert!(root.path().ends_with("/v1/"), "unexpected root {root}");
        }
        assert_eq!(FirebaseEndpoints::default(), endpoints);
    }

    #[test]
    fn builds_rest_paths_from_roots() {
        let endpoints = FirebaseEndpoints::production();
        let url = endpoint(&endpoints.identity_toolkit, &["accounts:signInWithIdp"]);
        assert_eq!(
            url.as_str(),
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithIdp"
        );

        let url = endpoint(
            &endpoints.firestore,
            &[
                "projects",
                "demo-project",
                "databases",
                "(default)",
                "documents",
                "users",
                "u 1",
                "messages",
            ],
        );
        assert_eq!(
            url.as_str(),
            "https://firestore.googleapis.com/v1/projects/demo-project/databases/(default)/documents/users/u%201/messages"
        );
    }

    #[test]
    fn emulator_hosts_redirect_endpoints() {
        let endpoints =
            FirebaseEndpoints::with_emulators(Some("127.0.0.1:9099"), Some("localhost:8080"))
                .expect("emulator endpoints should parse");
        assert_eq!(
            endpoints.identity_toolkit.as_str(),
            "http://127.0.0.1:9099/identitytoolkit.googleapis.com/v1/"
        );
        assert_eq!(
            endpoints.secure_token.as_str(),
            "http://127.0.0.1:9099/securetoken.googleapis.com/v1/"
        );
        assert_eq!(endpoints.firestore.as_str(), "http://localhost:8080/v1/");
    }

    #[test]
    fn rejects_garbage_emulator_host() {
        let err = FirebaseEndpoints::with_emulators(Some("bad host:port:x"), None)
            .expect_err("invalid host must fail");
        assert_eq!(err.category, BridgeErrorCategory::Config);
    }
}
