//! Environment-backed configuration for `firebridge-host`.

use std::{env, error::Error, fmt, path::PathBuf, time::Duration};

use bridge_core::{BridgeInitConfig, ErrorReportPolicy};
use bridge_firebase::{FirebaseConfig, ListenerConfig};

const DEFAULT_SESSION_FILE: &str = "./.firebridge/session.json";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Where the signed-in session is kept between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStoreKind {
    File(PathBuf),
    Memory,
    #[cfg(feature = "os-keyring")]
    Keyring,
}

/// Runtime configuration used by the host process.
#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    pub firebase: FirebaseConfig,
    /// Helper that performs the browser popup and prints the IdP response.
    pub popup_command: Option<String>,
    pub session_store: SessionStoreKind,
    pub listener: ListenerConfig,
    pub init: BridgeInitConfig,
    pub auth_emulator_host: Option<String>,
    pub firestore_emulator_host: Option<String>,
}

impl HostConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let firebase = FirebaseConfig {
            api_key: required_env("FIREBRIDGE_API_KEY", &mut lookup)?,
            auth_domain: required_env("FIREBRIDGE_AUTH_DOMAIN", &mut lookup)?,
            database_url: required_env("FIREBRIDGE_DATABASE_URL", &mut lookup)?,
            project_id: required_env("FIREBRIDGE_PROJECT_ID", &mut lookup)?,
            storage_bucket: required_env("FIREBRIDGE_STORAGE_BUCKET", &mut lookup)?,
            messaging_sender_id: required_env("FIREBRIDGE_MESSAGING_SENDER_ID", &mut lookup)?,
            app_id: required_env("FIREBRIDGE_APP_ID", &mut lookup)?,
        };

        let popup_command = optional_trimmed_env("FIREBRIDGE_POPUP_COMMAND", &mut lookup);
        let session_store = parse_session_store(&mut lookup)?;

        let poll_interval_ms = parse_optional_u64(
            "FIREBRIDGE_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
            &mut lookup,
        )?;
        if poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FIREBRIDGE_POLL_INTERVAL_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        let init = BridgeInitConfig {
            token_refresh_errors: parse_policy("FIREBRIDGE_TOKEN_REFRESH_ERRORS", &mut lookup)?,
            sign_out_errors: parse_policy("FIREBRIDGE_SIGN_OUT_ERRORS", &mut lookup)?,
            ..BridgeInitConfig::default()
        };

        Ok(Self {
            firebase,
            popup_command,
            session_store,
            listener: ListenerConfig {
                poll_interval: Duration::from_millis(poll_interval_ms),
            },
            init,
            auth_emulator_host: optional_trimmed_env("FIREBASE_AUTH_EMULATOR_HOST", &mut lookup),
            firestore_emulator_host: optional_trimmed_env("FIRESTORE_EMULATOR_HOST", &mut lookup),
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is unset or blank.
    Missing { key: &'static str },
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { key } => write!(f, "missing required {key}"),
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required_env<F>(key: &'static str, lookup: &mut F) -> Result<String, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    optional_trimmed_env(key, lookup).ok_or(ConfigError::Missing { key })
}

fn parse_optional_u64<F>(key: &'static str, default: u64, lookup: &mut F) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_policy<F>(key: &'static str, lookup: &mut F) -> Result<ErrorReportPolicy, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(ErrorReportPolicy::default());
    };
    match value.to_ascii_lowercase().as_str() {
        "log" => Ok(ErrorReportPolicy::Log),
        "surface" => Ok(ErrorReportPolicy::Surface),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected 'log' or 'surface'".to_owned(),
        }),
    }
}

fn parse_session_store<F>(lookup: &mut F) -> Result<SessionStoreKind, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let session_file = optional_trimmed_env("FIREBRIDGE_SESSION_FILE", lookup)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE));

    let Some(value) = optional_trimmed_env("FIREBRIDGE_SESSION_STORE", lookup) else {
        return Ok(SessionStoreKind::File(session_file));
    };
    match value.to_ascii_lowercase().as_str() {
        "file" => Ok(SessionStoreKind::File(session_file)),
        "memory" => Ok(SessionStoreKind::Memory),
        #[cfg(feature = "os-keyring")]
        "keyring" => Ok(SessionStoreKind::Keyring),
        _ => Err(ConfigError::InvalidValue {
            key: "FIREBRIDGE_SESSION_STORE",
            value,
            reason: supported_stores().to_owned(),
        }),
    }
}

#[cfg(feature = "os-keyring")]
fn supported_stores() -> &'static str {
    "expected 'file', 'memory' or 'keyring'"
}

#[cfg(not(feature = "os-keyring"))]
fn supported_stores() -> &'static str {
    "expected 'file' or 'memory'"
}
