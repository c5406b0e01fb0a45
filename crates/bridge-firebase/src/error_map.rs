//! Translation of Firebase REST failures into `BridgeError`s carrying the
//! error codes Firebase web clients report (`auth/...`, `permission-denied`, ...).

use bridge_core::{BridgeError, BridgeErrorCategory, classify_http_status};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RestErrorEnvelope {
    error: RestErrorBody,
}

#[derive(Debug, Deserialize)]
struct RestErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn parse_error_body(body: &str) -> Option<RestErrorBody> {
    serde_json::from_str::<RestErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error)
}

/// Map an Identity Toolkit / Secure Token error response.
pub(crate) fn map_auth_rest_error(status: u16, body: &str) -> BridgeError {
    let server_message = parse_error_body(body)
        .and_then(|error| error.message)
        .unwrap_or_default();
    // Server messages look like `INVALID_IDP_RESPONSE : detail`.
    let server_code = server_message
        .split(" : ")
        .next()
        .unwrap_or_default()
        .trim();

    let (category, code) = auth_code_for_server_code(server_code, status);
    BridgeError::new(category, code, auth_message(code))
}

/// Map a Firestore error response.
pub(crate) fn map_firestore_rest_error(status: u16, body: &str) -> BridgeError {
    let parsed = parse_error_body(body);
    let message = parsed
        .as_ref()
        .and_then(|error| error.message.clone())
        .unwrap_or_else(|| format!("Firestore request failed with HTTP {status}"));
    let grpc_status = parsed.and_then(|error| error.status);

    let (category, code) = match grpc_status.as_deref() {
        Some(grpc_status) => (
            firestore_category(grpc_status, status),
            grpc_status.to_ascii_lowercase().replace('_', "-"),
        ),
        None => (classify_http_status(status), "unknown".to_owned()),
    };

    BridgeError::new(category, code, message)
}

/// Map a transport failure on an auth request.
pub(crate) fn map_auth_transport_error(err: reqwest::Error) -> BridgeError {
    if err.is_decode() {
        return BridgeError::new(
            BridgeErrorCategory::Serialization,
            "auth/internal-error",
            format!("unexpected auth response: {err}"),
        );
    }
    BridgeError::new(
        BridgeErrorCategory::Network,
        "auth/network-request-failed",
        auth_message("auth/network-request-failed"),
    )
}

/// Map a transport failure on a Firestore request.
pub(crate) fn map_firestore_transport_error(err: reqwest::Error) -> BridgeError {
    if err.is_decode() {
        return BridgeError::new(
            BridgeErrorCategory::Serialization,
            "internal",
            format!("unexpected Firestore response: {err}"),
        );
    }
    BridgeError::new(
        BridgeErrorCategory::Network,
        "unavailable",
        format!("Firestore is unreachable: {err}"),
    )
}

/// The popup was dismissed or the helper produced no IdP response.
pub fn popup_closed_error() -> BridgeError {
    BridgeError::new(
        BridgeErrorCategory::Auth,
        "auth/popup-closed-by-user",
        auth_message("auth/popup-closed-by-user"),
    )
}

/// Token requested for a user that is no longer signed in.
pub(crate) fn no_current_user_error() -> BridgeError {
    BridgeError::new(
        BridgeErrorCategory::Auth,
        "auth/no-current-user",
        auth_message("auth/no-current-user"),
    )
}

/// Codes after which the persisted session can never be refreshed again.
pub(crate) fn is_session_terminal(code: &str) -> bool {
    matches!(
        code,
        "auth/user-token-expired" | "auth/invalid-user-token" | "auth/user-disabled"
    )
}

fn auth_message(code: &str) -> String {
    format!("Firebase: Error ({code}).")
}

fn auth_code_for_server_code(server_code: &str, status: u16) -> (BridgeErrorCategory, &'static str) {
    use BridgeErrorCategory::*;

    match server_code {
        "INVALID_IDP_RESPONSE" | "INVALID_PENDING_TOKEN" => (Auth, "auth/invalid-credential"),
        "FEDERATED_USER_ID_ALREADY_LINKED" => (Auth, "auth/credential-already-in-use"),
        "USER_DISABLED" => (Auth, "auth/user-disabled"),
        "USER_NOT_FOUND" | "TOKEN_EXPIRED" => (Auth, "auth/user-token-expired"),
        "INVALID_REFRESH_TOKEN" | "INVALID_ID_TOKEN" => (Auth, "auth/invalid-user-token"),
        "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => (Auth, "auth/requires-recent-login"),
        "TOO_MANY_ATTEMPTS_TRY_LATER" | "QUOTA_EXCEEDED" => (RateLimited, "auth/too-many-requests"),
        "OPERATION_NOT_ALLOWED" => (Config, "auth/operation-not-allowed"),
        "INVALID_API_KEY" => (Config, "auth/invalid-api-key"),
        "CONFIGURATION_NOT_FOUND" | "PROJECT_NOT_FOUND" => {
            (Config, "auth/configuration-not-found")
        }
        other if other.starts_with("API key not valid") => (Config, "auth/invalid-api-key"),
        _ => match classify_http_status(status) {
            RateLimited => (RateLimited, "auth/too-many-requests"),
            Network => (Network, "auth/network-request-failed"),
            _ => (Internal, "auth/internal-error"),
        },
    }
}

fn firestore_category(grpc_status: &str, http_status: u16) -> BridgeErrorCategory {
    match grpc_status {
        "PERMISSION_DENIED" | "UNAUTHENTICATED" => BridgeErrorCategory::Auth,
        "RESOURCE_EXHAUSTED" => BridgeErrorCategory::RateLimited,
        "UNAVAILABLE" | "DEADLINE_EXCEEDED" | "ABORTED" | "INTERNAL" => {
            BridgeErrorCategory::Network
        }
        "INVALID_ARGUMENT" | "NOT_FOUND" | "FAILED_PRECONDITION" | "OUT_OF_RANGE" => {
            BridgeErrorCategory::Config
        }
        _ => classify_http_status(http_status),
    }
}
