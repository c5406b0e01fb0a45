//! Popup sign-in through an external helper process.
//!
//! The helper gets the `PopupRequest` as one JSON line on stdin, runs the
//! browser popup and prints `{"requestUri": ..., "postBody": ...}` on stdout.
//! A missing helper, a non-zero exit or empty output all mean the user closed
//! the popup.

use std::process::Stdio;

use async_trait::async_trait;
use bridge_core::{BridgeError, BridgeErrorCategory};
use bridge_firebase::{IdpResponse, PopupHandler, PopupRequest, popup_closed_error};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, info, warn};

pub struct CommandPopupHandler {
    command: Option<Vec<String>>,
}

impl CommandPopupHandler {
    /// `command_line` is split on whitespace into program and arguments.
    pub fn new(command_line: Option<&str>) -> Self {
        let command = command_line
            .map(|line| line.split_whitespace().map(ToOwned::to_owned).collect::<Vec<_>>())
            .filter(|parts| !parts.is_empty());
        Self { command }
    }
}

#[async_trait]
impl PopupHandler for CommandPopupHandler {
    async fn open(&self, request: &PopupRequest) -> Result<IdpResponse, BridgeError> {
        let Some((program, args)) = self.command.as_ref().and_then(|parts| parts.split_first())
        else {
            warn!("no popup helper configured; set FIREBRIDGE_POPUP_COMMAND");
            return Err(popup_closed_error());
        };

        let mut request_line = serde_json::to_vec(request).map_err(|err| {
            BridgeError::new(
                BridgeErrorCategory::Serialization,
                "auth/internal-error",
                err.to_string(),
            )
        })?;
        request_line.push(b'\n');

        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                warn!(%program, error = %err, "failed to start popup helper");
                return Err(popup_closed_error());
            }
        };
        debug!(%program, event_id = %request.event_id, "popup helper started");

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(&request_line).await {
                warn!(error = %err, "failed to hand request to popup helper");
            }
            drop(stdin);
        }

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(err) => {
                warn!(error = %err, "popup helper did not finish");
                return Err(popup_closed_error());
            }
        };
        if !output.status.success() {
            info!(status = %output.status, "popup helper reported a dismissed popup");
            return Err(popup_closed_error());
        }

        parse_helper_output(&output.stdout)
    }
}

fn parse_helper_output(stdout: &[u8]) -> Result<IdpResponse, BridgeError> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Err(popup_closed_error());
    }
    serde_json::from_str(text).map_err(|err| {
        BridgeError::new(
            BridgeErrorCategory::Auth,
            "auth/invalid-credential",
            format!("popup helper printed an unreadable IdP response: {err}"),
        )
    })
}
