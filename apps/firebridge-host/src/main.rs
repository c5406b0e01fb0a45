mod bridge;
mod config;
mod logging;
mod popup;

use std::{process::ExitCode, sync::Arc, time::Duration};

use bridge_firebase::{FirebaseBackend, FirebaseEndpoints, spawn_runtime};
use bridge_platform::{FileSecretStore, InMemorySecretStore, SecretStore};
use config::{HostConfig, SessionStoreKind};
use popup::CommandPopupHandler;
use tokio::io::{BufReader, stdin, stdout};
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> ExitCode {
    logging::init();
    info!("starting firebridge-host");

    let config = match HostConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            eprintln!("firebridge-host: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("firebridge-host")
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(run(config));
    // The stdin reader parks a blocking-pool thread until the next line or
    // EOF; dropping the runtime would wait for it.
    runtime.shutdown_background();

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(%message, "firebridge-host stopped");
            eprintln!("firebridge-host: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: HostConfig) -> Result<(), String> {
    let endpoints = FirebaseEndpoints::with_emulators(
        config.auth_emulator_host.as_deref(),
        config.firestore_emulator_host.as_deref(),
    )
    .map_err(|err| err.to_string())?;
    if config.auth_emulator_host.is_some() || config.firestore_emulator_host.is_some() {
        warn!(
            auth = %endpoints.identity_toolkit,
            firestore = %endpoints.firestore,
            "using Firebase emulators"
        );
    }

    let backend = FirebaseBackend::new(
        config.firebase.clone(),
        endpoints,
        config.listener,
        Arc::new(CommandPopupHandler::new(config.popup_command.as_deref())),
        session_store(&config.session_store),
    )
    .map_err(|err| err.to_string())?;

    let (handle, events) = spawn_runtime(Arc::new(backend), config.init.clone());
    let mut writer = tokio::spawn(bridge::pump_events(events, stdout()));

    info!("reading port commands from stdin");
    tokio::select! {
        result = bridge::pump_commands(BufReader::new(stdin()), handle.channels()) => {
            if let Err(err) = result {
                warn!(error = %err, "command stream failed");
            }
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    handle.shutdown().await;
    // The event stream closes once in-flight command tasks finish.
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut writer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => warn!(error = %err, "event stream failed"),
        Ok(Err(err)) => warn!(error = %err, "event writer task failed"),
        Err(_) => {
            warn!("event writer still busy at shutdown");
            writer.abort();
        }
    }
    info!("firebridge-host stopped");
    Ok(())
}

fn session_store(kind: &SessionStoreKind) -> Arc<dyn SecretStore> {
    match kind {
        SessionStoreKind::File(path) => {
            info!(path = %path.display(), "persisting session to file");
            Arc::new(FileSecretStore::new(path))
        }
        SessionStoreKind::Memory => Arc::new(InMemorySecretStore::default()),
        #[cfg(feature = "os-keyring")]
        SessionStoreKind::Keyring => Arc::new(bridge_platform::OsKeyringSecretStore),
    }
}
