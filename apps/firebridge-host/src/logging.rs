//! Tracing/logging bootstrap for the host.

use std::{env, io};

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,firebridge_host=debug,bridge_firebase=debug";

/// Initialize global tracing subscriber with severity gating from environment.
///
/// Output goes to stderr; stdout carries the port protocol.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `FIREBRIDGE_HOST_LOG`
/// 3) `FIREBRIDGE_LOG`
/// 4) internal default filter
pub fn init() {
    let env_filter = filter_from_env();
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_env_filter(env_filter)
        .try_init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    for key in ["FIREBRIDGE_HOST_LOG", "FIREBRIDGE_LOG"] {
        if let Some(value) = env::var(key).ok().filter(|v| !v.trim().is_empty())
            && let Ok(filter) = EnvFilter::try_new(value)
        {
            return filter;
        }
    }

    EnvFilter::new(DEFAULT_FILTER)
}
