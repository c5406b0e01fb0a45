//! Process-level shutdown of the host binary.
//!
//! The host is started against an unroutable emulator address with an
//! in-memory session store, so no request ever leaves the machine.

#![cfg(unix)]

use std::{process::Stdio, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
    time::{sleep, timeout},
};

const READY_LINE: &str = "reading port commands from stdin";
const EXIT_DEADLINE: Duration = Duration::from_secs(5);

fn spawn_host() -> Child {
    Command::new(env!("CARGO_BIN_EXE_firebridge-host"))
        .env_clear()
        .env("RUST_LOG", "info")
        .env("FIREBRIDGE_API_KEY", "fake-api-key")
        .env("FIREBRIDGE_AUTH_DOMAIN", "demo-firebridge.firebaseapp.com")
        .env("FIREBRIDGE_DATABASE_URL", "https://demo-firebridge.firebaseio.com")
        .env("FIREBRIDGE_PROJECT_ID", "demo-firebridge")
        .env("FIREBRIDGE_STORAGE_BUCKET", "demo-firebridge.appspot.com")
        .env("FIREBRIDGE_MESSAGING_SENDER_ID", "1234567890")
        .env("FIREBRIDGE_APP_ID", "1:1234567890:web:abcdef")
        .env("FIREBRIDGE_SESSION_STORE", "memory")
        .env("FIREBASE_AUTH_EMULATOR_HOST", "127.0.0.1:9")
        .env("FIRESTORE_EMULATOR_HOST", "127.0.0.1:9")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .expect("host binary should start")
}

/// Block until the host logs that it reads commands, then keep draining its
/// stderr in the background.
async fn wait_until_ready(child: &mut Child) {
    let stderr = child.stderr.take().expect("stderr is piped");
    let mut lines = BufReader::new(stderr).lines();

    timeout(EXIT_DEADLINE, async {
        loop {
            let line = lines
                .next_line()
                .await
                .expect("stderr readable")
                .expect("host exited before it was ready");
            if line.contains(READY_LINE) {
                return;
            }
        }
    })
    .await
    .expect("host should become ready in time");

    tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });
    // The Ctrl-C listener is armed right after the ready line.
    sleep(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn interrupt_stops_host_while_stdin_stays_open() {
    let mut child = spawn_host();
    let _stdin = child.stdin.take().expect("stdin is piped");
    wait_until_ready(&mut child).await;

    let pid = child.id().expect("host is running");
    let status = Command::new("kill")
        .arg("-INT")
        .arg(pid.to_string())
        .status()
        .await
        .expect("kill should run");
    assert!(status.success());

    let exit = timeout(EXIT_DEADLINE, child.wait())
        .await
        .expect("host must exit after SIGINT even with stdin open")
        .expect("wait on host");
    assert!(exit.success(), "unexpected exit status: {exit}");
}

#[tokio::test]
async fn closing_stdin_stops_host() {
    let mut child = spawn_host();
    let stdin = child.stdin.take().expect("stdin is piped");
    wait_until_ready(&mut child).await;

    drop(stdin);

    let exit = timeout(EXIT_DEADLINE, child.wait())
        .await
        .expect("host must exit on stdin EOF")
        .expect("wait on host");
    assert!(exit.success(), "unexpected exit status: {exit}");
}
