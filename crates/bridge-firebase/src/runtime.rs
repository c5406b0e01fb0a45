use std::sync::Arc;

use bridge_core::{
    AuthStateStream, AuthUser, BridgeChannelError, BridgeChannels, BridgeCommand, BridgeError,
    BridgeEvent, BridgeInitConfig, ErrorReportPolicy, EventStream, FailureOrigin, IdentityBackend,
    MessageRecord, MessageStore, SaveRequest, SessionState, SessionStateMachine, SessionTransition,
    credential_event, messages_from_snapshot, normalize_failure,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Front door of a running bridge.
#[derive(Debug)]
pub struct BridgeRuntimeHandle {
    channels: BridgeChannels,
    session: watch::Receiver<SessionState>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl BridgeRuntimeHandle {
    pub async fn send(&self, command: BridgeCommand) -> Result<(), BridgeChannelError> {
        self.channels.send_command(command).await
    }

    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }

    pub fn channels(&self) -> &BridgeChannels {
        &self.channels
    }

    pub fn session_state(&self) -> SessionState {
        self.session.borrow().clone()
    }

    /// Watch session transitions as the runtime applies them.
    pub fn watch_session(&self) -> watch::Receiver<SessionState> {
        self.session.clone()
    }

    /// Stop the runtime and close any open message subscription.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.task.await {
            warn!(error = %err, "bridge runtime task ended abnormally");
        }
    }
}

/// Spawn the bridge over `backend`.
///
/// The returned stream is subscribed before the runtime starts, so it sees the
/// events caused by a session restored at start-up.
pub fn spawn_runtime<B>(backend: Arc<B>, config: BridgeInitConfig) -> (BridgeRuntimeHandle, EventStream)
where
    B: IdentityBackend + MessageStore,
{
    let (channels, command_rx) = BridgeChannels::new(config.command_buffer, config.event_buffer);
    let events = channels.subscribe();
    let (session_tx, session) = watch::channel(SessionState::SignedOut);
    let shutdown = CancellationToken::new();

    let runtime = BridgeRuntime {
        auth_state: backend.auth_state(),
        backend,
        channels: channels.clone(),
        command_rx,
        config,
        session: Session::default(),
        session_tx,
        shutdown: shutdown.child_token(),
    };
    let task = tokio::spawn(async move {
        runtime.run().await;
    });

    (
        BridgeRuntimeHandle {
            channels,
            session,
            shutdown,
            task,
        },
        events,
    )
}

#[derive(Debug)]
struct MessageSubscription {
    uid: String,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// Session lifecycle plus the single live subscription it owns.
#[derive(Debug, Default)]
struct Session {
    state_machine: SessionStateMachine,
    subscription: Option<MessageSubscription>,
}

impl Session {
    async fn close_subscription(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        subscription.stop.cancel();
        if let Err(err) = subscription.task.await {
            warn!(uid = %subscription.uid, error = %err, "message subscription task failed");
        }
        debug!(uid = %subscription.uid, "message subscription closed");
    }
}

struct BridgeRuntime<B> {
    backend: Arc<B>,
    channels: BridgeChannels,
    command_rx: mpsc::Receiver<BridgeCommand>,
    auth_state: AuthStateStream,
    config: BridgeInitConfig,
    session: Session,
    session_tx: watch::Sender<SessionState>,
    shutdown: CancellationToken,
}

impl<B> BridgeRuntime<B>
where
    B: IdentityBackend + MessageStore,
{
    async fn run(mut self) {
        // Auth-state observers see the current state first.
        let initial = self.auth_state.borrow_and_update().clone();
        self.handle_auth_state(initial).await;

        let mut auth_open = true;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = self.command_rx.recv() => match command {
                    Some(command) => self.dispatch(command),
                    None => break,
                },
                changed = self.auth_state.changed(), if auth_open => match changed {
                    Ok(()) => {
                        let user = self.auth_state.borrow_and_update().clone();
                        self.handle_auth_state(user).await;
                    }
                    Err(_) => {
                        warn!("auth-state feed closed; session changes are no longer tracked");
                        auth_open = false;
                    }
                },
            }
        }

        self.session.close_subscription().await;
        info!("bridge runtime stopped");
    }

    /// Each command runs as its own task so a slow popup never blocks saves.
    fn dispatch(&self, command: BridgeCommand) {
        debug!(port = command.port(), "command received");
        let backend = Arc::clone(&self.backend);
        let channels = self.channels.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            match command {
                BridgeCommand::SignIn => sign_in(backend.as_ref(), &channels).await,
                BridgeCommand::SignOut => sign_out(backend.as_ref(), &channels, &config).await,
                BridgeCommand::SaveMessage(request) => {
                    save_message(backend.as_ref(), &channels, request).await
                }
            }
        });
    }

    async fn handle_auth_state(&mut self, user: Option<AuthUser>) {
        let transition = self.session.state_machine.on_auth_state(user.as_ref());
        if transition == SessionTransition::Unchanged {
            return;
        }
        info!(?transition, "session transition");

        if transition.closes_subscription() {
            self.session.close_subscription().await;
        }
        if let Some(uid) = transition.opens_subscription_for() {
            self.session.subscription = Some(self.open_subscription(uid));
        }
        self.session_tx
            .send_replace(self.session.state_machine.state().clone());

        if let Some(user) = user {
            let backend = Arc::clone(&self.backend);
            let channels = self.channels.clone();
            let policy = self.config.token_refresh_errors;
            tokio::spawn(async move {
                match backend.id_token(&user).await {
                    Ok(token) => channels.emit(credential_event(&user, token)),
                    Err(err) => {
                        warn!(uid = %user.uid, code = %err.code, "id token fetch failed after auth-state change");
                        if let Some(event) =
                            normalize_failure(FailureOrigin::TokenRefresh, err, policy)
                        {
                            channels.emit(event);
                        }
                    }
                }
            });
        }
    }

    fn open_subscription(&self, uid: &str) -> MessageSubscription {
        let stop = CancellationToken::new();
        let task = tokio::spawn(forward_messages(
            Arc::clone(&self.backend),
            uid.to_owned(),
            self.channels.clone(),
            stop.child_token(),
        ));
        debug!(uid, "message subscription opened");
        MessageSubscription {
            uid: uid.to_owned(),
            stop,
            task,
        }
    }
}

async fn sign_in<B: IdentityBackend>(backend: &B, channels: &BridgeChannels) {
    let result = async {
        let user = backend.sign_in_with_popup().await?;
        let token = backend.id_token(&user).await?;
        Ok::<_, BridgeError>(credential_event(&user, token))
    }
    .await;

    match result {
        Ok(event) => channels.emit(event),
        Err(err) => {
            info!(code = %err.code, "sign-in failed");
            // Sign-in failures always surface, whatever the policy.
            if let Some(event) = normalize_failure(
                FailureOrigin::SignIn,
                err,
                ErrorReportPolicy::Surface,
            ) {
                channels.emit(event);
            }
        }
    }
}

async fn sign_out<B: IdentityBackend>(backend: &B, channels: &BridgeChannels, config: &BridgeInitConfig) {
    if let Err(err) = backend.sign_out().await {
        warn!(code = %err.code, message = %err.message, "sign-out failed");
        if let Some(event) = normalize_failure(FailureOrigin::SignOut, err, config.sign_out_errors) {
            channels.emit(event);
        }
    }
}

async fn save_message<S: MessageStore>(store: &S, channels: &BridgeChannels, request: SaveRequest) {
    let SaveRequest { uid, content } = request;
    if let Err(err) = store.add_message(&uid, MessageRecord { content }).await {
        warn!(%uid, code = %err.code, "message save failed");
        if let Some(event) = normalize_failure(
            FailureOrigin::SaveMessage,
            err,
            ErrorReportPolicy::Surface,
        ) {
            channels.emit(event);
        }
    }
}

/// Forward every snapshot of `uid`'s messages as a full `receiveMessages`
/// batch until cancelled. Listener errors are logged only.
async fn forward_messages<S: MessageStore>(
    store: Arc<S>,
    uid: String,
    channels: BridgeChannels,
    stop: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        _ = stop.cancelled() => return,
        opened = store.watch_messages(&uid) => opened,
    };
    let mut snapshots = match opened {
        Ok(snapshots) => snapshots,
        Err(err) => {
            warn!(%uid, code = %err.code, message = %err.message, "could not open message listener");
            return;
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            next = snapshots.recv() => match next {
                Some(Ok(snapshot)) => {
                    channels.emit(BridgeEvent::ReceiveMessages(messages_from_snapshot(&snapshot)));
                }
                Some(Err(err)) => {
                    warn!(%uid, code = %err.code, message = %err.message, "message listener error");
                }
                None => {
                    debug!(%uid, "message listener ended");
                    break;
                }
            },
        }
    }
}
