use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use crate::types::{BridgeCommand, BridgeEvent};

/// Broadcast event stream handed to frontend port writers.
pub type EventStream = broadcast::Receiver<BridgeEvent>;

/// Errors returned by bridge channel operations.
#[derive(Debug, Error)]
pub enum BridgeChannelError {
    /// The runtime stopped reading commands.
    #[error("command channel is closed")]
    CommandChannelClosed,
}

/// Inbound command queue plus outbound event fan-out shared by the runtime
/// and frontend port adapters.
#[derive(Clone, Debug)]
pub struct BridgeChannels {
    command_tx: mpsc::Sender<BridgeCommand>,
    event_tx: broadcast::Sender<BridgeEvent>,
}

impl BridgeChannels {
    /// Create a new channel set and return it with the command receiver.
    pub fn new(
        command_buffer: usize,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<BridgeCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));

        (
            Self {
                command_tx,
                event_tx,
            },
            command_rx,
        )
    }

    /// Subscribe to outbound port events.
    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    /// Queue one frontend command for the runtime.
    pub async fn send_command(&self, command: BridgeCommand) -> Result<(), BridgeChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| BridgeChannelError::CommandChannelClosed)
    }

    /// Emit an event to every attached port writer.
    ///
    /// Best-effort: with no subscriber attached the event is dropped.
    pub fn emit(&self, event: BridgeEvent) {
        trace!(port = event.port(), "emitting port event");
        let _ = self.event_tx.send(event);
    }
}

/// Receive the next event, skipping over lag gaps. `None` once every sender is gone.
///
/// Skipped events are gone for good; size `BridgeInitConfig::event_buffer`
/// for the slowest writer.
pub async fn recv_event(events: &mut EventStream) -> Option<BridgeEvent> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "port event subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
