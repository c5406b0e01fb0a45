//! NDJSON port adapter: commands in on one stream, events out on another.

use std::io;

use bridge_core::{BridgeChannels, BridgeCommand, EventStream, recv_event};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Longest accepted command line.
const MAX_LINE_BYTES: usize = 1_048_576;

/// Parse one command line. Blank lines yield `Ok(None)`.
pub fn parse_command_line(line: &str) -> Result<Option<BridgeCommand>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Forward commands read from `reader` until EOF.
///
/// Malformed and oversized lines are logged and skipped; at most
/// `MAX_LINE_BYTES + 1` bytes of a line are ever buffered. Returns early only
/// on an I/O error or once the runtime stops accepting commands.
pub async fn pump_commands<R>(mut reader: R, channels: &BridgeChannels) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            debug!("command stream reached EOF");
            return Ok(());
        }
        if buf.len() > MAX_LINE_BYTES {
            let dropped = if buf.ends_with(b"\n") {
                buf.len()
            } else {
                buf.len() + discard_rest_of_line(&mut reader).await?
            };
            warn!(bytes = dropped, limit = MAX_LINE_BYTES, "skipping oversized command line");
            continue;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "skipping non-UTF-8 command line");
                continue;
            }
        };
        match parse_command_line(line) {
            Ok(Some(command)) => {
                trace!(port = command.port(), "command line accepted");
                if channels.send_command(command).await.is_err() {
                    warn!("runtime stopped accepting commands");
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, line = line.trim_end(), "skipping malformed command line"),
        }
    }
}

/// Consume bytes up to and including the next newline. Returns how many bytes
/// were dropped.
async fn discard_rest_of_line<R>(reader: &mut R) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut discarded = 0;
    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(discarded);
            }
            match available.iter().position(|byte| *byte == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(consumed);
        discarded += consumed;
        if done {
            return Ok(discarded);
        }
    }
}

/// Write every event from `events` to `writer` as one JSON line, flushing per
/// line. Returns when the event stream closes.
pub async fn pump_events<W>(mut events: EventStream, mut writer: W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = recv_event(&mut events).await {
        let mut line = serde_json::to_vec(&event).map_err(io::Error::other)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
        trace!(port = event.port(), "event line written");
    }
    Ok(())
}
