/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! JSON-lines control surface: commands in, events out.

use async_broadcast::{Receiver, RecvError};
use chatrelay_client::CoordinatorHandle;
use chatrelay_types::{ControlCommand, ControlEvent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Decode one input line. Blank and invalid lines yield `None`.
pub fn parse_command(line: &str) -> Option<ControlCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(command) => Some(command),
        Err(e) => {
            warn!("Ignoring invalid control command ({e}): {line}");
            None
        }
    }
}

/// Forward commands from `input` until EOF or until the coordinator stops.
pub async fn read_commands<R>(input: R, handle: CoordinatorHandle) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(command) = parse_command(&line) {
            if !handle.send(command) {
                debug!("Coordinator stopped, no longer reading commands");
                break;
            }
        }
    }
    Ok(())
}

/// Write every control event to `out`, one JSON object per line.
pub async fn write_events<W>(mut events: Receiver<ControlEvent>, mut out: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Overflowed(missed)) => {
                warn!("Control output fell behind, {missed} event(s) dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}
