//! Per-connection session task.
//!
//! Each accepted socket gets one session: it registers the connection,
//! forwards queued payloads to the socket from a writer task, executes client
//! commands against the registry, and removes the connection exactly once
//! when the read side ends for any reason.

use std::sync::Arc;

use roomcast_core::{ConnectionHandle, Registry};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpStream, tcp::OwnedWriteHalf},
    sync::mpsc,
};

use crate::{command::Command, error::ServerError};

/// Drive one client connection until it closes.
pub(crate) async fn run(
    stream: TcpStream,
    registry: Arc<Registry>,
    max_line_length: usize,
) -> Result<(), ServerError> {
    let (reader, mut writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel::<String>();

    let handle = match registry.add_generated(tx) {
        Ok(handle) => handle,
        Err(e) => {
            // The client is turned away either way
            if let Err(io) = writer.write_all(format!("ERR {e}\n").as_bytes()).await {
                tracing::debug!("rejection write failed: {}", io);
            }
            return Err(e.into());
        },
    };

    tracing::info!(id = %handle.id(), "session started");
    let writer_task = tokio::spawn(write_loop(writer, rx));

    let result = read_loop(reader, &registry, &handle, max_line_length).await;

    registry.remove(&handle);
    let id = handle.id().clone();
    drop(handle);

    // Writer drains queued payloads and exits once every sender is gone
    if let Err(e) = writer_task.await {
        tracing::warn!(%id, "writer task failed: {}", e);
    }
    tracing::info!(%id, "session ended");

    result
}

async fn read_loop(
    reader: tokio::net::tcp::OwnedReadHalf,
    registry: &Registry,
    handle: &ConnectionHandle,
    max_line_length: usize,
) -> Result<(), ServerError> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let limit = u64::try_from(max_line_length).unwrap_or(u64::MAX).saturating_add(1);

    if handle.send(&format!("ID {}", handle.id())).is_err() {
        return Ok(());
    }

    loop {
        line.clear();
        let read = (&mut reader).take(limit).read_until(b'\n', &mut line).await?;
        if read == 0 {
            return Ok(());
        }
        if read > max_line_length && line.last() != Some(&b'\n') {
            tracing::warn!(id = %handle.id(), "line exceeds {} bytes, closing", max_line_length);
            return Ok(());
        }

        let reply = match Command::from_line(&line) {
            Ok(Command::Quit) => return Ok(()),
            Ok(command) => execute(registry, handle, command),
            Err(e) => Some(format!("ERR {e}")),
        };

        if let Some(reply) = reply {
            if handle.send(&reply).is_err() {
                // Writer is gone, nothing left to serve
                return Ok(());
            }
        }
    }
}

/// Run a command against the registry, returning the reply for the sender.
fn execute(registry: &Registry, handle: &ConnectionHandle, command: Command) -> Option<String> {
    let sender = handle.id();

    match command {
        Command::Join(room) => Some(match registry.join_room(handle, &room) {
            Ok(_) => format!("OK joined {room}"),
            Err(e) => format!("ERR {e}"),
        }),
        Command::Leave(room) => Some(if registry.leave_room(handle, &room) {
            format!("OK left {room}")
        } else {
            format!("ERR not in {room}")
        }),
        Command::LeaveAll => {
            Some(format!("OK left {} rooms", registry.leave_all_rooms(handle).len()))
        },
        Command::Say { room, text } => {
            let payload = format!("MSG {room} {sender} {text}");
            registry.emit_to_room(&room, &payload, Some(handle)).err().map(|e| format!("ERR {e}"))
        },
        Command::All(text) => {
            let report = registry.broadcast(&format!("ALL {sender} {text}"));
            tracing::debug!(
                id = %sender,
                attempted = report.attempted(),
                failed = report.failures.len(),
                "broadcast"
            );
            None
        },
        Command::Tell { to, text } => {
            let payload = format!("TELL {sender} {text}");
            registry.send_to(&to, &payload).err().map(|e| format!("ERR {e}"))
        },
        Command::Rooms => Some(listing("ROOMS", registry.room_ids())),
        Command::Who(room) => {
            let members = registry.room_members(&room).into_iter().map(|id| id.to_string());
            Some(listing(&format!("WHO {room}"), members))
        },
        Command::Id => Some(format!("ID {sender}")),
        Command::Quit => None,
    }
}

fn listing(prefix: &str, items: impl IntoIterator<Item = String>) -> String {
    items.into_iter().fold(prefix.to_owned(), |mut line, item| {
        line.push(' ');
        line.push_str(&item);
        line
    })
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(payload) = rx.recv().await {
        if let Err(e) = write_line(&mut writer, &payload).await {
            tracing::debug!("socket write failed: {}", e);
            break;
        }
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!("socket shutdown failed: {}", e);
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, payload: &str) -> std::io::Result<()> {
    writer.write_all(payload.as_bytes()).await?;
    writer.write_all(b"\n").await
}
