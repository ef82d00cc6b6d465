//! Newline-delimited JSON transport for the tickler host protocol.
//!
//! Each input line is one command envelope. Each output line is either the
//! response to a command or a reminder/task event. Stdout carries nothing
//! else, so logging goes to stderr.

use crate::error::{Result, TicklerError};
use crate::host::channel::{HostCommandClient, TaskCommandHandler, command_channel_with_events};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};

const REQUEST_CAPACITY: usize = 64;

/// Output shared by the command loop and the event forwarder.
type SharedWriter<W> = Arc<Mutex<W>>;

/// Serve the host protocol on the process's stdin and stdout.
pub async fn run_stdio_bridge<H: TaskCommandHandler>(
    handler: H,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = BufWriter::new(tokio::io::stdout());
    run_bridge(handler, event_tx, reader, writer).await
}

/// Serve the host protocol on any line reader and writer.
///
/// Events published on `event_tx` are interleaved with responses. Returns
/// when the input ends or after answering `runtime.stop`.
pub async fn run_bridge<H, R, W>(
    handler: H,
    event_tx: broadcast::Sender<EventEnvelope>,
    reader: R,
    writer: W,
) -> Result<()>
where
    H: TaskCommandHandler,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (client, server) = command_channel_with_events(REQUEST_CAPACITY, event_tx, handler);
    let writer = Arc::new(Mutex::new(writer));

    let router = tokio::spawn(server.run());
    let forwarder = tokio::spawn(forward_events(client.subscribe_events(), Arc::clone(&writer)));

    // `serve_commands` consumes the client, which closes the router's queue.
    let served = serve_commands(client, reader, writer).await;

    forwarder.abort();
    let _ = forwarder.await;
    let _ = router.await;
    served
}

/// Copy broadcast events to the output until the channel closes or the
/// output fails.
async fn forward_events<W>(mut events: broadcast::Receiver<EventEnvelope>, writer: SharedWriter<W>)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "host output fell behind, events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if let Err(e) = emit(&writer, &event).await {
            tracing::warn!(event = %event.event, error = %e, "stopped forwarding events");
            break;
        }
    }
}

async fn serve_commands<R, W>(
    client: HostCommandClient,
    reader: R,
    writer: SharedWriter<W>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| TicklerError::Channel(format!("failed to read command line: {e}")))?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let envelope = match serde_json::from_str::<CommandEnvelope>(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, line, "unparseable command line");
                let reply = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                emit(&writer, &reply).await?;
                continue;
            }
        };

        let stop = envelope.command == CommandName::RuntimeStop;
        let request_id = envelope.request_id.clone();
        let reply = client.send(envelope).await.unwrap_or_else(|e| {
            tracing::error!(request_id = %request_id, error = %e, "command was not dispatched");
            ResponseEnvelope::error(request_id, format!("dispatch failed: {e}"))
        });
        emit(&writer, &reply).await?;

        if stop {
            tracing::info!("host asked to stop");
            return Ok(());
        }
    }
    tracing::info!("host input closed");
    Ok(())
}

/// Serialize `message` and write it as one flushed line.
async fn emit<W, T>(writer: &SharedWriter<W>, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    let mut w = writer.lock().await;
    w.write_all(&line)
        .await
        .map_err(|e| TicklerError::Channel(format!("failed to write host output: {e}")))?;
    w.flush()
        .await
        .map_err(|e| TicklerError::Channel(format!("failed to flush host output: {e}")))
}
