//! Link to the radio stack bridge.
//!
//! One TCP connection carrying newline-delimited JSON both ways. Outbound
//! lines are transport requests (tagged `request`) and audio commands
//! (tagged `audio`); inbound lines are transport events (tagged `event`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedSender};

use tandem_engine::{AudioCommand, AudioSink, Transport, TransportError, TransportEvent, TransportRequest};

use crate::event_loop::Input;

/// Shared outbound half. Cloned into the transport and audio handles.
#[derive(Clone)]
struct Writer {
    tx: UnboundedSender<String>,
    up: Arc<AtomicBool>,
}

impl Writer {
    fn send_line<T: Serialize>(&self, msg: &T) -> Result<(), TransportError> {
        if !self.up.load(Ordering::Acquire) {
            return Err(TransportError::LinkDown);
        }
        let line = serde_json::to_string(msg).map_err(|e| TransportError::Refused(e.to_string()))?;
        self.tx.send(line).map_err(|_| TransportError::LinkDown)
    }
}

pub struct StackTransport(Writer);

impl Transport for StackTransport {
    fn request(&mut self, req: TransportRequest) -> Result<(), TransportError> {
        self.0.send_line(&req)
    }
}

pub struct StackAudio(Writer);

impl AudioSink for StackAudio {
    fn apply(&mut self, cmd: AudioCommand) {
        if let Err(e) = self.0.send_line(&cmd) {
            tracing::warn!(?cmd, error = %e, "audio command dropped");
        }
    }
}

/// Parse one inbound line. Blank lines are keep-alives.
pub fn parse_line(line: &str) -> Option<Result<TransportEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Connect to the bridge and spawn the reader and writer tasks. Inbound
/// events go to `input`; losing the link posts `Input::LinkLost`.
pub async fn connect(addr: &str, input: UnboundedSender<Input>) -> Result<(StackTransport, StackAudio)> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to stack bridge at {addr}"))?;
    stream.set_nodelay(true).context("failed to set TCP_NODELAY")?;
    tracing::info!(addr, "stack bridge connected");

    let (read, mut write) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let up = Arc::new(AtomicBool::new(true));

    {
        let up = up.clone();
        tokio::spawn(async move {
            while let Some(mut line) = rx.recv().await {
                line.push('\n');
                if let Err(e) = write.write_all(line.as_bytes()).await {
                    tracing::error!(error = %e, "stack write failed");
                    up.store(false, Ordering::Release);
                    break;
                }
            }
        });
    }

    {
        let up = up.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_line(&line) {
                        Some(Ok(ev)) => {
                            if input.send(Input::Transport(ev)).is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => tracing::warn!(line = %line, error = %e, "unparseable stack event"),
                        None => {}
                    },
                    Ok(None) => {
                        tracing::error!("stack bridge closed the link");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "stack read failed");
                        break;
                    }
                }
            }
            up.store(false, Ordering::Release);
            let _ = input.send(Input::LinkLost);
        });
    }

    let writer = Writer { tx, up };
    Ok((StackTransport(writer.clone()), StackAudio(writer)))
}
