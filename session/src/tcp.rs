//! TCP transport: framed JSON over a socket to the engine.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

use crate::codec::{FrameReader, FrameWriter};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::{LINK_CHANNEL_CAPACITY, Link, Transport, TransportError, TransportFut};

/// Default engine port.
pub const DEFAULT_PORT: u16 = 1314;

/// Bound on a single connect attempt; retries are paced separately.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpTransport {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Transport for TcpTransport {
    fn describe(&self) -> String {
        format!("tcp://{}", self.address())
    }

    fn connect(&self) -> TransportFut<'_> {
        Box::pin(async move {
            let address = self.address();
            let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address))
                .await
                .map_err(|_| {
                    TransportError::Unavailable(format!(
                        "connect to {address} timed out after {}ms",
                        self.connect_timeout.as_millis()
                    ))
                })??;
            stream.set_nodelay(true)?;
            let peer = self.describe();
            let (read_half, write_half) = stream.into_split();

            let (outbound, outbound_rx) = mpsc::channel(LINK_CHANNEL_CAPACITY);
            let (inbound_tx, inbound) = mpsc::channel(LINK_CHANNEL_CAPACITY);

            tokio::spawn(write_loop(write_half, outbound_rx, peer.clone()));
            tokio::spawn(read_loop(read_half, inbound_tx, peer));

            Ok::<_, TransportError>(Link { outbound, inbound })
        })
    }
}

async fn write_loop(
    write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
    peer: String,
) {
    let mut writer = FrameWriter::new(write_half);
    while let Some(message) = outbound_rx.recv().await {
        if let Err(e) = writer.write_message(&message).await {
            tracing::warn!(peer = %peer, kind = message.kind(), "Engine write failed: {e:#}");
            break;
        }
    }
    tracing::debug!(peer = %peer, "Engine writer stopped");
}

async fn read_loop(read_half: OwnedReadHalf, inbound_tx: mpsc::Sender<ServerMessage>, peer: String) {
    let mut reader = FrameReader::new(read_half);
    loop {
        match reader.read_frame().await {
            Ok(Some(body)) => match serde_json::from_slice::<ServerMessage>(&body) {
                Ok(message) => {
                    if inbound_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::trace!(peer = %peer, "Ignoring undecodable engine frame: {e}");
                }
            },
            Ok(None) => {
                tracing::info!(peer = %peer, "Engine closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!(peer = %peer, "Engine read failed: {e:#}");
                break;
            }
        }
    }
}
