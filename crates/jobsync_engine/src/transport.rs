use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jobsync_logging::{sync_debug, sync_trace};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What a live link reports back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    Closed { reason: Option<String> },
    Error(String),
}

/// One open connection: text frames out, events in, and a handle to close it.
///
/// After `Closed` or `Error` the link delivers nothing more.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
    pub shutdown: CancellationToken,
}

impl Link {
    /// Builds a link and returns the far ends of its channels.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<TransportEvent>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let link = Self {
            outbound: out_tx,
            inbound: in_rx,
            shutdown: CancellationToken::new(),
        };
        (link, out_rx, in_tx)
    }
}

#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Link, TransportError>;
}

/// WebSocket connector over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        let (link, out_rx, in_tx) = Link::pair();
        tokio::spawn(pump(ws, out_rx, in_tx, link.shutdown.clone()));
        Ok(link)
    }
}

/// Shuttles frames between the socket and the link channels until either side
/// goes away.
async fn pump(
    ws: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    in_tx: mpsc::UnboundedSender<TransportEvent>,
    shutdown: CancellationToken,
) {
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            outbound = out_rx.recv() => match outbound {
                Some(text) => {
                    sync_trace!("-> {} bytes", text.len());
                    if let Err(err) = write.send(Message::text(text)).await {
                        let _ = in_tx.send(TransportEvent::Error(err.to_string()));
                        break;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let _ = in_tx.send(TransportEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|frame| frame.reason.as_str().to_owned())
                        .filter(|reason| !reason.is_empty());
                    let _ = in_tx.send(TransportEvent::Closed { reason });
                    break;
                }
                // Protocol-level pings are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let _ = in_tx.send(TransportEvent::Error(err.to_string()));
                    break;
                }
                None => {
                    let _ = in_tx.send(TransportEvent::Closed { reason: None });
                    break;
                }
            },
        }
    }
    sync_debug!("WebSocket pump finished");
}
