use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::hub::FeedHub;
use crate::models::MetricSnapshot;

const DEFAULT_RECONNECT_DELAY_SECONDS: u64 = 1;
const MAX_RECONNECT_DELAY_SECONDS: u64 = 30;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Malformed feed frame: {0}")]
    Malformed(String),
}

#[derive(Deserialize)]
struct DataFrame {
    channel: String,
    #[serde(default)]
    data: Value,
}

pub fn control_frame(action: &str, channel: &str) -> String {
    serde_json::json!({ "action": action, "channel": channel }).to_string()
}

pub fn parse_data_frame(text: &str) -> Result<(String, MetricSnapshot), FeedError> {
    let frame: DataFrame =
        serde_json::from_str(text).map_err(|e| FeedError::Malformed(e.to_string()))?;
    Ok((frame.channel, MetricSnapshot::from_json(&frame.data)))
}

enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// Keeps a websocket to the stats feed open and pours incoming snapshots into
/// the hub. Disconnects are retried with exponential backoff; consumers of the
/// hub only notice that snapshots stop arriving for a while.
pub struct FeedConnector {
    url: String,
    hub: Arc<FeedHub>,
}

impl FeedConnector {
    pub fn new(url: impl Into<String>, hub: Arc<FeedHub>) -> Self {
        Self {
            url: url.into(),
            hub,
        }
    }

    pub async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut reconnect_delay_seconds = DEFAULT_RECONNECT_DELAY_SECONDS;
        loop {
            info!(url = %self.url, "Connecting to stats feed.");
            match tokio_tungstenite::connect_async(self.url.as_str()).await {
                Ok((ws_stream, _)) => {
                    info!(url = %self.url, "Connected to stats feed.");
                    reconnect_delay_seconds = DEFAULT_RECONNECT_DELAY_SECONDS;
                    match self.session(ws_stream, &mut shutdown_rx).await {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Disconnected) => {
                            warn!("Stats feed closed by server. Preparing to reconnect...");
                        }
                        Err(e) => {
                            warn!(error = %e, "Stats feed session ended with an error.");
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to connect to stats feed. Will retry.");
                }
            }

            debug!(delay_seconds = reconnect_delay_seconds, "Sleeping before next connection attempt.");
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = tokio::time::sleep(Duration::from_secs(reconnect_delay_seconds)) => {}
            }
            reconnect_delay_seconds = (reconnect_delay_seconds * 2).min(MAX_RECONNECT_DELAY_SECONDS);
        }
        info!("Stats feed connector stopped.");
    }

    async fn session<S>(
        &self,
        ws_stream: tokio_tungstenite::WebSocketStream<S>,
        shutdown_rx: &mut oneshot::Receiver<()>,
    ) -> Result<SessionEnd, FeedError>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = ws_stream.split();
        let mut active_rx = self.hub.watch_active();
        // Channels the server has been asked for on this connection.
        let mut requested: BTreeSet<String> = BTreeSet::new();

        let wanted = active_rx.borrow_and_update().clone();
        sync_requests(&mut sink, &mut requested, &wanted).await?;

        loop {
            tokio::select! {
                biased;

                _ = &mut *shutdown_rx => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }

                changed = active_rx.changed() => {
                    if changed.is_err() {
                        // Hub dropped; nothing left to feed.
                        return Ok(SessionEnd::Shutdown);
                    }
                    let wanted = active_rx.borrow_and_update().clone();
                    sync_requests(&mut sink, &mut requested, &wanted).await?;
                }

                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Text(text))) => match parse_data_frame(text.as_str()) {
                            Ok((channel, snapshot)) => {
                                self.hub.publish(&channel, snapshot);
                            }
                            Err(e) => warn!(error = %e, "Ignoring feed frame."),
                        },
                        Some(Ok(WsMessage::Close(_))) | None => return Ok(SessionEnd::Disconnected),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
    }
}

async fn sync_requests<K>(
    sink: &mut K,
    requested: &mut BTreeSet<String>,
    wanted: &BTreeSet<String>,
) -> Result<(), FeedError>
where
    K: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    for channel in wanted.difference(requested) {
        debug!(channel = %channel, "Requesting feed channel.");
        sink.send(WsMessage::text(control_frame("subscribe", channel))).await?;
    }
    for channel in requested.difference(wanted) {
        debug!(channel = %channel, "Releasing feed channel.");
        sink.send(WsMessage::text(control_frame("unsubscribe", channel))).await?;
    }
    *requested = wanted.clone();
    Ok(())
}
