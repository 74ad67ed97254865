use super::events::{self, OutgoingMessage};
use super::{ChannelShared, ConnectionState, Connector, InboundHandler, TransportChannel};
use crate::error::TransportError;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

/// Builds the websocket endpoint for `server`, carrying the identity as the
/// `id` query parameter. Bare hosts get `ws://`; http(s) maps to ws(s).
pub fn endpoint_url(server: &str, identity: &str) -> Result<Url, TransportError> {
    let trimmed = server.trim();
    let normalized = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else {
        format!("ws://{trimmed}")
    };
    let mut url = Url::parse(&normalized)?;
    url.query_pairs_mut().append_pair("id", identity);
    Ok(url)
}

/// Websocket-backed channel. The connection is driven by a background task
/// on the current tokio runtime; `connect` returns while still `Connecting`.
pub struct WsChannel {
    shared: Arc<ChannelShared>,
    outbound: mpsc::UnboundedSender<String>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl WsChannel {
    pub fn connect(server: &str, identity: &str) -> Result<Arc<Self>, TransportError> {
        let url = endpoint_url(server, identity)?;
        let handle = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let shared = Arc::new(ChannelShared::new(ConnectionState::Connecting));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();

        log::info!("connecting to {url}");
        handle.spawn(drive(url, shared.clone(), outbound_rx, shutdown_rx));

        Ok(Arc::new(Self {
            shared,
            outbound,
            shutdown: Mutex::new(Some(shutdown)),
        }))
    }
}

async fn drive(
    url: Url,
    shared: Arc<ChannelShared>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let connected = tokio::select! {
        _ = &mut shutdown => {
            shared.set_state(ConnectionState::Disconnected);
            return;
        }
        res = connect_async(url.as_str()) => res,
    };
    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            log::warn!("websocket connect to {url} failed: {e}");
            shared.set_state(ConnectionState::Disconnected);
            return;
        }
    };
    if !shared.transition(ConnectionState::Connecting, ConnectionState::Connected) {
        // Closed while the handshake was in flight.
        return;
    }
    log::info!("websocket connected");

    let (mut write, mut read) = ws_stream.split();
    // Handlers persist synchronously, so they run off the async workers, in
    // arrival order.
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let dispatcher = tokio::task::spawn_blocking({
        let shared = shared.clone();
        move || dispatch_inbound(&shared, inbound_rx)
    });
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = write.send(WsMessage::Close(None)).await;
                break;
            }
            Some(frame) = outbound_rx.recv() => {
                if let Err(e) = write.send(WsMessage::Text(frame)).await {
                    log::warn!("websocket send failed: {e}");
                    break;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = inbound_tx.send(text);
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("websocket read failed: {e}");
                    break;
                }
            }
        }
    }
    drop(inbound_tx);
    if let Err(e) = dispatcher.await {
        log::warn!("inbound dispatcher failed: {e}");
    }
    shared.set_state(ConnectionState::Disconnected);
    log::info!("websocket disconnected");
}

fn dispatch_inbound(shared: &ChannelShared, mut frames: mpsc::UnboundedReceiver<String>) {
    while let Some(text) = frames.blocking_recv() {
        shared.dispatch_frame(&text);
    }
}

impl TransportChannel for WsChannel {
    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn emit(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        if self.shared.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let frame = events::encode_send(message)?;
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::ChannelClosed)
    }

    fn subscribe(&self, handler: InboundHandler) {
        self.shared.subscribe(handler);
    }

    fn unsubscribe(&self) {
        self.shared.unsubscribe();
    }

    fn close(&self) {
        self.shared.close();
        let shutdown = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = shutdown {
            let _ = tx.send(());
        }
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens a [`WsChannel`] per identity against a fixed server.
#[derive(Debug, Clone)]
pub struct WsConnector {
    server_url: String,
}

impl WsConnector {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }
}

impl Connector for WsConnector {
    fn connect(&self, identity: &str) -> Result<Arc<dyn TransportChannel>, TransportError> {
        let channel: Arc<dyn TransportChannel> = WsChannel::connect(&self.server_url, identity)?;
        Ok(channel)
    }
}
