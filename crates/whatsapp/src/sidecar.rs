//! [`WhatsAppClient`] backed by the Baileys sidecar over a local WebSocket.
//!
//! Every session opens its own connection to the sidecar and logs in with
//! its session id as the account id. Frames for other accounts are ignored.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    tokio::{
        net::TcpStream,
        sync::{Mutex as AsyncMutex, mpsc, oneshot},
    },
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    client::{ClientFactory, EventSender, WhatsAppClient},
    error::{Error, Result},
    types::{ClientOptions, GatewayMessage, IssuedPairingCode, PairingCodeInfo, SidecarMessage},
};

/// Default port for the sidecar WebSocket server.
pub const DEFAULT_SIDECAR_PORT: u16 = 32_680;

const CONNECT_ATTEMPTS: u32 = 10;
const MAX_CONNECT_BACKOFF: Duration = Duration::from_secs(5);
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SendOutcome = std::result::Result<(), String>;
type PendingSends = Arc<Mutex<HashMap<String, oneshot::Sender<SendOutcome>>>>;

struct Connection {
    write_tx: mpsc::UnboundedSender<String>,
    /// Cancelled on `destroy`, so the closing socket is not reported as a
    /// disconnect.
    closing: CancellationToken,
}

/// Sidecar-backed client for one session.
pub struct SidecarClient {
    options: ClientOptions,
    port: u16,
    events: EventSender,
    connection: AsyncMutex<Option<Connection>>,
    pending: PendingSends,
    pairing: Arc<Mutex<Option<IssuedPairingCode>>>,
}

impl SidecarClient {
    pub fn new(options: ClientOptions, port: u16, events: EventSender) -> Self {
        Self {
            options,
            port,
            events,
            connection: AsyncMutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            pairing: Arc::new(Mutex::new(None)),
        }
    }

    fn session_id(&self) -> &str {
        &self.options.session_id
    }

    async fn send_frame(&self, frame: &GatewayMessage) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        let connection = self.connection.lock().await;
        let connection = connection
            .as_ref()
            .ok_or_else(|| Error::not_connected(self.session_id()))?;
        connection
            .write_tx
            .send(json)
            .map_err(|_| Error::not_connected(self.session_id()))
    }
}

#[async_trait]
impl WhatsAppClient for SidecarClient {
    async fn initialize(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if connection.is_some() {
            return Err(Error::AlreadyInitialized {
                session_id: self.session_id().to_string(),
            });
        }

        let ws = connect_with_retry(self.port, CONNECT_ATTEMPTS).await?;
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let closing = CancellationToken::new();

        write_tx
            .send(serde_json::to_string(&GatewayMessage::login(&self.options))?)
            .map_err(|_| Error::not_connected(self.session_id()))?;

        let reader = FrameRouter {
            session_id: self.session_id().to_string(),
            events: self.events.clone(),
            pending: Arc::clone(&self.pending),
            pairing: Arc::clone(&self.pairing),
        };
        tokio::spawn(run_connection(ws, write_rx, closing.clone(), reader));

        *connection = Some(Connection { write_tx, closing });
        info!(
            session_id = self.session_id(),
            port = self.port,
            "logged in to whatsapp sidecar"
        );
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        let Some(connection) = self.connection.lock().await.take() else {
            return Ok(());
        };

        connection.closing.cancel();
        let logout = GatewayMessage::Logout {
            account_id: self.session_id().to_string(),
        };
        // Queued before the sender drops, so the writer flushes it and then
        // closes the socket.
        let _ = connection.write_tx.send(serde_json::to_string(&logout)?);
        drop(connection);

        lock(&self.pairing).take();
        lock(&self.pending).clear();
        debug!(session_id = self.session_id(), "sidecar connection released");
        Ok(())
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(request_id.clone(), tx);

        let frame = GatewayMessage::SendMessage {
            request_id: request_id.clone(),
            account_id: self.session_id().to_string(),
            to: chat_id.to_string(),
            text: text.to_string(),
        };
        if let Err(e) = self.send_frame(&frame).await {
            lock(&self.pending).remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(SEND_TIMEOUT, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(Error::SendFailed { message }),
            Ok(Err(_)) => Err(Error::not_connected(self.session_id())),
            Err(_) => {
                lock(&self.pending).remove(&request_id);
                Err(Error::Timeout {
                    request: request_id,
                })
            },
        }
    }

    async fn request_pairing_code(&self) -> Result<()> {
        lock(&self.pairing).take();
        self.send_frame(&GatewayMessage::RequestPairingCode {
            account_id: self.session_id().to_string(),
            phone_number: self.options.phone_number.clone(),
        })
        .await
    }

    fn pairing_code_info(&self) -> PairingCodeInfo {
        lock(&self.pairing)
            .as_ref()
            .map(IssuedPairingCode::info)
            .unwrap_or_default()
    }
}

/// Creates one [`SidecarClient`] per session, all talking to the same port.
pub struct SidecarClientFactory {
    port: u16,
}

impl SidecarClientFactory {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Default for SidecarClientFactory {
    fn default() -> Self {
        Self::new(DEFAULT_SIDECAR_PORT)
    }
}

impl ClientFactory for SidecarClientFactory {
    fn create(
        &self,
        options: ClientOptions,
        events: EventSender,
    ) -> Result<Arc<dyn WhatsAppClient>> {
        Ok(Arc::new(SidecarClient::new(options, self.port, events)))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Routes inbound frames for one session.
struct FrameRouter {
    session_id: String,
    events: EventSender,
    pending: PendingSends,
    pairing: Arc<Mutex<Option<IssuedPairingCode>>>,
}

impl FrameRouter {
    fn route(&self, text: &str) {
        let msg: SidecarMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "unparseable sidecar frame");
                return;
            },
        };

        match &msg {
            SidecarMessage::SendResult {
                request_id,
                success,
                error,
            } => {
                if let Some(tx) = lock(&self.pending).remove(request_id) {
                    let outcome = if *success {
                        Ok(())
                    } else {
                        Err(error.clone().unwrap_or_else(|| "unknown error".into()))
                    };
                    let _ = tx.send(outcome);
                }
                return;
            },
            SidecarMessage::Error { account_id, error } => {
                if account_id.as_deref().is_none_or(|id| id == self.session_id) {
                    warn!(session_id = %self.session_id, error = %error, "sidecar error");
                }
                return;
            },
            _ => {},
        }

        if msg.account_id() != Some(self.session_id.as_str()) {
            return;
        }

        if let SidecarMessage::PairingCode {
            code,
            expires_in_secs,
            ..
        } = &msg
        {
            *lock(&self.pairing) = Some(IssuedPairingCode::new(
                code.clone(),
                Duration::from_secs(*expires_in_secs),
            ));
        }

        if let Some(event) = msg.into_client_event() {
            let _ = self.events.send(event);
        }
    }
}

async fn run_connection(
    ws: WsStream,
    mut write_rx: mpsc::UnboundedReceiver<String>,
    closing: CancellationToken,
    router: FrameRouter,
) {
    let outcome = pump(ws, &mut write_rx, &router).await;
    lock(&router.pending).clear();

    if closing.is_cancelled() {
        return;
    }

    let reason = match outcome {
        Ok(()) => "sidecar connection closed".to_string(),
        Err(e) => e.to_string(),
    };
    warn!(session_id = %router.session_id, reason = %reason, "lost sidecar connection");
    let _ = router
        .events
        .send(crate::types::ClientEvent::Disconnected(reason));
}

async fn pump(
    ws: WsStream,
    write_rx: &mut mpsc::UnboundedReceiver<String>,
    router: &FrameRouter,
) -> Result<()> {
    let (mut sink, mut reader) = ws.split();

    loop {
        tokio::select! {
            incoming = reader.next() => match incoming {
                Some(Ok(Message::Text(text))) => router.route(&text),
                Some(Ok(Message::Ping(data))) => sink.send(Message::Pong(data)).await?,
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {},
                Some(Err(e)) => return Err(e.into()),
            },
            outgoing = write_rx.recv() => match outgoing {
                Some(text) => sink.send(Message::Text(text.into())).await?,
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                },
            },
        }
    }
}

/// Connect to the sidecar, retrying while its process is still starting.
async fn connect_with_retry(port: u16, attempts: u32) -> Result<WsStream> {
    let url = format!("ws://127.0.0.1:{port}");
    let mut backoff = Duration::from_millis(500);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match connect_async(url.as_str()).await {
            Ok((ws, _response)) => return Ok(ws),
            Err(e) => {
                debug!(attempt, url = %url, error = %e, "sidecar not reachable yet");
                last_error = Some(e);
            },
        }
        if attempt < attempts {
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_CONNECT_BACKOFF);
        }
    }

    Err(last_error.map_or_else(
        || Error::message(format!("could not connect to sidecar at {url}")),
        Error::from,
    ))
}
