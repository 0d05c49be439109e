//! The seam between a session and the library that actually speaks WhatsApp.

use std::sync::Arc;

use {async_trait::async_trait, tokio::sync::mpsc};

use crate::{
    error::Result,
    types::{ClientEvent, ClientOptions, PairingCodeInfo},
};

/// Sender half a client uses to deliver [`ClientEvent`]s to its session.
pub type EventSender = mpsc::UnboundedSender<ClientEvent>;

/// Receiver half consumed by the session's event loop.
pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

/// One WhatsApp account connection.
///
/// Protocol, pairing cryptography and reconnection all live behind this
/// trait. Events are pushed through the [`EventSender`] given at creation.
#[async_trait]
pub trait WhatsAppClient: Send + Sync {
    /// Connect and start the authentication flow.
    async fn initialize(&self) -> Result<()>;

    /// Tear the connection down.
    async fn destroy(&self) -> Result<()>;

    /// Send a plain-text message to a chat.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()>;

    /// Ask for a fresh pairing code. The code arrives later as a
    /// [`ClientEvent::PairingCode`] and through [`Self::pairing_code_info`].
    async fn request_pairing_code(&self) -> Result<()>;

    /// Current pairing code state.
    fn pairing_code_info(&self) -> PairingCodeInfo;
}

/// Builds clients; one call per session.
pub trait ClientFactory: Send + Sync {
    fn create(&self, options: ClientOptions, events: EventSender) -> Result<Arc<dyn WhatsAppClient>>;
}
