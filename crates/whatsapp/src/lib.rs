//! WhatsApp connectivity for voltron sessions.
//!
//! Sessions talk to WhatsApp through the [`WhatsAppClient`] trait. The
//! shipped implementation drives a Baileys sidecar (a Node.js process) over
//! a local WebSocket, one connection per session.

pub mod client;
pub mod error;
pub mod process;
pub mod qr;
pub mod sidecar;
pub mod types;

pub use {
    client::{ClientFactory, EventReceiver, EventSender, WhatsAppClient},
    error::{Error, Result},
    process::{SidecarConfig, SidecarProcess, find_sidecar_dir, start_sidecar},
    sidecar::{DEFAULT_SIDECAR_PORT, SidecarClient, SidecarClientFactory},
    types::{
        ClientEvent, ClientOptions, ConnectedUser, IncomingMessage, IssuedPairingCode,
        PairingCodeInfo, phone_from_jid,
    },
};
