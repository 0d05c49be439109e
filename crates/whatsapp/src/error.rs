/// Crate-wide result type for WhatsApp client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed client errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The client has no live connection to the sidecar.
    #[error("whatsapp client not connected: {session_id}")]
    NotConnected { session_id: String },

    /// `initialize` was called on a client that is already connected.
    #[error("whatsapp client already initialized: {session_id}")]
    AlreadyInitialized { session_id: String },

    /// The sidecar did not answer a request in time.
    #[error("sidecar request timed out: {request}")]
    Timeout { request: String },

    /// The sidecar reported a failed send.
    #[error("send failed: {message}")]
    SendFailed { message: String },

    #[error("{message}")]
    Message { message: String },

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_connected(session_id: impl Into<String>) -> Self {
        Self::NotConnected {
            session_id: session_id.into(),
        }
    }
}
