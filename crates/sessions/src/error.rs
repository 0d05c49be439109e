use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("session {session_id} is not ready")]
    NotReady { session_id: String },

    #[error("session {session_id} is already initialized")]
    AlreadyInitialized { session_id: String },

    #[error("session {session_id} has no client; call initialize first")]
    NotInitialized { session_id: String },

    #[error("command already registered: {name}")]
    DuplicateCommand { name: String },

    #[error(transparent)]
    Client(#[from] voltron_whatsapp::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    #[must_use]
    pub fn not_ready(session_id: impl Into<String>) -> Self {
        Self::NotReady {
            session_id: session_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
