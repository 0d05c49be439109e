//! Chat commands shared by every session.
//!
//! The registry is a flat, immutable table of [`CommandDescriptor`]s. The
//! manager binds each descriptor to a session id and registers the result in
//! that session's command table.

mod menu;
mod pairing;

use std::sync::Arc;

use {
    futures::future::BoxFuture,
    tracing::warn,
    voltron_config::VoltronConfig,
    voltron_whatsapp::{IncomingMessage, WhatsAppClient},
};

use crate::{directory::SessionDirectory, followup::FollowUps};

pub use pairing::PAIR_CODE_FOLLOW_UP_DELAY;

/// Reply sent by every command whose session is gone.
pub const SESSION_NOT_FOUND: &str = "❌ Session not found!";

pub type CommandFuture = BoxFuture<'static, ()>;

/// Registry-level handler: message, shared services, bound session id.
pub type CommandHandler = fn(MessageContext, CommandServices, String) -> CommandFuture;

/// A handler with its session id already bound, as stored per session.
pub type BoundCommand = Arc<dyn Fn(MessageContext) -> CommandFuture + Send + Sync>;

/// One registry entry.
#[derive(Clone, Copy)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub handler: CommandHandler,
}

impl std::fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Immutable command table.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: Vec<CommandDescriptor>,
}

impl CommandRegistry {
    pub fn new(commands: Vec<CommandDescriptor>) -> Self {
        Self { commands }
    }

    /// The commands every session ships with.
    pub fn builtin() -> Self {
        Self::new(vec![
            CommandDescriptor {
                name: "menu",
                description: "Show available commands",
                handler: menu::menu,
            },
            CommandDescriptor {
                name: "paircode",
                description: "Get pair code for WhatsApp linking",
                handler: pairing::paircode,
            },
            CommandDescriptor {
                name: "link",
                description: "Link your WhatsApp with pair code",
                handler: pairing::link,
            },
            CommandDescriptor {
                name: "linkinfo",
                description: "Check linking status and get pair code",
                handler: pairing::linkinfo,
            },
            CommandDescriptor {
                name: "unlink",
                description: "Unlink your WhatsApp from this session",
                handler: pairing::unlink,
            },
            CommandDescriptor {
                name: "sessions",
                description: "Show the status of every session (admin)",
                handler: menu::sessions,
            },
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.iter()
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Process-wide services a handler may use.
#[derive(Clone)]
pub struct CommandServices {
    pub directory: Arc<dyn SessionDirectory>,
    pub follow_ups: FollowUps,
    pub settings: Arc<VoltronConfig>,
    pub registry: Arc<CommandRegistry>,
}

/// The message that triggered a command, plus a way to answer it.
#[derive(Clone)]
pub struct MessageContext {
    pub session_id: String,
    pub message: IncomingMessage,
    /// Text after the command name, trimmed.
    pub args: String,
    client: Arc<dyn WhatsAppClient>,
}

impl MessageContext {
    pub fn new(
        session_id: &str,
        message: IncomingMessage,
        args: &str,
        client: Arc<dyn WhatsAppClient>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            message,
            args: args.trim().to_string(),
            client,
        }
    }

    /// Send `text` to the originating chat. Failures are logged.
    pub async fn reply(&self, text: &str) -> bool {
        match self.client.send_text(&self.message.chat_id, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    session_id = %self.session_id,
                    chat_id = %self.message.chat_id,
                    error = %e,
                    "reply failed"
                );
                false
            },
        }
    }
}
