//! One WhatsApp account: its client, readiness and command table.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock, RwLock, Weak},
};

use {
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
    voltron_auto_reply::{ReplyContext, auto_reply},
    voltron_config::{SessionConfig, VoltronConfig},
    voltron_whatsapp::{
        ClientEvent, ClientFactory, ClientOptions, ConnectedUser, EventReceiver, IncomingMessage,
        PairingCodeInfo, WhatsAppClient, qr,
    },
};

use crate::{
    access,
    commands::{BoundCommand, MessageContext},
    error::{Error, Result},
    state::{Readiness, SessionPhase},
    status::SessionStatus,
};

struct RegisteredCommand {
    description: String,
    run: BoundCommand,
}

/// Session wrapper around exactly one [`WhatsAppClient`].
pub struct SessionBot {
    config: SessionConfig,
    settings: Arc<VoltronConfig>,
    factory: Arc<dyn ClientFactory>,
    client: OnceLock<Arc<dyn WhatsAppClient>>,
    readiness: RwLock<Readiness>,
    commands: RwLock<HashMap<String, RegisteredCommand>>,
    /// Fires on a clean stop; ends the event loop and aborts any handler in flight.
    stopped: CancellationToken,
}

impl SessionBot {
    pub fn new(
        config: SessionConfig,
        settings: Arc<VoltronConfig>,
        factory: Arc<dyn ClientFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            settings,
            factory,
            client: OnceLock::new(),
            readiness: RwLock::new(Readiness::default()),
            commands: RwLock::new(HashMap::new()),
            stopped: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Options the client is built with.
    pub fn client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::new(
            self.id(),
            self.prefix(),
            &self.settings.bot.sessions_dir,
        );
        options.restart_on_auth_failure = self.settings.bot.auto_restart;
        options.phone_number = self.config.phone_number.clone();
        options
    }

    /// Build the client and start consuming its events.
    pub fn initialize(self: &Arc<Self>) -> Result<()> {
        if self.client.get().is_some() {
            return Err(Error::AlreadyInitialized {
                session_id: self.id().to_string(),
            });
        }
        info!(session_id = self.id(), "initializing session");

        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.factory.create(self.client_options(), events_tx)?;
        if self.client.set(client).is_err() {
            return Err(Error::AlreadyInitialized {
                session_id: self.id().to_string(),
            });
        }

        tokio::spawn(run_event_loop(
            Arc::downgrade(self),
            events_rx,
            self.stopped.clone(),
        ));
        Ok(())
    }

    /// Connect the client. Errors are logged and reported as `false`.
    pub async fn start(&self) -> bool {
        let Some(client) = self.client.get() else {
            error!(session_id = self.id(), "start called before initialize");
            return false;
        };
        info!(session_id = self.id(), "starting session");
        match client.initialize().await {
            Ok(()) => true,
            Err(e) => {
                error!(session_id = self.id(), error = %e, "start failed");
                false
            },
        }
    }

    /// Destroy the client. Returns whether it was torn down cleanly.
    pub async fn stop(&self) -> bool {
        let Some(client) = self.client.get() else {
            return false;
        };
        match client.destroy().await {
            Ok(()) => {
                self.stopped.cancel();
                self.readiness
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .stop();
                info!(session_id = self.id(), "session stopped");
                true
            },
            Err(e) => {
                error!(session_id = self.id(), error = %e, "stop failed");
                false
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        self.readiness
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .ready
    }

    pub fn phase(&self) -> SessionPhase {
        self.readiness
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .phase
    }

    pub fn user(&self) -> Option<ConnectedUser> {
        self.readiness
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .user
            .clone()
    }

    /// Ready and backed by a client.
    pub fn is_active(&self) -> bool {
        self.is_ready() && self.client.get().is_some()
    }

    pub fn status(&self) -> SessionStatus {
        let readiness = self.readiness.read().unwrap_or_else(|e| e.into_inner());
        SessionStatus {
            session_id: self.id().to_string(),
            is_ready: readiness.ready,
            user: readiness.user.clone(),
            prefix: self.prefix().to_string(),
            phase: readiness.phase,
        }
    }

    /// Send a message through the client.
    ///
    /// `Err(NotReady)` before the session is ready; transport failures are
    /// logged and reported as `Ok(false)`.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<bool> {
        if !self.is_ready() {
            return Err(Error::not_ready(self.id()));
        }
        let client = self.client.get().ok_or_else(|| Error::NotInitialized {
            session_id: self.id().to_string(),
        })?;
        match client.send_text(chat_id, text).await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(session_id = self.id(), chat_id, error = %e, "send message failed");
                Ok(false)
            },
        }
    }

    pub fn pairing_code_info(&self) -> PairingCodeInfo {
        self.client
            .get()
            .map(|c| c.pairing_code_info())
            .unwrap_or_default()
    }

    /// Ask the client for a fresh pairing code. Failures are logged.
    pub async fn generate_new_pair_code(&self) -> bool {
        let Some(client) = self.client.get() else {
            warn!(session_id = self.id(), "pairing code requested before initialize");
            return false;
        };
        match client.request_pairing_code().await {
            Ok(()) => true,
            Err(e) => {
                warn!(session_id = self.id(), error = %e, "pairing code request failed");
                false
            },
        }
    }

    /// Add a command to this session's table. Names are unique.
    pub fn register_command(&self, name: &str, description: &str, run: BoundCommand) -> Result<()> {
        let mut commands = self.commands.write().unwrap_or_else(|e| e.into_inner());
        if commands.contains_key(name) {
            return Err(Error::DuplicateCommand {
                name: name.to_string(),
            });
        }
        commands.insert(name.to_string(), RegisteredCommand {
            description: description.to_string(),
            run,
        });
        Ok(())
    }

    /// Registered command names with their descriptions, sorted by name.
    pub fn commands(&self) -> Vec<(String, String)> {
        let commands = self.commands.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<_> = commands
            .iter()
            .map(|(name, cmd)| (name.clone(), cmd.description.clone()))
            .collect();
        list.sort();
        list
    }

    fn command(&self, name: &str) -> Option<BoundCommand> {
        self.commands
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|cmd| Arc::clone(&cmd.run))
    }

    /// Split `<prefix><name> <args>` into a lowercase name and the args.
    /// Any prefixed text is a command, even when the name is empty.
    fn parse_command<'a>(&self, body: &'a str) -> Option<(String, &'a str)> {
        if self.prefix().is_empty() {
            return None;
        }
        let rest = body.trim_start().strip_prefix(self.prefix())?;
        let (name, args) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        Some((name.to_lowercase(), args))
    }

    /// Apply one client event: update readiness, then run its side effects.
    pub async fn apply(&self, event: ClientEvent) {
        self.readiness
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .apply(&event);

        let session_id = self.id();
        match event {
            ClientEvent::Qr(code) => {
                info!(session_id, "QR code ready, scan within 60 seconds");
                if self.client_options().qr_terminal {
                    match qr::render_terminal(&code) {
                        Ok(art) => println!("{art}"),
                        Err(e) => warn!(session_id, error = %e, "could not render QR code"),
                    }
                }
                info!(session_id, "or link with {}paircode", self.prefix());
            },
            ClientEvent::PairingCode {
                code,
                expires_in_secs,
            } => {
                info!(session_id, code = %code, expires_in_secs, "pairing code issued");
            },
            ClientEvent::Authenticated => info!(session_id, "authenticated"),
            ClientEvent::Ready(user) => {
                info!(
                    session_id,
                    name = user.name.as_deref().unwrap_or("Unknown"),
                    phone = user.phone.as_deref().unwrap_or("Unknown"),
                    "session online"
                );
            },
            ClientEvent::AuthFailure(reason) => {
                error!(session_id, reason = %reason, "authentication failed");
            },
            ClientEvent::Disconnected(reason) => {
                warn!(session_id, reason = %reason, "disconnected");
            },
            ClientEvent::Message(message) => self.handle_message(message).await,
        }
    }

    /// Route an inbound message to a command or a keyword auto-reply.
    pub async fn handle_message(&self, message: IncomingMessage) {
        if message.from_me {
            return;
        }

        let session_id = self.id();
        let decision = access::check(
            message.sender_phone(),
            &message.body,
            &self.settings.security,
        );
        if !decision.is_allowed() {
            debug!(session_id, sender = %message.sender, ?decision, "message dropped");
            return;
        }

        let Some(client) = self.client.get().map(Arc::clone) else {
            return;
        };

        if let Some((name, args)) = self.parse_command(&message.body) {
            match self.command(&name) {
                Some(run) => {
                    info!(
                        session_id,
                        command = %name,
                        sender = %message.sender,
                        "running command"
                    );
                    let args = args.to_string();
                    run(MessageContext::new(session_id, message, &args, client)).await;
                },
                None => debug!(session_id, command = %name, "unknown command ignored"),
            }
            return;
        }

        let ctx = ReplyContext {
            bot_name: &self.settings.bot.name,
            session_id,
            online: self.is_ready(),
        };
        let Some(reply) = auto_reply(&message.body, &ctx) else {
            return;
        };
        if let Err(e) = client.send_text(&message.chat_id, &reply).await {
            warn!(session_id, chat_id = %message.chat_id, error = %e, "auto-reply failed");
        }
    }
}

/// Consume client events in delivery order until the client goes away or
/// the session is stopped.
///
/// Each event runs in its own task so a panicking handler is logged instead
/// of killing the loop. A stop aborts the handler in flight.
async fn run_event_loop(
    bot: Weak<SessionBot>,
    mut events: EventReceiver,
    stopped: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = stopped.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(bot) = bot.upgrade() else {
            break;
        };
        let session_id = bot.id().to_string();
        let handler = tokio::spawn(async move { bot.apply(event).await });
        let abort = handler.abort_handle();
        tokio::select! {
            result = handler => {
                if let Err(e) = result
                    && !e.is_cancelled()
                {
                    error!(session_id = %session_id, error = %e, "session event handler failed");
                }
            },
            _ = stopped.cancelled() => {
                abort.abort();
                debug!(session_id = %session_id, "event handler aborted on stop");
                break;
            },
        }
    }
}
