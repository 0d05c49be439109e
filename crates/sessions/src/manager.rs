//! Owns every session: staggered startup, restart and shutdown.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    tracing::{error, info, warn},
    voltron_config::{SessionConfig, VoltronConfig},
    voltron_whatsapp::ClientFactory,
};

use crate::{
    commands::{BoundCommand, CommandRegistry, CommandServices, MessageContext},
    directory::{SessionDirectory, SessionMap},
    error::{Error, Result},
    followup::FollowUps,
    session::SessionBot,
    status::{SessionStatus, StartupSummary},
};

pub struct SessionManager {
    settings: Arc<VoltronConfig>,
    factory: Arc<dyn ClientFactory>,
    registry: Arc<CommandRegistry>,
    sessions: SessionMap,
    follow_ups: FollowUps,
    shutting_down: AtomicBool,
}

impl SessionManager {
    pub fn new(settings: VoltronConfig, factory: Arc<dyn ClientFactory>) -> Self {
        Self::with_registry(settings, factory, CommandRegistry::builtin())
    }

    pub fn with_registry(
        settings: VoltronConfig,
        factory: Arc<dyn ClientFactory>,
        registry: CommandRegistry,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            factory,
            registry: Arc::new(registry),
            sessions: SessionMap::new(),
            follow_ups: FollowUps::new(),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &VoltronConfig {
        &self.settings
    }

    /// Read-only session lookup, shared with command handlers and the
    /// health endpoint.
    pub fn directory(&self) -> Arc<dyn SessionDirectory> {
        Arc::new(self.sessions.clone())
    }

    fn services(&self) -> CommandServices {
        CommandServices {
            directory: self.directory(),
            follow_ups: self.follow_ups.clone(),
            settings: Arc::clone(&self.settings),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Start every enabled session in order, pausing between starts.
    pub async fn initialize_all_sessions(&self) -> StartupSummary {
        let configs = self.settings.enabled_sessions();
        let stagger = Duration::from_millis(self.settings.bot.session_stagger_ms);
        let ids: Vec<&str> = configs.iter().map(|c| c.id.as_str()).collect();
        info!(
            bot = %self.settings.bot.name,
            version = %self.settings.bot.version,
            count = configs.len(),
            sessions = %ids.join(", "),
            "initializing sessions"
        );
        if configs.len() > self.settings.bot.max_sessions {
            warn!(
                enabled = configs.len(),
                max_sessions = self.settings.bot.max_sessions,
                "more sessions enabled than maxSessions"
            );
        }

        let mut successful = 0;
        for (i, config) in configs.iter().enumerate() {
            if self.initialize_session(config).await {
                successful += 1;
            }
            if i + 1 < configs.len() {
                info!(delay_ms = stagger.as_millis() as u64, "waiting before next session");
                tokio::time::sleep(stagger).await;
            }
        }

        let summary = StartupSummary {
            total: configs.len(),
            successful,
        };
        info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed(),
            "sessions summary"
        );
        if summary.successful == 0 {
            error!("all sessions failed to start");
        } else {
            info!("each session links independently; use <prefix>menu in a chat for commands");
        }
        self.log_status().await;
        summary
    }

    /// Build, wire and start one session. Any failure is logged and `false`.
    pub async fn initialize_session(&self, config: &SessionConfig) -> bool {
        let session_id = config.id.as_str();
        if self.sessions.contains(session_id).await {
            warn!(session_id, "session already running");
            return false;
        }
        info!(
            session_id,
            prefix = %config.prefix,
            description = %config.description,
            "initializing session"
        );

        let bot = SessionBot::new(
            config.clone(),
            Arc::clone(&self.settings),
            Arc::clone(&self.factory),
        );
        if let Err(e) = bot.initialize() {
            error!(session_id, error = %e, "failed to initialize session");
            return false;
        }
        self.register_commands(&bot, session_id);

        if !bot.start().await {
            error!(session_id, "session failed to start");
            return false;
        }

        self.follow_ups.arm(session_id);
        self.sessions.insert(session_id, bot).await;
        info!(session_id, "session initialized");
        true
    }

    /// Bind every registry command to `session_id` and add it to the
    /// session's table. Returns how many were registered.
    pub fn register_commands(&self, bot: &SessionBot, session_id: &str) -> usize {
        let mut registered = 0;
        for descriptor in self.registry.iter() {
            let services = self.services();
            let bound_id = session_id.to_string();
            let handler = descriptor.handler;
            let run: BoundCommand = Arc::new(move |ctx: MessageContext| {
                handler(ctx, services.clone(), bound_id.clone())
            });
            match bot.register_command(descriptor.name, descriptor.description, run) {
                Ok(()) => registered += 1,
                Err(e) => {
                    error!(
                        session_id,
                        command = descriptor.name,
                        error = %e,
                        "failed to register command"
                    );
                },
            }
        }
        info!(session_id, registered, "registered commands");
        registered
    }

    /// Stop every session and empty the map. Returns how many stopped
    /// cleanly.
    pub async fn shutdown_all_sessions(&self) -> usize {
        info!("shutting down all sessions");
        let mut stopped = 0;
        for (session_id, bot) in self.sessions.drain().await {
            self.follow_ups.cancel(&session_id);
            if bot.stop().await {
                stopped += 1;
            } else {
                error!(session_id = %session_id, "failed to stop session");
            }
        }
        info!(stopped, "sessions stopped");
        stopped
    }

    /// Stop a running session, wait `restartDelayMs`, then start it again.
    pub async fn restart_session(&self, session_id: &str) -> Result<bool> {
        let Some(bot) = self.sessions.get(session_id).await else {
            return Err(Error::session_not_found(session_id));
        };

        info!(session_id, "restarting session");
        bot.stop().await;
        self.sessions.remove(session_id).await;
        self.follow_ups.cancel(session_id);

        tokio::time::sleep(Duration::from_millis(self.settings.bot.restart_delay_ms)).await;

        let Some(config) = self.settings.session(session_id) else {
            warn!(session_id, "session no longer configured");
            return Ok(false);
        };
        Ok(self.initialize_session(&config).await)
    }

    /// Shut everything down once. Later calls return `false` and do nothing.
    pub async fn graceful_shutdown(&self, signal: &str) -> bool {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!(signal, "received signal, shutting down gracefully");
        self.follow_ups.cancel_all();
        self.shutdown_all_sessions().await;
        info!(bot = %self.settings.bot.name, "shutdown complete");
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub async fn session_status(&self, session_id: &str) -> Option<SessionStatus> {
        self.sessions.get(session_id).await.map(|bot| bot.status())
    }

    /// Status of every running session, in startup order.
    pub async fn all_session_status(&self) -> Vec<SessionStatus> {
        self.sessions.statuses().await
    }

    pub async fn session(&self, session_id: &str) -> Option<Arc<SessionBot>> {
        self.sessions.get(session_id).await
    }

    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.ids().await
    }

    async fn log_status(&self) {
        for status in self.all_session_status().await {
            let user = status
                .user
                .as_ref()
                .and_then(|u| u.name.as_deref())
                .unwrap_or("Not Connected");
            info!(
                session_id = %status.session_id,
                online = status.is_ready,
                user,
                prefix = %status.prefix,
                "session status"
            );
        }
    }
}
