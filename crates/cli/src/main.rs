mod config_commands;

use std::sync::Arc;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
    tracing_appender::{
        non_blocking::WorkerGuard,
        rolling::{RollingFileAppender, Rotation},
    },
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    voltron_config::VoltronConfig,
    voltron_sessions::{SessionManager, health},
    voltron_whatsapp::{SidecarClientFactory, SidecarConfig, SidecarProcess},
};

use crate::config_commands::ConfigAction;

#[derive(Parser)]
#[command(name = "voltron", about = "Voltron, multi-session WhatsApp bot", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to `logging.level`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Override a config value for this run (`section.key=value`, repeatable).
    #[arg(long = "set", global = true, value_name = "SECTION.KEY=VALUE")]
    overrides: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every enabled session (default when no subcommand is provided).
    Run,
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Install the tracing subscriber. The returned guard flushes the log file
/// and must live until the process exits.
fn init_telemetry(cli: &Cli, config: &VoltronConfig) -> Option<WorkerGuard> {
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_writer, guard) = if config.logging.file {
        match RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("voltron")
            .filename_suffix("log")
            .max_log_files(config.logging.max_files.max(1))
            .build(&config.logging.dir)
        {
            Ok(appender) => {
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (Some(writer), Some(guard))
            },
            Err(e) => {
                eprintln!(
                    "cannot open log directory {}: {e}",
                    config.logging.dir.display()
                );
                (None, None)
            },
        }
    } else {
        (None, None)
    };
    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
    });

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if cli.json_logs {
        registry
            .with(
                config
                    .logging
                    .console
                    .then(|| fmt::layer().json().with_target(true).with_thread_ids(false)),
            )
            .init();
    } else {
        registry
            .with(config.logging.console.then(|| {
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
            }))
            .init();
    }

    guard
}

/// Resolves with the name of the first termination signal received.
async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            },
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            },
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}

async fn start_sidecar(config: &VoltronConfig) -> anyhow::Result<Option<SidecarProcess>> {
    if !config.whatsapp.auto_start {
        return Ok(None);
    }
    let sidecar_dir = voltron_whatsapp::find_sidecar_dir(config.whatsapp.dir.as_deref())?;
    let process = voltron_whatsapp::start_sidecar(SidecarConfig {
        sidecar_dir,
        port: config.whatsapp.port,
        sessions_dir: Some(config.bot.sessions_dir.clone()),
    })
    .await
    .context("failed to start whatsapp sidecar")?;
    Ok(Some(process))
}

async fn run(config: VoltronConfig) -> anyhow::Result<()> {
    info!(
        bot = %config.bot.name,
        version = %config.bot.version,
        sessions = config.enabled_sessions().len(),
        "voltron starting"
    );

    let mut sidecar = start_sidecar(&config).await?;

    let health_port = config.deployment.port;
    let health_check = config.deployment.health_check;
    let factory = Arc::new(SidecarClientFactory::new(config.whatsapp.port));
    let manager = SessionManager::new(config, factory);

    let health_shutdown = CancellationToken::new();
    let health_task = health_check.then(|| {
        let directory = manager.directory();
        let shutdown = health_shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(health_port, directory, shutdown).await {
                error!(error = %e, port = health_port, "health endpoint stopped");
            }
        })
    });

    let summary = manager.initialize_all_sessions().await;
    if summary.total > 0 && summary.successful == 0 {
        warn!("no session could be started; waiting for a shutdown signal");
    }

    let signal = wait_for_signal().await;
    manager.graceful_shutdown(signal).await;

    health_shutdown.cancel();
    if let Some(task) = health_task {
        let _ = task.await;
    }
    if let Some(process) = sidecar.as_mut()
        && let Err(e) = process.stop().await
    {
        warn!(error = %e, "failed to stop whatsapp sidecar");
    }

    info!("shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = voltron_config::discover_and_load();
    config_commands::apply_overrides(&mut config, &cli.overrides)?;

    let _guard = init_telemetry(&cli, &config);

    match cli.command {
        None | Some(Commands::Run) => run(config).await,
        Some(Commands::Config { action }) => config_commands::handle_config(action, &config),
    }
}
