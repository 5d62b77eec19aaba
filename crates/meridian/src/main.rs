//! Main application entry point for the Meridian game server.
//!
//! Parses the CLI, loads the TOML configuration, initializes logging, wires
//! the server with its stock commands and runs until a termination signal.

use anyhow::Context;
use async_trait::async_trait;
use meridian_commands::{
    ArgumentInfo, ArgumentKind, Command, CommandContext, CommandDispatcher, CommandResult,
};
use meridian_server::shutdown::setup_shutdown_handler;
use meridian_server::GameServer;
use meridian_sessions::SessionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod config;

use cli::CliArgs;
use config::AppConfig;

/// Initialize the logging system.
fn setup_logging(config: &config::LoggingSettings, json_format: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    if json_format || config.json_format {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
    Ok(())
}

/// Arguments for the stock `sessions` command.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionReportArgs {
    #[serde(default)]
    verbose: bool,
}

/// Reports how many sessions are live.
struct SessionReportCommand {
    sessions: Arc<SessionManager>,
}

#[async_trait]
impl Command for SessionReportCommand {
    type Args = SessionReportArgs;

    fn name(&self) -> &str {
        "sessions"
    }

    fn short_description(&self) -> &str {
        "Report the live session count"
    }

    fn detailed_description(&self) -> &str {
        "Reports the number of entries currently held by the session manager"
    }

    fn completion_message(&self) -> &str {
        "session report written to the log"
    }

    fn arguments(&self) -> Vec<ArgumentInfo> {
        vec![ArgumentInfo::optional(
            "verbose",
            ArgumentKind::Boolean,
            serde_json::json!(false),
            "include per-session detail in the log",
        )]
    }

    async fn execute(
        &self,
        ctx: &CommandContext,
        args: SessionReportArgs,
    ) -> anyhow::Result<CommandResult> {
        info!(
            issuer = %ctx.issuer,
            count = self.sessions.session_count(),
            verbose = args.verbose,
            "session report"
        );
        Ok(CommandResult::Executed)
    }
}

/// Registers the commands every deployment carries.
fn register_stock_commands(
    commands: &CommandDispatcher,
    sessions: Arc<SessionManager>,
) -> anyhow::Result<()> {
    commands
        .register(SessionReportCommand { sessions })
        .context("failed to register the sessions command")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .with_context(|| format!("failed to load {}", args.config_path.display()))?;

    if let Some(bind_address) = args.bind_address {
        config.server.bind_address = bind_address;
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }

    setup_logging(&config.logging, args.json_logs)?;

    let server_config = config.to_server_config()?;
    info!("🌐 starting Meridian on {}", server_config.bind_address);

    let server = Arc::new(GameServer::new(server_config));
    register_stock_commands(&server.command_dispatcher(), server.session_manager())?;
    // wire formats and message handlers are registered here by the game
    // embedding this server; the stock binary serves the fallback format

    let server_task = {
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("server error: {e}");
            }
        })
    };

    info!("server started, press Ctrl+C to stop");
    let shutdown_rx = setup_shutdown_handler().await;
    let _ = shutdown_rx.await;

    info!("shutting down...");
    server.shutdown();
    if let Err(e) = server_task.await {
        error!("server task failed to join: {e}");
    }
    info!("shutdown complete");
    Ok(())
}
