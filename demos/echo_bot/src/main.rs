//! Echo Bot Example
//!
//! A tiny synchronous host wired to [`MatrixBackend`]. Every callback runs on
//! a blocking worker, so the handlers below call the backend directly.
//!
//! # Commands
//!
//! ```text
//! /echo <text>  Echo text
//! /ping         Pong!
//! /react        React to the command
//! /rooms        List public rooms
//! /info         Message info
//! /help         This help
//! ```
//!
//! # Usage
//!
//! ```bash
//! MXBOT_MATRIX__HOMESERVER=matrix.example.org \
//! MXBOT_MATRIX__ACCESS_TOKEN=syt_... \
//!     cargo run --package echo-bot
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use clap::Parser;
use mxbot::prelude::*;
use mxbot::runtime::config::LogLevel;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "echo-bot", about = "A simple echo bot for Matrix")]
struct Cli {
    /// Configuration file (defaults to searching for mxbot.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile
    #[arg(short, long)]
    profile: Option<String>,

    /// Log at debug level regardless of the configuration
    #[arg(short, long)]
    verbose: bool,
}

// ============================================================================
// Host
// ============================================================================

struct EchoHost {
    backend: Arc<MatrixBackend>,
}

impl EchoHost {
    fn reply(&self, message: &Message, text: &str) {
        let reply = self.backend.build_reply(message, text, false);
        if let Err(e) = self.backend.send_message(&reply) {
            error!(error = %e, "Failed to send reply");
        }
    }

    fn info_text(message: &Message) -> String {
        let sender = message.frm.as_ref().map_or("Unknown".into(), |f| f.to_string());
        let kind = if message.is_direct() {
            "Direct"
        } else if message.is_group() {
            "Group"
        } else {
            "Other"
        };
        format!(
            "📋 Message Info\n\
            • Type: {kind}\n\
            • From: {sender}\n\
            • Event ID: {}",
            message.event_id().unwrap_or("-")
        )
    }

    fn rooms_text(&self) -> String {
        match self.backend.rooms() {
            Ok(rooms) if rooms.is_empty() => "No public rooms".to_string(),
            Ok(rooms) => rooms
                .iter()
                .map(|room| format!("• {room}"))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("Failed to list rooms: {e}"),
        }
    }
}

impl Host for EchoHost {
    fn on_message(&self, message: Message) {
        if self.backend.is_from_self(&message) {
            return;
        }
        info!(
            from = %message.frm.as_ref().map_or_else(String::new, |f| f.id().to_string()),
            body = %message.body,
            "Message received"
        );

        let text = message.body.trim();
        if let Some(content) = text.strip_prefix("/echo ") {
            self.reply(&message, content);
        } else if text == "/ping" {
            self.reply(&message, "Pong! 🏓");
        } else if text == "/react" {
            if let Err(e) = self.backend.react(&message, "👍") {
                error!(error = %e, "Failed to react");
            }
        } else if text == "/rooms" {
            self.reply(&message, &self.rooms_text());
        } else if text == "/info" {
            self.reply(&message, &Self::info_text(&message));
        } else if text == "/help" {
            self.reply(
                &message,
                "**Echo Bot**\n\n\
                - `/echo <text>` echo text\n\
                - `/ping` pong\n\
                - `/react` react to the command\n\
                - `/rooms` list public rooms\n\
                - `/info` message info",
            );
        }
    }

    fn on_reaction(&self, reaction: Reaction) {
        info!(
            reactor = %reaction.reactor,
            reactee = %reaction.reactee,
            key = %reaction.key,
            "Reaction received"
        );
    }

    fn on_connected(&self) {
        info!("Echo bot is online");
    }

    fn on_disconnected(&self) {
        info!("Echo bot is offline");
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Requests shutdown on Ctrl+C.
fn watch_ctrl_c(shutdown: ShutdownHandle) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;
    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || match runtime.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down");
                shutdown.shutdown();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
        })?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    if let Some(profile) = &cli.profile {
        loader = loader.profile(profile.as_str());
    }
    let mut config = loader.load_validated()?;
    if cli.verbose {
        config.logging.level = LogLevel::Debug;
    }
    logging::init_from_config(&config.logging);

    let backend = Arc::new(MatrixBackend::new(&config)?);
    watch_ctrl_c(backend.shutdown_handle())?;

    let host = Arc::new(EchoHost {
        backend: backend.clone(),
    });
    backend.serve(host)?;

    Ok(())
}
