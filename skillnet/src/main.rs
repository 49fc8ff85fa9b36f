//! `SkillNet` — command-line client for the skill-exchange marketplace.
//!
//! Logs in, lists your conversations, and optionally opens a live chat
//! with one partner. Configuration via CLI flags, environment variables,
//! or config file (`~/.config/skillnet/config.toml`).
//!
//! ```bash
//! # List conversations
//! cargo run --bin skillnet -- --email alice@example.com --password secret
//!
//! # Open a live chat with bob
//! cargo run --bin skillnet -- --email alice@example.com --password secret \
//!     --chat-with bob
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use skillnet::auth::{AuthApi, TokenStore};
use skillnet::chat::{ChatService, ConversationSession, SessionEvent};
use skillnet::config::{CliArgs, ClientConfig};
use skillnet::rest::RestClient;
use skillnet_proto::auth::Credentials;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logging goes to a file so stdout stays clean for the chat itself.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("skillnet starting");

    match run(&cli, &config).await {
        Ok(()) => {
            tracing::info!("skillnet exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &CliArgs, config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (Some(email), Some(password)) = (cli.email.clone(), cli.password.clone()) else {
        return Err("credentials required: pass --email and --password \
                    (or SKILLNET_EMAIL / SKILLNET_PASSWORD)"
            .into());
    };

    let tokens = Arc::new(TokenStore::new());
    let rest = RestClient::new(config, tokens)?;
    let auth = AuthApi::new(rest.clone());

    let user = auth.login(&Credentials { email, password }).await?;
    println!("Logged in as {}", user.username);

    let chat = ChatService::new(rest, config);
    let conversations = chat.conversations().await?;
    if conversations.is_empty() {
        println!("No conversations yet.");
    } else {
        println!("Conversations:");
        for c in &conversations {
            println!(
                "  {:<20} {}  ({})",
                c.username,
                c.last_message,
                c.last_message_time.format("%Y-%m-%d %H:%M")
            );
        }
    }

    if let Some(peer) = &cli.chat_with {
        let (session, events) = chat.open(peer).await?;
        run_chat(&session, events).await;
        session.close().await;
    }

    auth.logout().await;
    Ok(())
}

/// Interactive loop: print session events, read stdin lines, send them.
/// `/quit` or EOF ends the chat.
async fn run_chat(session: &ConversationSession, mut events: mpsc::Receiver<SessionEvent>) {
    println!("--- chatting with {} (/quit to leave) ---", session.peer());
    for message in session.messages() {
        print_message(&message.sender, &message.message, message.created_at);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(SessionEvent::Connected) => println!("[connected]"),
                    Some(SessionEvent::MessageReceived(m)) => {
                        print_message(&m.sender, &m.message, m.created_at);
                    }
                    Some(SessionEvent::Warning(w)) => println!("[warning: {w}]"),
                    Some(SessionEvent::Disconnected { retry_in }) => {
                        println!("[disconnected, retrying in {}s]", retry_in.as_secs());
                    }
                    Some(SessionEvent::Failed { reason }) => {
                        println!("[session failed: {reason}]");
                        return;
                    }
                    Some(SessionEvent::HistoryLoaded { .. }) => {}
                    None => return,
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) if text.trim() == "/quit" => return,
                    Ok(Some(text)) => {
                        if let Err(e) = session.send(&text).await {
                            println!("[not sent: {e}]");
                        }
                    }
                    Ok(None) | Err(_) => return,
                }
            }
        }
    }
}

fn print_message(sender: &str, body: &str, at: chrono::DateTime<chrono::Utc>) {
    println!("{} {sender}: {body}", at.format("%H:%M"));
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("skillnet.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
