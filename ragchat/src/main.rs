//! ragchat - terminal front end for a retrieval-augmented chat backend
//!
//! Commands:
//! - Checking configuration and backend health
//! - Listing and creating sessions
//! - Reading paginated session history
//! - Asking questions with streamed answers, and regenerating answers
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/ragchat/config.toml (~/.config/ragchat/config.toml)
//! - Logs: $XDG_STATE_HOME/ragchat/ragchat.log (~/.local/state/ragchat/ragchat.log)
//!
//! Ctrl-C stops a streaming answer; partial text stays on screen.

mod render;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ragchat_core::config::ChatConfig;
use ragchat_core::format::{format_relative_time, preview};
use ragchat_core::{short_id, ChatClient, ChatController, Config, TurnOutcome};
use tokio_util::sync::CancellationToken;

use crate::render::{format_message, ConsoleObserver};

#[derive(Parser)]
#[command(name = "ragchat")]
#[command(about = "Chat with a retrieval-augmented assistant")]
#[command(version)]
struct Args {
    /// Write debug logs to the state directory
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show configuration and backend health
    Status,

    /// List chat sessions
    Sessions,

    /// Create an empty session
    New {
        /// Session title
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Print a session's message history
    History {
        /// Session id
        session: String,

        /// Messages per page (default: from config)
        #[arg(short, long)]
        limit: Option<u32>,

        /// Add one page of older messages
        #[arg(short, long, conflicts_with = "all")]
        more: bool,

        /// Follow cursors back to the first message
        #[arg(short, long)]
        all: bool,
    },

    /// Ask a question and stream the answer
    Ask {
        /// Session to continue (a new session is created when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Retrieval depth for this turn (default: from config)
        #[arg(long)]
        top_k: Option<u32>,

        /// The question
        #[arg(required = true)]
        prompt: Vec<String>,
    },

    /// Regenerate an assistant message
    Retry {
        /// Session id
        session: String,

        /// Id of the assistant message to regenerate
        message_id: String,

        /// Retrieval depth for this retry (default: from config)
        #[arg(long)]
        top_k: Option<u32>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    // Keep the guard alive until exit so buffered log lines are flushed
    let _log_guard = if args.verbose {
        Some(
            ragchat_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(run(args.command, config))
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Status => cmd_status(&config).await,
        Command::Sessions => cmd_sessions(&config).await,
        Command::New { title } => cmd_new(&config, title.as_deref()).await,
        Command::History {
            session,
            limit,
            more,
            all,
        } => cmd_history(&config, &session, limit, more, all).await,
        Command::Ask {
            session,
            top_k,
            prompt,
        } => cmd_ask(&config, session, top_k, &prompt.join(" ")).await,
        Command::Retry {
            session,
            message_id,
            top_k,
        } => cmd_retry(&config, &session, &message_id, top_k).await,
    }
}

fn client(config: &Config) -> Result<ChatClient> {
    ChatClient::new(&config.backend).context("failed to create backend client")
}

fn controller(config: &Config, chat: ChatConfig) -> Result<ChatController<ChatClient>> {
    chat.validate().context("invalid chat settings")?;
    Ok(ChatController::new(client(config)?, chat))
}

/// Token canceled by Ctrl-C
fn cancel_on_ctrlc() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to install Ctrl-C handler")?;
    Ok(token)
}

async fn cmd_status(config: &Config) -> Result<()> {
    println!("ragchat Configuration");
    println!("=====================");
    println!();
    println!("Config file:     {}", Config::config_path().display());
    println!(
        "Log file:        {}",
        ragchat_core::logging::log_file_path().display()
    );
    println!("Backend URL:     {}", config.backend.base_url);
    println!("Connect Timeout: {}s", config.backend.connect_timeout_secs);
    println!("Request Timeout: {}s", config.backend.request_timeout_secs);
    println!("Transport:       {}", config.chat.transport.as_str());
    println!("Page Size:       {}", config.chat.page_size);
    println!(
        "Top K:           {}",
        config
            .chat
            .top_k
            .map(|k| k.to_string())
            .unwrap_or_else(|| "<backend default>".to_string())
    );

    let client = client(config)?;
    let healthy = client.health_check().await?;

    println!();
    if healthy {
        println!("Backend: reachable");
    } else {
        println!("Backend: unreachable");
    }

    Ok(())
}

async fn cmd_sessions(config: &Config) -> Result<()> {
    let client = client(config)?;
    let sessions = client
        .list_sessions()
        .await
        .context("failed to list sessions")?;

    let sessions: Vec<_> = sessions.into_iter().filter(|s| !s.is_deleted()).collect();
    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("{:<10} {:<40} {:>12}", "Session", "Title", "Updated");
    println!("{:-<64}", "");
    for session in &sessions {
        println!(
            "{:<10} {:<40} {:>12}",
            short_id(&session.id),
            preview(&session.display_title(), 40),
            format_relative_time(session.updated_at)
        );
    }

    Ok(())
}

async fn cmd_new(config: &Config, title: Option<&str>) -> Result<()> {
    let client = client(config)?;
    let session = client
        .create_session(title)
        .await
        .context("failed to create session")?;
    println!("Created session {}", session.id);
    Ok(())
}

async fn cmd_history(
    config: &Config,
    session_id: &str,
    limit: Option<u32>,
    more: bool,
    all: bool,
) -> Result<()> {
    let mut chat = config.chat.clone();
    if let Some(limit) = limit {
        chat.page_size = limit;
    }
    let controller = controller(config, chat)?;

    let history = if all {
        controller.history_all(session_id).await
    } else if more {
        match controller.history(session_id).await {
            Ok(_) => controller.history_more(session_id).await,
            Err(e) => Err(e),
        }
    } else {
        controller.history(session_id).await
    }
    .with_context(|| format!("failed to load history of session {}", session_id))?;

    if history.messages.is_empty() {
        println!("No messages in session {}.", session_id);
        return Ok(());
    }

    for message in &history.messages {
        println!("{}", format_message(message));
        println!();
    }
    if history.has_more {
        println!("(older messages available, use --more or --all)");
    }

    Ok(())
}

async fn cmd_ask(
    config: &Config,
    session: Option<String>,
    top_k: Option<u32>,
    prompt: &str,
) -> Result<()> {
    if prompt.trim().is_empty() {
        bail!("prompt is empty");
    }

    let mut chat = config.chat.clone();
    chat.top_k = top_k.or(chat.top_k);
    let controller = controller(config, chat)?;

    let session_id = match session {
        Some(id) => id,
        None => {
            let session = controller
                .backend()
                .create_session(Some(preview(prompt, 60).as_str()))
                .await
                .context("failed to create session")?;
            println!("Session: {}", session.id);
            session.id
        }
    };

    let mut list = controller
        .open_session(&session_id)
        .await
        .with_context(|| format!("failed to load session {}", session_id))?;

    let cancel = cancel_on_ctrlc()?;
    let mut observer = ConsoleObserver::new();
    let outcome = controller
        .send(&mut list, prompt, &cancel, &mut observer)
        .await
        .context("turn failed")?;

    finish(outcome)
}

async fn cmd_retry(
    config: &Config,
    session_id: &str,
    message_id: &str,
    top_k: Option<u32>,
) -> Result<()> {
    let mut chat = config.chat.clone();
    chat.top_k = top_k.or(chat.top_k);
    let controller = controller(config, chat)?;

    let mut list = controller
        .open_session(session_id)
        .await
        .with_context(|| format!("failed to load session {}", session_id))?;

    let cancel = cancel_on_ctrlc()?;
    let mut observer = ConsoleObserver::new();
    let outcome = controller
        .retry(&mut list, message_id, &cancel, &mut observer)
        .await
        .with_context(|| format!("failed to retry message {}", message_id))?;

    finish(outcome)
}

fn finish(outcome: TurnOutcome) -> Result<()> {
    match outcome {
        TurnOutcome::Completed(message) => {
            tracing::info!(message_id = %message.id, "Turn completed");
            Ok(())
        }
        TurnOutcome::Failed(failure) => bail!("assistant failed: {}", failure),
        TurnOutcome::Canceled => Ok(()),
    }
}
