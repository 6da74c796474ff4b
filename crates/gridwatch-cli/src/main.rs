//! Gridwatch - Terminal chat client for the grid analytics backend
//!
//! Ask questions about grid load in plain language; replies stream in as the
//! backend reasons, runs SQL, and attaches tables and charts.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use gridwatch_core::{paths, ChatClient, ChatClientConfig, Conversation, TranscriptUpdate};

mod commands;
mod interrupt;
mod render;

use commands::{parse_input, Input};
use interrupt::Interrupt;
use render::{closes_reply, TranscriptPrinter};

/// Gridwatch - grid analytics chat
#[derive(Parser)]
#[command(name = "gridwatch")]
#[command(about = "Chat with the grid analytics backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Backend base URL (overrides config and GRIDWATCH_BASE_URL)
    #[arg(short, long)]
    base_url: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the reasoning trace after each reply
    #[arg(short, long)]
    thinking: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat (default)
    Chat,

    /// Ask a single question and exit
    Ask { query: Vec<String> },

    /// Print the effective configuration
    Config,
}

fn init_logging(verbose: bool) {
    let log_dir = paths::logs_dir();
    std::fs::create_dir_all(&log_dir).ok();

    // Logs go to a file so they never interleave with streamed replies
    let Ok(log_file) = std::fs::File::create(log_dir.join("gridwatch.log")) else {
        return;
    };

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<ChatClientConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = ChatClientConfig::load_from(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => ChatClientConfig::load()?,
    };
    if let Some(url) = &cli.base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    Ok(config)
}

/// Print transcript updates as they arrive; signal `done` after each reply
fn spawn_printer(
    mut updates: mpsc::UnboundedReceiver<TranscriptUpdate>,
    done: mpsc::UnboundedSender<()>,
    show_thinking: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut printer = TranscriptPrinter::new(show_thinking);
        let mut stdout = std::io::stdout();
        while let Some(update) = updates.recv().await {
            if let Err(e) = printer.render(&update, &mut stdout) {
                tracing::warn!("Failed to write to stdout: {}", e);
            }
            if closes_reply(&update) {
                let _ = done.send(());
            }
        }
    })
}

/// Run one turn, cancelling it on Ctrl-C, and wait for the printer to catch up
async fn run_turn(
    conversation: &mut Conversation,
    interrupt: &Interrupt,
    query: &str,
    done: &mut mpsc::UnboundedReceiver<()>,
) {
    let cancel = interrupt.begin_turn();
    if let Err(e) = conversation.send_with_cancel(query, cancel).await {
        tracing::warn!("Turn ended with error: {}", e);
    }
    interrupt.end_turn();

    // Every turn closes its reply exactly once
    done.recv().await;
}

async fn repl(
    mut conversation: Conversation,
    interrupt: &Interrupt,
    mut done: mpsc::UnboundedReceiver<()>,
) -> Result<()> {
    println!("Gridwatch - ask about grid load. /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Query(query) => run_turn(&mut conversation, interrupt, &query, &mut done).await,
            Input::Reset => {
                conversation.reset()?;
                println!("Started a new thread.");
            }
            Input::Thread => {
                let thread = conversation.thread();
                match thread.thread_id() {
                    Some(id) => println!("Thread {}", id),
                    None => println!("No thread yet"),
                }
                println!("Parent message {}", thread.parent_message_id());
            }
            Input::Help => println!("{}", commands::HELP),
            Input::Quit => break,
            Input::Unknown(command) => {
                println!("Unknown command {}. Try /help.", command);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(&cli)?;

    if let Some(Commands::Config) = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    tracing::info!("Starting Gridwatch against {}", config.base_url);
    let client = ChatClient::new(config);
    let mut conversation = Conversation::new(Arc::new(client));

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let printer = spawn_printer(conversation.subscribe(), done_tx, cli.thinking);

    let interrupt = Interrupt::new();
    interrupt.install();

    match cli.command {
        Some(Commands::Ask { query }) => {
            let query = query.join(" ");
            if query.trim().is_empty() {
                anyhow::bail!("ask needs a question");
            }
            run_turn(&mut conversation, &interrupt, &query, &mut done_rx).await;
        }
        Some(Commands::Chat) | None => repl(conversation, &interrupt, done_rx).await?,
        Some(Commands::Config) => {}
    }

    printer.abort();
    Ok(())
}
