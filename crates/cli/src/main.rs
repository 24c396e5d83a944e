//! Sidekick CLI — a terminal chat surface for the agent framework.
//!
//! Commands:
//! - `chat`     — Interactive chat or single-message mode
//! - `history`  — List persisted conversations
//!
//! The CLI stands in for the browser UI: raw input lines (including
//! `/command` and `@agent` prefixes) go verbatim to the delegate router,
//! streamed partial text is printed as it arrives, and the conversation is
//! saved after every turn.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sidekick_agent::{Agent, DelegateAgent, ThoughtAgent};
use sidekick_config::AssistantConfig;
use sidekick_core::environment::{PageSnapshot, StaticProvider};
use sidekick_core::repository::ConversationRepository;
use sidekick_services::OpenAiCompatService;
use sidekick_store::FileStore;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Parser)]
#[command(
    name = "sidekick",
    about = "Sidekick — a tool-using conversational agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (default: ~/.sidekick/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List persisted conversations
    History,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.unwrap_or_else(AssistantConfig::default_path);
    let config = AssistantConfig::load(&config_path).context("Failed to load configuration")?;

    match cli.command {
        Commands::Chat { message } => chat(config, message).await,
        Commands::History => history(config).await,
    }
}

fn build_router(config: &AssistantConfig) -> DelegateAgent {
    let service = Arc::new(OpenAiCompatService::from_config(&config.backend));
    let store = Arc::new(FileStore::new(
        config
            .conversations_dir
            .clone()
            .unwrap_or_else(FileStore::default_dir),
    ));

    // The terminal has no live page — a fixed empty snapshot stands in for
    // the content-script collaborator.
    let environment = Arc::new(StaticProvider::new(PageSnapshot::default()));

    let chat_agent: Arc<dyn Agent> = Arc::new(
        ThoughtAgent::new(
            "chat",
            "Answers free-form questions",
            service,
            environment,
            config.clone(),
        )
        .with_instructions("You are Sidekick, a helpful assistant running in a terminal.")
        .with_repository(store),
    );

    DelegateAgent::new(chat_agent, Vec::new(), Vec::new(), config.enable_chitchat)
}

async fn chat(config: AssistantConfig, message: Option<String>) -> anyhow::Result<()> {
    let router = build_router(&config);

    // Print only the unseen suffix of the accumulated partial text
    let printed = Arc::new(Mutex::new(0usize));
    let printed_clone = printed.clone();
    router.on_message_change(Arc::new(move |text: &str| {
        let mut printed = printed_clone.lock().unwrap();
        if text.len() > *printed {
            print!("{}", &text[*printed..]);
            let _ = std::io::stdout().flush();
            *printed = text.len();
        }
    }));

    if let Some(message) = message {
        *printed.lock().unwrap() = 0;
        let answer = router.chat(&message).await?;
        finish_line(&printed, &answer);
        return Ok(());
    }

    println!("Sidekick interactive chat — type 'exit' to quit.");
    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        *printed.lock().unwrap() = 0;
        match router.chat(line).await {
            Ok(answer) => finish_line(&printed, &answer),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}

/// Ensure non-streamed answers are shown and end the output line.
fn finish_line(printed: &Arc<Mutex<usize>>, answer: &str) {
    let printed = *printed.lock().unwrap();
    if printed == 0 && !answer.is_empty() {
        println!("{answer}");
    } else {
        println!();
    }
}

async fn history(config: AssistantConfig) -> anyhow::Result<()> {
    let store = FileStore::new(
        config
            .conversations_dir
            .unwrap_or_else(FileStore::default_dir),
    );

    let keys = store.list().await.context("Failed to list conversations")?;
    if keys.is_empty() {
        println!("No conversations saved yet.");
        return Ok(());
    }

    for key in keys {
        match store.load(&key).await? {
            Some(conversation) => println!(
                "{key}  ({} messages, {} turns)",
                conversation.messages.len(),
                conversation.interactions.len()
            ),
            None => println!("{key}  (unreadable)"),
        }
    }

    Ok(())
}
