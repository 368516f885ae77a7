use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use folio_core::{redact_counted, ChatInput, Profile};
use folio_observability::{init_tracing, AppMetrics};
use folio_relay::gemini::{DEFAULT_API_BASE, DEFAULT_MODEL};
use folio_relay::{ChatRelay, GeminiClient, GeminiConfig};
use folio_storage::MemoryStore;

#[derive(Debug, Parser)]
#[command(name = "folio")]
#[command(about = "Folio Chat CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mask phone numbers in TEXT, or in stdin when TEXT is omitted.
    Redact {
        text: Option<String>,
        /// Print the number of replaced spans to stderr.
        #[arg(long)]
        count: bool,
    },
    /// Chat with the configured model from the terminal.
    Chat {
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: String,
        #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
        model: String,
        #[arg(long, env = "GEMINI_API_BASE", default_value = DEFAULT_API_BASE)]
        api_base: String,
        #[arg(long, env = "FOLIO_PROFILE_PATH")]
        profile: Option<PathBuf>,
        #[arg(long, env = "FOLIO_PROFILE_OWNER", default_value = "Jordan Example")]
        owner: String,
        #[arg(long, default_value_t = 20)]
        timeout_seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("folio_cli");
    let cli = Cli::parse();

    match cli.command {
        Command::Redact { text, count } => {
            let input = match text {
                Some(text) => text,
                None => {
                    let mut buffer = String::new();
                    io::stdin()
                        .read_to_string(&mut buffer)
                        .context("failed reading stdin")?;
                    buffer
                }
            };
            let redaction = redact_counted(&input);
            print!("{}", redaction.text);
            if !redaction.text.ends_with('\n') {
                println!();
            }
            if count {
                eprintln!("redacted: {}", redaction.replaced);
            }
        }
        Command::Chat {
            api_key,
            model,
            api_base,
            profile,
            owner,
            timeout_seconds,
        } => {
            let profile = match profile {
                Some(path) => Profile::from_file(owner, &path)?,
                None => Profile::default(),
            };
            let client = GeminiClient::new(GeminiConfig {
                api_key,
                model,
                api_base,
                timeout: Duration::from_secs(timeout_seconds),
            })?;
            let relay = ChatRelay::new(
                client,
                Arc::new(MemoryStore::new()),
                Arc::new(profile),
                AppMetrics::shared(),
            );
            run_chat(relay).await?;
        }
    }

    Ok(())
}

async fn run_chat(relay: ChatRelay<GeminiClient, MemoryStore>) -> Result<()> {
    let mut session_id: Option<String> = None;

    println!("{}", relay.profile().greeting);
    println!("(type 'exit' to quit)");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        match relay
            .handle_message(ChatInput {
                session_id: session_id.clone(),
                message: message.to_string(),
            })
            .await
        {
            Ok(reply) => {
                session_id = Some(reply.session_id);
                println!("\n{}\n", reply.reply_text);
            }
            Err(err) => eprintln!("error: {:#}", anyhow::Error::from(err)),
        }
    }

    Ok(())
}
