use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use shoal_client::{AgentClient, ClientConfig, ClientUpdate, FileConfig, load_config};
use shoal_convo::Role;

#[derive(Parser)]
#[command(name = "shoal-cli")]
#[command(about = "Terminal client for live agent conversations")]
struct Cli {
    /// WebSocket endpoint, e.g. ws://localhost:4400/ws (overrides config)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Path to shoal.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat: reads lines from stdin, streams replies to stdout
    Chat {
        /// Label for the initial session
        #[arg(long)]
        label: Option<String>,
    },

    /// Send a single message and print the finished reply
    Send {
        content: String,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Clone, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shoal_client=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let file_config: FileConfig = load_config(cli.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;
    let mut config = ClientConfig::from_file(&file_config);
    if cli.url.is_some() {
        config.connection.url = cli.url.clone();
    }
    if config.connection.url.is_none() {
        anyhow::bail!("No endpoint configured; pass --url or set connection.url in shoal.toml");
    }

    let client = AgentClient::new(config);

    match cli.command {
        Commands::Chat { label } => chat(&client, label).await,
        Commands::Send { content, format } => send_once(&client, &content, &format).await,
    }
}

/// Interactive loop: user lines go out as turns, assistant deltas print as
/// they merge into the transcript.
async fn chat(client: &AgentClient, label: Option<String>) -> Result<()> {
    client.create_session(label).await?;
    client.connect().await?;

    let mut updates = client.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // Tracks how much of the streaming reply has been printed already.
    let mut printed = 0usize;

    eprintln!("Connected. Type a message, Ctrl-D to quit.");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        client.submit_user_message(line).await?;
                        printed = 0;
                    }
                    None => break,
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(ClientUpdate::MessagesChanged) => {
                        let messages = client.messages().await?;
                        if let Some(last) = messages.last() {
                            if last.role == Role::Assistant && last.content.len() > printed {
                                print!("{}", &last.content[printed..]);
                                use std::io::Write;
                                std::io::stdout().flush().ok();
                                printed = last.content.len();
                            }
                        }
                    }
                    Ok(ClientUpdate::StreamingChanged(false)) => {
                        if printed > 0 {
                            println!();
                            printed = 0;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }
    client.disconnect().await?;
    Ok(())
}

/// One-shot: submit, wait for the turn to finish, print the reply.
async fn send_once(client: &AgentClient, content: &str, format: &OutputFormat) -> Result<()> {
    let mut updates = client.subscribe();
    client.connect().await?;
    client.submit_user_message(content).await?;

    // The turn is over when streaming flips back off.
    loop {
        match updates.recv().await {
            Ok(ClientUpdate::StreamingChanged(false)) => break,
            Ok(_) => {}
            Err(e) => anyhow::bail!("Update stream ended: {}", e),
        }
    }

    let messages = client.messages().await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&messages)?),
        OutputFormat::Text => {
            if let Some(reply) = messages.iter().rev().find(|m| m.role == Role::Assistant) {
                println!("{}", reply.content);
                for call in &reply.tool_calls {
                    let marker = call
                        .result
                        .as_ref()
                        .map(|r| if r.is_error { "error" } else { "ok" })
                        .unwrap_or("no result");
                    eprintln!("[tool {} -> {}]", call.name, marker);
                }
            }
        }
    }
    client.disconnect().await?;
    Ok(())
}
