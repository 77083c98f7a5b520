//! chat - terminal client for the relay
//!
//! # Usage
//!
//! ```bash
//! # Talk to a local relay (endpoint from relay.toml or CHAT_ENDPOINT)
//! chat
//!
//! # Explicit endpoint and token
//! chat --endpoint http://127.0.0.1:54321/functions/v1 --token local-dev-token
//! ```
//!
//! # Commands
//!
//! - `/text`: send following lines as chat messages (default)
//! - `/image`: send following lines as image prompts
//! - `/image <prompt>`: generate one image without switching mode
//! - `/new`: start a new chat
//! - `/history`: print the conversation so far
//! - `/quit`: exit
//!
//! Ctrl-C cancels a reply in progress; at the prompt it exits.
//! Logs go to stderr (`RUST_LOG=chat_client=debug`).

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use chat_client::render::{render_entry, render_update};
use chat_client::{ChatClient, HttpTransport, IgnoreReason, SendOutcome};
use relay_core::{default_config_path, load_config_from_path, ConfigOverrides};

/// Terminal chat client
#[derive(Debug, Parser)]
#[command(name = "chat", version, about)]
struct Args {
    /// Path to relay.toml
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Relay base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Bearer token
    #[arg(long)]
    token: Option<String>,

    /// Give up on a reply after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Image,
}

enum Command<'a> {
    Quit,
    NewChat,
    History,
    Help,
    SwitchMode(Mode),
    ImageOnce(&'a str),
    Unknown(&'a str),
    Send(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let trimmed = line.trim();
    match trimmed {
        "/quit" | "/exit" => Command::Quit,
        "/new" => Command::NewChat,
        "/history" => Command::History,
        "/help" => Command::Help,
        "/text" => Command::SwitchMode(Mode::Text),
        "/image" => Command::SwitchMode(Mode::Image),
        _ => {
            if let Some(prompt) = trimmed.strip_prefix("/image ") {
                Command::ImageOnce(prompt)
            } else if trimmed.starts_with('/') {
                Command::Unknown(trimmed)
            } else {
                Command::Send(line)
            }
        }
    }
}

fn print_prompt(mode: Mode) {
    let tag = match mode {
        Mode::Text => "text",
        Mode::Image => "image",
    };
    print!("[{tag}] > ");
    let _ = std::io::stdout().flush();
}

/// Drive one turn, printing updates as they land
async fn run_turn(client: &mut ChatClient<HttpTransport>) {
    print!("assistant> ");
    let _ = std::io::stdout().flush();

    while client.is_busy() {
        let mut cancel_requested = false;
        tokio::select! {
            update = client.next_update() => {
                if let Some(update) = update {
                    print!("{}", render_update(&update));
                    let _ = std::io::stdout().flush();
                }
            }
            _ = signal::ctrl_c() => cancel_requested = true,
        }
        if cancel_requested {
            for update in client.cancel() {
                print!("{}", render_update(&update));
            }
            let _ = std::io::stdout().flush();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs to stderr so stdout carries only the conversation
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_client=warn".parse()?)
                .add_directive("relay_core=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut config = load_config_from_path(args.config.or_else(default_config_path))
        .context("Failed to load configuration")?;
    let overrides = ConfigOverrides {
        endpoint: args.endpoint,
        token: args.token,
        turn_timeout_secs: args.timeout,
        ..ConfigOverrides::default()
    };
    overrides
        .apply(&mut config)
        .context("Invalid command-line option")?;

    let transport = HttpTransport::new(&config.client).context("Failed to build HTTP client")?;
    println!("Connected to {} (type /help for commands)", transport.endpoint());
    let mut client = ChatClient::new(transport).with_turn_timeout(config.client.turn_timeout);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut mode = Mode::Text;

    loop {
        print_prompt(mode);

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let outcome = match parse_command(&line) {
            Command::Quit => break,
            Command::NewChat => {
                if client.new_chat() {
                    println!("Started a new chat");
                }
                continue;
            }
            Command::History => {
                for entry in client.conversation().entries() {
                    println!("{}", render_entry(entry));
                }
                continue;
            }
            Command::Help => {
                println!("/text  /image  /image <prompt>  /new  /history  /quit");
                continue;
            }
            Command::SwitchMode(next) => {
                mode = next;
                continue;
            }
            Command::Unknown(command) => {
                println!("Unknown command {command} (try /help)");
                continue;
            }
            Command::ImageOnce(prompt) => client.send_image(prompt),
            Command::Send(input) => match mode {
                Mode::Text => client.send_text(input),
                Mode::Image => client.send_image(input),
            },
        };

        match outcome {
            SendOutcome::Started(_) => run_turn(&mut client).await,
            SendOutcome::Ignored(IgnoreReason::EmptyInput) => {}
            SendOutcome::Ignored(IgnoreReason::Busy) => {
                println!("Still waiting for the previous reply");
            }
        }
    }

    Ok(())
}
