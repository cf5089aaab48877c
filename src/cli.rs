//! Command-line interface parsing and startup wiring.

use std::error::Error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::core::config::{Config, SessionSettings};
use crate::ui::chat_loop::run_chat;

#[derive(Parser)]
#[command(name = "causette")]
#[command(about = "A terminal chat client with streaming responses")]
#[command(
    long_about = "Causette is a full-screen terminal chat client that streams replies from \
OpenAI-compatible completion APIs and keeps your conversation between runs.\n\n\
Environment Variables:\n\
  TOGETHER_API_KEY   Bearer credential for the completion API (required)\n\
  TOGETHER_BASE_URL  Custom API base URL (optional)\n\
  RUST_LOG           Diagnostic filter; logs go to stderr\n\n\
Controls:\n\
  Type               Enter your message in the input field\n\
  Enter              Send the message\n\
  Up/Down/Mouse      Scroll through chat history\n\
  Ctrl+X             Clear the conversation (asks for confirmation)\n\
  Ctrl+C             Quit the application"
)]
pub struct Args {
    /// Model to use for chat
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Base URL of the completion API
    #[arg(short = 'b', long, value_name = "URL")]
    pub base_url: Option<String>,
}

pub async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("⚠️  Ignoring unreadable config: {e}");
        Config::default()
    });

    let settings = match SessionSettings::resolve(&config, args.model, args.base_url) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ Error: {e}");
            eprintln!();
            eprintln!("Please set your Together API key:");
            eprintln!("export TOGETHER_API_KEY=\"your-api-key-here\"");
            eprintln!();
            eprintln!("Optionally, you can also set a custom base URL:");
            eprintln!("export TOGETHER_BASE_URL=\"https://api.together.xyz/v1\"");
            std::process::exit(1);
        }
    };

    run_chat(settings).await
}
