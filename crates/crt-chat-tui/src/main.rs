mod app;
mod handler;
mod tui;
mod ui;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use clap::Parser;
use crt_chat_core::{Config, Conversation, OpenRouterClient};
use tracing_subscriber::EnvFilter;

use app::App;

#[derive(Parser)]
#[command(name = "crtchat", version)]
#[command(about = "Retro 70s terminal for chatting with a hosted LLM")]
struct Cli {
    /// Config file (defaults to <config dir>/crt-chat/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Model identifier sent to the endpoint
    #[arg(short, long)]
    model: Option<String>,
    /// Chat completions endpoint URL
    #[arg(short, long)]
    endpoint: Option<String>,
    /// Where to write the operator log
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Save the effective settings to the config file and exit
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }

    if cli.write_config {
        let written = match cli.config {
            Some(path) => {
                config.save_to(&path)?;
                path
            }
            None => config.save()?,
        };
        println!("Wrote {}", written.display());
        return Ok(());
    }

    let log_path = match cli.log_file {
        Some(path) => path,
        None => default_log_path()?,
    };
    init_logging(&log_path)?;

    let api_key = Config::api_key_from_env();
    if api_key.is_none() {
        tracing::warn!("no API key in environment; requests will fail until one is set");
    }
    tracing::info!(model = %config.model, endpoint = %config.endpoint, "starting");

    let client = OpenRouterClient::from_config(&config, api_key);
    let conversation = Conversation::new(Arc::new(client));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();
    let mut app = App::new(conversation, &config, events.sender());

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    if let Err(e) = &result {
        tracing::error!(error = %e, "exiting with error");
    }
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut tui::EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

fn default_log_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(data_dir.join("crt-chat").join("crt-chat.log"))
}

/// Logs go to a file because the terminal belongs to the UI
fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crt_chat_core=info,crt_chat_tui=info".into()),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(())
}
