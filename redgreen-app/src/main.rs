mod app;
mod audio;
mod config;

use anyhow::Result;
use app::App;
use chrono::{DateTime, Utc};
use clap::Parser;
use config::AppConfig;
use redgreen_core::SessionContext;
use redgreen_net::NetReply;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use winit::event_loop::EventLoop;

#[derive(Debug, Parser)]
#[command(name = "redgreen")]
#[command(about = "Plays red/green trials and reports responses to the experiment server")]
struct Cli {
    /// JSON config file; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    session_id: Option<String>,
    /// Session start time (RFC 3339) as issued by the server.
    #[arg(long)]
    session_start: Option<DateTime<Utc>>,
    /// Continue a suspended session from this trial number.
    #[arg(long)]
    resume_from_trial: Option<u32>,
    #[arg(long, default_value_t = false)]
    windowed: bool,
}

impl Cli {
    fn app_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        if let Some(url) = &self.server_url {
            config.client.base_url = url.clone();
        }
        if self.windowed {
            config.fullscreen = false;
        }
        Ok(config)
    }

    fn session(&self) -> SessionContext {
        SessionContext {
            session_id: self.session_id.clone(),
            started_at: self.session_start,
            resume_from_trial: self.resume_from_trial,
        }
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = cli.app_config()?;
    let session = cli.session();
    match (&session.session_id, session.started_at) {
        (None, _) => warn!("no session id given; trials cannot be loaded"),
        (Some(id), Some(start)) => info!("session {id} started at {}", start.to_rfc3339()),
        (Some(id), None) => info!("session {id}"),
    }

    let event_loop = EventLoop::<NetReply>::with_user_event().build()?;
    let app = App::new(config, session, &event_loop)?;
    app.run(event_loop)
}
