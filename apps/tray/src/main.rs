use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{is_cancellation, HttpLocalClient, LocalClient};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cancel;
mod config;
mod controller;
mod desktop;
mod generation;
mod icons;
mod menu;
mod snapshot;
mod taxonomy;
mod toolkit;
mod watcher;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

use crate::{
    cancel::CancelSignal,
    config::load_settings,
    controller::{ExitReason, Tray},
    desktop::SystemDesktop,
    icons::{HttpIconSource, RemoteIcons},
    menu::MenuManager,
    toolkit::ConsoleToolkit,
    watcher::StreamWatcher,
};

#[derive(Parser, Debug)]
#[command(version, about = "Tray menu for the tailnet daemon")]
struct Args {
    /// Config file; defaults to tailnet-tray/tray.toml in the user config dir.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    daemon_url: Option<String>,
    #[arg(long)]
    settings_url: Option<String>,
    /// Log filter directive, e.g. "tray=debug".
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(url) = args.daemon_url {
        settings.daemon_url = url;
    }
    if let Some(url) = args.settings_url {
        settings.settings_url = url;
    }
    if let Some(filter) = args.log {
        settings.log_filter = filter;
    }
    settings.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut client = HttpLocalClient::new(&settings.daemon_url)?;
    if let Some(password) = &settings.api_password {
        client = client.with_password(password.clone());
    }
    let client: Arc<dyn LocalClient> = Arc::new(client);

    let lifetime = Arc::new(CancelSignal::new());
    {
        let lifetime = lifetime.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
            }
            lifetime.cancel();
        });
    }

    let (state_tx, state_rx) = mpsc::channel(1);
    let watcher = tokio::spawn(
        StreamWatcher::new(client.clone(), state_tx, lifetime.token())
            .with_reconnect_delay(settings.reconnect_delay())
            .run(),
    );

    let icons = RemoteIcons::new(Arc::new(HttpIconSource::new()));
    let toolkit = ConsoleToolkit::spawn().context("starting console menu")?;
    let menu = MenuManager::new(Box::new(toolkit), client.clone(), icons);
    info!(daemon = %settings.daemon_url, "starting tray");
    let tray = Tray::start(
        menu,
        client,
        Arc::new(SystemDesktop),
        state_rx,
        lifetime.token(),
        settings.settings_url.clone(),
    )
    .await;

    let reason = tray.run().await;
    if reason == ExitReason::Quit {
        lifetime.cancel();
    }

    let watched = watcher.await.context("stream watcher task failed")?;
    match (reason, watched) {
        (ExitReason::Quit, Err(err)) if is_cancellation(&err) => Ok(()),
        (_, Err(err)) => {
            error!(error = %format!("{err:#}"), "stream watcher stopped");
            Err(err)
        }
        (_, Ok(())) => Ok(()),
    }
}
