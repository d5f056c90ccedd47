//! Clipboard, notifications and browser access.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait Desktop: Send + Sync {
    async fn copy_to_clipboard(&self, text: &str) -> Result<()>;
    async fn notify(&self, summary: &str, body: &str) -> Result<()>;
    async fn open_url(&self, url: &str) -> Result<()>;
}

/// Desktop integration for freedesktop sessions.
#[derive(Debug, Default)]
pub struct SystemDesktop;

#[async_trait]
impl Desktop for SystemDesktop {
    async fn copy_to_clipboard(&self, text: &str) -> Result<()> {
        let text = text.to_string();
        tokio::task::spawn_blocking(move || {
            let mut clipboard = arboard::Clipboard::new().context("opening clipboard")?;
            clipboard.set_text(text).context("writing clipboard")
        })
        .await
        .context("clipboard task failed")?
    }

    async fn notify(&self, summary: &str, body: &str) -> Result<()> {
        run("notify-send", &["--app-name=tailnet-tray", summary, body]).await
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        run("xdg-open", &[url]).await
    }
}

async fn run(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .with_context(|| format!("spawning {program}"))?;
    if !status.success() {
        bail!("{program} exited with {status}");
    }
    debug!(program, "desktop command finished");
    Ok(())
}
