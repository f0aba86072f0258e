//! TFTP client implementation
//!
//! - `client`: Binds a socket and starts downloads
//! - `session`: The per-download state machine
//! - `config`: Client configuration

#[allow(clippy::module_inception)]
mod client;
mod config;
mod session;

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};

pub use client::Client;
pub use config::ClientConfig;
pub use session::{ClientState, Download, DownloadProgress};

/// Download `remote_file` and store it at `local_file`
///
/// Nothing is written unless the whole file arrived. Ctrl+C closes the
/// download.
pub async fn run(config: ClientConfig, remote_file: &str, local_file: &Path) -> Result<()> {
    run_until(config, remote_file, local_file, tokio::signal::ctrl_c()).await
}

/// Like [`run`], but the download is closed once `shutdown` resolves
pub async fn run_until<F: Future>(
    config: ClientConfig,
    remote_file: &str,
    local_file: &Path,
    shutdown: F,
) -> Result<()> {
    let client = Client::new(config);
    log::info!(
        "Downloading {} from {}:{} to {}",
        remote_file,
        client.config().server_ip,
        client.config().server_port,
        local_file.display()
    );

    let mut download = client.get(remote_file).await?;
    tokio::pin!(shutdown);
    let mut interrupted = false;

    loop {
        tokio::select! {
            progress = download.next_progress() => match progress {
                Some(progress) => log::debug!(
                    "Block {}: {} bytes received",
                    progress.block,
                    progress.received
                ),
                None => break,
            },
            _ = &mut shutdown, if !interrupted => {
                log::warn!("Interrupted, closing download");
                interrupted = true;
                download.close();
            }
        }
    }

    let data = match download.wait().await {
        Some(result) => result?,
        None => anyhow::bail!("Download of {} was cancelled", remote_file),
    };

    tokio::fs::write(local_file, &data)
        .await
        .with_context(|| format!("Failed to write {}", local_file.display()))?;

    log::info!("Saved {} bytes to {}", data.len(), local_file.display());
    Ok(())
}
