//! TFTP server implementation
//!
//! This module provides the serving side of a transfer:
//! - `server`: Binds the port and starts a session
//! - `worker`: The per-session state machine
//! - `source`: Where served bytes come from
//! - `config`: Server configuration

mod config;
#[allow(clippy::module_inception)]
mod server;
mod source;
mod worker;

use std::future::Future;

use anyhow::Result;

// Public server types
pub use config::Config;
pub use server::Server;
pub use source::{FileSource, FsSource};
pub use worker::{ServeProgress, ServerState, Serving};

/// Run the TFTP server
///
/// Sessions are served one after another until `once` is set or the process
/// is interrupted with Ctrl+C.
pub async fn run(config: Config, once: bool) -> Result<()> {
    run_until(config, once, tokio::signal::ctrl_c()).await
}

/// Like [`run`], but stops once `shutdown` resolves
///
/// A session in progress is closed first, which tells its client.
pub async fn run_until<F: Future>(config: Config, once: bool, shutdown: F) -> Result<()> {
    let server = Server::new(config);
    let config = server.config();
    log::info!("Starting TFTP server on {}:{}", config.ip_address, config.port);
    log::info!("Serving: {}", config.path.display());

    // Ensure the path exists
    if !config.path.exists() {
        log::error!("Path does not exist: {}", config.path.display());
        return Err(anyhow::anyhow!("Path does not exist"));
    }

    tokio::pin!(shutdown);

    loop {
        let mut session = tokio::select! {
            session = server.open() => session?,
            _ = &mut shutdown => {
                log::warn!("Interrupted, stopping server");
                return Ok(());
            }
        };
        let mut interrupted = false;

        loop {
            tokio::select! {
                progress = session.next_progress() => match progress {
                    Some(progress) => log::debug!(
                        "{}/{} bytes acknowledged ({:.0}%)",
                        progress.sent,
                        progress.total,
                        progress.fraction() * 100.0
                    ),
                    None => break,
                },
                _ = &mut shutdown, if !interrupted => {
                    log::warn!("Interrupted, closing server");
                    interrupted = true;
                    session.close();
                }
            }
        }

        match session.wait().await {
            Some(Ok(())) => log::info!("Transfer finished"),
            Some(Err(err)) if once => return Err(err.into()),
            Some(Err(err)) => log::warn!("Transfer failed: {} ({})", err, err.description()),
            None => {}
        }

        if once || interrupted {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn shutdown_stops_an_idle_server() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(Ipv4Addr::LOCALHOST.into(), 0, dir.path().to_path_buf());

        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(run_until(config, false, stopped));
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn missing_path_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(Ipv4Addr::LOCALHOST.into(), 0, dir.path().join("nope"));

        let (_stop, stopped) = tokio::sync::oneshot::channel::<()>();
        assert!(run_until(config, true, stopped).await.is_err());
    }
}
