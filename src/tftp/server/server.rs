use std::net::SocketAddr;

use super::config::Config;
use super::source::{FileSource, FsSource};
use super::worker::{self, Serving};
use crate::tftp::core::{ServerError, bind};

/// TFTP server
///
/// Each call to [`Server::open`] binds the configured port and answers one
/// read request; the returned [`Serving`] reports how that transfer goes.
///
/// # Example
///
/// ```rust,no_run
/// use tftp_lite::tftp::server::{Config, Server};
/// use std::path::PathBuf;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let config = Config::new("0.0.0.0".parse()?, 69, PathBuf::from("/srv/tftp/boot.img"));
/// let server = Server::new(config);
///
/// let session = server.open().await?;
/// if let Some(result) = session.wait().await {
///     result?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serve the configured path to the next client
    pub async fn open(&self) -> Result<Serving, ServerError> {
        let source = FsSource::new(self.config.path.clone());
        log::debug!("Serving files from {}", source.path().display());
        self.open_with(source).await
    }

    /// Serve bytes from `source` to the next client
    pub async fn open_with<F: FileSource>(&self, source: F) -> Result<Serving, ServerError> {
        let addr = SocketAddr::new(self.config.ip_address, self.config.port);
        let socket = bind(addr).await.map_err(ServerError::Socket)?;

        let serving = worker::spawn(socket, source, self.config.retry_policy())
            .map_err(ServerError::Socket)?;
        log::info!("TFTP server listening on {}", serving.local_addr());
        Ok(serving)
    }
}
