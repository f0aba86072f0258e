use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use super::config::ClientConfig;
use super::session::{self, Download};
use crate::tftp::core::{ClientError, MAX_PACKET_SIZE, bind, encode_rrq};

/// TFTP client
///
/// Downloads (RRQ) a single file per call; each download owns its own socket.
///
/// # Example
///
/// ```rust,no_run
/// use tftp_lite::tftp::client::{Client, ClientConfig};
///
/// # async fn demo() -> anyhow::Result<()> {
/// let client = Client::new(ClientConfig::new("192.168.1.100".parse()?, 69));
///
/// let mut download = client.get("remote.txt").await?;
/// while let Some(progress) = download.next_progress().await {
///     println!("{} bytes", progress.received);
/// }
/// let bytes = download.wait().await.expect("not closed")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
}

impl Client {
    /// Create a new TFTP client
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start downloading `remote_file` from the server
    ///
    /// Returns once the local socket is bound; the transfer itself runs in the
    /// background and reports through the returned [`Download`]. A name that
    /// cannot fit in a single request fails with
    /// [`ClientError::InvalidRequest`] before anything is sent.
    pub async fn get(&self, remote_file: &str) -> Result<Download, ClientError> {
        encode_rrq(remote_file, &mut [0u8; MAX_PACKET_SIZE])?;

        let server_addr = SocketAddr::new(self.config.server_ip, self.config.server_port);
        let local: IpAddr = match server_addr {
            SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
        };

        let socket = bind(SocketAddr::new(local, 0))
            .await
            .map_err(ClientError::Socket)?;

        session::spawn(
            socket,
            server_addr,
            remote_file.to_string(),
            self.config.retry_policy(),
        )
        .map_err(ClientError::Socket)
    }

    /// Download `remote_file` and wait for the whole file
    ///
    /// Returns `None` if the download was closed through another path before
    /// it finished.
    pub async fn download(&self, remote_file: &str) -> Result<Option<Vec<u8>>, ClientError> {
        let download = self.get(remote_file).await?;
        download.wait().await.transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::tftp::core::PacketError;

    fn client() -> Client {
        Client::new(ClientConfig::new(Ipv4Addr::LOCALHOST.into(), 6969))
    }

    #[tokio::test]
    async fn rejects_names_that_do_not_fit_a_request() {
        let err = client().get(&"a".repeat(508)).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidRequest(PacketError::BufferTooSmall { .. })
        ));
        assert_eq!(err.code(), 5);

        let err = client().get("boot\0img").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(PacketError::EmbeddedNul)));
    }

    #[tokio::test]
    async fn longest_name_is_accepted() {
        let download = client().get(&"a".repeat(507)).await.unwrap();
        assert!(download.is_open());
        download.close();
        assert!(download.wait().await.is_none());
    }
}
