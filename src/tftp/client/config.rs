use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::tftp::core::{DEFAULT_TIMEOUT, MAX_RETRY, RetryPolicy};

/// TFTP client configuration
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tftp_lite::tftp::client::ClientConfig;
///
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 69)
///     .with_timeout(Duration::from_secs(2));
/// assert_eq!(config.max_retry, 3);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server IP address
    pub server_ip: IpAddr,
    /// Server port number
    pub server_port: u16,
    /// Wait applied to every attempt
    pub timeout: Duration,
    /// Retransmissions before giving up
    pub max_retry: u32,
}

impl ClientConfig {
    /// Create new client configuration
    ///
    /// # Arguments
    ///
    /// * `server_ip` - Server IP address
    /// * `server_port` - Server port number (usually 69)
    pub fn new(server_ip: IpAddr, server_port: u16) -> Self {
        Self {
            server_ip,
            server_port,
            timeout: DEFAULT_TIMEOUT,
            max_retry: MAX_RETRY,
        }
    }

    /// Set timeout duration
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how many retransmissions are attempted
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.timeout,
            max_retry: self.max_retry,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 69)
    }
}
