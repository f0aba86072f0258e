use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::tftp::core::{DEFAULT_TIMEOUT, MAX_RETRY, RetryPolicy};

/// TFTP server configuration
///
/// # Example
///
/// ```rust
/// use tftp_lite::tftp::server::Config;
/// use std::path::PathBuf;
///
/// let config = Config::new(
///     "127.0.0.1".parse().unwrap(),
///     69,
///     PathBuf::from("/tmp/tftp/boot.img"),
/// );
/// assert_eq!(config.max_retry, 3);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address to listen on
    pub ip_address: IpAddr,
    /// Port number to listen on
    pub port: u16,
    /// File to serve, or a directory whose files are served by name
    pub path: PathBuf,
    /// Wait for each ACK before retransmitting
    pub timeout: Duration,
    /// Retransmissions of one block before giving up
    pub max_retry: u32,
}

impl Config {
    /// Create a new configuration
    ///
    /// # Arguments
    ///
    /// * `ip_address` - IP address to listen on
    /// * `port` - Port number to listen on
    /// * `path` - File or directory to serve
    pub fn new(ip_address: IpAddr, port: u16, path: PathBuf) -> Self {
        Self {
            ip_address,
            port,
            path,
            timeout: DEFAULT_TIMEOUT,
            max_retry: MAX_RETRY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

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

impl Default for Config {
    fn default() -> Self {
        Self::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            69,
            std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()),
        )
    }
}
