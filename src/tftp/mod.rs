//! TFTP (Trivial File Transfer Protocol) implementation
//!
//! This module implements the transfer core of
//! [RFC 1350](https://www.rfc-editor.org/rfc/rfc1350) TFTP Protocol version 2:
//! octet mode, 512-byte blocks, one block in flight, bounded retransmission.
//!
//! ## Module Structure
//!
//! ```text
//! tftp/
//! ├── core/           # Core protocol implementation
//! │   ├── packet      # Packet serialization/deserialization
//! │   ├── error       # Failure taxonomy and ERROR reason codes
//! │   ├── socket      # Socket abstraction layer
//! │   └── handle      # Progress / result / close channels
//! │
//! ├── server/         # TFTP server
//! │   ├── server      # Binds the port, starts sessions
//! │   ├── worker      # Per-session state machine
//! │   ├── source      # Served file source
//! │   └── config      # Server configuration
//! │
//! └── client/         # TFTP client
//!     ├── client      # Binds a socket, starts downloads
//!     ├── session     # Per-download state machine
//!     └── config      # Client configuration
//! ```
//!
//! ## Usage Examples
//!
//! ### Serve one file
//!
//! ```rust,no_run
//! use tftp_lite::tftp::server::{Config, Server};
//! use std::path::PathBuf;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::new("0.0.0.0".parse()?, 69, PathBuf::from("/var/tftp/boot.img"));
//! let mut session = Server::new(config).open().await?;
//!
//! while let Some(progress) = session.next_progress().await {
//!     println!("{:.0}%", progress.fraction() * 100.0);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Download a file
//!
//! ```rust,no_run
//! use tftp_lite::tftp::client::{Client, ClientConfig};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let client = Client::new(ClientConfig::new("192.168.1.100".parse()?, 69));
//! let bytes = client.download("boot.img").await?;
//! # Ok(())
//! # }
//! ```

// Submodules
pub mod client;
pub mod core;
pub mod server;

// Re-export commonly used types for convenience
pub use self::core::{ClientError, ErrorCode, Packet, ServerError};
