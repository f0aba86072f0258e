//! TFTP core protocol implementation
//!
//! This module contains the pieces shared by the client and the server:
//! - `packet`: Packet serialization and deserialization
//! - `error`: Failure taxonomy and ERROR packet reason codes
//! - `socket`: Datagram transport abstraction
//! - `handle`: Progress/result/close channels of a running transfer

mod error;
mod handle;
mod packet;
mod socket;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

// Public core types
pub use error::{ClientError, ErrorCode, ServerError};
pub use handle::{SessionState, TransferHandle};
pub use packet::{
    BLOCK_SIZE, MAX_PACKET_SIZE, MODE_OCTET, Packet, PacketError, encode_ack, encode_data,
    encode_error, encode_rrq, is_final_payload,
};
pub use socket::{Socket, bind};

pub(crate) use handle::{SessionChannels, channel};

/// Retransmissions allowed before a transfer is declared timed out
pub const MAX_RETRY: u32 = 3;
/// Wait applied to every attempt
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
/// Receive buffer; larger than any valid packet so oversize DATA is caught
pub(crate) const RECV_BUFFER_SIZE: usize = 1500;

/// Per-attempt timing shared by both engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retry: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retry: MAX_RETRY,
        }
    }
}
