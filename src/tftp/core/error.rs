//! Transfer failure taxonomy
//!
//! Two layers: [`ErrorCode`] is the numeric reason carried inside ERROR
//! packets on the wire, while [`ClientError`] and [`ServerError`] are what a
//! transfer reports to its owner as the terminal result.

use std::fmt;
use std::io;

use thiserror::Error;

use super::packet::PacketError;

/// Reason codes carried by ERROR packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Requested file could not be opened or read
    FileNotFound = 1000,
    /// Retransmissions exhausted
    TransferTimeout = 1001,
    /// Peer acknowledged a block other than the one in flight
    BlockMismatch = 1002,
    /// Server closed the transfer voluntarily
    ServerClosed = 1003,
    /// Client closed the transfer voluntarily
    ClientClosed = 1004,
}

impl ErrorCode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1000 => Some(Self::FileNotFound),
            1001 => Some(Self::TransferTimeout),
            1002 => Some(Self::BlockMismatch),
            1003 => Some(Self::ServerClosed),
            1004 => Some(Self::ClientClosed),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Text sent alongside the code in an ERROR packet
    pub fn message(self) -> &'static str {
        match self {
            Self::FileNotFound => "file not found",
            Self::TransferTimeout => "transfer timed out",
            Self::BlockMismatch => "mismatched block number",
            Self::ServerClosed => "server closed the transfer",
            Self::ClientClosed => "client closed the transfer",
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.as_u16()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.as_u16())
    }
}

/// Terminal failure of a download
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Socket(#[source] io::Error),

    #[error("failed to send data: {0}")]
    SendFailure(#[source] io::Error),

    #[error("failed to receive data: {0}")]
    ReceiveFailure(#[source] io::Error),

    #[error("request timed out after {retries} retries")]
    RequestTimeout { retries: u32 },

    #[error("server error {code}: {message}")]
    UnexpectedErrorPacket { code: u16, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] PacketError),
}

impl ClientError {
    /// Stable numeric code of the failure kind
    pub fn code(&self) -> u16 {
        match self {
            Self::Socket(_) => 0,
            Self::SendFailure(_) => 1,
            Self::ReceiveFailure(_) => 2,
            Self::RequestTimeout { .. } => 3,
            Self::UnexpectedErrorPacket { .. } => 4,
            Self::InvalidRequest(_) => 5,
        }
    }

    /// Fixed description of the failure kind
    pub fn description(&self) -> &'static str {
        match self {
            Self::Socket(_) => "socket could not be created",
            Self::SendFailure(_) => "sending data failed",
            Self::ReceiveFailure(_) => "receiving data failed",
            Self::RequestTimeout { .. } => "request timed out",
            Self::UnexpectedErrorPacket { .. } => "server replied with an error packet",
            Self::InvalidRequest(_) => "request could not be encoded",
        }
    }
}

/// Terminal failure of a served transfer
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server socket error: {0}")]
    Socket(#[source] io::Error),

    #[error("failed to read file: {0}")]
    FileReadFailure(#[source] io::Error),

    #[error("failed to send data: {0}")]
    SendFailure(#[source] io::Error),

    #[error("failed to receive data: {0}")]
    ReceiveFailure(#[source] io::Error),

    #[error("block {block} unacknowledged after {retries} retries")]
    SendTimeout { block: u16, retries: u32 },

    #[error("transfer aborted with error {code}: {message}")]
    UnexpectedErrorPacket { code: u16, message: String },
}

impl ServerError {
    /// Stable numeric code of the failure kind
    pub fn code(&self) -> u16 {
        match self {
            Self::Socket(_) => 0,
            Self::FileReadFailure(_) => 1,
            Self::SendFailure(_) => 2,
            Self::ReceiveFailure(_) => 3,
            Self::SendTimeout { .. } => 4,
            Self::UnexpectedErrorPacket { .. } => 5,
        }
    }

    /// Fixed description of the failure kind
    pub fn description(&self) -> &'static str {
        match self {
            Self::Socket(_) => "server socket could not be created",
            Self::FileReadFailure(_) => "file could not be read",
            Self::SendFailure(_) => "sending data failed",
            Self::ReceiveFailure(_) => "receiving data failed",
            Self::SendTimeout { .. } => "data block was never acknowledged",
            Self::UnexpectedErrorPacket { .. } => "transfer ended by an error packet",
        }
    }
}
