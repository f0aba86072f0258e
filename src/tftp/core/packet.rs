//! TFTP packet serialization and deserialization
//!
//! Wire layout (all integers big-endian):
//!
//! ```text
//! RRQ/WRQ | 01/02 | filename | 0 | mode | 0 |
//! DATA    | 03    | block#   | payload (0..=512) |
//! ACK     | 04    | block#   |
//! ERROR   | 05    | code     | message | 0 |
//! ```

use std::fmt;

use thiserror::Error;

/// Read request opcode
pub const OPCODE_RRQ: u16 = 1;
/// Write request opcode
pub const OPCODE_WRQ: u16 = 2;
/// Data opcode
pub const OPCODE_DATA: u16 = 3;
/// Acknowledgement opcode
pub const OPCODE_ACK: u16 = 4;
/// Error opcode
pub const OPCODE_ERROR: u16 = 5;

/// Payload bytes carried by a full DATA block
pub const BLOCK_SIZE: usize = 512;
/// Largest packet this implementation ever sends (opcode + block# + payload)
pub const MAX_PACKET_SIZE: usize = 4 + BLOCK_SIZE;
/// The only transfer mode spoken on the wire
pub const MODE_OCTET: &str = "octet";

/// Codec failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("payload of {0} bytes exceeds the 512 byte block size")]
    PayloadTooLarge(usize),

    #[error("slice {offset}..{end} is outside a source of {len} bytes")]
    OutOfBounds { offset: usize, end: usize, len: usize },

    #[error("string field contains a NUL byte")]
    EmbeddedNul,
}

/// A decoded TFTP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Rrq { filename: String, mode: String },
    Wrq { filename: String, mode: String },
    Data { block_num: u16, data: Vec<u8> },
    Ack(u16),
    Error { code: u16, msg: String },
}

impl Packet {
    /// Opcode of this packet
    pub fn opcode(&self) -> u16 {
        match self {
            Packet::Rrq { .. } => OPCODE_RRQ,
            Packet::Wrq { .. } => OPCODE_WRQ,
            Packet::Data { .. } => OPCODE_DATA,
            Packet::Ack(_) => OPCODE_ACK,
            Packet::Error { .. } => OPCODE_ERROR,
        }
    }

    /// Encode into `buf`, returning the number of bytes written
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        let mut w = Writer::new(buf);
        w.put_u16(self.opcode())?;
        match self {
            Packet::Rrq { filename, mode } | Packet::Wrq { filename, mode } => {
                w.put_str(filename)?;
                w.put_str(mode)?;
            }
            Packet::Data { block_num, data } => {
                if data.len() > BLOCK_SIZE {
                    return Err(PacketError::PayloadTooLarge(data.len()));
                }
                w.put_u16(*block_num)?;
                w.put_bytes(data)?;
            }
            Packet::Ack(block_num) => w.put_u16(*block_num)?,
            Packet::Error { code, msg } => {
                w.put_u16(*code)?;
                w.put_str(msg)?;
            }
        }
        Ok(w.pos)
    }

    /// Encode into a freshly allocated buffer
    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        let capacity = match self {
            Packet::Rrq { filename, mode } | Packet::Wrq { filename, mode } => {
                filename.len() + mode.len() + 4
            }
            Packet::Data { data, .. } => data.len() + 4,
            Packet::Ack(_) => 4,
            Packet::Error { msg, .. } => msg.len() + 5,
        };
        let mut buf = vec![0u8; capacity];
        let len = self.encode(&mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Decode a received datagram
    pub fn deserialize(buf: &[u8]) -> Result<Packet, PacketError> {
        if buf.len() < 2 {
            return Err(PacketError::Malformed("shorter than an opcode"));
        }
        let opcode = u16::from_be_bytes([buf[0], buf[1]]);
        let body = &buf[2..];

        match opcode {
            OPCODE_RRQ | OPCODE_WRQ => {
                let (filename, rest) = take_str(body)?;
                let (mode, _) = take_str(rest)?;
                if opcode == OPCODE_RRQ {
                    Ok(Packet::Rrq { filename, mode })
                } else {
                    Ok(Packet::Wrq { filename, mode })
                }
            }
            OPCODE_DATA => {
                let (block_num, payload) = take_u16(body, "DATA without block number")?;
                if payload.len() > BLOCK_SIZE {
                    return Err(PacketError::Malformed("DATA payload exceeds block size"));
                }
                Ok(Packet::Data {
                    block_num,
                    data: payload.to_vec(),
                })
            }
            OPCODE_ACK => match take_u16(body, "ACK without block number")? {
                (block_num, []) => Ok(Packet::Ack(block_num)),
                _ => Err(PacketError::Malformed("ACK with trailing bytes")),
            },
            OPCODE_ERROR => {
                let (code, rest) = take_u16(body, "ERROR without code")?;
                let (msg, _) = take_str(rest)?;
                Ok(Packet::Error { code, msg })
            }
            _ => Err(PacketError::Malformed("unknown opcode")),
        }
    }

    /// Whether a DATA packet ends the transfer
    pub fn is_final_block(&self) -> bool {
        matches!(self, Packet::Data { data, .. } if is_final_payload(data.len()))
    }
}

/// A payload shorter than a full block ends the transfer
pub fn is_final_payload(len: usize) -> bool {
    len < BLOCK_SIZE
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Rrq { filename, mode } => write!(f, "RRQ {filename} ({mode})"),
            Packet::Wrq { filename, mode } => write!(f, "WRQ {filename} ({mode})"),
            Packet::Data { block_num, data } => write!(f, "DATA #{block_num} ({} bytes)", data.len()),
            Packet::Ack(block_num) => write!(f, "ACK #{block_num}"),
            Packet::Error { code, msg } => write!(f, "ERROR {code}: {msg}"),
        }
    }
}

/// Write an RRQ for `filename` in octet mode
pub fn encode_rrq(filename: &str, buf: &mut [u8]) -> Result<usize, PacketError> {
    let mut w = Writer::new(buf);
    w.put_u16(OPCODE_RRQ)?;
    w.put_str(filename)?;
    w.put_str(MODE_OCTET)?;
    Ok(w.pos)
}

/// Write an ACK for `block_num`; always 4 bytes
pub fn encode_ack(block_num: u16, buf: &mut [u8]) -> Result<usize, PacketError> {
    let mut w = Writer::new(buf);
    w.put_u16(OPCODE_ACK)?;
    w.put_u16(block_num)?;
    Ok(w.pos)
}

/// Write an ERROR carrying `code` and `reason`
pub fn encode_error(code: u16, reason: &str, buf: &mut [u8]) -> Result<usize, PacketError> {
    let mut w = Writer::new(buf);
    w.put_u16(OPCODE_ERROR)?;
    w.put_u16(code)?;
    w.put_str(reason)?;
    Ok(w.pos)
}

/// Write a DATA block holding `source[offset..offset + length]`
pub fn encode_data(
    source: &[u8],
    offset: usize,
    length: usize,
    block_num: u16,
    buf: &mut [u8],
) -> Result<usize, PacketError> {
    if length > BLOCK_SIZE {
        return Err(PacketError::PayloadTooLarge(length));
    }
    let end = offset
        .checked_add(length)
        .filter(|end| *end <= source.len())
        .ok_or(PacketError::OutOfBounds {
            offset,
            end: offset.saturating_add(length),
            len: source.len(),
        })?;

    let mut w = Writer::new(buf);
    w.put_u16(OPCODE_DATA)?;
    w.put_u16(block_num)?;
    w.put_bytes(&source[offset..end])?;
    Ok(w.pos)
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(PacketError::BufferTooSmall {
                needed: end,
                available: self.buf.len(),
            });
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn put_u16(&mut self, value: u16) -> Result<(), PacketError> {
        self.put_bytes(&value.to_be_bytes())
    }

    fn put_str(&mut self, value: &str) -> Result<(), PacketError> {
        if value.as_bytes().contains(&0) {
            return Err(PacketError::EmbeddedNul);
        }
        self.put_bytes(value.as_bytes())?;
        self.put_bytes(&[0])
    }
}

fn take_u16<'a>(buf: &'a [u8], missing: &'static str) -> Result<(u16, &'a [u8]), PacketError> {
    match buf {
        [hi, lo, rest @ ..] => Ok((u16::from_be_bytes([*hi, *lo]), rest)),
        _ => Err(PacketError::Malformed(missing)),
    }
}

fn take_str(buf: &[u8]) -> Result<(String, &[u8]), PacketError> {
    let nul = buf
        .iter()
        .position(|b| *b == 0)
        .ok_or(PacketError::Malformed("missing NUL terminator"))?;
    let value = std::str::from_utf8(&buf[..nul])
        .map_err(|_| PacketError::Malformed("string field is not UTF-8"))?;
    Ok((value.to_owned(), &buf[nul + 1..]))
}
