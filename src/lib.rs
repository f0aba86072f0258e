//! Lock-step TFTP (RFC 1350) client and server over UDP.
//!
//! See [`tftp`] for the protocol engine and [`config`] for the optional
//! configuration file used by the `tftp-lite` binary.

pub mod config;
pub mod tftp;
