//! Datagram transport used by the transfer engines
//!
//! The engines never touch sockets directly; they go through [`Socket`], which
//! the tokio [`UdpSocket`] implements and tests replace with a scripted double.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

/// A bound datagram endpoint
pub trait Socket: Send + 'static {
    /// Send one datagram to `target`
    fn send_to(
        &mut self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<()>> + Send;

    /// Wait up to `timeout` for one datagram.
    ///
    /// Resolves to `Ok(None)` when the timeout expires first.
    fn recv_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> impl Future<Output = io::Result<Option<(usize, SocketAddr)>>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Socket for UdpSocket {
    async fn send_to(&mut self, buf: &[u8], target: SocketAddr) -> io::Result<()> {
        let sent = UdpSocket::send_to(self, buf, target).await?;
        if sent != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram: {sent} of {} bytes", buf.len()),
            ));
        }
        Ok(())
    }

    async fn recv_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        match tokio::time::timeout(timeout, self.recv_from(buf)).await {
            Ok(received) => received.map(Some),
            Err(_) => Ok(None),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Bind a UDP socket on `addr`
pub async fn bind(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(addr).await?;
    log::debug!("Socket bound to {}", socket.local_addr()?);
    Ok(socket)
}
