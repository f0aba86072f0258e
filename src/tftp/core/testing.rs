//! Scripted [`Socket`] for driving the engines without a network

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Packet, Socket};

/// One scripted outcome of a receive call
#[derive(Debug)]
pub(crate) enum Incoming {
    Datagram(Vec<u8>, SocketAddr),
    Timeout,
    Fail(io::ErrorKind),
}

impl Incoming {
    pub(crate) fn packet(packet: Packet, from: SocketAddr) -> Self {
        Incoming::Datagram(packet.serialize().unwrap(), from)
    }
}

/// Datagrams sent by the engine under test
pub(crate) type SentLog = Arc<Mutex<Vec<(Packet, SocketAddr)>>>;

/// Replays [`Incoming`] events in order, then blocks forever.
#[derive(Debug)]
pub(crate) struct ScriptedSocket {
    incoming: VecDeque<Incoming>,
    sent: SentLog,
    fail_sends: bool,
}

impl ScriptedSocket {
    pub(crate) fn new(incoming: impl IntoIterator<Item = Incoming>) -> (Self, SentLog) {
        let sent = SentLog::default();
        let socket = Self {
            incoming: incoming.into_iter().collect(),
            sent: sent.clone(),
            fail_sends: false,
        };
        (socket, sent)
    }

    pub(crate) fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }
}

impl Socket for ScriptedSocket {
    async fn send_to(&mut self, buf: &[u8], target: SocketAddr) -> io::Result<()> {
        if self.fail_sends {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let packet = Packet::deserialize(buf).expect("engine sent an undecodable packet");
        self.sent.lock().unwrap().push((packet, target));
        Ok(())
    }

    async fn recv_timeout(
        &mut self,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.incoming.pop_front() {
            Some(Incoming::Datagram(bytes, from)) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(Some((bytes.len(), from)))
            }
            Some(Incoming::Timeout) => Ok(None),
            Some(Incoming::Fail(kind)) => Err(kind.into()),
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok("127.0.0.1:40000".parse().unwrap())
    }
}

/// Packets sent so far, in order
pub(crate) fn sent_packets(log: &SentLog) -> Vec<Packet> {
    log.lock().unwrap().iter().map(|(packet, _)| packet.clone()).collect()
}
