//! Download state machine
//!
//! ```text
//! Idle -> RequestSent -> AwaitingData -> Complete
//!              \              \
//!               `-------------`--> Failed / Closed
//! ```

use std::io;
use std::net::SocketAddr;

use log::{debug, error, info, warn};
use tokio::time::Instant;

use crate::tftp::core::{
    ClientError, ErrorCode, MAX_PACKET_SIZE, Packet, PacketError, RECV_BUFFER_SIZE,
    RetryPolicy, SessionChannels, SessionState, Socket, TransferHandle, channel, encode_ack,
    encode_error, encode_rrq,
};

/// Where a download currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    RequestSent,
    AwaitingData,
    Complete,
    Failed,
    Closed,
}

impl SessionState for ClientState {
    fn is_open(&self) -> bool {
        matches!(
            self,
            ClientState::Idle | ClientState::RequestSent | ClientState::AwaitingData
        )
    }
}

/// Emitted after every accepted DATA block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes received so far
    pub received: usize,
    /// Block just accepted
    pub block: u16,
}

/// Handle of a running download
pub type Download = TransferHandle<DownloadProgress, Result<Vec<u8>, ClientError>, ClientState>;

type Channels = SessionChannels<DownloadProgress, Result<Vec<u8>, ClientError>, ClientState>;

enum Step {
    /// Datagram ignored; the pending deadline still applies
    Discard,
    /// Block accepted, more to come
    Continue,
    /// Final block accepted
    Done,
}

/// Start downloading `filename` from `server` over `socket`
pub(crate) fn spawn<S: Socket>(
    socket: S,
    server: SocketAddr,
    filename: String,
    policy: RetryPolicy,
) -> io::Result<Download> {
    let (handle, channels) = channel(ClientState::Idle, socket.local_addr()?);
    let session = Session {
        socket,
        server,
        peer: None,
        filename,
        policy,
        state: ClientState::Idle,
        expected_block: 1,
        received: Vec::new(),
        retries: 0,
        out: [0u8; MAX_PACKET_SIZE],
        out_len: 0,
        out_target: server,
        channels,
    };
    tokio::spawn(session.run());
    Ok(handle)
}

struct Session<S> {
    socket: S,
    server: SocketAddr,
    /// Address the server answers from; fixed by the first reply
    peer: Option<SocketAddr>,
    filename: String,
    policy: RetryPolicy,
    state: ClientState,
    expected_block: u16,
    received: Vec<u8>,
    retries: u32,
    /// Last packet sent, kept for retransmission
    out: [u8; MAX_PACKET_SIZE],
    out_len: usize,
    out_target: SocketAddr,
    channels: Channels,
}

impl<S: Socket> Session<S> {
    async fn run(mut self) {
        info!("Requesting {} from {}", self.filename, self.server);

        match self.transfer().await {
            Some(Ok(data)) => {
                info!("Download of {} complete: {} bytes", self.filename, data.len());
                self.enter(ClientState::Complete);
                self.channels.finish(Ok(data));
            }
            Some(Err(err)) => {
                error!("Download of {} failed: {}", self.filename, err);
                self.enter(ClientState::Failed);
                self.channels.finish(Err(err));
            }
            None => {
                info!("Download of {} closed", self.filename);
                self.enter(ClientState::Closed);
            }
        }
    }

    /// Drive the exchange; `None` means the owner closed the transfer
    async fn transfer(&mut self) -> Option<Result<Vec<u8>, ClientError>> {
        if self.channels.close_requested() {
            return None;
        }
        let request = encode_rrq(&self.filename, &mut self.out);
        if let Err(err) = self.transmit(request, self.server).await {
            return Some(Err(err));
        }
        self.enter(ClientState::RequestSent);

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let mut deadline = Instant::now() + self.policy.timeout;

        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            let received = tokio::select! {
                biased;
                _ = self.channels.closed() => None,
                received = self.socket.recv_timeout(&mut buf, wait) => Some(received),
            };

            let Some(received) = received else {
                if self.state == ClientState::AwaitingData {
                    self.notify(ErrorCode::ClientClosed).await;
                }
                return None;
            };

            match received {
                Err(err) => return Some(Err(ClientError::ReceiveFailure(err))),
                Ok(None) => {
                    if self.retries >= self.policy.max_retry {
                        self.notify(ErrorCode::TransferTimeout).await;
                        return Some(Err(ClientError::RequestTimeout {
                            retries: self.retries,
                        }));
                    }
                    self.retries += 1;
                    warn!(
                        "No reply from {}, retransmitting ({}/{})",
                        self.out_target, self.retries, self.policy.max_retry
                    );
                    if let Err(err) = self.retransmit().await {
                        return Some(Err(err));
                    }
                    deadline = Instant::now() + self.policy.timeout;
                }
                Ok(Some((len, from))) => match self.on_datagram(&buf[..len], from).await {
                    Ok(Step::Discard) => {}
                    Ok(Step::Continue) => deadline = Instant::now() + self.policy.timeout,
                    Ok(Step::Done) => return Some(Ok(std::mem::take(&mut self.received))),
                    Err(err) => return Some(Err(err)),
                },
            }
        }
    }

    async fn on_datagram(&mut self, bytes: &[u8], from: SocketAddr) -> Result<Step, ClientError> {
        if let Some(peer) = self.peer
            && peer != from
        {
            warn!("Ignoring datagram from {} (transfer peer is {})", from, peer);
            return Ok(Step::Discard);
        }

        let packet = match Packet::deserialize(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                warn!("Discarding datagram from {}: {}", from, err);
                return Ok(Step::Discard);
            }
        };

        let last = packet.is_final_block();
        match packet {
            Packet::Data { block_num, data } if block_num == self.expected_block => {
                if self.peer.is_none() {
                    debug!("Server answered from {}", from);
                    self.peer = Some(from);
                }
                self.received.extend_from_slice(&data);
                self.channels.progress(DownloadProgress {
                    received: self.received.len(),
                    block: block_num,
                });
                debug!("Block {} received ({} bytes)", block_num, data.len());

                let ack = encode_ack(block_num, &mut self.out);
                self.transmit(ack, from).await?;
                self.retries = 0;

                if last {
                    return Ok(Step::Done);
                }
                self.expected_block = self.expected_block.wrapping_add(1);
                self.enter(ClientState::AwaitingData);
                Ok(Step::Continue)
            }
            Packet::Data { block_num, .. } => {
                debug!(
                    "Discarding block {} (expecting {})",
                    block_num, self.expected_block
                );
                Ok(Step::Discard)
            }
            Packet::Error { code, msg } => {
                match ErrorCode::from_u16(code) {
                    Some(reason) => debug!("Server ended the transfer: {}", reason),
                    None => debug!("Server sent error code {}", code),
                }
                Err(ClientError::UnexpectedErrorPacket { code, message: msg })
            }
            other => {
                warn!("Ignoring unexpected {} from {}", other, from);
                Ok(Step::Discard)
            }
        }
    }

    /// Send the packet just encoded into `out` and remember it for retries
    async fn transmit(
        &mut self,
        encoded: Result<usize, PacketError>,
        target: SocketAddr,
    ) -> Result<(), ClientError> {
        self.out_len = encoded?;
        self.out_target = target;
        self.retransmit().await
    }

    async fn retransmit(&mut self) -> Result<(), ClientError> {
        self.socket
            .send_to(&self.out[..self.out_len], self.out_target)
            .await
            .map_err(ClientError::SendFailure)
    }

    /// Best-effort ERROR to the server once it is known
    async fn notify(&mut self, reason: ErrorCode) {
        let Some(peer) = self.peer else {
            return;
        };
        let mut buf = [0u8; MAX_PACKET_SIZE];
        match encode_error(reason.as_u16(), reason.message(), &mut buf) {
            Ok(len) => {
                if let Err(err) = self.socket.send_to(&buf[..len], peer).await {
                    warn!("Could not tell {} about {}: {}", peer, reason, err);
                }
            }
            Err(err) => warn!("Could not encode {}: {}", reason, err),
        }
    }

    fn enter(&mut self, state: ClientState) {
        if self.state != state {
            debug!("Client state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.channels.set_state(state);
        }
    }
}
