//! Serving state machine
//!
//! ```text
//! Idle -> Listening -> SendingBlock -> AwaitingAck -> (next block | Complete)
//!            \                              \
//!             `-----------------------------`--> Failed / Closed
//! ```

use std::io;
use std::net::SocketAddr;

use log::{debug, error, info, warn};
use tokio::time::Instant;

use super::source::FileSource;
use crate::tftp::core::{
    BLOCK_SIZE, ErrorCode, MAX_PACKET_SIZE, MODE_OCTET, Packet, RECV_BUFFER_SIZE, RetryPolicy,
    ServerError, SessionChannels, SessionState, Socket, TransferHandle, channel, encode_data,
    encode_error, is_final_payload,
};

/// Where a served transfer currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Listening,
    SendingBlock,
    AwaitingAck,
    Complete,
    Failed,
    Closed,
}

impl SessionState for ServerState {
    fn is_open(&self) -> bool {
        matches!(
            self,
            ServerState::Idle
                | ServerState::Listening
                | ServerState::SendingBlock
                | ServerState::AwaitingAck
        )
    }
}

/// Emitted after every acknowledged block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeProgress {
    /// Bytes acknowledged by the client
    pub sent: usize,
    /// Size of the file being served
    pub total: usize,
}

impl ServeProgress {
    /// Completion in `0.0..=1.0`
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.sent as f32 / self.total as f32
        }
    }
}

/// Handle of a running server session
pub type Serving = TransferHandle<ServeProgress, Result<(), ServerError>, ServerState>;

type Channels = SessionChannels<ServeProgress, Result<(), ServerError>, ServerState>;

enum Step {
    Discard,
    Continue,
    Done,
}

/// Start a session that answers one read request on `socket`
pub(crate) fn spawn<S: Socket, F: FileSource>(
    socket: S,
    source: F,
    policy: RetryPolicy,
) -> io::Result<Serving> {
    let (handle, channels) = channel(ServerState::Idle, socket.local_addr()?);
    let worker = Worker {
        socket,
        source,
        policy,
        state: ServerState::Idle,
        client: None,
        filename: String::new(),
        data: Vec::new(),
        offset: 0,
        block: 1,
        block_len: 0,
        retries: 0,
        out: [0u8; MAX_PACKET_SIZE],
        out_len: 0,
        channels,
    };
    tokio::spawn(worker.run());
    Ok(handle)
}

/// One server session: waits for an RRQ, then sends the file block by block
pub(crate) struct Worker<S, F> {
    socket: S,
    source: F,
    policy: RetryPolicy,
    state: ServerState,
    client: Option<SocketAddr>,
    filename: String,
    data: Vec<u8>,
    /// Offset of the block in flight
    offset: usize,
    block: u16,
    block_len: usize,
    retries: u32,
    out: [u8; MAX_PACKET_SIZE],
    out_len: usize,
    channels: Channels,
}

impl<S: Socket, F: FileSource> Worker<S, F> {
    async fn run(mut self) {
        match self.serve().await {
            Some(Ok(())) => {
                info!(
                    "Sent {} ({} bytes) to {}",
                    self.filename,
                    self.data.len(),
                    self.peer_name()
                );
                self.enter(ServerState::Complete);
                self.channels.finish(Ok(()));
            }
            Some(Err(err)) => {
                error!("Transfer to {} failed: {}", self.peer_name(), err);
                self.enter(ServerState::Failed);
                self.channels.finish(Err(err));
            }
            None => {
                info!("Server session closed");
                self.enter(ServerState::Closed);
            }
        }
    }

    /// `None` means the owner closed the session
    async fn serve(&mut self) -> Option<Result<(), ServerError>> {
        self.enter(ServerState::Listening);
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        let (client, filename) = loop {
            let received = tokio::select! {
                biased;
                _ = self.channels.closed() => None,
                received = self.socket.recv_timeout(&mut buf, self.policy.timeout) => Some(received),
            };
            match received? {
                Err(err) => return Some(Err(ServerError::ReceiveFailure(err))),
                Ok(None) => continue,
                Ok(Some((len, from))) => match Packet::deserialize(&buf[..len]) {
                    Ok(Packet::Rrq { filename, mode }) => {
                        if !mode.eq_ignore_ascii_case(MODE_OCTET) {
                            warn!("{} asked for mode {}, serving as {}", from, mode, MODE_OCTET);
                        }
                        break (from, filename);
                    }
                    Ok(other) => warn!("Ignoring {} from {} while listening", other, from),
                    Err(err) => warn!("Discarding datagram from {}: {}", from, err),
                },
            }
        };

        info!("Read request for {} from {}", filename, client);
        self.client = Some(client);
        self.filename = filename;

        match self.source.load(&self.filename).await {
            Ok(data) => self.data = data,
            Err(err) => {
                self.notify(ErrorCode::FileNotFound).await;
                return Some(Err(ServerError::FileReadFailure(err)));
            }
        }

        if let Err(err) = self.send_block().await {
            return Some(Err(err));
        }
        let mut deadline = Instant::now() + self.policy.timeout;

        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            let received = tokio::select! {
                biased;
                _ = self.channels.closed() => None,
                received = self.socket.recv_timeout(&mut buf, wait) => Some(received),
            };

            let Some(received) = received else {
                self.notify(ErrorCode::ServerClosed).await;
                return None;
            };

            match received {
                Err(err) => return Some(Err(ServerError::ReceiveFailure(err))),
                Ok(None) => {
                    if self.retries >= self.policy.max_retry {
                        self.notify(ErrorCode::TransferTimeout).await;
                        return Some(Err(ServerError::SendTimeout {
                            block: self.block,
                            retries: self.retries,
                        }));
                    }
                    self.retries += 1;
                    warn!(
                        "Block {} unacknowledged, retransmitting ({}/{})",
                        self.block, self.retries, self.policy.max_retry
                    );
                    if let Err(err) = self.retransmit().await {
                        return Some(Err(err));
                    }
                    deadline = Instant::now() + self.policy.timeout;
                }
                Ok(Some((len, from))) => match self.on_datagram(&buf[..len], from).await {
                    Ok(Step::Discard) => {}
                    Ok(Step::Continue) => deadline = Instant::now() + self.policy.timeout,
                    Ok(Step::Done) => return Some(Ok(())),
                    Err(err) => return Some(Err(err)),
                },
            }
        }
    }

    async fn on_datagram(&mut self, bytes: &[u8], from: SocketAddr) -> Result<Step, ServerError> {
        if self.client != Some(from) {
            warn!("Ignoring datagram from {} during transfer", from);
            return Ok(Step::Discard);
        }

        let packet = match Packet::deserialize(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                warn!("Discarding datagram from {}: {}", from, err);
                return Ok(Step::Discard);
            }
        };

        match packet {
            Packet::Ack(block_num) if block_num == self.block => {
                self.retries = 0;
                let sent = self.offset + self.block_len;
                self.channels.progress(ServeProgress {
                    sent,
                    total: self.data.len(),
                });

                if is_final_payload(self.block_len) {
                    return Ok(Step::Done);
                }
                self.offset = sent;
                self.block = self.block.wrapping_add(1);
                self.send_block().await?;
                Ok(Step::Continue)
            }
            Packet::Ack(block_num) if block_num == self.block.wrapping_sub(1) => {
                debug!("Duplicate ACK {} ignored", block_num);
                Ok(Step::Discard)
            }
            Packet::Ack(block_num) => {
                warn!("ACK {} while block {} is in flight", block_num, self.block);
                let reason = ErrorCode::BlockMismatch;
                self.notify(reason).await;
                Err(ServerError::UnexpectedErrorPacket {
                    code: reason.as_u16(),
                    message: reason.message().to_string(),
                })
            }
            Packet::Error { code, msg } => {
                match ErrorCode::from_u16(code) {
                    Some(reason) => debug!("Client ended the transfer: {}", reason),
                    None => debug!("Client sent error code {}", code),
                }
                Err(ServerError::UnexpectedErrorPacket { code, message: msg })
            }
            Packet::Rrq { .. } => {
                debug!("Repeated request from {} ignored", from);
                Ok(Step::Discard)
            }
            other => {
                warn!("Ignoring unexpected {} from {}", other, from);
                Ok(Step::Discard)
            }
        }
    }

    /// Encode the block starting at `offset` and send it
    async fn send_block(&mut self) -> Result<(), ServerError> {
        self.enter(ServerState::SendingBlock);

        let len = (self.data.len() - self.offset).min(BLOCK_SIZE);
        self.out_len = encode_data(&self.data, self.offset, len, self.block, &mut self.out)
            .map_err(|err| ServerError::SendFailure(io::Error::new(io::ErrorKind::InvalidInput, err)))?;
        self.block_len = len;

        debug!("Sending block {} ({} bytes)", self.block, len);
        self.retransmit().await?;
        self.enter(ServerState::AwaitingAck);
        Ok(())
    }

    async fn retransmit(&mut self) -> Result<(), ServerError> {
        let Some(client) = self.client else {
            return Ok(());
        };
        self.socket
            .send_to(&self.out[..self.out_len], client)
            .await
            .map_err(ServerError::SendFailure)
    }

    /// Best-effort ERROR to the requesting client
    async fn notify(&mut self, reason: ErrorCode) {
        let Some(client) = self.client else {
            return;
        };
        let mut buf = [0u8; MAX_PACKET_SIZE];
        match encode_error(reason.as_u16(), reason.message(), &mut buf) {
            Ok(len) => {
                if let Err(err) = self.socket.send_to(&buf[..len], client).await {
                    warn!("Could not tell {} about {}: {}", client, reason, err);
                }
            }
            Err(err) => warn!("Could not encode {}: {}", reason, err),
        }
    }

    fn peer_name(&self) -> String {
        self.client
            .map(|client| client.to_string())
            .unwrap_or_else(|| "nobody".to_string())
    }

    fn enter(&mut self, state: ServerState) {
        if self.state != state {
            debug!("Server state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.channels.set_state(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::tftp::core::testing::{Incoming, ScriptedSocket, SentLog, sent_packets};
    use crate::tftp::server::FsSource;

    fn client() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn rrq(filename: &str) -> Incoming {
        Incoming::packet(
            Packet::Rrq { filename: filename.into(), mode: "octet".into() },
            client(),
        )
    }

    fn ack(block: u16) -> Incoming {
        Incoming::packet(Packet::Ack(block), client())
    }

    fn policy() -> RetryPolicy {
        RetryPolicy { timeout: Duration::from_millis(10), max_retry: 3 }
    }

    fn serve(file: Vec<u8>, script: Vec<Incoming>) -> (Serving, SentLog) {
        let (socket, sent) = ScriptedSocket::new(script);
        (spawn(socket, file, policy()).unwrap(), sent)
    }

    fn error_packet(reason: ErrorCode) -> Packet {
        Packet::Error { code: reason.as_u16(), msg: reason.message().into() }
    }

    fn data_blocks(sent: &SentLog) -> Vec<(u16, usize)> {
        sent_packets(sent)
            .into_iter()
            .filter_map(|packet| match packet {
                Packet::Data { block_num, data } => Some((block_num, data.len())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn serves_file_in_two_blocks() {
        let file: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let (mut handle, sent) = serve(file.clone(), vec![rrq("f"), ack(1), ack(2)]);

        let first = handle.next_progress().await.unwrap();
        assert_eq!(first, ServeProgress { sent: 512, total: 1000 });
        assert!((first.fraction() - 0.512).abs() < f32::EPSILON);
        let second = handle.next_progress().await.unwrap();
        assert_eq!(second.fraction(), 1.0);
        assert_eq!(handle.next_progress().await, None);

        handle.wait().await.unwrap().unwrap();

        let packets = sent_packets(&sent);
        assert_eq!(
            packets,
            vec![
                Packet::Data { block_num: 1, data: file[..512].to_vec() },
                Packet::Data { block_num: 2, data: file[512..].to_vec() },
            ]
        );
        assert!(sent.lock().unwrap().iter().all(|(_, to)| *to == client()));
    }

    #[tokio::test]
    async fn empty_file_is_one_empty_block() {
        let (mut handle, sent) = serve(Vec::new(), vec![rrq("empty"), ack(1)]);

        let progress = handle.next_progress().await.unwrap();
        assert_eq!(progress.fraction(), 1.0);
        handle.wait().await.unwrap().unwrap();
        assert_eq!(data_blocks(&sent), vec![(1, 0)]);
    }

    #[tokio::test]
    async fn exact_multiple_ends_with_empty_block() {
        let (handle, sent) = serve(vec![7; 1024], vec![rrq("f"), ack(1), ack(2), ack(3)]);

        handle.wait().await.unwrap().unwrap();
        assert_eq!(data_blocks(&sent), vec![(1, 512), (2, 512), (3, 0)]);
    }

    #[tokio::test]
    async fn times_out_after_max_retry_with_same_block() {
        let (handle, sent) = serve(
            vec![1; 700],
            vec![
                rrq("f"),
                ack(1),
                Incoming::Timeout,
                Incoming::Timeout,
                Incoming::Timeout,
                Incoming::Timeout,
            ],
        );

        let err = handle.wait().await.unwrap().unwrap_err();
        assert!(matches!(err, ServerError::SendTimeout { block: 2, retries: 3 }));
        assert_eq!(data_blocks(&sent), vec![(1, 512), (2, 188), (2, 188), (2, 188), (2, 188)]);
        assert_eq!(
            sent_packets(&sent).last(),
            Some(&error_packet(ErrorCode::TransferTimeout))
        );
    }

    #[tokio::test]
    async fn mismatched_ack_is_escalated() {
        let (handle, sent) = serve(vec![1; 2000], vec![rrq("f"), ack(1), ack(9)]);

        match handle.wait().await.unwrap() {
            Err(ServerError::UnexpectedErrorPacket { code, .. }) => assert_eq!(code, 1002),
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(
            sent_packets(&sent).last(),
            Some(&error_packet(ErrorCode::BlockMismatch))
        );
    }

    #[tokio::test]
    async fn duplicate_ack_is_ignored() {
        let (handle, sent) = serve(vec![1; 600], vec![rrq("f"), ack(1), ack(1), ack(2)]);

        handle.wait().await.unwrap().unwrap();
        assert_eq!(data_blocks(&sent), vec![(1, 512), (2, 88)]);
    }

    #[tokio::test]
    async fn block_numbers_wrap_past_65535() {
        let blocks = 65_537usize;
        let file = vec![0x42; (blocks - 1) * BLOCK_SIZE + 10];
        let mut script = vec![rrq("big")];
        for i in 1..=blocks {
            script.push(ack((i % 65_536) as u16));
            if i == 65_535 {
                // block 0 is now in flight; a repeat of 65535 is the duplicate
                script.push(ack(65_535));
            }
        }
        let (handle, sent) = serve(file, script);

        handle.wait().await.unwrap().unwrap();

        let sent_blocks = data_blocks(&sent);
        assert_eq!(sent_blocks.len(), blocks);
        let around_wrap: Vec<u16> = sent_blocks[65_533..].iter().map(|(block, _)| *block).collect();
        assert_eq!(around_wrap, vec![65_534, 65_535, 0, 1]);
        assert_eq!(sent_blocks.last(), Some(&(1, 10)));
    }

    #[tokio::test]
    async fn missing_file_sends_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, sent) = ScriptedSocket::new(vec![rrq("missing.bin")]);
        let handle = spawn(socket, FsSource::new(dir.path()), policy()).unwrap();

        let err = handle.wait().await.unwrap().unwrap_err();
        assert!(matches!(err, ServerError::FileReadFailure(_)));
        assert_eq!(err.code(), 1);
        assert_eq!(sent_packets(&sent), vec![error_packet(ErrorCode::FileNotFound)]);
    }

    #[tokio::test]
    async fn client_error_packet_ends_transfer() {
        let (handle, _) = serve(
            vec![1; 2000],
            vec![
                rrq("f"),
                Incoming::packet(Packet::Error { code: 1004, msg: "bye".into() }, client()),
            ],
        );

        match handle.wait().await.unwrap() {
            Err(ServerError::UnexpectedErrorPacket { code, message }) => {
                assert_eq!(code, 1004);
                assert_eq!(message, "bye");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn listening_ignores_noise_until_a_request() {
        let (handle, sent) = serve(
            vec![5; 3],
            vec![
                Incoming::Timeout,
                ack(4),
                Incoming::Datagram(vec![1], client()),
                rrq("f"),
                ack(1),
            ],
        );

        handle.wait().await.unwrap().unwrap();
        assert_eq!(data_blocks(&sent), vec![(1, 3)]);
    }

    #[tokio::test]
    async fn other_hosts_cannot_interfere() {
        let stranger: SocketAddr = "127.0.0.1:1234".parse().unwrap();
        let (handle, sent) = serve(
            vec![1; 10],
            vec![
                rrq("f"),
                Incoming::packet(Packet::Ack(9), stranger),
                ack(1),
            ],
        );

        handle.wait().await.unwrap().unwrap();
        assert_eq!(data_blocks(&sent), vec![(1, 10)]);
    }

    #[tokio::test]
    async fn close_mid_transfer_sends_server_closed() {
        let (mut handle, sent) = serve(vec![1; 2000], vec![rrq("f"), ack(1)]);

        assert!(handle.next_progress().await.is_some());
        handle.close();
        assert_eq!(handle.next_progress().await, None);
        assert_eq!(handle.state(), ServerState::Closed);
        assert!(handle.wait().await.is_none());

        assert_eq!(
            sent_packets(&sent).last(),
            Some(&error_packet(ErrorCode::ServerClosed))
        );
    }

    #[tokio::test]
    async fn close_while_listening_sends_nothing() {
        let (mut handle, sent) = serve(vec![1; 10], vec![]);

        assert!(handle.is_open());
        handle.close();
        assert_eq!(handle.next_progress().await, None);
        assert!(handle.wait().await.is_none());
        assert!(sent_packets(&sent).is_empty());
    }

    #[tokio::test]
    async fn receive_failure_is_fatal() {
        let (handle, _) = serve(
            vec![1; 10],
            vec![rrq("f"), Incoming::Fail(io::ErrorKind::ConnectionReset)],
        );

        let err = handle.wait().await.unwrap().unwrap_err();
        assert!(matches!(err, ServerError::ReceiveFailure(_)));
    }

    #[tokio::test]
    async fn send_failure_is_fatal() {
        let (socket, _) = ScriptedSocket::new(vec![rrq("f")]);
        let handle = spawn(socket.failing_sends(), vec![1; 10], policy()).unwrap();

        let err = handle.wait().await.unwrap().unwrap_err();
        assert!(matches!(err, ServerError::SendFailure(_)));
    }
}
