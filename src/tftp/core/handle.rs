//! Output side of a running transfer
//!
//! A transfer runs as its own task. The owner keeps a [`TransferHandle`] and
//! talks to the task only through channels: a progress stream, a one-shot
//! terminal result, a close signal, and the session state.

use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot, watch};

/// Session states that can tell whether the transport is still held
pub trait SessionState: Copy + Send + Sync + 'static {
    fn is_open(&self) -> bool;
}

/// Owner's view of a transfer running in the background
#[derive(Debug)]
pub struct TransferHandle<P, R, S> {
    progress: mpsc::UnboundedReceiver<P>,
    result: oneshot::Receiver<R>,
    close: watch::Sender<bool>,
    state: watch::Receiver<S>,
    local_addr: SocketAddr,
}

impl<P, R, S: SessionState> TransferHandle<P, R, S> {
    /// Next progress event, or `None` once the transfer has ended
    pub async fn next_progress(&mut self) -> Option<P> {
        self.progress.recv().await
    }

    /// Wait for the terminal result.
    ///
    /// Returns `None` when the transfer was closed before it finished.
    pub async fn wait(self) -> Option<R> {
        let Self { result, close, .. } = self;
        let outcome = result.await.ok();
        drop(close);
        outcome
    }

    /// Ask the transfer to stop. Calling it again is a no-op.
    pub fn close(&self) {
        self.close.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.close.borrow()
    }

    pub fn state(&self) -> S {
        *self.state.borrow()
    }

    /// Whether the session still owns its transport
    pub fn is_open(&self) -> bool {
        !self.is_closed() && self.state().is_open()
    }

    /// Address of the transport owned by the session
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Session side of a [`TransferHandle`]
#[derive(Debug)]
pub(crate) struct SessionChannels<P, R, S> {
    progress: mpsc::UnboundedSender<P>,
    result: Option<oneshot::Sender<R>>,
    close: watch::Receiver<bool>,
    state: watch::Sender<S>,
}

impl<P, R, S: SessionState> SessionChannels<P, R, S> {
    pub(crate) fn progress(&self, event: P) {
        // A dropped receiver only means nobody is watching.
        let _ = self.progress.send(event);
    }

    pub(crate) fn set_state(&self, state: S) {
        self.state.send_replace(state);
    }

    /// Deliver the terminal result; only the first call has any effect
    pub(crate) fn finish(&mut self, result: R) {
        if let Some(tx) = self.result.take() {
            let _ = tx.send(result);
        }
    }

    pub(crate) fn close_requested(&self) -> bool {
        *self.close.borrow()
    }

    /// Resolves once close is requested or the handle is gone
    pub(crate) async fn closed(&mut self) {
        let _ = self.close.wait_for(|closed| *closed).await;
    }
}

/// Create both ends of a transfer's channels
pub(crate) fn channel<P, R, S: SessionState>(
    initial: S,
    local_addr: SocketAddr,
) -> (TransferHandle<P, R, S>, SessionChannels<P, R, S>) {
    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let (result_tx, result_rx) = oneshot::channel();
    let (close_tx, close_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(initial);

    let handle = TransferHandle {
        progress: progress_rx,
        result: result_rx,
        close: close_tx,
        state: state_rx,
        local_addr,
    };
    let session = SessionChannels {
        progress: progress_tx,
        result: Some(result_tx),
        close: close_rx,
        state: state_tx,
    };
    (handle, session)
}
