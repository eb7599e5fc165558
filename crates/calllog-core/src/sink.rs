//! One-shot result delivery
//!
//! A [`ResultSink`] is consumed by the call that delivers through it, so a
//! second delivery does not compile. Dropping a sink without delivering is
//! logged and, for channel-backed sinks, observed by the receiver as an
//! internal error.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::warn;

use crate::error::{BridgeError, BridgeResult};
use crate::request::Reply;

type Callback = Box<dyn FnOnce(BridgeResult<Reply>) + Send + 'static>;

enum Target {
    Channel(oneshot::Sender<BridgeResult<Reply>>),
    Callback(Callback),
}

/// Delivers exactly one success or error to the caller
pub struct ResultSink {
    target: Option<Target>,
}

impl ResultSink {
    /// Sink backed by a oneshot channel, plus the future resolving to its outcome
    pub fn channel() -> (Self, PendingReply) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                target: Some(Target::Channel(tx)),
            },
            PendingReply { rx },
        )
    }

    /// Sink invoking `callback` with the outcome
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: FnOnce(BridgeResult<Reply>) + Send + 'static,
    {
        Self {
            target: Some(Target::Callback(Box::new(callback))),
        }
    }

    pub fn success(self, reply: Reply) {
        self.deliver(Ok(reply));
    }

    pub fn error(self, error: BridgeError) {
        self.deliver(Err(error));
    }

    pub fn deliver(mut self, outcome: BridgeResult<Reply>) {
        match self.target.take() {
            Some(Target::Channel(tx)) => {
                // Receiver gone means the caller stopped listening.
                let _ = tx.send(outcome);
            }
            Some(Target::Callback(callback)) => callback(outcome),
            None => {}
        }
    }
}

impl Drop for ResultSink {
    fn drop(&mut self) {
        if self.target.is_some() {
            warn!(target: crate::LOG_TARGET, "result sink dropped without a reply");
        }
    }
}

impl fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.target {
            Some(Target::Channel(_)) => "channel",
            Some(Target::Callback(_)) => "callback",
            None => "spent",
        };
        f.debug_struct("ResultSink").field("target", &kind).finish()
    }
}

/// Receiving side of [`ResultSink::channel`]
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<BridgeResult<Reply>>,
}

impl PendingReply {
    /// Non-blocking check; `None` while the request is still pending
    pub fn try_take(&mut self) -> Option<BridgeResult<Reply>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(dropped())),
        }
    }
}

impl Future for PendingReply {
    type Output = BridgeResult<Reply>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(dropped())))
    }
}

fn dropped() -> BridgeError {
    BridgeError::internal("result sink dropped")
}
