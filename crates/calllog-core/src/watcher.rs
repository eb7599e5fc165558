//! Call-state watcher
//!
//! Waits for the device to return to [`CallState::Idle`] and resolves the
//! sink it was handed. The subscription lives only as long as the wait:
//! it is dropped before the result is delivered, so it can never fire a
//! second time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::platform::CallStateSource;
use crate::request::Reply;
use crate::sink::ResultSink;

/// Device-level call state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallState {
    /// No call; terminal for a wait
    Idle,
    /// Incoming call ringing
    Ringing,
    /// A call is dialing, active or on hold
    Offhook,
}

impl CallState {
    /// Platform integer code
    pub fn code(self) -> i32 {
        match self {
            CallState::Idle => 0,
            CallState::Ringing => 1,
            CallState::Offhook => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(CallState::Idle),
            1 => Some(CallState::Ringing),
            2 => Some(CallState::Offhook),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == CallState::Idle
    }
}

/// One notification from the call-state stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStateEvent {
    pub state: CallState,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl CallStateEvent {
    pub fn new(state: CallState) -> Self {
        Self {
            state,
            phone_number: None,
        }
    }

    pub fn ringing(phone_number: impl Into<String>) -> Self {
        Self {
            state: CallState::Ringing,
            phone_number: Some(phone_number.into()),
        }
    }
}

/// Resolves a pending sink when the current call ends
pub struct CallStateWatcher {
    source: Arc<dyn CallStateSource>,
    active: Arc<AtomicBool>,
    timeout: Option<Duration>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl CallStateWatcher {
    /// `timeout` of `None` waits indefinitely
    pub fn new(source: Arc<dyn CallStateSource>, timeout: Option<Duration>) -> Self {
        Self {
            source,
            active: Arc::new(AtomicBool::new(false)),
            timeout,
            cancel: Mutex::new(None),
        }
    }

    /// Whether a subscription is currently registered
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Subscribe and resolve `sink` on the first idle observation
    ///
    /// `on_finished` runs once the subscription is gone and before the
    /// sink is resolved, including when the task is dropped with its
    /// runtime. It is not called when the wait is refused because another
    /// one is active.
    pub fn begin_wait_for_call_end<F>(&self, sink: ResultSink, on_finished: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            sink.error(BridgeError::AlreadyRunning);
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.active.store(false, Ordering::Release);
                on_finished();
                sink.error(BridgeError::unavailable("No async runtime to observe call state."));
                return;
            }
        };

        // Register before returning so no transition after this call is missed.
        let mut events = self.source.subscribe();
        let release = WaitRelease {
            active: self.active.clone(),
            on_finished: Some(on_finished),
        };
        let (cancel_tx, cancelled) = oneshot::channel();
        *self.cancel.lock() = Some(cancel_tx);
        let timeout = self.timeout;
        debug!(target: crate::LOG_TARGET, "listening for call state changes");

        runtime.spawn(async move {
            let wait = async {
                match timeout {
                    Some(limit) => match tokio::time::timeout(limit, wait_for_idle(&mut events)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(target: crate::LOG_TARGET, "call did not end within {:?}", limit);
                            Err(BridgeError::Timeout {
                                seconds: limit.as_secs(),
                            })
                        }
                    },
                    None => wait_for_idle(&mut events).await,
                }
            };
            let outcome = tokio::select! {
                outcome = wait => outcome,
                _ = cancelled => {
                    info!(target: crate::LOG_TARGET, "call state wait cancelled");
                    Err(BridgeError::unavailable("Call state wait cancelled."))
                }
            };

            drop(events);
            drop(release);
            sink.deliver(outcome.map(|()| Reply::Null));
        });
    }

    /// Abandon the active wait, resolving its sink with `UNAVAILABLE`
    ///
    /// Returns `false` when no wait is active. The release runs on the
    /// wait task, not before this returns.
    pub fn cancel(&self) -> bool {
        match self.cancel.lock().take() {
            Some(cancel) => cancel.send(()).is_ok(),
            None => false,
        }
    }
}

/// Clears the active flag and runs the release callback when dropped
struct WaitRelease<F: FnOnce()> {
    active: Arc<AtomicBool>,
    on_finished: Option<F>,
}

impl<F: FnOnce()> Drop for WaitRelease<F> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(on_finished) = self.on_finished.take() {
            on_finished();
        }
    }
}

async fn wait_for_idle(events: &mut broadcast::Receiver<CallStateEvent>) -> BridgeResult<()> {
    loop {
        match events.recv().await {
            Ok(event) => match event.state {
                CallState::Idle => {
                    info!(target: crate::LOG_TARGET, "Call ended");
                    return Ok(());
                }
                CallState::Offhook => {
                    debug!(target: crate::LOG_TARGET, "Call in progress");
                }
                CallState::Ringing => {
                    debug!(
                        target: crate::LOG_TARGET,
                        "Incoming call from {}",
                        event.phone_number.as_deref().unwrap_or("unknown")
                    );
                }
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(target: crate::LOG_TARGET, "call state listener lagged, {} events skipped", skipped);
            }
            Err(RecvError::Closed) => {
                return Err(BridgeError::unavailable("Call state stream closed."));
            }
        }
    }
}
