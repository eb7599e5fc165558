//! Single-flight request gate
//!
//! The gate owns one request slot. A request moves through it as:
//!
//! ```text
//!            submit                     all capabilities held
//!   Idle ───────────────► Dispatching ─────────────────────────► execute ──► Idle
//!     ▲                       │                                     │
//!     │                       │ capability missing                  │ call-state wait
//!     │                       ▼                                     ▼
//!     │             AwaitingAuthorization                    AwaitingCallEnd
//!     │                       │                                     │
//!     └─── denied ◄───────────┴── granted ──► execute               └── idle observed ──► Idle
//! ```
//!
//! Every path out of a non-idle state clears the slot before the result is
//! delivered, so the sink may submit the next request from its callback.
//! A submit that finds the slot occupied is answered with
//! `ALREADY_RUNNING` and leaves the occupant untouched.

use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, BridgeResult};
use crate::permission::{missing_permissions, Authorizer, GrantResult, Permission, GATE_REQUEST_CODE};
use crate::request::Request;
use crate::sink::ResultSink;
use crate::watcher::CallStateWatcher;

/// Observable phase of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    Dispatching,
    AwaitingAuthorization,
    AwaitingCallEnd,
}

enum Slot {
    Idle,
    Dispatching {
        method: &'static str,
    },
    AwaitingAuthorization {
        request: Request,
        sink: ResultSink,
        permissions: Vec<Permission>,
    },
    AwaitingCallEnd,
}

impl Slot {
    fn phase(&self) -> GatePhase {
        match self {
            Slot::Idle => GatePhase::Idle,
            Slot::Dispatching { .. } => GatePhase::Dispatching,
            Slot::AwaitingAuthorization { .. } => GatePhase::AwaitingAuthorization,
            Slot::AwaitingCallEnd => GatePhase::AwaitingCallEnd,
        }
    }

    fn method(&self) -> Option<&'static str> {
        match self {
            Slot::Idle => None,
            Slot::Dispatching { method } => Some(*method),
            Slot::AwaitingAuthorization { request, .. } => Some(request.method()),
            Slot::AwaitingCallEnd => Some(Request::WaitForCallEnd.method()),
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::AwaitingAuthorization { permissions, .. } => f
                .debug_struct("AwaitingAuthorization")
                .field("method", &self.method())
                .field("permissions", permissions)
                .finish(),
            other => write!(f, "{:?}({:?})", other.phase(), other.method()),
        }
    }
}

struct GateInner {
    slot: Mutex<Slot>,
    authorizer: Arc<dyn Authorizer>,
    dispatcher: Dispatcher,
    watcher: CallStateWatcher,
    base_permissions: Vec<Permission>,
}

impl GateInner {
    fn release(&self) {
        *self.slot.lock() = Slot::Idle;
    }
}

/// Serializes requests and interleaves authorization prompts
///
/// Cloning yields another handle to the same slot.
#[derive(Clone)]
pub struct RequestGate {
    inner: Arc<GateInner>,
}

impl RequestGate {
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        dispatcher: Dispatcher,
        watcher: CallStateWatcher,
        base_permissions: Vec<Permission>,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                slot: Mutex::new(Slot::Idle),
                authorizer,
                dispatcher,
                watcher,
                base_permissions,
            }),
        }
    }

    pub fn phase(&self) -> GatePhase {
        self.inner.slot.lock().phase()
    }

    pub fn is_idle(&self) -> bool {
        self.phase() == GatePhase::Idle
    }

    /// Method name of the request occupying the slot
    pub fn pending_method(&self) -> Option<&'static str> {
        self.inner.slot.lock().method()
    }

    /// Accept `request` if the slot is free, otherwise reject it through `sink`
    pub fn submit(&self, request: Request, sink: ResultSink) {
        let method = request.method();
        {
            let mut slot = self.inner.slot.lock();
            if let Some(pending) = slot.method() {
                drop(slot);
                reject_busy(method, pending, sink);
                return;
            }
            *slot = Slot::Dispatching { method };
        }

        if let Err(err) = self.inner.dispatcher.precheck(&request) {
            debug!(target: crate::LOG_TARGET, "{} failed platform check: {}", method, err);
            self.inner.release();
            sink.error(err);
            return;
        }

        let required = request.required_permissions(&self.inner.base_permissions);
        let missing = missing_permissions(self.inner.authorizer.as_ref(), &required);
        if missing.is_empty() {
            self.dispatch(request, sink);
            return;
        }

        info!(target: crate::LOG_TARGET, "{} needs {:?}, prompting", method, missing);
        *self.inner.slot.lock() = Slot::AwaitingAuthorization {
            request,
            sink,
            permissions: missing.clone(),
        };

        if let Err(err) = self.inner.authorizer.request(&missing, GATE_REQUEST_CODE) {
            // The prompt was never shown, so no callback will come.
            if let Some((_, sink)) = self.take_awaiting() {
                self.inner.release();
                sink.error(err);
            }
        }
    }

    /// Submit the result of decoding a `method` call
    ///
    /// An occupied slot wins over a decoding failure: the caller sees
    /// `ALREADY_RUNNING` whatever the shape of its arguments.
    pub fn submit_decoded(&self, method: &str, decoded: BridgeResult<Request>, sink: ResultSink) {
        let err = match decoded {
            Ok(request) => return self.submit(request, sink),
            Err(err) => err,
        };
        let pending = self.inner.slot.lock().method();
        match pending {
            Some(pending) => reject_busy(method, pending, sink),
            None => {
                debug!(target: crate::LOG_TARGET, "{} rejected at decode: {}", method, err);
                sink.error(err);
            }
        }
    }

    /// Authorization callback from the platform
    ///
    /// Returns `false` when `request_code` belongs to someone else. Empty
    /// `grants` mean the prompt was dismissed and count as a denial.
    pub fn on_authorization_result(
        &self,
        request_code: i32,
        permissions: &[Permission],
        grants: &[GrantResult],
    ) -> bool {
        if request_code != GATE_REQUEST_CODE {
            return false;
        }

        let Some((request, sink)) = self.take_awaiting() else {
            warn!(target: crate::LOG_TARGET, "authorization result for {:?} with nothing pending", permissions);
            return true;
        };

        let all_granted = !grants.is_empty() && grants.iter().all(|g| g.is_granted());
        if all_granted {
            debug!(target: crate::LOG_TARGET, "{:?} granted, resuming {}", permissions, request.method());
            self.dispatch(request, sink);
        } else {
            info!(target: crate::LOG_TARGET, "{:?} denied, failing {}", permissions, request.method());
            self.inner.release();
            sink.error(BridgeError::permission_denied("Permissions not granted."));
        }
        true
    }

    /// Abandon whatever occupies the slot
    ///
    /// A request awaiting authorization fails with `UNAVAILABLE` at once
    /// and a late authorization callback then finds nothing pending. A
    /// call-end wait is cancelled and frees the slot from its own task.
    pub fn reset(&self) {
        let mut slot = self.inner.slot.lock();
        let previous = mem::replace(&mut *slot, Slot::Idle);
        match previous {
            Slot::AwaitingAuthorization { request, sink, .. } => {
                drop(slot);
                info!(target: crate::LOG_TARGET, "host detached, failing {}", request.method());
                sink.error(BridgeError::unavailable("Activity detached."));
            }
            Slot::AwaitingCallEnd => {
                *slot = Slot::AwaitingCallEnd;
                drop(slot);
                info!(target: crate::LOG_TARGET, "host detached, cancelling call state wait");
                self.inner.watcher.cancel();
            }
            other => *slot = other,
        }
    }

    /// Move an awaiting request out of the slot, leaving it reserved
    fn take_awaiting(&self) -> Option<(Request, ResultSink)> {
        let mut slot = self.inner.slot.lock();
        match mem::replace(&mut *slot, Slot::Idle) {
            Slot::AwaitingAuthorization { request, sink, .. } => {
                *slot = Slot::Dispatching {
                    method: request.method(),
                };
                Some((request, sink))
            }
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Run a request whose capabilities are held; the slot is reserved
    fn dispatch(&self, request: Request, sink: ResultSink) {
        if request.is_suspending() {
            *self.inner.slot.lock() = Slot::AwaitingCallEnd;
            let gate: Weak<GateInner> = Arc::downgrade(&self.inner);
            self.inner.watcher.begin_wait_for_call_end(sink, move || {
                if let Some(inner) = gate.upgrade() {
                    let mut slot = inner.slot.lock();
                    if matches!(*slot, Slot::AwaitingCallEnd) {
                        *slot = Slot::Idle;
                    }
                }
            });
            return;
        }

        let method = request.method();
        let outcome = self.inner.dispatcher.execute(&request);
        self.inner.release();
        match &outcome {
            Ok(_) => debug!(target: crate::LOG_TARGET, "{} completed", method),
            Err(err) => info!(target: crate::LOG_TARGET, "{} failed with {}: {}", method, err.code(), err),
        }
        sink.deliver(outcome);
    }
}

fn reject_busy(method: &str, pending: &str, sink: ResultSink) {
    warn!(
        target: crate::LOG_TARGET,
        "rejecting {}: {} is still pending",
        method,
        pending
    );
    sink.error(BridgeError::AlreadyRunning);
}

impl fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestGate")
            .field("slot", &*self.inner.slot.lock())
            .field("base_permissions", &self.inner.base_permissions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::{MemoryAuthorizer, MemoryCallLog, SimulatedTelephony};
    use crate::recordings::RecordingScanner;
    use crate::request::Reply;

    const BASE: [Permission; 2] = [Permission::ReadCallLog, Permission::ReadPhoneState];

    fn gate(authorizer: Arc<MemoryAuthorizer>) -> RequestGate {
        let telephony = Arc::new(SimulatedTelephony::new());
        let dispatcher = Dispatcher::new(
            Arc::new(MemoryCallLog::new()),
            telephony.clone(),
            RecordingScanner::new("/nonexistent-root"),
            28,
        );
        RequestGate::new(
            authorizer,
            dispatcher,
            CallStateWatcher::new(telephony, None),
            BASE.to_vec(),
        )
    }

    #[test]
    fn granted_request_dispatches_without_prompt() {
        let authorizer = Arc::new(MemoryAuthorizer::granting(BASE));
        let gate = gate(authorizer.clone());
        let (sink, mut pending) = ResultSink::channel();
        gate.submit(Request::Get, sink);
        assert_eq!(pending.try_take(), Some(Ok(Reply::Records(vec![]))));
        assert_eq!(authorizer.prompt_count(), 0);
        assert!(gate.is_idle());
    }

    #[test]
    fn missing_capability_suspends_until_callback() {
        let authorizer = Arc::new(MemoryAuthorizer::granting([Permission::ReadCallLog]));
        let gate = gate(authorizer.clone());
        let (sink, mut pending) = ResultSink::channel();
        gate.submit(Request::Get, sink);

        assert!(pending.try_take().is_none());
        assert_eq!(gate.phase(), GatePhase::AwaitingAuthorization);
        assert_eq!(gate.pending_method(), Some("get"));
        assert_eq!(authorizer.prompts()[0].permissions, vec![Permission::ReadPhoneState]);

        assert!(gate.on_authorization_result(
            GATE_REQUEST_CODE,
            &[Permission::ReadPhoneState],
            &[GrantResult::Granted],
        ));
        assert_eq!(pending.try_take(), Some(Ok(Reply::Records(vec![]))));
        assert!(gate.is_idle());
    }

    #[test]
    fn foreign_request_code_is_not_consumed() {
        let gate = gate(Arc::new(MemoryAuthorizer::new()));
        let (sink, mut pending) = ResultSink::channel();
        gate.submit(Request::Get, sink);
        assert!(!gate.on_authorization_result(1, &BASE, &[GrantResult::Granted; 2]));
        assert!(pending.try_take().is_none());
        assert_eq!(gate.phase(), GatePhase::AwaitingAuthorization);
    }

    #[test]
    fn dismissed_prompt_counts_as_denial() {
        let gate = gate(Arc::new(MemoryAuthorizer::new()));
        let (sink, mut pending) = ResultSink::channel();
        gate.submit(Request::Get, sink);
        assert!(gate.on_authorization_result(GATE_REQUEST_CODE, &[], &[]));
        assert_eq!(
            pending.try_take().unwrap().unwrap_err().code(),
            "PERMISSION_NOT_GRANTED"
        );
        assert!(gate.is_idle());
    }

    #[test]
    fn occupied_slot_outranks_decode_failure() {
        let gate = gate(Arc::new(MemoryAuthorizer::new()));
        let (occupant, mut occupant_pending) = ResultSink::channel();
        gate.submit(Request::Get, occupant);

        for err in [BridgeError::missing_arg("number"), BridgeError::not_implemented("bogus")] {
            let (sink, mut pending) = ResultSink::channel();
            gate.submit_decoded("makeCall", Err(err), sink);
            assert_eq!(pending.try_take(), Some(Err(BridgeError::AlreadyRunning)));
        }
        assert_eq!(gate.pending_method(), Some("get"));
        assert!(occupant_pending.try_take().is_none());
    }

    #[test]
    fn decode_failure_on_idle_gate_leaves_it_idle() {
        let gate = gate(Arc::new(MemoryAuthorizer::new()));
        let (sink, mut pending) = ResultSink::channel();
        gate.submit_decoded("makeCall", Err(BridgeError::missing_arg("number")), sink);
        assert_eq!(pending.try_take(), Some(Err(BridgeError::missing_arg("number"))));
        assert!(gate.is_idle());
    }

    #[test]
    fn reset_fails_the_request_awaiting_authorization() {
        let gate = gate(Arc::new(MemoryAuthorizer::new()));
        let (sink, mut pending) = ResultSink::channel();
        gate.submit(Request::Get, sink);

        gate.reset();
        assert_eq!(pending.try_take().unwrap().unwrap_err().code(), "UNAVAILABLE");
        assert!(gate.is_idle());
        // The answer to the abandoned prompt resumes nothing.
        assert!(gate.on_authorization_result(GATE_REQUEST_CODE, &BASE, &[GrantResult::Granted; 2]));
        assert!(gate.is_idle());
    }

    #[test]
    fn reset_on_idle_gate_is_a_no_op() {
        let gate = gate(Arc::new(MemoryAuthorizer::granting(BASE)));
        gate.reset();
        assert!(gate.is_idle());
    }

    #[test]
    fn stray_callback_is_ignored() {
        let gate = gate(Arc::new(MemoryAuthorizer::new()));
        assert!(gate.on_authorization_result(GATE_REQUEST_CODE, &BASE, &[GrantResult::Granted; 2]));
        assert!(gate.is_idle());
    }
}
