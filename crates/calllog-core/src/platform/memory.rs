//! In-memory platform
//!
//! Stand-ins for the device services, driven by the CLI host and the test
//! suites. Every type records what was asked of it so callers can assert
//! on prompts, dialed numbers and live listeners.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};
use url::Url;

use super::{CallControl, CallLogStore, CallStateSource, Platform};
use crate::error::{BridgeError, BridgeResult, StoreError};
use crate::filter::CallLogFilter;
use crate::permission::{Authorizer, Permission};
use crate::record::CallLogRow;
use crate::watcher::CallStateEvent;

/// Default API level reported by [`SimulatedTelephony`]
pub const DEFAULT_API_LEVEL: u32 = 34;

const CALL_STATE_CAPACITY: usize = 64;

/// Call log held in memory
#[derive(Debug, Default)]
pub struct MemoryCallLog {
    rows: RwLock<Vec<CallLogRow>>,
    failing: AtomicBool,
    queries: AtomicUsize,
}

impl MemoryCallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<CallLogRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
            ..Self::default()
        }
    }

    pub fn insert(&self, row: CallLogRow) {
        self.rows.write().push(row);
    }

    /// Make every following query fail as if the provider returned nothing
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of queries served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl CallLogStore for MemoryCallLog {
    fn query(&self, filter: &CallLogFilter) -> Result<Vec<CallLogRow>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::NoResult);
        }
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }
}

/// A prompt issued through [`MemoryAuthorizer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPrompt {
    pub permissions: Vec<Permission>,
    pub request_code: i32,
}

/// Grant table with a prompt log
#[derive(Debug)]
pub struct MemoryAuthorizer {
    granted: RwLock<HashSet<Permission>>,
    prompts: Mutex<Vec<PermissionPrompt>>,
    attached: AtomicBool,
}

impl MemoryAuthorizer {
    /// Nothing granted, activity attached
    pub fn new() -> Self {
        Self::granting(std::iter::empty::<Permission>())
    }

    pub fn granting(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            granted: RwLock::new(permissions.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            attached: AtomicBool::new(true),
        }
    }

    pub fn grant_all() -> Self {
        Self::granting(Permission::ALL)
    }

    pub fn grant(&self, permission: Permission) {
        self.granted.write().insert(permission);
    }

    pub fn revoke(&self, permission: Permission) {
        self.granted.write().remove(&permission);
    }

    /// Simulate the host losing its foreground activity
    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    pub fn attach(&self) {
        self.attached.store(true, Ordering::SeqCst);
    }

    pub fn prompts(&self) -> Vec<PermissionPrompt> {
        self.prompts.lock().clone()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

impl Default for MemoryAuthorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Authorizer for MemoryAuthorizer {
    fn is_granted(&self, permission: Permission) -> bool {
        self.granted.read().contains(&permission)
    }

    fn request(&self, permissions: &[Permission], request_code: i32) -> BridgeResult<()> {
        if !self.attached.load(Ordering::SeqCst) {
            return Err(BridgeError::permission_denied(
                "Permission request failed. Activity is null.",
            ));
        }
        debug!(target: crate::LOG_TARGET, "prompting for {:?} (code {})", permissions, request_code);
        self.prompts.lock().push(PermissionPrompt {
            permissions: permissions.to_vec(),
            request_code,
        });
        Ok(())
    }
}

/// Telephony and telecom services with a controllable call-state feed
#[derive(Debug)]
pub struct SimulatedTelephony {
    api_level: AtomicU32,
    telecom_available: AtomicBool,
    dialed: Mutex<Vec<Url>>,
    ended: AtomicUsize,
    states: broadcast::Sender<CallStateEvent>,
}

impl SimulatedTelephony {
    pub fn new() -> Self {
        Self::with_api_level(DEFAULT_API_LEVEL)
    }

    pub fn with_api_level(api_level: u32) -> Self {
        let (states, _) = broadcast::channel(CALL_STATE_CAPACITY);
        Self {
            api_level: AtomicU32::new(api_level),
            telecom_available: AtomicBool::new(true),
            dialed: Mutex::new(Vec::new()),
            ended: AtomicUsize::new(0),
            states,
        }
    }

    pub fn set_telecom_available(&self, available: bool) {
        self.telecom_available.store(available, Ordering::SeqCst);
    }

    /// Publish a call-state change; returns how many listeners saw it
    pub fn emit(&self, event: CallStateEvent) -> usize {
        self.states.send(event).unwrap_or(0)
    }

    /// Listeners currently registered on the call-state feed
    pub fn listener_count(&self) -> usize {
        self.states.receiver_count()
    }

    pub fn dialed(&self) -> Vec<Url> {
        self.dialed.lock().clone()
    }

    pub fn ended_calls(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedTelephony {
    fn default() -> Self {
        Self::new()
    }
}

impl CallControl for SimulatedTelephony {
    fn api_level(&self) -> u32 {
        self.api_level.load(Ordering::SeqCst)
    }

    fn has_telecom_service(&self) -> bool {
        self.telecom_available.load(Ordering::SeqCst)
    }

    fn place_call(&self, uri: &Url) -> BridgeResult<()> {
        info!(target: crate::LOG_TARGET, "dialing {}", uri);
        self.dialed.lock().push(uri.clone());
        Ok(())
    }

    fn end_call(&self) -> BridgeResult<()> {
        if !self.has_telecom_service() {
            return Err(BridgeError::unavailable("TelecomManager not available."));
        }
        self.ended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl CallStateSource for SimulatedTelephony {
    fn subscribe(&self) -> broadcast::Receiver<CallStateEvent> {
        self.states.subscribe()
    }
}

/// Handles to an in-memory platform, kept alongside the bundle for control
#[derive(Clone)]
pub struct MemoryPlatform {
    pub authorizer: Arc<MemoryAuthorizer>,
    pub call_log: Arc<MemoryCallLog>,
    pub telephony: Arc<SimulatedTelephony>,
}

impl MemoryPlatform {
    pub fn new(authorizer: MemoryAuthorizer, call_log: MemoryCallLog, telephony: SimulatedTelephony) -> Self {
        Self {
            authorizer: Arc::new(authorizer),
            call_log: Arc::new(call_log),
            telephony: Arc::new(telephony),
        }
    }

    /// Everything granted, empty log, default telephony
    pub fn permissive() -> Self {
        Self::new(
            MemoryAuthorizer::grant_all(),
            MemoryCallLog::new(),
            SimulatedTelephony::new(),
        )
    }

    /// Collaborator bundle sharing these handles
    pub fn platform(&self) -> Platform {
        Platform {
            authorizer: self.authorizer.clone(),
            call_log: self.call_log.clone(),
            call_control: self.telephony.clone(),
            call_states: self.telephony.clone(),
        }
    }
}
