//! Platform collaborators
//!
//! The bridge owns no device state. Everything it touches on the device is
//! reached through the traits in this module:
//!
//! ```text
//! ┌──────────────────┐
//! │   RequestGate    │
//! └───┬──────────┬───┘
//!     │          │
//! ┌───▼───────┐ ┌▼─────────────────┐
//! │Dispatcher │ │ CallStateWatcher │
//! └─┬───────┬─┘ └────────┬─────────┘
//!   │       │            │
//! CallLog  CallControl  CallStateSource      Authorizer (gate only)
//! Store
//! ```
//!
//! [`memory`] provides in-process implementations used by the CLI host and
//! the tests.

pub mod memory;

use std::sync::Arc;

use tokio::sync::broadcast;
use url::Url;

use crate::error::{BridgeResult, StoreError};
use crate::filter::CallLogFilter;
use crate::permission::Authorizer;
use crate::record::CallLogRow;
use crate::watcher::CallStateEvent;

/// Platform call-log content store
pub trait CallLogStore: Send + Sync {
    /// Rows matching `filter`; ordering is left to the caller
    fn query(&self, filter: &CallLogFilter) -> Result<Vec<CallLogRow>, StoreError>;

    /// Number of rows matching `filter`
    fn count(&self, filter: &CallLogFilter) -> Result<usize, StoreError> {
        self.query(filter).map(|rows| rows.len())
    }
}

/// Outbound call placement and call termination
pub trait CallControl: Send + Sync {
    /// Platform API level of the device
    fn api_level(&self) -> u32;

    /// Whether the telecom service needed to end calls is reachable
    fn has_telecom_service(&self) -> bool;

    /// Dispatch a call intent for a `tel:` URI
    fn place_call(&self, uri: &Url) -> BridgeResult<()>;

    /// End the current call
    fn end_call(&self) -> BridgeResult<()>;
}

/// Device call-state notification stream
///
/// Each `subscribe` registers a new listener; dropping the returned
/// receiver unregisters it.
pub trait CallStateSource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<CallStateEvent>;
}

/// The set of collaborators a bridge is wired to
#[derive(Clone)]
pub struct Platform {
    pub authorizer: Arc<dyn Authorizer>,
    pub call_log: Arc<dyn CallLogStore>,
    pub call_control: Arc<dyn CallControl>,
    pub call_states: Arc<dyn CallStateSource>,
}
