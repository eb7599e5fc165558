//! # calllog-core
//!
//! Call-log access, outbound calls and call-state waits for a host
//! application, served over a single request/response channel.
//!
//! Only one request is in flight at a time. A request that needs a
//! capability the process does not hold is parked while the platform asks
//! the user, then resumed or failed once the answer arrives. Waiting for a
//! call to end parks the request until the device reports idle.
//!
//! ## Quick Start
//!
//! ```rust
//! use calllog_core::{CallLogBridge, BridgeConfig, MethodCall, MethodResponse};
//! use calllog_core::platform::memory::MemoryPlatform;
//! use calllog_core::record::{CallLogRow, CallType};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let platform = MemoryPlatform::permissive();
//! platform.call_log.insert(CallLogRow::new("5550100", CallType::Incoming, 100, 30));
//! platform.call_log.insert(CallLogRow::new("5550101", CallType::Outgoing, 300, 12));
//!
//! let bridge = CallLogBridge::new(BridgeConfig::default(), platform.platform()).unwrap();
//! let response = bridge
//!     .call(MethodCall::with_arguments("query", json!({ "dateFrom": "200" })))
//!     .await;
//!
//! match response {
//!     MethodResponse::Success { result } => assert_eq!(result[0]["number"], "5550101"),
//!     other => panic!("{:?}", other),
//! }
//! # });
//! ```
//!
//! ## Architecture
//!
//! - [`channel`]: decodes host method calls into typed [`Request`]s
//! - [`gate`]: the single-flight slot and authorization interleaving
//! - [`dispatcher`]: runs synchronous requests against the platform
//! - [`watcher`]: resolves call-state waits on the first idle observation
//! - [`platform`]: collaborator traits and an in-memory platform

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod gate;
pub mod logging;
pub mod permission;
pub mod platform;
pub mod record;
pub mod recordings;
pub mod request;
pub mod sink;
pub mod watcher;

pub use channel::{CallLogBridge, MethodCall, MethodResponse, ResponseEnvelope};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult, StoreError};
pub use filter::CallLogFilter;
pub use gate::{GatePhase, RequestGate};
pub use permission::{Authorizer, GrantResult, Permission, GATE_REQUEST_CODE};
pub use platform::Platform;
pub use record::{CallLogRecord, CallLogRow, CallType};
pub use request::{Reply, Request};
pub use sink::{PendingReply, ResultSink};
pub use watcher::{CallState, CallStateEvent, CallStateWatcher};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Target used by every log line from this crate
pub const LOG_TARGET: &str = "calllog";
