//! Typed requests and replies
//!
//! Each channel method maps to one [`Request`] variant whose required
//! fields are plain values and whose optional fields are `Option`s.
//! Validation happens once, when the method call is decoded.

use serde::Serialize;
use url::Url;

use crate::filter::CallLogFilter;
use crate::permission::Permission;
use crate::record::CallLogRecord;

/// Wire method names
pub mod method {
    pub const GET_CALL_RECORDINGS: &str = "getCallRecordings";
    pub const MAKE_CALL: &str = "makeCall";
    pub const END_CALL: &str = "endCall";
    // Spelling is part of the host contract.
    pub const WAIT_FOR_CALL_END: &str = "endUserDisconected";
    pub const CHECK_FOR_ACTIVE_CALL: &str = "checkForActiveCall";
    pub const GET: &str = "get";
    pub const QUERY: &str = "query";
}

/// A validated request for the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// List recording files under the storage root
    GetCallRecordings {
        filter: String,
        selected_path: Option<String>,
    },
    /// Place an outbound call
    MakeCall { number: String },
    /// Terminate the current call
    EndCall,
    /// Resolve once the device returns to idle
    WaitForCallEnd,
    /// Report whether the log holds an outgoing call
    CheckForActiveCall,
    /// Whole call log, newest first
    Get,
    /// Call log restricted by a filter, newest first
    Query(CallLogFilter),
}

impl Request {
    /// Wire method name of this request
    pub fn method(&self) -> &'static str {
        match self {
            Request::GetCallRecordings { .. } => method::GET_CALL_RECORDINGS,
            Request::MakeCall { .. } => method::MAKE_CALL,
            Request::EndCall => method::END_CALL,
            Request::WaitForCallEnd => method::WAIT_FOR_CALL_END,
            Request::CheckForActiveCall => method::CHECK_FOR_ACTIVE_CALL,
            Request::Get => method::GET,
            Request::Query(_) => method::QUERY,
        }
    }

    /// Capabilities the gate must hold before dispatching this request
    ///
    /// `base` is required by every request; placing and ending calls
    /// add their own capability on top.
    pub fn required_permissions(&self, base: &[Permission]) -> Vec<Permission> {
        let mut required = base.to_vec();
        let extra = match self {
            Request::MakeCall { .. } => Some(Permission::CallPhone),
            Request::EndCall => Some(Permission::AnswerPhoneCalls),
            _ => None,
        };
        if let Some(permission) = extra {
            if !required.contains(&permission) {
                required.push(permission);
            }
        }
        required
    }

    /// Whether the request completes asynchronously through the watcher
    pub fn is_suspending(&self) -> bool {
        matches!(self, Request::WaitForCallEnd)
    }
}

/// Successful outcome of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    /// No value (`null` on the wire)
    Null,
    Bool(bool),
    Records(Vec<CallLogRecord>),
    /// `file://` locations of recordings
    Locations(Vec<Url>),
}

impl Reply {
    /// JSON value carried by a success response
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Reply::Null => serde_json::Value::Null,
            other => serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
        }
    }
}
