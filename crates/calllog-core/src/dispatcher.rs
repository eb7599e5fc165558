//! Synchronous request execution
//!
//! The dispatcher maps each non-suspending [`Request`] onto its collaborator
//! and produces exactly one outcome. Call-state waits never reach it; the
//! gate hands those to the watcher.

use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use crate::error::{BridgeError, BridgeResult};
use crate::filter::CallLogFilter;
use crate::platform::{CallControl, CallLogStore};
use crate::record::{CallLogRecord, CallType};
use crate::recordings::RecordingScanner;
use crate::request::{Reply, Request};

/// Executes requests against the platform collaborators
pub struct Dispatcher {
    call_log: Arc<dyn CallLogStore>,
    call_control: Arc<dyn CallControl>,
    recordings: RecordingScanner,
    end_call_min_api_level: u32,
}

impl Dispatcher {
    pub fn new(
        call_log: Arc<dyn CallLogStore>,
        call_control: Arc<dyn CallControl>,
        recordings: RecordingScanner,
        end_call_min_api_level: u32,
    ) -> Self {
        Self {
            call_log,
            call_control,
            recordings,
            end_call_min_api_level,
        }
    }

    /// Platform checks that must pass before any authorization prompt
    pub fn precheck(&self, request: &Request) -> BridgeResult<()> {
        if let Request::EndCall = request {
            let actual = self.call_control.api_level();
            if actual < self.end_call_min_api_level {
                return Err(BridgeError::UnsupportedVersion {
                    required: self.end_call_min_api_level,
                    actual,
                });
            }
            if !self.call_control.has_telecom_service() {
                return Err(BridgeError::unavailable("TelecomManager not available."));
            }
        }
        Ok(())
    }

    /// Run a non-suspending request to completion
    pub fn execute(&self, request: &Request) -> BridgeResult<Reply> {
        match request {
            Request::GetCallRecordings {
                filter,
                selected_path,
            } => {
                let found = self.recordings.find(filter, selected_path.as_deref());
                debug!(target: crate::LOG_TARGET, "{} recordings match {:?}", found.len(), filter);
                Ok(Reply::Locations(found))
            }
            Request::MakeCall { number } => {
                let uri = tel_uri(number)?;
                self.call_control.place_call(&uri)?;
                Ok(Reply::Null)
            }
            Request::EndCall => {
                self.precheck(request)?;
                self.call_control.end_call()?;
                Ok(Reply::Null)
            }
            Request::CheckForActiveCall => {
                let outgoing = CallLogFilter::all().with_call_type(CallType::Outgoing);
                let count = self.call_log.count(&outgoing)?;
                Ok(Reply::Bool(count > 0))
            }
            Request::Get => self.query_logs(&CallLogFilter::all()),
            Request::Query(filter) => self.query_logs(filter),
            Request::WaitForCallEnd => Err(BridgeError::internal(
                "call-state waits are not dispatched synchronously",
            )),
        }
    }

    /// Newest first; rows with equal timestamps keep store order
    fn query_logs(&self, filter: &CallLogFilter) -> BridgeResult<Reply> {
        debug!(target: crate::LOG_TARGET, "querying call log where [{}]", filter);
        let mut rows = self.call_log.query(filter)?;
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        let records: Vec<CallLogRecord> = rows.into_iter().map(CallLogRecord::from).collect();
        info!(target: crate::LOG_TARGET, "returning {} call log records", records.len());
        Ok(Reply::Records(records))
    }
}

/// `tel:` URI for a dial string
pub fn tel_uri(number: &str) -> BridgeResult<Url> {
    let trimmed = number.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::missing_arg("number"));
    }
    Url::parse(&format!("tel:{}", trimmed))
        .map_err(|e| BridgeError::invalid_arg("number", e.to_string()))
}
