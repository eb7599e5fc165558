//! Method channel codec and bridge facade
//!
//! The host speaks in [`MethodCall`]s: a method name plus a loosely typed
//! argument map. Decoding turns them into [`Request`]s, so argument
//! problems are answered here and never reach the gate.
//!
//! # Example
//!
//! ```rust
//! use calllog_core::channel::{CallLogBridge, MethodCall, MethodResponse};
//! use calllog_core::config::BridgeConfig;
//! use calllog_core::platform::memory::MemoryPlatform;
//!
//! # tokio_test::block_on(async {
//! let platform = MemoryPlatform::permissive();
//! let bridge = CallLogBridge::new(BridgeConfig::default(), platform.platform()).unwrap();
//!
//! let response = bridge.call(MethodCall::new("checkForActiveCall")).await;
//! assert_eq!(response, MethodResponse::success(serde_json::json!(false)));
//! # });
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, BridgeResult};
use crate::filter::CallLogFilter;
use crate::gate::RequestGate;
use crate::permission::{GrantResult, Permission};
use crate::platform::Platform;
use crate::recordings::RecordingScanner;
use crate::request::{method, Reply, Request};
use crate::sink::ResultSink;
use crate::watcher::CallStateWatcher;

/// A method invocation as sent by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    /// Call without arguments
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments: Value::Null,
        }
    }

    pub fn with_arguments(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// Decode into a typed request
    pub fn into_request(self) -> BridgeResult<Request> {
        let args = match self.arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        match self.method.as_str() {
            method::GET_CALL_RECORDINGS => Ok(Request::GetCallRecordings {
                filter: required_string(&args, "filterRecording")?,
                selected_path: optional_string(&args, "selectedPath")?,
            }),
            method::MAKE_CALL => Ok(Request::MakeCall {
                number: required_string(&args, "number")?,
            }),
            method::END_CALL => Ok(Request::EndCall),
            method::WAIT_FOR_CALL_END => Ok(Request::WaitForCallEnd),
            method::CHECK_FOR_ACTIVE_CALL => Ok(Request::CheckForActiveCall),
            method::GET => Ok(Request::Get),
            method::QUERY => {
                let from = optional_string(&args, "dateFrom")?;
                let to = optional_string(&args, "dateTo")?;
                Ok(Request::Query(CallLogFilter::from_strings(
                    from.as_deref(),
                    to.as_deref(),
                )?))
            }
            other => Err(BridgeError::not_implemented(other)),
        }
    }
}

fn required_string(args: &Map<String, Value>, name: &str) -> BridgeResult<String> {
    optional_string(args, name)?.ok_or_else(|| BridgeError::missing_arg(name))
}

/// Strings pass through; numbers are accepted in their decimal form
fn optional_string(args: &Map<String, Value>, name: &str) -> BridgeResult<Option<String>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(BridgeError::invalid_arg(
            name,
            format!("expected a string, got {}", other),
        )),
    }
}

/// Reply sent back to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MethodResponse {
    Success { result: Value },
    Error { code: String, message: String },
    NotImplemented,
}

impl MethodResponse {
    pub fn success(result: Value) -> Self {
        MethodResponse::Success { result }
    }

    pub fn from_outcome(outcome: BridgeResult<Reply>) -> Self {
        match outcome {
            Ok(reply) => MethodResponse::Success {
                result: reply.to_value(),
            },
            Err(BridgeError::NotImplemented { .. }) => MethodResponse::NotImplemented,
            Err(err) => MethodResponse::Error {
                code: err.code().to_string(),
                message: err.to_string(),
            },
        }
    }

    /// Error code, if this is an error response
    pub fn error_code(&self) -> Option<&str> {
        match self {
            MethodResponse::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// A response tagged with the id of the call it answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub response: MethodResponse,
}

/// The plugin object: one channel, one gate
pub struct CallLogBridge {
    config: BridgeConfig,
    gate: RequestGate,
}

impl CallLogBridge {
    pub fn new(config: BridgeConfig, platform: Platform) -> BridgeResult<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(
            platform.call_log,
            platform.call_control,
            RecordingScanner::new(config.storage_root.clone()),
            config.end_call_min_api_level,
        );
        let watcher = CallStateWatcher::new(platform.call_states, config.call_end_timeout());
        let gate = RequestGate::new(
            platform.authorizer,
            dispatcher,
            watcher,
            config.base_permissions.clone(),
        );
        debug!(target: crate::LOG_TARGET, "bridge ready on channel {}", config.channel_name);
        Ok(Self { config, gate })
    }

    pub fn channel_name(&self) -> &str {
        &self.config.channel_name
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    /// Decode `call` and submit it
    ///
    /// A call arriving while another is outstanding is answered with
    /// `ALREADY_RUNNING` even if it would not decode. Otherwise decoding
    /// failures go to `sink` without occupying the gate.
    pub fn handle(&self, call: MethodCall, sink: ResultSink) {
        let method = call.method.clone();
        self.gate.submit_decoded(&method, call.into_request(), sink);
    }

    /// Submit `call` and wait for its response
    pub async fn call(&self, call: MethodCall) -> MethodResponse {
        let (sink, pending) = ResultSink::channel();
        self.handle(call, sink);
        MethodResponse::from_outcome(pending.await)
    }

    /// The host's foreground activity went away
    ///
    /// Fails or cancels the outstanding request so the next one is
    /// accepted.
    pub fn detach(&self) {
        self.gate.reset();
    }

    /// Forward a platform authorization callback to the gate
    pub fn on_request_permissions_result(
        &self,
        request_code: i32,
        permissions: &[Permission],
        grants: &[GrantResult],
    ) -> bool {
        self.gate
            .on_authorization_result(request_code, permissions, grants)
    }
}
