//! End-to-end flows through the bridge: single-flight rejection,
//! authorization interleaving and the synchronous methods.

use std::fs::{self, File};
use std::sync::Arc;

use calllog_core::platform::memory::{MemoryAuthorizer, MemoryCallLog, MemoryPlatform, SimulatedTelephony};
use calllog_core::{
    BridgeConfig, CallLogBridge, CallType, CallLogRow, GatePhase, GrantResult, MethodCall,
    MethodResponse, Permission, ResultSink, GATE_REQUEST_CODE,
};
use serde_json::json;
use tracing_test::traced_test;

const BASE: [Permission; 2] = [Permission::ReadCallLog, Permission::ReadPhoneState];

fn bridge_with(platform: &MemoryPlatform) -> CallLogBridge {
    CallLogBridge::new(BridgeConfig::default(), platform.platform()).unwrap()
}

fn ungranted() -> MemoryPlatform {
    MemoryPlatform::new(MemoryAuthorizer::new(), MemoryCallLog::new(), SimulatedTelephony::new())
}

#[tokio::test]
async fn get_returns_newest_first() {
    let platform = MemoryPlatform::permissive();
    for (number, date) in [("a", 100), ("b", 300), ("c", 200)] {
        platform.call_log.insert(CallLogRow::new(number, CallType::Incoming, date, 10));
    }
    let bridge = bridge_with(&platform);

    let response = bridge.call(MethodCall::new("get")).await;
    let MethodResponse::Success { result } = &response else {
        panic!("expected success, got {:?}", response);
    };
    let stamps: Vec<i64> = result
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["timestamp"].as_i64().unwrap())
        .collect();
    assert_eq!(stamps, vec![300, 200, 100]);
    assert!(bridge.gate().is_idle());
}

#[tokio::test]
async fn query_with_date_range_filters_rows() {
    let platform = MemoryPlatform::permissive();
    for date in [50, 150, 250] {
        platform.call_log.insert(CallLogRow::new("n", CallType::Missed, date, 0));
    }
    let bridge = bridge_with(&platform);

    let response = bridge
        .call(MethodCall::with_arguments(
            "query",
            json!({ "dateFrom": "100", "dateTo": "200" }),
        ))
        .await;
    assert_eq!(
        response,
        MethodResponse::success(json!([{
            "formattedNumber": "",
            "number": "n",
            "callType": 3,
            "timestamp": 150,
            "duration": 0,
            "name": "",
        }]))
    );

    // No bounds behaves like `get`.
    let everything = bridge.call(MethodCall::with_arguments("query", json!({}))).await;
    let all = bridge.call(MethodCall::new("get")).await;
    assert_eq!(everything, all);
}

#[tokio::test]
async fn failing_store_reports_internal_error_and_frees_the_gate() {
    let platform = MemoryPlatform::permissive();
    platform.call_log.set_failing(true);
    let bridge = bridge_with(&platform);

    let response = bridge.call(MethodCall::new("get")).await;
    assert_eq!(response.error_code(), Some("INTERNAL_ERROR"));
    assert!(bridge.gate().is_idle());

    platform.call_log.set_failing(false);
    assert!(matches!(
        bridge.call(MethodCall::new("get")).await,
        MethodResponse::Success { .. }
    ));
}

#[tokio::test]
#[traced_test]
async fn second_call_while_pending_is_rejected() {
    let platform = ungranted();
    let bridge = bridge_with(&platform);

    let (first, mut first_pending) = ResultSink::channel();
    bridge.handle(MethodCall::new("get"), first);
    assert_eq!(bridge.gate().phase(), GatePhase::AwaitingAuthorization);

    let rejected = bridge.call(MethodCall::new("checkForActiveCall")).await;
    assert_eq!(rejected.error_code(), Some("ALREADY_RUNNING"));
    assert!(logs_contain("rejecting checkForActiveCall: get is still pending"));

    // The occupant is untouched and still resumes.
    assert_eq!(bridge.gate().pending_method(), Some("get"));
    assert!(first_pending.try_take().is_none());
    assert!(bridge.on_request_permissions_result(GATE_REQUEST_CODE, &BASE, &[GrantResult::Granted; 2]));
    assert!(matches!(first_pending.await, Ok(_)));
    assert_eq!(platform.authorizer.prompt_count(), 1);
}

#[tokio::test]
async fn denial_fails_once_and_never_dispatches() {
    let platform = ungranted();
    let bridge = bridge_with(&platform);

    let (sink, pending) = ResultSink::channel();
    bridge.handle(MethodCall::new("get"), sink);
    bridge.on_request_permissions_result(
        GATE_REQUEST_CODE,
        &BASE,
        &[GrantResult::Granted, GrantResult::Denied],
    );

    let outcome = pending.await;
    assert_eq!(outcome.unwrap_err().code(), "PERMISSION_NOT_GRANTED");
    assert_eq!(platform.call_log.query_count(), 0);
    assert!(bridge.gate().is_idle());
}

#[tokio::test]
async fn grant_dispatches_exactly_once() {
    let platform = ungranted();
    let bridge = bridge_with(&platform);

    let (sink, pending) = ResultSink::channel();
    bridge.handle(MethodCall::new("get"), sink);
    assert_eq!(platform.call_log.query_count(), 0);

    platform.authorizer.grant(Permission::ReadCallLog);
    platform.authorizer.grant(Permission::ReadPhoneState);
    bridge.on_request_permissions_result(GATE_REQUEST_CODE, &BASE, &[GrantResult::Granted; 2]);
    // A duplicate callback finds nothing pending.
    bridge.on_request_permissions_result(GATE_REQUEST_CODE, &BASE, &[GrantResult::Granted; 2]);

    assert!(pending.await.is_ok());
    assert_eq!(platform.call_log.query_count(), 1);
}

#[tokio::test]
async fn detached_host_cannot_prompt() {
    let platform = ungranted();
    platform.authorizer.detach();
    let bridge = bridge_with(&platform);

    let response = bridge.call(MethodCall::new("get")).await;
    assert_eq!(
        response,
        MethodResponse::Error {
            code: "PERMISSION_NOT_GRANTED".into(),
            message: "Permission request failed. Activity is null.".into(),
        }
    );
    assert!(bridge.gate().is_idle());
}

#[tokio::test]
async fn make_call_succeeds_only_after_call_permission() {
    let platform = MemoryPlatform::new(
        MemoryAuthorizer::granting(BASE),
        MemoryCallLog::new(),
        SimulatedTelephony::new(),
    );
    let bridge = bridge_with(&platform);

    let (sink, mut pending) = ResultSink::channel();
    bridge.handle(
        MethodCall::with_arguments("makeCall", json!({ "number": "5550100" })),
        sink,
    );
    assert!(pending.try_take().is_none());
    assert!(platform.telephony.dialed().is_empty());
    assert_eq!(platform.authorizer.prompts()[0].permissions, vec![Permission::CallPhone]);

    bridge.on_request_permissions_result(
        GATE_REQUEST_CODE,
        &[Permission::CallPhone],
        &[GrantResult::Granted],
    );
    assert_eq!(pending.await, Ok(calllog_core::Reply::Null));
    assert_eq!(platform.telephony.dialed()[0].as_str(), "tel:5550100");
}

#[tokio::test]
async fn end_call_on_old_platform_fails_without_prompt() {
    let platform = MemoryPlatform::new(
        MemoryAuthorizer::new(),
        MemoryCallLog::new(),
        SimulatedTelephony::with_api_level(27),
    );
    let bridge = bridge_with(&platform);

    let response = bridge.call(MethodCall::new("endCall")).await;
    assert_eq!(response.error_code(), Some("UNSUPPORTED_VERSION"));
    assert_eq!(platform.authorizer.prompt_count(), 0);
    assert!(bridge.gate().is_idle());
}

#[tokio::test]
async fn end_call_without_telecom_is_unavailable() {
    let platform = MemoryPlatform::permissive();
    platform.telephony.set_telecom_available(false);
    let bridge = bridge_with(&platform);

    let response = bridge.call(MethodCall::new("endCall")).await;
    assert_eq!(response.error_code(), Some("UNAVAILABLE"));

    platform.telephony.set_telecom_available(true);
    assert_eq!(
        bridge.call(MethodCall::new("endCall")).await,
        MethodResponse::success(json!(null))
    );
    assert_eq!(platform.telephony.ended_calls(), 1);
}

#[tokio::test]
async fn missing_argument_on_idle_gate_never_occupies_it() {
    let platform = ungranted();
    let bridge = bridge_with(&platform);

    let response = bridge.call(MethodCall::new("getCallRecordings")).await;
    assert_eq!(response.error_code(), Some("MISSING_ARGS"));
    assert_eq!(platform.authorizer.prompt_count(), 0);
    assert!(bridge.gate().is_idle());
}

#[tokio::test]
async fn malformed_call_while_pending_is_already_running() {
    let platform = ungranted();
    let bridge = bridge_with(&platform);

    let (sink, mut pending) = ResultSink::channel();
    bridge.handle(MethodCall::new("get"), sink);
    assert_eq!(bridge.gate().phase(), GatePhase::AwaitingAuthorization);

    let missing = bridge.call(MethodCall::new("makeCall")).await;
    assert_eq!(missing.error_code(), Some("ALREADY_RUNNING"));
    let unknown = bridge.call(MethodCall::new("bogus")).await;
    assert_eq!(unknown.error_code(), Some("ALREADY_RUNNING"));

    assert_eq!(bridge.gate().pending_method(), Some("get"));
    assert!(pending.try_take().is_none());
    assert_eq!(platform.authorizer.prompt_count(), 1);
}

#[tokio::test]
async fn unknown_method_is_not_implemented() {
    let platform = MemoryPlatform::permissive();
    let bridge = bridge_with(&platform);
    assert_eq!(
        bridge.call(MethodCall::new("deleteCallLog")).await,
        MethodResponse::NotImplemented
    );
    assert!(bridge.gate().is_idle());
}

#[tokio::test]
async fn recordings_are_found_under_the_storage_root() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("Recordings");
    fs::create_dir(&dir).unwrap();
    File::create(dir.join("VoiceNote1.mp3")).unwrap();
    File::create(dir.join("other.mp3")).unwrap();

    let platform = MemoryPlatform::permissive();
    let config = BridgeConfig::default().with_storage_root(root.path());
    let bridge = CallLogBridge::new(config, platform.platform()).unwrap();

    let response = bridge
        .call(MethodCall::with_arguments(
            "getCallRecordings",
            json!({ "filterRecording": "voice", "selectedPath": "Recordings" }),
        ))
        .await;
    let MethodResponse::Success { result } = &response else {
        panic!("expected success, got {:?}", response);
    };
    let locations = result.as_array().unwrap();
    assert_eq!(locations.len(), 1);
    assert!(locations[0].as_str().unwrap().ends_with("/Recordings/VoiceNote1.mp3"));
}

#[tokio::test]
async fn sink_may_resubmit_from_its_callback() {
    let platform = MemoryPlatform::permissive();
    let bridge = Arc::new(bridge_with(&platform));

    let (second, second_pending) = ResultSink::channel();
    let inner = bridge.clone();
    let first = ResultSink::from_fn(move |_| {
        inner.handle(MethodCall::new("checkForActiveCall"), second);
    });
    bridge.handle(MethodCall::new("get"), first);

    assert_eq!(second_pending.await, Ok(calllog_core::Reply::Bool(false)));
}
