//! Property tests for the single-flight slot

use calllog_core::platform::memory::{MemoryAuthorizer, MemoryCallLog, MemoryPlatform, SimulatedTelephony};
use calllog_core::{
    BridgeConfig, BridgeError, CallLogBridge, CallLogFilter, GatePhase, Request, ResultSink,
};
use proptest::prelude::*;

fn any_request() -> impl Strategy<Value = Request> {
    prop_oneof![
        Just(Request::Get),
        Just(Request::EndCall),
        Just(Request::WaitForCallEnd),
        Just(Request::CheckForActiveCall),
        "[0-9]{3,10}".prop_map(|number| Request::MakeCall { number }),
        ("[a-z]{0,6}", proptest::option::of("[A-Za-z]{1,8}")).prop_map(|(filter, selected_path)| {
            Request::GetCallRecordings {
                filter,
                selected_path,
            }
        }),
        (proptest::option::of(0i64..1_000), proptest::option::of(0i64..1_000)).prop_map(
            |(date_from, date_to)| Request::Query(CallLogFilter {
                date_from,
                date_to,
                call_type: None,
            })
        ),
    ]
}

proptest! {
    #[test]
    fn occupied_slot_rejects_every_submit(requests in proptest::collection::vec(any_request(), 1..20)) {
        let platform = MemoryPlatform::new(
            MemoryAuthorizer::new(),
            MemoryCallLog::new(),
            SimulatedTelephony::new(),
        );
        let bridge = CallLogBridge::new(BridgeConfig::default(), platform.platform()).unwrap();
        let gate = bridge.gate();

        let (occupant, mut occupant_pending) = ResultSink::channel();
        gate.submit(Request::Get, occupant);
        prop_assert_eq!(gate.phase(), GatePhase::AwaitingAuthorization);

        for request in requests {
            let (sink, mut pending) = ResultSink::channel();
            gate.submit(request, sink);
            prop_assert_eq!(pending.try_take(), Some(Err(BridgeError::AlreadyRunning)));
        }

        prop_assert_eq!(gate.pending_method(), Some("get"));
        prop_assert!(occupant_pending.try_take().is_none());
        prop_assert_eq!(platform.authorizer.prompt_count(), 1);
        prop_assert_eq!(platform.call_log.query_count(), 0);
        prop_assert!(platform.telephony.dialed().is_empty());
    }
}
