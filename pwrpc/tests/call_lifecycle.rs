//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Integration tests for call lifecycle and the pending call table.
//!
//! These tests verify that:
//! - Starting, clearing, cancelling and abandoning calls keeps the table
//!   consistent
//! - Cancellation sends exactly one CLIENT_ERROR packet and abandoning sends
//!   none
//! - Client streams refuse messages once the call has ended
//! - Transport failures surface to the caller without corrupting state

use pwrpc::packet::{self, PacketType};
use pwrpc::testing::TestClient;
use pwrpc::{
    CallRef, Channel, Method, PendingCall, PendingRpc, PwrpcError, RpcManager, Service, Status,
    StreamObserver,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const SERVICE: &str = "pw.test.Sensors";

#[derive(Clone, PartialEq, prost::Message)]
struct Reading {
    #[prost(sint32, tag = "1")]
    celsius: i32,
}

fn sensors() -> Service {
    Service::new(
        SERVICE,
        [
            Method::unary::<Reading, Reading>("Get"),
            Method::server_streaming::<Reading, Reading>("Watch"),
            Method::client_streaming::<Reading, Reading>("Upload"),
        ],
    )
    .unwrap()
}

/// Call that only counts the events it receives.
#[derive(Default)]
struct CountingCall {
    events: AtomicUsize,
}

impl PendingCall for CountingCall {
    fn handle_next(&self, _payload: &[u8]) {
        self.events.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_completed(&self, _status: Status) {
        self.events.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_error(&self, _status: Status) {
        self.events.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_released(&self) {}

    fn is_active(&self) -> bool {
        true
    }
}

type Sent = Arc<Mutex<Vec<Vec<u8>>>>;

fn manager_rpc() -> (PendingRpc, Sent) {
    let sent: Sent = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sent);
    let channel = Channel::from_fn(3, move |bytes: &[u8]| {
        sink.lock().unwrap().push(bytes.to_vec());
        Ok(())
    });
    let service = sensors();
    let method = Arc::clone(service.method("Watch").unwrap());
    (PendingRpc::new(Arc::new(channel), method), sent)
}

fn same_call(a: &CallRef, b: &CallRef) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

fn sent_types(sent: &Sent) -> Vec<Option<PacketType>> {
    sent.lock()
        .unwrap()
        .iter()
        .map(|bytes| packet::decode(bytes).unwrap().packet_type())
        .collect()
}

#[test]
fn test_start_registers_the_given_call() {
    let (rpc, sent) = manager_rpc();
    let rpcs = RpcManager::new();
    let call: CallRef = Arc::new(CountingCall::default());

    let previous = rpcs.start(rpc.clone(), Arc::clone(&call), Some(&[0x08, 0x02][..])).unwrap();
    assert!(previous.is_none());
    assert!(same_call(&rpcs.get_pending(&rpc).unwrap(), &call));
    assert_eq!(sent_types(&sent), vec![Some(PacketType::Request)]);

    let request = packet::decode(&sent.lock().unwrap()[0]).unwrap();
    assert_eq!(request.channel_id, 3);
    assert_eq!(request.payload, vec![0x08, 0x02]);
}

#[test]
fn test_start_returns_superseded_call() {
    let (rpc, _sent) = manager_rpc();
    let rpcs = RpcManager::new();
    let first: CallRef = Arc::new(CountingCall::default());
    let second: CallRef = Arc::new(CountingCall::default());

    rpcs.start(rpc.clone(), Arc::clone(&first), None).unwrap();
    let previous = rpcs.start(rpc.clone(), Arc::clone(&second), None).unwrap();

    assert!(same_call(&previous.unwrap(), &first));
    assert!(same_call(&rpcs.get_pending(&rpc).unwrap(), &second));
    assert_eq!(rpcs.len(), 1);
}

#[test]
fn test_clear_and_cancel_remove_the_call() {
    let (rpc, sent) = manager_rpc();
    let rpcs = RpcManager::new();

    rpcs.open(rpc.clone(), Arc::new(CountingCall::default()));
    assert!(rpcs.clear(&rpc).is_some());
    assert!(rpcs.get_pending(&rpc).is_none());
    assert!(sent.lock().unwrap().is_empty());

    rpcs.open(rpc.clone(), Arc::new(CountingCall::default()));
    assert!(rpcs.cancel(&rpc).unwrap().is_some());
    assert!(rpcs.get_pending(&rpc).is_none());

    let packets = sent.lock().unwrap().clone();
    assert_eq!(packets.len(), 1);
    let cancel = packet::decode(&packets[0]).unwrap();
    assert_eq!(cancel.packet_type(), Some(PacketType::ClientError));
    assert_eq!(cancel.status, Status::Cancelled.code());

    assert!(rpcs.cancel(&rpc).unwrap().is_none());
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[test]
fn test_abandon_sends_nothing() {
    let (rpc, sent) = manager_rpc();
    let rpcs = RpcManager::new();
    rpcs.open(rpc.clone(), Arc::new(CountingCall::default()));

    assert!(rpcs.abandon(&rpc).is_some());
    assert!(rpcs.abandon(&rpc).is_none());
    assert!(rpcs.is_empty());
    assert!(sent.lock().unwrap().is_empty());
}

#[test]
fn test_client_stream_requires_pending_call() {
    let (rpc, sent) = manager_rpc();
    let rpcs = RpcManager::new();

    assert!(rpcs.client_stream(&rpc, b"\x08\x01").unwrap().is_none());
    assert!(rpcs.client_stream_end(&rpc).unwrap().is_none());
    assert!(sent.lock().unwrap().is_empty());

    rpcs.open(rpc.clone(), Arc::new(CountingCall::default()));
    assert!(rpcs.client_stream(&rpc, b"\x08\x01").unwrap().is_some());
    assert!(rpcs.client_stream_end(&rpc).unwrap().is_some());
    assert_eq!(
        sent_types(&sent),
        vec![Some(PacketType::ClientStream), Some(PacketType::ClientStreamEnd)]
    );
    assert_eq!(rpcs.len(), 1);
}

#[test]
fn test_call_cancel_sends_one_packet() {
    let test = TestClient::new([sensors()]).unwrap();
    let call = test
        .method("pw.test.Sensors/Watch")
        .unwrap()
        .invoke_server_streaming(&Reading { celsius: 0 }, StreamObserver::<Reading>::new())
        .unwrap();

    assert!(call.cancel().unwrap());
    assert!(!call.cancel().unwrap());

    let sent = test.sent_packets();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].packet_type(), Some(PacketType::ClientError));
    assert_eq!(sent[1].status, Status::Cancelled.code());
    assert_eq!(call.error(), Some(Status::Cancelled));
    assert!(test.client().rpcs().is_empty());
}

#[test]
fn test_call_abandon_sends_nothing() {
    let test = TestClient::new([sensors()]).unwrap();
    let call = test
        .method("pw.test.Sensors/Watch")
        .unwrap()
        .invoke_server_streaming(&Reading { celsius: 0 }, StreamObserver::<Reading>::new())
        .unwrap();

    assert!(call.abandon());
    assert!(!call.abandon());
    assert_eq!(test.sent_packets().len(), 1);
    assert!(test.client().rpcs().is_empty());

    // The server is told the call is gone when it next speaks.
    assert!(test.receive_server_stream(SERVICE, "Watch", &Reading { celsius: 1 }));
    let sent = test.sent_packets();
    assert_eq!(sent.last().unwrap().status, Status::FailedPrecondition.code());
}

#[test]
fn test_send_after_cancel_is_cancelled() {
    let test = TestClient::new([sensors()]).unwrap();
    let call = test
        .method("pw.test.Sensors/Upload")
        .unwrap()
        .invoke_client_streaming::<Reading, Reading>(StreamObserver::new())
        .unwrap();

    call.send(&Reading { celsius: 1 }).unwrap();
    call.cancel().unwrap();

    let error = call.send(&Reading { celsius: 2 }).unwrap_err();
    assert!(error.is_rpc_error());
    assert_eq!(error.status(), Some(Status::Cancelled));
    assert_eq!(test.last_client_streams::<Reading>(), vec![Reading { celsius: 1 }]);
}

#[test]
fn test_send_after_completion_is_failed_precondition() {
    let test = TestClient::new([sensors()]).unwrap();
    let call = test
        .method("pw.test.Sensors/Upload")
        .unwrap()
        .invoke_client_streaming::<Reading, Reading>(StreamObserver::new())
        .unwrap();

    assert!(test.receive_response(SERVICE, "Upload", &Reading { celsius: 9 }, Status::Ok));

    let error = call.send(&Reading { celsius: 2 }).unwrap_err();
    assert_eq!(error.status(), Some(Status::FailedPrecondition));
    assert!(test.last_client_streams::<Reading>().is_empty());
}

#[test]
fn test_finish_sends_stream_end_only_while_active() {
    let test = TestClient::new([sensors()]).unwrap();
    let call = test
        .method("pw.test.Sensors/Upload")
        .unwrap()
        .invoke_client_streaming::<Reading, Reading>(StreamObserver::new())
        .unwrap();

    call.finish().unwrap();
    call.abandon();
    call.finish().unwrap();

    let types: Vec<_> = test.sent_packets().iter().map(|p| p.packet_type()).collect();
    assert_eq!(
        types,
        vec![Some(PacketType::Request), Some(PacketType::ClientStreamEnd)]
    );
}

#[test]
fn test_send_on_unary_call_is_rejected() {
    let test = TestClient::new([sensors()]).unwrap();
    let call = test
        .method("pw.test.Sensors/Get")
        .unwrap()
        .invoke_unary(&Reading { celsius: 0 }, StreamObserver::<Reading>::new())
        .unwrap();

    let error = call.send(&Reading { celsius: 1 }).unwrap_err();
    assert!(matches!(error, PwrpcError::WrongMethodType { .. }));
}

#[test]
fn test_finish_without_client_stream_is_rejected() {
    let test = TestClient::new([sensors()]).unwrap();
    let unary = test
        .method("pw.test.Sensors/Get")
        .unwrap()
        .invoke_unary(&Reading { celsius: 0 }, StreamObserver::<Reading>::new())
        .unwrap();
    let streaming = test
        .method("pw.test.Sensors/Watch")
        .unwrap()
        .invoke_server_streaming(&Reading { celsius: 0 }, StreamObserver::<Reading>::new())
        .unwrap();

    assert!(matches!(
        unary.finish().unwrap_err(),
        PwrpcError::WrongMethodType { .. }
    ));
    assert!(matches!(
        streaming.finish().unwrap_err(),
        PwrpcError::WrongMethodType { .. }
    ));

    let types: Vec<_> = test.sent_packets().iter().map(|p| p.packet_type()).collect();
    assert_eq!(types, vec![Some(PacketType::Request), Some(PacketType::Request)]);
    assert!(unary.is_active());
    assert!(streaming.is_active());
}

#[test]
fn test_failed_start_leaves_no_call() {
    let test = TestClient::new([sensors()]).unwrap();
    test.set_channel_output_error("link down");

    let error = test
        .method("pw.test.Sensors/Get")
        .unwrap()
        .invoke_unary(&Reading { celsius: 0 }, StreamObserver::<Reading>::new())
        .unwrap_err();

    assert!(error.is_transport_error());
    assert!(test.client().rpcs().is_empty());
    assert_eq!(test.client().metrics().calls_started(), 0);
}

#[test]
fn test_failed_cancel_still_ends_call() {
    let test = TestClient::new([sensors()]).unwrap();
    let call = test
        .method("pw.test.Sensors/Watch")
        .unwrap()
        .invoke_server_streaming(&Reading { celsius: 0 }, StreamObserver::<Reading>::new())
        .unwrap();

    test.set_channel_output_error("link down");
    assert!(call.cancel().is_err());

    assert!(!call.is_active());
    assert_eq!(call.error(), Some(Status::Cancelled));
    assert!(test.client().rpcs().is_empty());
}

#[test]
fn test_new_call_supersedes_pending_call() {
    let test = TestClient::new([sensors()]).unwrap();
    let first_events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&first_events);
    let watch = test.method("pw.test.Sensors/Watch").unwrap();

    let first = watch
        .invoke_server_streaming(
            &Reading { celsius: 0 },
            StreamObserver::new().with_next(move |_: Reading| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    let second = watch
        .invoke_server_streaming(&Reading { celsius: 0 }, StreamObserver::<Reading>::new())
        .unwrap();

    assert!(!first.is_active());
    assert_eq!(first.error(), Some(Status::Cancelled));
    assert!(second.is_active());

    // Cancelling the old call must not disturb the new one.
    assert!(!first.cancel().unwrap());
    assert_eq!(test.client().rpcs().len(), 1);

    assert!(test.receive_server_stream(SERVICE, "Watch", &Reading { celsius: 4 }));
    assert_eq!(first_events.load(Ordering::SeqCst), 0);
    assert!(second.is_active());
}

#[test]
fn test_dropping_client_releases_pending_call() {
    let marker = Arc::new(());
    let observed = Arc::downgrade(&marker);

    let call = {
        let test = TestClient::new([sensors()]).unwrap();
        test.method("pw.test.Sensors/Upload")
            .unwrap()
            .invoke_client_streaming::<Reading, Reading>(StreamObserver::new().with_next(
                move |_: Reading| {
                    drop(Arc::clone(&marker));
                },
            ))
            .unwrap()
    };

    // The observer is gone along with everything it captured.
    assert!(observed.upgrade().is_none());
    assert!(!call.is_active());
    assert_eq!(call.error(), Some(Status::Cancelled));
    assert!(!call.cancel().unwrap());
    assert_eq!(
        call.send(&Reading { celsius: 1 }).unwrap_err().status(),
        Some(Status::Cancelled)
    );
    assert!(call.finish().is_ok());
}

#[test]
fn test_dropping_call_handles_and_client_frees_observer() {
    let marker = Arc::new(());
    let observed = Arc::downgrade(&marker);

    {
        let test = TestClient::new([sensors()]).unwrap();
        let _call = test
            .method("pw.test.Sensors/Watch")
            .unwrap()
            .invoke_server_streaming(
                &Reading { celsius: 0 },
                StreamObserver::new().with_next(move |_: Reading| {
                    drop(Arc::clone(&marker));
                }),
            )
            .unwrap();
    }

    assert!(observed.upgrade().is_none());
}

#[test]
fn test_stream_messages_never_follow_completion() {
    for _ in 0..50 {
        let test = TestClient::new([sensors()]).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (next, done) = (Arc::clone(&log), Arc::clone(&log));
        let _call = test
            .method("pw.test.Sensors/Watch")
            .unwrap()
            .invoke_server_streaming(
                &Reading { celsius: 0 },
                StreamObserver::new()
                    .with_next(move |r: Reading| next.lock().unwrap().push(r.celsius))
                    .with_completed(move |_| done.lock().unwrap().push(-1)),
            )
            .unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for celsius in 0..20 {
                    test.receive_server_stream(SERVICE, "Watch", &Reading { celsius });
                }
            });
            scope.spawn(|| {
                test.receive_status(SERVICE, "Watch", Status::Ok);
            });
        });

        let log = log.lock().unwrap();
        assert_eq!(log.last(), Some(&-1));
        assert_eq!(log.iter().filter(|&&value| value == -1).count(), 1);
    }
}

#[test]
fn test_concurrent_start_and_cancel_keep_table_consistent() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 200;

    let (rpc, sent) = manager_rpc();
    let rpcs = RpcManager::new();
    let superseded = AtomicUsize::new(0);
    let cancelled = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                for _ in 0..ROUNDS {
                    let call: CallRef = Arc::new(CountingCall::default());
                    if rpcs.start(rpc.clone(), call, None).unwrap().is_some() {
                        superseded.fetch_add(1, Ordering::SeqCst);
                    }
                    if rpcs.cancel(&rpc).unwrap().is_some() {
                        cancelled.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    let started = THREADS * ROUNDS;
    let superseded = superseded.load(Ordering::SeqCst);
    let cancelled = cancelled.load(Ordering::SeqCst);

    // Every registered call was replaced, cancelled, or is still pending.
    let remaining = started - superseded - cancelled;
    assert!(remaining <= 1);
    assert_eq!(rpcs.len(), remaining);
    assert_eq!(rpcs.get_pending(&rpc).is_some(), remaining == 1);

    let types = sent_types(&sent);
    let requests = types.iter().filter(|t| **t == Some(PacketType::Request)).count();
    let cancels = types.iter().filter(|t| **t == Some(PacketType::ClientError)).count();
    assert_eq!(requests, started);
    assert_eq!(cancels, cancelled);
}
