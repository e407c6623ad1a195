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

//! Per-invocation call state.
//!
//! A [`Call`] is active until exactly one terminal transition happens:
//!
//! ```text
//!            on_next (any number)
//!               ┌───┐
//!               ▼   │
//!            ┌────────┐  on_completed(s)   ┌───────────────┐
//!            │ Active │──────────────────▶│ Completed(s)  │
//!            └────────┘                    └───────────────┘
//!               │  on_error(s) / cancel / abandon
//!               ▼
//!          ┌─────────────┐
//!          │ Errored(s)  │   (cancel and abandon use CANCELLED)
//!          └─────────────┘
//! ```
//!
//! The observer is released on the terminal transition, so it can never see
//! another event afterward. Local cancellation releases it without a terminal
//! event.

use crate::channel::Channel;
use crate::error::{ChannelOutputError, PwrpcError, RpcError};
use crate::manager::RpcManager;
use crate::observer::StreamObserver;
use crate::pending::PendingRpc;
use crate::service::MethodType;
use crate::status::Status;
use parking_lot::{Mutex, ReentrantMutex};
use prost::Message;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Type-erased view of a call, as stored by the [`RpcManager`].
///
/// The dispatcher drives calls through this trait after it has resolved the
/// call for an inbound packet. Implementations must tolerate events arriving
/// after they have become terminal and ignore them.
pub trait PendingCall: Send + Sync {
    /// Handles an encoded response message.
    fn handle_next(&self, payload: &[u8]);

    /// Handles the end of the call with a status from the server.
    fn handle_completed(&self, status: Status);

    /// Handles a server error.
    fn handle_error(&self, status: Status);

    /// Handles the call leaving the table without a terminal packet, because
    /// another call took its key or the client was dropped. The call becomes
    /// locally cancelled without notifying its observer.
    fn handle_released(&self);

    /// Returns `true` until the call has reached a terminal state.
    fn is_active(&self) -> bool;
}

/// Address of the allocation behind a call, used to tell calls sharing a key
/// apart.
pub(crate) fn call_address<T: ?Sized>(call: &Arc<T>) -> *const () {
    Arc::as_ptr(call).cast::<()>()
}

/// The observer is present exactly while the call is active.
struct CallState<Resp> {
    status: Option<Status>,
    error: Option<Status>,
    observer: Option<Arc<StreamObserver<Resp>>>,
}

impl<Resp> CallState<Resp> {
    fn is_active(&self) -> bool {
        self.status.is_none() && self.error.is_none()
    }

    fn active_observer(&self) -> Option<Arc<StreamObserver<Resp>>> {
        if self.is_active() {
            self.observer.clone()
        } else {
            None
        }
    }
}

struct CallInner<Resp> {
    rpc: PendingRpc,
    rpcs: Weak<RpcManager>,
    state: Mutex<CallState<Resp>>,
    /// Held while the observer runs, so events for one call never
    /// interleave even when packets are processed on several threads.
    delivery: ReentrantMutex<()>,
}

impl<Resp> CallInner<Resp> {
    /// Applies a terminal transition and hands back the observer to notify.
    /// Returns `None` if the call was already terminal.
    fn terminate(
        &self,
        apply: impl FnOnce(&mut CallState<Resp>),
    ) -> Option<Arc<StreamObserver<Resp>>> {
        let mut state = self.state.lock();
        if !state.is_active() {
            return None;
        }
        apply(&mut state);
        state.observer.take()
    }
}

impl<Resp> PendingCall for CallInner<Resp>
where
    Resp: Message + Default + 'static,
{
    fn handle_next(&self, payload: &[u8]) {
        let _delivery = self.delivery.lock();
        let Some(observer) = self.state.lock().active_observer() else {
            return;
        };
        match Resp::decode(payload) {
            Ok(response) => observer.on_next(response),
            Err(error) => warn!(
                rpc = %self.rpc,
                %error,
                "Ignoring response payload that failed to decode"
            ),
        }
    }

    fn handle_completed(&self, status: Status) {
        let _delivery = self.delivery.lock();
        if let Some(observer) = self.terminate(|state| state.status = Some(status)) {
            observer.on_completed(status);
        }
    }

    fn handle_error(&self, status: Status) {
        let _delivery = self.delivery.lock();
        if let Some(observer) = self.terminate(|state| state.error = Some(status)) {
            observer.on_error(status);
        }
    }

    fn handle_released(&self) {
        drop(self.terminate(|state| state.error = Some(Status::Cancelled)));
    }

    fn is_active(&self) -> bool {
        self.state.lock().is_active()
    }
}

/// Handle to one invocation of an RPC method.
///
/// Handles are cheap to clone; every clone refers to the same call. Dropping
/// every handle does not end the call: a pending call stays registered with
/// the client until the server finishes it or it is cancelled or abandoned.
pub struct Call<Req, Resp> {
    inner: Arc<CallInner<Resp>>,
    _request: PhantomData<fn(Req)>,
}

impl<Req, Resp> Call<Req, Resp>
where
    Req: Message + Default + 'static,
    Resp: Message + Default + 'static,
{
    pub(crate) fn new(rpc: PendingRpc, rpcs: &Arc<RpcManager>, observer: StreamObserver<Resp>) -> Self {
        Self {
            inner: Arc::new(CallInner {
                rpc,
                rpcs: Arc::downgrade(rpcs),
                state: Mutex::new(CallState {
                    status: None,
                    error: None,
                    observer: Some(Arc::new(observer)),
                }),
                delivery: ReentrantMutex::new(()),
            }),
            _request: PhantomData,
        }
    }

    /// The type-erased call to register with the [`RpcManager`].
    pub(crate) fn as_pending(&self) -> Arc<dyn PendingCall> {
        self.inner.clone()
    }

    /// The key this call is registered under.
    #[must_use]
    pub fn rpc(&self) -> &PendingRpc {
        &self.inner.rpc
    }

    /// The channel the call runs on.
    #[must_use]
    pub fn channel(&self) -> &Arc<Channel> {
        self.inner.rpc.channel()
    }

    /// Returns `true` until the call completes, fails, or is cancelled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.state.lock().is_active()
    }

    /// The status the call completed with, if it completed.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        self.inner.state.lock().status
    }

    /// The error the call ended with, if any. Cancelled calls report
    /// [`Status::Cancelled`].
    #[must_use]
    pub fn error(&self) -> Option<Status> {
        self.inner.state.lock().error
    }

    /// Cancels the call and tells the server.
    ///
    /// Returns `Ok(false)` if the call was no longer active. The call is
    /// marked cancelled before the CLIENT_ERROR packet is sent and stays
    /// cancelled if the send fails. The observer is not notified.
    ///
    /// # Errors
    ///
    /// Returns the channel's [`ChannelOutputError`] if the cancellation could
    /// not be sent.
    pub fn cancel(&self) -> Result<bool, ChannelOutputError> {
        if !self.end_locally() {
            return Ok(false);
        }
        debug!(rpc = %self.inner.rpc, "Cancelling call");
        if let Some(rpcs) = self.inner.rpcs.upgrade() {
            rpcs.cancel_call(&self.inner.rpc, call_address(&self.inner))?;
        }
        Ok(true)
    }

    /// Stops tracking the call without telling the server.
    ///
    /// Returns `false` if the call was no longer active. Later packets from
    /// the server for this call are answered with FAILED_PRECONDITION.
    pub fn abandon(&self) -> bool {
        if !self.end_locally() {
            return false;
        }
        debug!(rpc = %self.inner.rpc, "Abandoning call");
        if let Some(rpcs) = self.inner.rpcs.upgrade() {
            rpcs.abandon_call(&self.inner.rpc, call_address(&self.inner));
        }
        true
    }

    /// Sends one message of the client stream.
    ///
    /// # Errors
    ///
    /// * [`PwrpcError::WrongMethodType`] if the method has no client stream.
    /// * [`PwrpcError::Rpc`] with [`Status::Cancelled`] if the call was
    ///   cancelled or failed, or with [`Status::FailedPrecondition`] if it
    ///   already completed.
    /// * [`PwrpcError::ChannelOutput`] if the packet could not be sent.
    pub fn send(&self, request: &Req) -> Result<(), PwrpcError> {
        self.expect_client_stream()?;
        {
            let state = self.inner.state.lock();
            if state.error.is_some() {
                return Err(RpcError::new(self.inner.rpc.clone(), Status::Cancelled).into());
            }
            if state.status.is_some() {
                return Err(
                    RpcError::new(self.inner.rpc.clone(), Status::FailedPrecondition).into(),
                );
            }
        }
        let Some(rpcs) = self.inner.rpcs.upgrade() else {
            return Err(RpcError::new(self.inner.rpc.clone(), Status::FailedPrecondition).into());
        };
        rpcs.client_stream(&self.inner.rpc, &request.encode_to_vec())?;
        Ok(())
    }

    /// Tells the server the client stream is done. Does nothing if the call
    /// is no longer active.
    ///
    /// # Errors
    ///
    /// * [`PwrpcError::WrongMethodType`] if the method has no client stream.
    /// * [`PwrpcError::ChannelOutput`] if the packet could not be sent.
    pub fn finish(&self) -> Result<(), PwrpcError> {
        self.expect_client_stream()?;
        if !self.is_active() {
            return Ok(());
        }
        if let Some(rpcs) = self.inner.rpcs.upgrade() {
            rpcs.client_stream_end(&self.inner.rpc)?;
        }
        Ok(())
    }

    fn expect_client_stream(&self) -> Result<(), PwrpcError> {
        let method = self.inner.rpc.method();
        if method.method_type().is_client_streaming() {
            return Ok(());
        }
        Err(PwrpcError::WrongMethodType {
            method: method.full_name(),
            expected: MethodType::ClientStreaming,
            actual: method.method_type(),
        })
    }

    /// Marks an active call cancelled and releases its observer.
    fn end_locally(&self) -> bool {
        self.inner
            .terminate(|state| state.error = Some(Status::Cancelled))
            .is_some()
    }
}

impl<Req, Resp> Clone for Call<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _request: PhantomData,
        }
    }
}

impl<Req, Resp> fmt::Debug for Call<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Call")
            .field("rpc", &self.inner.rpc)
            .field("status", &state.status)
            .field("error", &state.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{self, PacketType};
    use crate::service::{Method, Service};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone, PartialEq, prost::Message)]
    struct Reading {
        #[prost(sint32, tag = "1")]
        celsius: i32,
    }

    struct Harness {
        rpcs: Arc<RpcManager>,
        service: Service,
        channel: Arc<Channel>,
        sent: Arc<parking_lot::Mutex<Vec<Vec<u8>>>>,
        offline: Arc<AtomicBool>,
        events: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl Harness {
        fn new() -> Self {
            let sent = Arc::new(parking_lot::Mutex::new(Vec::new()));
            let offline = Arc::new(AtomicBool::new(false));
            let (sink, down) = (Arc::clone(&sent), Arc::clone(&offline));
            let channel = Arc::new(Channel::from_fn(1, move |bytes: &[u8]| {
                if down.load(Ordering::SeqCst) {
                    return Err(ChannelOutputError::new("offline"));
                }
                sink.lock().push(bytes.to_vec());
                Ok(())
            }));
            let service = Service::new(
                "pw.test.Sensors",
                [
                    Method::unary::<Reading, Reading>("Get"),
                    Method::client_streaming::<Reading, Reading>("Upload"),
                ],
            )
            .unwrap();
            Self {
                rpcs: Arc::new(RpcManager::new()),
                service,
                channel,
                sent,
                offline,
                events: Arc::new(parking_lot::Mutex::new(Vec::new())),
            }
        }

        fn start(&self, method: &str) -> Call<Reading, Reading> {
            let rpc = PendingRpc::new(
                Arc::clone(&self.channel),
                Arc::clone(self.service.method(method).unwrap()),
            );
            let (next, done, failed) = (
                Arc::clone(&self.events),
                Arc::clone(&self.events),
                Arc::clone(&self.events),
            );
            let observer = StreamObserver::new()
                .with_next(move |r: Reading| next.lock().push(format!("next {}", r.celsius)))
                .with_completed(move |s| done.lock().push(format!("completed {s}")))
                .with_error(move |s| failed.lock().push(format!("error {s}")));
            let call = Call::new(rpc.clone(), &self.rpcs, observer);
            self.rpcs.start(rpc, call.as_pending(), None).unwrap();
            call
        }

        fn sent_types(&self) -> Vec<Option<PacketType>> {
            self.sent
                .lock()
                .iter()
                .map(|bytes| packet::decode(bytes).unwrap().packet_type())
                .collect()
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    fn reading(celsius: i32) -> Vec<u8> {
        Reading { celsius }.encode_to_vec()
    }

    #[test]
    fn test_next_then_completed() {
        let harness = Harness::new();
        let call = harness.start("Get");
        let pending = call.as_pending();

        pending.handle_next(&reading(21));
        pending.handle_completed(Status::Ok);

        assert_eq!(harness.events(), vec!["next 21", "completed OK"]);
        assert!(!call.is_active());
        assert_eq!(call.status(), Some(Status::Ok));
        assert_eq!(call.error(), None);
    }

    #[test]
    fn test_terminal_is_idempotent() {
        let harness = Harness::new();
        let call = harness.start("Get");
        let pending = call.as_pending();

        pending.handle_error(Status::Unavailable);
        pending.handle_error(Status::Internal);
        pending.handle_completed(Status::Ok);
        pending.handle_next(&reading(5));

        assert_eq!(harness.events(), vec!["error UNAVAILABLE"]);
        assert_eq!(call.error(), Some(Status::Unavailable));
        assert_eq!(call.status(), None);
    }

    #[test]
    fn test_undecodable_payload_is_ignored() {
        let harness = Harness::new();
        let call = harness.start("Get");

        call.as_pending().handle_next(&[0xFF, 0xFF, 0xFF]);

        assert!(harness.events().is_empty());
        assert!(call.is_active());
    }

    #[test]
    fn test_cancel_sends_cancel_once() {
        let harness = Harness::new();
        let call = harness.start("Get");

        assert!(call.cancel().unwrap());
        assert!(!call.cancel().unwrap());

        assert_eq!(call.error(), Some(Status::Cancelled));
        assert!(harness.rpcs.get_pending(call.rpc()).is_none());
        assert_eq!(
            harness.sent_types(),
            vec![Some(PacketType::Request), Some(PacketType::ClientError)]
        );
        assert!(harness.events().is_empty());
    }

    #[test]
    fn test_cancel_failure_stays_cancelled() {
        let harness = Harness::new();
        let call = harness.start("Get");
        harness.offline.store(true, Ordering::SeqCst);

        assert!(call.cancel().is_err());
        assert!(!call.is_active());
        assert_eq!(call.error(), Some(Status::Cancelled));
        assert!(harness.rpcs.get_pending(call.rpc()).is_none());
    }

    #[test]
    fn test_abandon_sends_nothing() {
        let harness = Harness::new();
        let call = harness.start("Get");

        assert!(call.abandon());
        assert!(!call.abandon());

        assert_eq!(call.error(), Some(Status::Cancelled));
        assert!(harness.rpcs.is_empty());
        assert_eq!(harness.sent_types(), vec![Some(PacketType::Request)]);
    }

    #[test]
    fn test_send_and_finish() {
        let harness = Harness::new();
        let call = harness.start("Upload");

        call.send(&Reading { celsius: 3 }).unwrap();
        call.finish().unwrap();

        assert_eq!(
            harness.sent_types(),
            vec![
                Some(PacketType::Request),
                Some(PacketType::ClientStream),
                Some(PacketType::ClientStreamEnd),
            ]
        );
    }

    #[test]
    fn test_send_after_cancel() {
        let harness = Harness::new();
        let call = harness.start("Upload");
        call.cancel().unwrap();

        let error = call.send(&Reading { celsius: 1 }).unwrap_err();
        assert_eq!(error.status(), Some(Status::Cancelled));
    }

    #[test]
    fn test_send_after_completion() {
        let harness = Harness::new();
        let call = harness.start("Upload");
        call.as_pending().handle_completed(Status::Ok);

        let error = call.send(&Reading { celsius: 1 }).unwrap_err();
        assert_eq!(error.status(), Some(Status::FailedPrecondition));

        call.finish().unwrap();
        assert_eq!(harness.sent_types(), vec![Some(PacketType::Request)]);
    }

    #[test]
    fn test_send_on_unary_rejected() {
        let harness = Harness::new();
        let call = harness.start("Get");
        let error = call.send(&Reading { celsius: 1 }).unwrap_err();
        assert!(matches!(error, PwrpcError::WrongMethodType { .. }));
    }

    #[test]
    fn test_finish_on_unary_rejected() {
        let harness = Harness::new();
        let call = harness.start("Get");
        let error = call.finish().unwrap_err();
        assert!(matches!(error, PwrpcError::WrongMethodType { .. }));
        assert_eq!(harness.sent_types(), vec![Some(PacketType::Request)]);
    }

    #[test]
    fn test_dropped_manager_releases_call() {
        let harness = Harness::new();
        let call = harness.start("Upload");
        let Harness { rpcs, events, .. } = harness;
        drop(rpcs);

        assert_eq!(call.error(), Some(Status::Cancelled));
        assert!(!call.cancel().unwrap());
        assert!(call.send(&Reading { celsius: 1 }).is_err());
        assert!(call.finish().is_ok());
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_superseded_call_is_silenced() {
        let harness = Harness::new();
        let call = harness.start("Get");

        call.as_pending().handle_released();
        call.as_pending().handle_completed(Status::Ok);

        assert_eq!(call.error(), Some(Status::Cancelled));
        assert!(harness.events().is_empty());
    }

    #[test]
    fn test_cancel_leaves_newer_call_registered() {
        let harness = Harness::new();
        let old = harness.start("Get");
        let new = harness.start("Get");

        assert!(old.cancel().unwrap());

        let registered = harness.rpcs.get_pending(new.rpc()).unwrap();
        assert!(Arc::ptr_eq(&registered, &new.as_pending()));
        assert_eq!(
            harness.sent_types(),
            vec![Some(PacketType::Request), Some(PacketType::Request)]
        );
    }
}
