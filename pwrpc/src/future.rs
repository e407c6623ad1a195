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

//! Futures over calls.
//!
//! These are thin consumers of a [`Call`]: the client registers the call with
//! an observer that fills a one-shot slot when the call ends, and the future
//! resolves from that slot. Futures do not drive any I/O; they resolve when
//! [`Client::process_packet`](crate::Client::process_packet) delivers the
//! terminal packet, whatever task or thread that happens on.
//!
//! If a call ends without a terminal event (it was cancelled, abandoned,
//! superseded by a newer call for the same method, or still pending when the
//! client was dropped) the future resolves to an [`RpcError`] with
//! [`Status::Cancelled`].

use crate::call::Call;
use crate::error::{PwrpcError, RpcError};
use crate::observer::StreamObserver;
use crate::pending::PendingRpc;
use crate::status::Status;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type Outcome<T> = Result<T, PwrpcError>;

/// Result of a unary or client streaming call.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryResult<Resp> {
    response: Resp,
    status: Status,
}

impl<Resp> UnaryResult<Resp> {
    /// The response message.
    pub fn response(&self) -> &Resp {
        &self.response
    }

    /// The status the server completed the call with.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Consumes the result, returning the response message.
    pub fn into_response(self) -> Resp {
        self.response
    }
}

struct UnarySlot<Resp> {
    sender: Option<oneshot::Sender<Outcome<UnaryResult<Resp>>>>,
    response: Option<Resp>,
}

impl<Resp> UnarySlot<Resp> {
    fn resolve(&mut self, outcome: Outcome<UnaryResult<Resp>>) {
        if let Some(sender) = self.sender.take() {
            // The receiver may already be gone.
            let _ = sender.send(outcome);
        }
    }
}

/// Builds the observer that feeds a [`UnaryFuture`].
pub(crate) fn unary_observer<Resp>(
    rpc: PendingRpc,
) -> (StreamObserver<Resp>, oneshot::Receiver<Outcome<UnaryResult<Resp>>>)
where
    Resp: Send + 'static,
{
    let (sender, receiver) = oneshot::channel::<Outcome<UnaryResult<Resp>>>();
    let slot = Arc::new(Mutex::new(UnarySlot {
        sender: Some(sender),
        response: None,
    }));

    let (next_slot, next_rpc) = (Arc::clone(&slot), rpc.clone());
    let completed_slot = Arc::clone(&slot);
    let completed_rpc = rpc.clone();
    let observer = StreamObserver::<Resp>::new()
        .with_next(move |response| {
            let mut slot = next_slot.lock();
            if slot.response.is_some() {
                slot.resolve(Err(PwrpcError::MultipleResponses {
                    rpc: next_rpc.clone(),
                }));
            } else {
                slot.response = Some(response);
            }
        })
        .with_completed(move |status| {
            let mut slot = completed_slot.lock();
            let outcome = match slot.response.take() {
                Some(response) => Ok(UnaryResult { response, status }),
                None => Err(PwrpcError::MissingResponse {
                    rpc: completed_rpc.clone(),
                }),
            };
            slot.resolve(outcome);
        })
        .with_error(move |status| {
            slot.lock()
                .resolve(Err(RpcError::new(rpc.clone(), status).into()));
        });

    (observer, receiver)
}

/// Builds the observer that feeds a [`StreamFuture`], passing every response
/// to `on_next`.
pub(crate) fn stream_observer<Resp>(
    rpc: PendingRpc,
    on_next: impl Fn(Resp) + Send + Sync + 'static,
) -> (StreamObserver<Resp>, oneshot::Receiver<Outcome<Status>>)
where
    Resp: Send + 'static,
{
    let (sender, receiver) = oneshot::channel::<Outcome<Status>>();
    let sender = Arc::new(Mutex::new(Some(sender)));
    let completed = Arc::clone(&sender);

    let observer = StreamObserver::<Resp>::new()
        .with_next(on_next)
        .with_completed(move |status| {
            if let Some(sender) = completed.lock().take() {
                let _ = sender.send(Ok(status));
            }
        })
        .with_error(move |status| {
            if let Some(sender) = sender.lock().take() {
                let _ = sender.send(Err(RpcError::new(rpc.clone(), status).into()));
            }
        });

    (observer, receiver)
}

fn poll_outcome<T, Req, Resp>(
    receiver: &mut oneshot::Receiver<Outcome<T>>,
    call: &Call<Req, Resp>,
    cx: &mut Context<'_>,
) -> Poll<Outcome<T>>
where
    Req: prost::Message + Default + 'static,
    Resp: prost::Message + Default + 'static,
{
    match Pin::new(receiver).poll(cx) {
        Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
        Poll::Ready(Err(_)) => Poll::Ready(Err(
            RpcError::new(call.rpc().clone(), Status::Cancelled).into()
        )),
        Poll::Pending => Poll::Pending,
    }
}

/// Future resolving to the single response of a unary or client streaming
/// call.
///
/// Resolves to:
///
/// * `Ok(UnaryResult)` when the server completes the call with a payload,
///   whatever the completion status.
/// * [`PwrpcError::Rpc`] when the server reports an error, or the call is
///   cancelled locally.
/// * [`PwrpcError::MissingResponse`] or [`PwrpcError::MultipleResponses`]
///   when the server breaks the unary contract.
pub struct UnaryFuture<Req, Resp> {
    call: Call<Req, Resp>,
    receiver: oneshot::Receiver<Outcome<UnaryResult<Resp>>>,
}

impl<Req, Resp> UnaryFuture<Req, Resp>
where
    Req: prost::Message + Default + 'static,
    Resp: prost::Message + Default + 'static,
{
    pub(crate) fn new(
        call: Call<Req, Resp>,
        receiver: oneshot::Receiver<Outcome<UnaryResult<Resp>>>,
    ) -> Self {
        Self { call, receiver }
    }

    /// The underlying call, for cancelling it or streaming requests.
    #[must_use]
    pub fn call(&self) -> &Call<Req, Resp> {
        &self.call
    }
}

impl<Req, Resp> Future for UnaryFuture<Req, Resp>
where
    Req: prost::Message + Default + 'static,
    Resp: prost::Message + Default + 'static,
{
    type Output = Outcome<UnaryResult<Resp>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        poll_outcome(&mut this.receiver, &this.call, cx)
    }
}

impl<Req, Resp> fmt::Debug for UnaryFuture<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryFuture")
            .field("call", &self.call)
            .finish_non_exhaustive()
    }
}

/// Future resolving to the completion status of a server or bidirectional
/// streaming call. Responses go to the callback given when the call started.
pub struct StreamFuture<Req, Resp> {
    call: Call<Req, Resp>,
    receiver: oneshot::Receiver<Outcome<Status>>,
}

impl<Req, Resp> StreamFuture<Req, Resp>
where
    Req: prost::Message + Default + 'static,
    Resp: prost::Message + Default + 'static,
{
    pub(crate) fn new(call: Call<Req, Resp>, receiver: oneshot::Receiver<Outcome<Status>>) -> Self {
        Self { call, receiver }
    }

    /// The underlying call, for cancelling it or streaming requests.
    #[must_use]
    pub fn call(&self) -> &Call<Req, Resp> {
        &self.call
    }
}

impl<Req, Resp> Future for StreamFuture<Req, Resp>
where
    Req: prost::Message + Default + 'static,
    Resp: prost::Message + Default + 'static,
{
    type Output = Outcome<Status>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        poll_outcome(&mut this.receiver, &this.call, cx)
    }
}

impl<Req, Resp> fmt::Debug for StreamFuture<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamFuture")
            .field("call", &self.call)
            .finish_non_exhaustive()
    }
}
