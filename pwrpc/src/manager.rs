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

//! Tracking of pending calls.
//!
//! The [`RpcManager`] maps each [`PendingRpc`] key to the call currently
//! occupying it and is the only component that pairs map updates with
//! packet sends. Every operation runs under one lock, held across the send,
//! so a `cancel` can never interleave with a `start` for the same key.
//!
//! A blocking channel output therefore serializes all manager operations
//! while it blocks.

use crate::call::{PendingCall, call_address};
use crate::error::ChannelOutputError;
use crate::packet;
use crate::pending::PendingRpc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Shared handle to a registered call.
pub type CallRef = Arc<dyn PendingCall>;

/// Tracks the pending call for every [`PendingRpc`] key.
///
/// # Example
///
/// ```rust
/// use pwrpc::{Channel, Method, PendingRpc, RpcManager, Service};
/// use std::sync::Arc;
///
/// #[derive(Clone, PartialEq, prost::Message)]
/// struct Empty {}
///
/// let service = Service::new("pw.example.Ping", [Method::unary::<Empty, Empty>("Ping")]).unwrap();
/// let channel = Arc::new(Channel::from_fn(1, |_: &[u8]| Ok(())));
/// let rpc = PendingRpc::new(channel, Arc::clone(service.method("Ping").unwrap()));
///
/// let manager = RpcManager::new();
/// assert!(manager.get_pending(&rpc).is_none());
/// assert!(manager.cancel(&rpc).unwrap().is_none());
/// ```
#[derive(Default)]
pub struct RpcManager {
    pending: Mutex<HashMap<PendingRpc, CallRef>>,
}

impl RpcManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends a REQUEST for `rpc` and registers `call` under it.
    ///
    /// Returns the call that previously occupied the key, if any. The prior
    /// call is no longer tracked; what to do with it is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns the channel's [`ChannelOutputError`] if the request could not
    /// be sent. The map is left unchanged in that case.
    pub fn start(
        &self,
        rpc: PendingRpc,
        call: CallRef,
        payload: Option<&[u8]>,
    ) -> Result<Option<CallRef>, ChannelOutputError> {
        let mut pending = self.pending.lock();
        debug!(%rpc, "Starting call");
        rpc.channel().send(&packet::request(&rpc, payload))?;
        Ok(pending.insert(rpc, call))
    }

    /// Registers `call` under `rpc` without sending anything.
    ///
    /// Used for calls already running on the server, or to listen for a
    /// call another party starts. Returns the previous call, if any.
    pub fn open(&self, rpc: PendingRpc, call: CallRef) -> Option<CallRef> {
        debug!(%rpc, "Opening call");
        self.pending.lock().insert(rpc, call)
    }

    /// Removes the call for `rpc` and, if there was one, tells the server it
    /// was cancelled.
    ///
    /// # Errors
    ///
    /// Returns the channel's [`ChannelOutputError`] if the CLIENT_ERROR packet
    /// could not be sent. The call stays removed.
    pub fn cancel(&self, rpc: &PendingRpc) -> Result<Option<CallRef>, ChannelOutputError> {
        let mut pending = self.pending.lock();
        let Some(call) = pending.remove(rpc) else {
            return Ok(None);
        };
        debug!(%rpc, "Cancelling call");
        rpc.channel().send(&packet::cancel(rpc))?;
        Ok(Some(call))
    }

    /// Removes the call for `rpc` without telling the server.
    pub fn abandon(&self, rpc: &PendingRpc) -> Option<CallRef> {
        let call = self.pending.lock().remove(rpc);
        if call.is_some() {
            debug!(%rpc, "Abandoned call");
        }
        call
    }

    /// Sends one client stream message for `rpc` if a call is pending.
    ///
    /// Returns the pending call, or `None` without sending if there is none.
    ///
    /// # Errors
    ///
    /// Returns the channel's [`ChannelOutputError`] if the packet could not
    /// be sent.
    pub fn client_stream(
        &self,
        rpc: &PendingRpc,
        payload: &[u8],
    ) -> Result<Option<CallRef>, ChannelOutputError> {
        let pending = self.pending.lock();
        let Some(call) = pending.get(rpc).cloned() else {
            return Ok(None);
        };
        trace!(%rpc, len = payload.len(), "Sending client stream message");
        rpc.channel().send(&packet::client_stream(rpc, payload))?;
        Ok(Some(call))
    }

    /// Ends the client stream for `rpc` if a call is pending.
    ///
    /// Returns the pending call, or `None` without sending if there is none.
    ///
    /// # Errors
    ///
    /// Returns the channel's [`ChannelOutputError`] if the packet could not
    /// be sent.
    pub fn client_stream_end(&self, rpc: &PendingRpc) -> Result<Option<CallRef>, ChannelOutputError> {
        let pending = self.pending.lock();
        let Some(call) = pending.get(rpc).cloned() else {
            return Ok(None);
        };
        debug!(%rpc, "Ending client stream");
        rpc.channel().send(&packet::client_stream_end(rpc))?;
        Ok(Some(call))
    }

    /// Removes and returns the call for `rpc` without sending anything.
    pub fn clear(&self, rpc: &PendingRpc) -> Option<CallRef> {
        self.pending.lock().remove(rpc)
    }

    /// Returns the call pending for `rpc`, leaving it registered.
    #[must_use]
    pub fn get_pending(&self, rpc: &PendingRpc) -> Option<CallRef> {
        self.pending.lock().get(rpc).cloned()
    }

    /// Number of pending calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if no call is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Like [`cancel`](Self::cancel), but only if the call registered for
    /// `rpc` is the call at `address`. Returns whether it was.
    pub(crate) fn cancel_call(
        &self,
        rpc: &PendingRpc,
        address: *const (),
    ) -> Result<bool, ChannelOutputError> {
        let mut pending = self.pending.lock();
        if !Self::holds(&pending, rpc, address) {
            return Ok(false);
        }
        pending.remove(rpc);
        rpc.channel().send(&packet::cancel(rpc))?;
        Ok(true)
    }

    /// Like [`abandon`](Self::abandon), but only if the call registered for
    /// `rpc` is the call at `address`. Returns whether it was.
    pub(crate) fn abandon_call(&self, rpc: &PendingRpc, address: *const ()) -> bool {
        let mut pending = self.pending.lock();
        if !Self::holds(&pending, rpc, address) {
            return false;
        }
        pending.remove(rpc);
        true
    }

    fn holds(pending: &HashMap<PendingRpc, CallRef>, rpc: &PendingRpc, address: *const ()) -> bool {
        pending
            .get(rpc)
            .is_some_and(|call| call_address(call) == address)
    }
}

impl Drop for RpcManager {
    fn drop(&mut self) {
        for (rpc, call) in self.pending.get_mut().drain() {
            debug!(%rpc, "Releasing call still pending at shutdown");
            call.handle_released();
        }
    }
}

impl fmt::Debug for RpcManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcManager")
            .field("pending", &self.len())
            .finish()
    }
}

impl fmt::Display for RpcManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.pending.lock();
        write!(f, "RpcManager({} pending:", pending.len())?;
        for rpc in pending.keys() {
            write!(f, " {rpc}")?;
        }
        f.write_str(")")
    }
}
