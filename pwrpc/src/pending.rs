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

//! Identity of an in-flight call.

use crate::channel::Channel;
use crate::service::Method;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Addresses one in-flight call by channel, service and method.
///
/// At most one call per key is pending at a time. The key holds the channel
/// and method it names so packets for the call can be built and sent without
/// further lookups, but equality and hashing only consider the three ids.
#[derive(Clone)]
pub struct PendingRpc {
    channel: Arc<Channel>,
    method: Arc<Method>,
}

impl PendingRpc {
    /// Creates a key for `method` on `channel`.
    #[must_use]
    pub fn new(channel: Arc<Channel>, method: Arc<Method>) -> Self {
        Self { channel, method }
    }

    /// The channel the call runs on.
    #[must_use]
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// The method being called.
    #[must_use]
    pub fn method(&self) -> &Arc<Method> {
        &self.method
    }

    /// The channel id.
    #[must_use]
    pub fn channel_id(&self) -> u32 {
        self.channel.id()
    }

    /// The service id.
    #[must_use]
    pub fn service_id(&self) -> u32 {
        self.method.service_id()
    }

    /// The method id.
    #[must_use]
    pub fn method_id(&self) -> u32 {
        self.method.id()
    }

    fn key(&self) -> (u32, u32, u32) {
        (self.channel_id(), self.service_id(), self.method_id())
    }
}

impl PartialEq for PendingRpc {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PendingRpc {}

impl Hash for PendingRpc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for PendingRpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PendingRpc(channel={}, method={})",
            self.channel_id(),
            self.method
        )
    }
}

impl fmt::Debug for PendingRpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRpc")
            .field("channel_id", &self.channel_id())
            .field("service_id", &format_args!("{:#010x}", self.service_id()))
            .field("method_id", &format_args!("{:#010x}", self.method_id()))
            .field("method", &self.method.full_name())
            .finish()
    }
}
