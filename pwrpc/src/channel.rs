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

//! Numbered outbound byte sinks.
//!
//! A [`Channel`] pairs a channel id with the transport capability that
//! delivers encoded packets to the remote endpoint. The client looks channels
//! up by id on every inbound and outbound operation. There is no retry or
//! backoff at this layer: a failed send surfaces immediately to the caller.

use crate::error::ChannelOutputError;
use std::fmt;
use tracing::trace;

/// Transport capability that sends one encoded packet.
///
/// The send may block, enqueue, or fail as the transport sees fit. The client
/// only distinguishes success from failure.
///
/// Closures of the form `Fn(&[u8]) -> Result<(), ChannelOutputError>`
/// implement this trait, which is usually the simplest way to wire a channel
/// to a transport.
///
/// # Example
///
/// ```rust
/// use pwrpc::{Channel, ChannelOutput, ChannelOutputError};
/// use std::sync::Mutex;
///
/// struct Recorder(Mutex<Vec<Vec<u8>>>);
///
/// impl ChannelOutput for Recorder {
///     fn send(&self, packet: &[u8]) -> Result<(), ChannelOutputError> {
///         self.0.lock().unwrap().push(packet.to_vec());
///         Ok(())
///     }
/// }
///
/// let channel = Channel::new(1, Recorder(Mutex::new(Vec::new())));
/// assert_eq!(channel.id(), 1);
/// ```
pub trait ChannelOutput: Send + Sync {
    /// Sends an encoded packet to the remote endpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelOutputError`] if the packet could not be sent.
    fn send(&self, packet: &[u8]) -> Result<(), ChannelOutputError>;
}

impl<F> ChannelOutput for F
where
    F: Fn(&[u8]) -> Result<(), ChannelOutputError> + Send + Sync,
{
    fn send(&self, packet: &[u8]) -> Result<(), ChannelOutputError> {
        self(packet)
    }
}

/// A numbered channel to an RPC endpoint.
///
/// # Example
///
/// ```rust
/// use pwrpc::Channel;
///
/// let channel = Channel::from_fn(1, |packet: &[u8]| {
///     println!("sending {} bytes", packet.len());
///     Ok(())
/// });
/// channel.send(&[0x08, 0x01]).unwrap();
/// ```
pub struct Channel {
    id: u32,
    output: Box<dyn ChannelOutput>,
}

impl Channel {
    /// Creates a channel with the given id and output.
    pub fn new(id: u32, output: impl ChannelOutput + 'static) -> Self {
        Self {
            id,
            output: Box::new(output),
        }
    }

    /// Creates a channel whose output is a closure.
    pub fn from_fn<F>(id: u32, output: F) -> Self
    where
        F: Fn(&[u8]) -> Result<(), ChannelOutputError> + Send + Sync + 'static,
    {
        Self::new(id, output)
    }

    /// Returns the channel id.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Sends an encoded packet through this channel's output.
    ///
    /// # Errors
    ///
    /// Returns the output's [`ChannelOutputError`] unchanged.
    pub fn send(&self, packet: &[u8]) -> Result<(), ChannelOutputError> {
        trace!(channel_id = self.id, len = packet.len(), "Sending packet");
        self.output.send(packet)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("output", &"<output>")
            .finish()
    }
}
