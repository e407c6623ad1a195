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

//! Client counters.
//!
//! Counters are kept in relaxed atomics and are always available through
//! [`Client::metrics`](crate::Client::metrics). With the `observability`
//! feature every event is also recorded through the `metrics` crate under
//! `pwrpc.client.*`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Packet and call counters for one client.
///
/// # Examples
///
/// ```rust
/// use pwrpc::ClientMetrics;
///
/// let metrics = ClientMetrics::new();
/// metrics.record_packet_received();
/// metrics.record_packet_dropped();
///
/// assert_eq!(metrics.packets_received(), 1);
/// assert_eq!(metrics.packets_processed(), 0);
/// assert_eq!(metrics.packets_dropped(), 1);
/// ```
#[derive(Debug, Default)]
pub struct ClientMetrics {
    /// Inbound packets handed to the client
    packets_received: AtomicU64,
    /// Inbound packets the client processed
    packets_processed: AtomicU64,
    /// Inbound packets reported as not processed
    packets_dropped: AtomicU64,
    /// CLIENT_ERROR replies sent for unroutable packets
    error_replies: AtomicU64,
    /// Calls started or opened through the client
    calls_started: AtomicU64,
}

impl ClientMetrics {
    /// Creates a tracker with every counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an inbound packet.
    pub fn record_packet_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("pwrpc.client.packets.received").increment(1);
    }

    /// Records an inbound packet that was processed.
    pub fn record_packet_processed(&self) {
        self.packets_processed.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("pwrpc.client.packets.processed").increment(1);
    }

    /// Records an inbound packet that was not processed.
    pub fn record_packet_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("pwrpc.client.packets.dropped").increment(1);
    }

    /// Records a CLIENT_ERROR reply to an unroutable packet.
    pub fn record_error_reply(&self) {
        self.error_replies.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("pwrpc.client.error_replies").increment(1);
    }

    /// Records a call being started or opened.
    pub fn record_call_started(&self) {
        self.calls_started.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("pwrpc.client.calls.started").increment(1);
    }

    /// Total inbound packets.
    #[must_use]
    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    /// Inbound packets that were processed.
    #[must_use]
    pub fn packets_processed(&self) -> u64 {
        self.packets_processed.load(Ordering::Relaxed)
    }

    /// Inbound packets that were not processed.
    #[must_use]
    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped.load(Ordering::Relaxed)
    }

    /// CLIENT_ERROR replies sent.
    #[must_use]
    pub fn error_replies(&self) -> u64 {
        self.error_replies.load(Ordering::Relaxed)
    }

    /// Calls started or opened.
    #[must_use]
    pub fn calls_started(&self) -> u64 {
        self.calls_started.load(Ordering::Relaxed)
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.packets_received.store(0, Ordering::Relaxed);
        self.packets_processed.store(0, Ordering::Relaxed);
        self.packets_dropped.store(0, Ordering::Relaxed);
        self.error_replies.store(0, Ordering::Relaxed);
        self.calls_started.store(0, Ordering::Relaxed);
    }
}
