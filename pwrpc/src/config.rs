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

//! Configuration for the client.

/// Configuration for a [`Client`](crate::Client).
///
/// # Examples
///
/// ```rust
/// use pwrpc::ClientConfig;
///
/// // Use default configuration
/// let config = ClientConfig::default();
/// assert!(config.send_error_replies);
///
/// // Customize configuration
/// let config = ClientConfig {
///     max_packet_size: Some(512),
///     ..Default::default()
/// };
/// assert_eq!(config.max_packet_size, Some(512));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientConfig {
    /// Largest inbound packet the client will decode, in bytes.
    ///
    /// Larger packets are reported as not processed without being decoded.
    /// `None` accepts packets of any size.
    ///
    /// Default: None (unlimited)
    pub max_packet_size: Option<usize>,

    /// Whether to answer inbound packets the client cannot route with a
    /// CLIENT_ERROR packet.
    ///
    /// Applies to packets naming an unknown service or method (NOT_FOUND)
    /// and packets for calls that are not pending (FAILED_PRECONDITION).
    /// Such packets count as processed either way.
    ///
    /// Default: true
    pub send_error_replies: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_packet_size: None,
            send_error_replies: true,
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest inbound packet size.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pwrpc::ClientConfig;
    ///
    /// let config = ClientConfig::new().with_max_packet_size(Some(256));
    /// assert_eq!(config.max_packet_size, Some(256));
    /// ```
    #[must_use]
    pub fn with_max_packet_size(mut self, size: Option<usize>) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Sets whether unroutable packets are answered with CLIENT_ERROR.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pwrpc::ClientConfig;
    ///
    /// let config = ClientConfig::new().with_error_replies(false);
    /// assert!(!config.send_error_replies);
    /// ```
    #[must_use]
    pub fn with_error_replies(mut self, enable: bool) -> Self {
        self.send_error_replies = enable;
        self
    }

    /// Returns `true` if a packet of `len` bytes is within the size limit.
    #[must_use]
    pub fn accepts_packet_len(&self, len: usize) -> bool {
        self.max_packet_size.is_none_or(|max| len <= max)
    }
}
