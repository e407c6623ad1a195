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

//! In-memory client harness for tests.
//!
//! [`TestClient`] wraps a [`Client`] whose single channel records every
//! packet the client sends instead of transmitting it, and offers helpers
//! that play the server side: building RESPONSE, SERVER_STREAM and
//! SERVER_ERROR packets and feeding them to the client.
//!
//! # Example
//!
//! ```rust
//! use pwrpc::testing::TestClient;
//! use pwrpc::{Method, Service, Status, StreamObserver};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Clone, PartialEq, prost::Message)]
//! struct Echo {
//!     #[prost(string, tag = "1")]
//!     text: String,
//! }
//!
//! let service = Service::new("pw.example.Echo", [Method::unary::<Echo, Echo>("Echo")]).unwrap();
//! let test = TestClient::new([service]).unwrap();
//!
//! let received = Arc::new(Mutex::new(None));
//! let sink = Arc::clone(&received);
//! test.method("pw.example.Echo/Echo")
//!     .unwrap()
//!     .invoke_unary(
//!         &Echo { text: "hi".into() },
//!         StreamObserver::new().with_next(move |echo: Echo| *sink.lock().unwrap() = Some(echo.text)),
//!     )
//!     .unwrap();
//!
//! assert_eq!(test.sent_payloads::<Echo>(), vec![Echo { text: "hi".into() }]);
//!
//! assert!(test.receive_response("pw.example.Echo", "Echo", &Echo { text: "hi".into() }, Status::Ok));
//! assert_eq!(received.lock().unwrap().as_deref(), Some("hi"));
//! ```

use crate::channel::Channel;
use crate::client::{Client, MethodClient};
use crate::config::ClientConfig;
use crate::error::{ChannelOutputError, PwrpcError};
use crate::ids;
use crate::packet::{self, PacketType, RpcPacket};
use crate::service::Service;
use crate::status::Status;
use parking_lot::Mutex;
use prost::Message;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

#[derive(Default)]
struct Recorder {
    packets: Vec<Vec<u8>>,
    client_stream_cursor: usize,
    output_error: Option<String>,
}

/// A [`Client`] with one recording channel.
pub struct TestClient {
    client: Client,
    recorder: Arc<Mutex<Recorder>>,
}

impl TestClient {
    /// Id of the recording channel.
    pub const CHANNEL_ID: u32 = 1;

    /// Creates a test client for `services` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Client::new`].
    pub fn new(services: impl IntoIterator<Item = Service>) -> Result<Self, PwrpcError> {
        Self::with_config(services, ClientConfig::default())
    }

    /// Creates a test client for `services` with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Client::with_config`].
    pub fn with_config(
        services: impl IntoIterator<Item = Service>,
        config: ClientConfig,
    ) -> Result<Self, PwrpcError> {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let sink = Arc::clone(&recorder);
        let channel = Channel::from_fn(Self::CHANNEL_ID, move |bytes: &[u8]| {
            let mut recorder = sink.lock();
            if let Some(message) = &recorder.output_error {
                return Err(ChannelOutputError::new(message.clone()));
            }
            recorder.packets.push(bytes.to_vec());
            Ok(())
        });
        Ok(Self {
            client: Client::with_config([channel], services, config)?,
            recorder,
        })
    }

    /// The wrapped client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns a [`MethodClient`] for `pkg.Service/Method` on the recording
    /// channel.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Client::method`].
    pub fn method(&self, full_name: &str) -> Result<MethodClient, PwrpcError> {
        self.client.method(Self::CHANNEL_ID, full_name)
    }

    /// Every packet the client has sent, oldest first.
    #[must_use]
    pub fn sent_packets(&self) -> Vec<RpcPacket> {
        self.recorder
            .lock()
            .packets
            .iter()
            .filter_map(|bytes| packet::decode(bytes).ok())
            .collect()
    }

    /// Payloads of every REQUEST and CLIENT_STREAM packet sent, decoded as
    /// `T`. Payloads that do not decode are skipped.
    #[must_use]
    pub fn sent_payloads<T: Message + Default>(&self) -> Vec<T> {
        self.sent_packets()
            .iter()
            .filter(|packet| {
                matches!(
                    packet.packet_type(),
                    Some(PacketType::Request | PacketType::ClientStream)
                )
            })
            .filter_map(Self::decode_payload)
            .collect()
    }

    /// Payloads of the CLIENT_STREAM packets sent since the previous call,
    /// decoded as `T`.
    pub fn last_client_streams<T: Message + Default>(&self) -> Vec<T> {
        let fresh: Vec<Vec<u8>> = {
            let mut recorder = self.recorder.lock();
            let start = recorder.client_stream_cursor.min(recorder.packets.len());
            recorder.client_stream_cursor = recorder.packets.len();
            recorder.packets[start..].to_vec()
        };
        fresh
            .iter()
            .filter_map(|bytes| packet::decode(bytes).ok())
            .filter(|packet| packet.packet_type() == Some(PacketType::ClientStream))
            .filter_map(|packet| Self::decode_payload(&packet))
            .collect()
    }

    /// Makes every following send on the channel fail with `message`.
    pub fn set_channel_output_error(&self, message: impl Into<String>) {
        self.recorder.lock().output_error = Some(message.into());
    }

    /// Lets sends on the channel succeed again.
    pub fn clear_channel_output_error(&self) {
        self.recorder.lock().output_error = None;
    }

    /// Delivers a RESPONSE carrying `payload` and `status`.
    ///
    /// Returns the result of [`Client::process_packet`].
    pub fn receive_response<T: Message>(
        &self,
        service: &str,
        method: &str,
        payload: &T,
        status: Status,
    ) -> bool {
        self.receive(PacketType::Response, service, method, payload.encode_to_vec(), status)
    }

    /// Delivers a RESPONSE with no payload, as ends a server streaming call.
    pub fn receive_status(&self, service: &str, method: &str, status: Status) -> bool {
        self.receive(PacketType::Response, service, method, Vec::new(), status)
    }

    /// Delivers one SERVER_STREAM message.
    pub fn receive_server_stream<T: Message>(&self, service: &str, method: &str, payload: &T) -> bool {
        self.receive(
            PacketType::ServerStream,
            service,
            method,
            payload.encode_to_vec(),
            Status::Ok,
        )
    }

    /// Delivers a SERVER_ERROR with `status`.
    pub fn receive_server_error(&self, service: &str, method: &str, status: Status) -> bool {
        self.receive(PacketType::ServerError, service, method, Vec::new(), status)
    }

    /// Passes raw bytes to [`Client::process_packet`].
    pub fn process_packet(&self, data: &[u8]) -> bool {
        self.client.process_packet(data)
    }

    fn receive(
        &self,
        packet_type: PacketType,
        service: &str,
        method: &str,
        payload: Vec<u8>,
        status: Status,
    ) -> bool {
        let bytes = RpcPacket {
            r#type: packet_type.into(),
            channel_id: Self::CHANNEL_ID,
            service_id: ids::calculate(service),
            method_id: ids::calculate(method),
            payload,
            status: status.code(),
        }
        .encode_to_vec();
        self.client.process_packet(&bytes)
    }

    fn decode_payload<T: Message + Default>(packet: &RpcPacket) -> Option<T> {
        match T::decode(packet.payload.as_slice()) {
            Ok(payload) => Some(payload),
            Err(error) => {
                warn!(%error, "Skipping sent payload that failed to decode");
                None
            }
        }
    }
}

impl fmt::Debug for TestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClient")
            .field("client", &self.client)
            .field("sent", &self.recorder.lock().packets.len())
            .finish()
    }
}
