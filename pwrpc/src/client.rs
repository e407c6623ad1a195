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

//! The RPC client: inbound packet dispatch and call invocation.
//!
//! A [`Client`] owns a fixed set of channels and services. Outbound, it hands
//! out [`MethodClient`]s that start calls. Inbound, the transport passes each
//! received packet to [`Client::process_packet`], which routes it to the
//! pending call it belongs to.

use crate::call::Call;
use crate::channel::Channel;
use crate::config::ClientConfig;
use crate::error::PwrpcError;
use crate::future::{self, StreamFuture, UnaryFuture};
use crate::ids;
use crate::manager::{CallRef, RpcManager};
use crate::metrics::ClientMetrics;
use crate::observer::StreamObserver;
use crate::packet::{self, PacketType, RpcPacket};
use crate::pending::PendingRpc;
use crate::service::{Method, MethodType, Service};
use crate::status::Status;
use prost::Message;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Client for one or more channels to RPC servers.
///
/// # Example
///
/// ```rust
/// use pwrpc::{Channel, Client, Method, Service, StreamObserver};
///
/// #[derive(Clone, PartialEq, prost::Message)]
/// struct Ping {
///     #[prost(uint32, tag = "1")]
///     seq: u32,
/// }
///
/// let service = Service::new("pw.example.Pinger", [Method::unary::<Ping, Ping>("Ping")]).unwrap();
/// // Packets sent on channel 1 go to the transport. Here they are dropped.
/// let channel = Channel::from_fn(1, |_packet: &[u8]| Ok(()));
/// let client = Client::new([channel], [service]).unwrap();
///
/// let call = client
///     .method(1, "pw.example.Pinger/Ping")
///     .unwrap()
///     .invoke_unary(&Ping { seq: 1 }, StreamObserver::<Ping>::new())
///     .unwrap();
/// assert!(call.is_active());
///
/// // Bytes that are not a packet are not processed.
/// assert!(!client.process_packet(b"\xff\xff\xff\xff"));
/// ```
pub struct Client {
    channels: HashMap<u32, Arc<Channel>>,
    services: HashMap<u32, Arc<Service>>,
    rpcs: Arc<RpcManager>,
    config: ClientConfig,
    metrics: Arc<ClientMetrics>,
}

impl Client {
    /// Creates a client with the default configuration.
    ///
    /// # Errors
    ///
    /// See [`Client::with_config`].
    pub fn new(
        channels: impl IntoIterator<Item = Channel>,
        services: impl IntoIterator<Item = Service>,
    ) -> Result<Self, PwrpcError> {
        Self::with_config(channels, services, ClientConfig::default())
    }

    /// Creates a client with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PwrpcError::InvalidId`] for a channel with id 0 and
    /// [`PwrpcError::DuplicateId`] if two channels or two services share an
    /// id.
    pub fn with_config(
        channels: impl IntoIterator<Item = Channel>,
        services: impl IntoIterator<Item = Service>,
        config: ClientConfig,
    ) -> Result<Self, PwrpcError> {
        let mut channel_map = HashMap::new();
        for channel in channels {
            if channel.id() == 0 {
                return Err(PwrpcError::InvalidId {
                    what: "channel",
                    name: "0".to_string(),
                });
            }
            match channel_map.entry(channel.id()) {
                Entry::Occupied(_) => {
                    return Err(PwrpcError::DuplicateId {
                        what: "channel",
                        id: channel.id(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(channel));
                }
            }
        }

        let mut service_map = HashMap::new();
        for service in services {
            match service_map.entry(service.id()) {
                Entry::Occupied(_) => {
                    return Err(PwrpcError::DuplicateId {
                        what: "service",
                        id: service.id(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(service));
                }
            }
        }

        debug!(
            channels = channel_map.len(),
            services = service_map.len(),
            "Created RPC client"
        );

        Ok(Self {
            channels: channel_map,
            services: service_map,
            rpcs: Arc::new(RpcManager::new()),
            config,
            metrics: Arc::new(ClientMetrics::new()),
        })
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Packet and call counters.
    #[must_use]
    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    /// The pending calls of this client.
    #[must_use]
    pub fn rpcs(&self) -> &RpcManager {
        &self.rpcs
    }

    /// Looks up a channel by id.
    #[must_use]
    pub fn channel(&self, channel_id: u32) -> Option<&Arc<Channel>> {
        self.channels.get(&channel_id)
    }

    /// Looks up a service by its fully qualified name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Arc<Service>> {
        self.services
            .get(&ids::calculate(name))
            .filter(|service| service.name() == name)
    }

    /// Looks up a service by wire id.
    #[must_use]
    pub fn service_by_id(&self, service_id: u32) -> Option<&Arc<Service>> {
        self.services.get(&service_id)
    }

    /// Returns a [`MethodClient`] for a method named `pkg.Service/Method` or
    /// `pkg.Service.Method`.
    ///
    /// # Errors
    ///
    /// Returns [`PwrpcError::InvalidMethodName`] if the name has no service
    /// part, and the errors of [`Client::method_by_name`].
    pub fn method(&self, channel_id: u32, full_name: &str) -> Result<MethodClient, PwrpcError> {
        let (service, method) = full_name
            .rsplit_once('/')
            .or_else(|| full_name.rsplit_once('.'))
            .filter(|(service, method)| !service.is_empty() && !method.is_empty())
            .ok_or_else(|| PwrpcError::InvalidMethodName {
                name: full_name.to_string(),
            })?;
        self.method_by_name(channel_id, service, method)
    }

    /// Returns a [`MethodClient`] for a method given by service and method
    /// name.
    ///
    /// # Errors
    ///
    /// Returns [`PwrpcError::UnknownChannel`], [`PwrpcError::UnknownService`]
    /// or [`PwrpcError::UnknownMethod`] if a lookup fails.
    pub fn method_by_name(
        &self,
        channel_id: u32,
        service: &str,
        method: &str,
    ) -> Result<MethodClient, PwrpcError> {
        let channel = self.lookup_channel(channel_id)?;
        let found = self
            .service(service)
            .ok_or_else(|| PwrpcError::UnknownService {
                service: service.to_string(),
            })?;
        let method = found.method(method).ok_or_else(|| PwrpcError::UnknownMethod {
            service: service.to_string(),
            method: method.to_string(),
        })?;
        Ok(self.method_client(channel, method))
    }

    /// Returns a [`MethodClient`] for a method given by wire ids.
    ///
    /// # Errors
    ///
    /// Returns [`PwrpcError::UnknownChannel`], [`PwrpcError::UnknownService`]
    /// or [`PwrpcError::UnknownMethod`] if a lookup fails.
    pub fn method_by_id(
        &self,
        channel_id: u32,
        service_id: u32,
        method_id: u32,
    ) -> Result<MethodClient, PwrpcError> {
        let channel = self.lookup_channel(channel_id)?;
        let service = self
            .service_by_id(service_id)
            .ok_or_else(|| PwrpcError::UnknownService {
                service: format!("{service_id:#010x}"),
            })?;
        let method = service
            .method_by_id(method_id)
            .ok_or_else(|| PwrpcError::UnknownMethod {
                service: service.name().to_string(),
                method: format!("{method_id:#010x}"),
            })?;
        Ok(self.method_client(channel, method))
    }

    fn lookup_channel(&self, channel_id: u32) -> Result<&Arc<Channel>, PwrpcError> {
        self.channels
            .get(&channel_id)
            .ok_or(PwrpcError::UnknownChannel { channel_id })
    }

    fn method_client(&self, channel: &Arc<Channel>, method: &Arc<Method>) -> MethodClient {
        MethodClient {
            rpc: PendingRpc::new(Arc::clone(channel), Arc::clone(method)),
            rpcs: Arc::clone(&self.rpcs),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Processes a packet received from a server.
    ///
    /// Returns `true` if the packet was addressed to this client and handled,
    /// which includes answering it with a CLIENT_ERROR packet because it
    /// named an unknown method or a call that is not pending. Returns
    /// `false` for bytes that are not a packet, packets with unset ids,
    /// packets addressed to a server, and packets for unknown channels.
    ///
    /// Observers of the affected call run on the calling thread before this
    /// returns. Packets may be processed from several threads; events for one
    /// call are delivered one at a time and never after its terminal event.
    pub fn process_packet(&self, data: &[u8]) -> bool {
        self.metrics.record_packet_received();
        let processed = self.dispatch(data);
        if processed {
            self.metrics.record_packet_processed();
        } else {
            self.metrics.record_packet_dropped();
        }
        processed
    }

    fn dispatch(&self, data: &[u8]) -> bool {
        if !self.config.accepts_packet_len(data.len()) {
            warn!(
                len = data.len(),
                max = ?self.config.max_packet_size,
                "Dropping oversized packet"
            );
            return false;
        }

        let packet = match packet::decode(data) {
            Ok(packet) => packet,
            Err(error) => {
                warn!(%error, "Failed to decode packet");
                return false;
            }
        };

        if packet.has_unset_ids() {
            warn!(
                channel_id = packet.channel_id,
                service_id = packet.service_id,
                method_id = packet.method_id,
                "Received corrupt packet with unset ids"
            );
            return false;
        }

        if packet.is_server_bound() {
            debug!(
                packet_type = packet.r#type,
                "Ignoring packet addressed to a server"
            );
            return false;
        }

        let Some(channel) = self.channels.get(&packet.channel_id) else {
            warn!(channel_id = packet.channel_id, "Received packet for unknown channel");
            return false;
        };

        let method = self
            .services
            .get(&packet.service_id)
            .and_then(|service| service.method_by_id(packet.method_id));
        let Some(method) = method else {
            warn!(
                channel_id = packet.channel_id,
                service_id = format_args!("{:#010x}", packet.service_id),
                method_id = format_args!("{:#010x}", packet.method_id),
                "Received packet for unknown method"
            );
            self.reply_error(channel, &packet, Status::NotFound);
            return true;
        };

        let rpc = PendingRpc::new(Arc::clone(channel), Arc::clone(method));
        let packet_type = packet.packet_type();
        let call = if packet_type == Some(PacketType::ServerStream) {
            self.rpcs.get_pending(&rpc)
        } else {
            self.rpcs.clear(&rpc)
        };
        let Some(call) = call else {
            warn!(%rpc, packet_type = packet.r#type, "Received packet for a call that is not pending");
            self.reply_error(channel, &packet, Status::FailedPrecondition);
            return true;
        };

        Self::deliver(&rpc, &call, packet_type, &packet);
        true
    }

    fn deliver(rpc: &PendingRpc, call: &CallRef, packet_type: Option<PacketType>, packet: &RpcPacket) {
        match packet_type {
            Some(PacketType::ServerError) => {
                let status = Self::decode_status(rpc, packet);
                debug!(%rpc, %status, "Call failed");
                call.handle_error(status);
            }
            Some(PacketType::Response) => {
                let status = Self::decode_status(rpc, packet);
                if !rpc.method().method_type().is_server_streaming() {
                    call.handle_next(&packet.payload);
                }
                debug!(%rpc, %status, "Call completed");
                call.handle_completed(status);
            }
            Some(PacketType::ServerStream) => {
                trace!(%rpc, len = packet.payload.len(), "Received server stream message");
                call.handle_next(&packet.payload);
            }
            _ => {
                warn!(%rpc, packet_type = packet.r#type, "Received unexpected packet type");
            }
        }
    }

    fn decode_status(rpc: &PendingRpc, packet: &RpcPacket) -> Status {
        Status::from_code(packet.status).unwrap_or_else(|| {
            warn!(%rpc, code = packet.status, "Unrecognized status code, using UNKNOWN");
            Status::Unknown
        })
    }

    fn reply_error(&self, channel: &Channel, received: &RpcPacket, status: Status) {
        if !self.config.send_error_replies {
            return;
        }
        match channel.send(&packet::error(received, status)) {
            Ok(()) => self.metrics.record_error_reply(),
            Err(error) => warn!(%error, %status, "Failed to send error reply"),
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut channels: Vec<_> = self.channels.keys().copied().collect();
        channels.sort_unstable();
        let mut services: Vec<_> = self.services.values().map(|s| s.name()).collect();
        services.sort_unstable();
        f.debug_struct("Client")
            .field("channels", &channels)
            .field("services", &services)
            .field("pending", &self.rpcs.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Invokes one method on one channel.
///
/// Every invocation checks that the method is of the matching kind and that
/// `Req` and `Resp` are the message types the method was declared with.
/// Starting a call while another call of the same method on the same
/// channel is pending replaces the older call, which ends locally cancelled
/// without notifying its observer.
#[derive(Clone, Debug)]
pub struct MethodClient {
    rpc: PendingRpc,
    rpcs: Arc<RpcManager>,
    metrics: Arc<ClientMetrics>,
}

impl MethodClient {
    /// The key calls of this method are registered under.
    #[must_use]
    pub fn rpc(&self) -> &PendingRpc {
        &self.rpc
    }

    /// The method descriptor.
    #[must_use]
    pub fn method(&self) -> &Arc<Method> {
        self.rpc.method()
    }

    /// The channel calls run on.
    #[must_use]
    pub fn channel_id(&self) -> u32 {
        self.rpc.channel_id()
    }

    /// Starts a unary call.
    ///
    /// # Errors
    ///
    /// Returns [`PwrpcError::WrongMethodType`] or
    /// [`PwrpcError::WrongPayloadType`] if the method does not match, and
    /// [`PwrpcError::ChannelOutput`] if the request could not be sent.
    pub fn invoke_unary<Req, Resp>(
        &self,
        request: &Req,
        observer: StreamObserver<Resp>,
    ) -> Result<Call<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        self.check::<Req, Resp>(MethodType::Unary)?;
        self.start(observer, Some(request.encode_to_vec()))
    }

    /// Starts a server streaming call.
    ///
    /// # Errors
    ///
    /// As for [`MethodClient::invoke_unary`].
    pub fn invoke_server_streaming<Req, Resp>(
        &self,
        request: &Req,
        observer: StreamObserver<Resp>,
    ) -> Result<Call<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        self.check::<Req, Resp>(MethodType::ServerStreaming)?;
        self.start(observer, Some(request.encode_to_vec()))
    }

    /// Starts a client streaming call. Requests are sent with
    /// [`Call::send`] and the stream is closed with [`Call::finish`].
    ///
    /// # Errors
    ///
    /// As for [`MethodClient::invoke_unary`].
    pub fn invoke_client_streaming<Req, Resp>(
        &self,
        observer: StreamObserver<Resp>,
    ) -> Result<Call<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        self.check::<Req, Resp>(MethodType::ClientStreaming)?;
        self.start(observer, None)
    }

    /// Starts a bidirectional streaming call.
    ///
    /// # Errors
    ///
    /// As for [`MethodClient::invoke_unary`].
    pub fn invoke_bidirectional_streaming<Req, Resp>(
        &self,
        observer: StreamObserver<Resp>,
    ) -> Result<Call<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        self.check::<Req, Resp>(MethodType::BidirectionalStreaming)?;
        self.start(observer, None)
    }

    /// Registers a unary call without sending a request, to receive the
    /// response of a call started elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`PwrpcError::WrongMethodType`] or
    /// [`PwrpcError::WrongPayloadType`] if the method does not match.
    pub fn open_unary<Req, Resp>(
        &self,
        observer: StreamObserver<Resp>,
    ) -> Result<Call<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        self.check::<Req, Resp>(MethodType::Unary)?;
        Ok(self.open(observer))
    }

    /// Registers a server streaming call without sending a request.
    ///
    /// # Errors
    ///
    /// As for [`MethodClient::open_unary`].
    pub fn open_server_streaming<Req, Resp>(
        &self,
        observer: StreamObserver<Resp>,
    ) -> Result<Call<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        self.check::<Req, Resp>(MethodType::ServerStreaming)?;
        Ok(self.open(observer))
    }

    /// Registers a client streaming call without sending a request.
    ///
    /// # Errors
    ///
    /// As for [`MethodClient::open_unary`].
    pub fn open_client_streaming<Req, Resp>(
        &self,
        observer: StreamObserver<Resp>,
    ) -> Result<Call<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        self.check::<Req, Resp>(MethodType::ClientStreaming)?;
        Ok(self.open(observer))
    }

    /// Registers a bidirectional streaming call without sending a request.
    ///
    /// # Errors
    ///
    /// As for [`MethodClient::open_unary`].
    pub fn open_bidirectional_streaming<Req, Resp>(
        &self,
        observer: StreamObserver<Resp>,
    ) -> Result<Call<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        self.check::<Req, Resp>(MethodType::BidirectionalStreaming)?;
        Ok(self.open(observer))
    }

    /// Starts a unary call and returns a future for its response.
    ///
    /// # Errors
    ///
    /// As for [`MethodClient::invoke_unary`].
    pub fn invoke_unary_future<Req, Resp>(
        &self,
        request: &Req,
    ) -> Result<UnaryFuture<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        let (observer, receiver) = future::unary_observer(self.rpc.clone());
        let call = self.invoke_unary(request, observer)?;
        Ok(UnaryFuture::new(call, receiver))
    }

    /// Starts a server streaming call, passing responses to `on_next`, and
    /// returns a future for its completion status.
    ///
    /// # Errors
    ///
    /// As for [`MethodClient::invoke_unary`].
    pub fn invoke_server_streaming_future<Req, Resp>(
        &self,
        request: &Req,
        on_next: impl Fn(Resp) + Send + Sync + 'static,
    ) -> Result<StreamFuture<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        let (observer, receiver) = future::stream_observer(self.rpc.clone(), on_next);
        let call = self.invoke_server_streaming(request, observer)?;
        Ok(StreamFuture::new(call, receiver))
    }

    /// Starts a client streaming call and returns a future for its response.
    /// Requests are sent through [`UnaryFuture::call`].
    ///
    /// # Errors
    ///
    /// As for [`MethodClient::invoke_unary`].
    pub fn invoke_client_streaming_future<Req, Resp>(
        &self,
    ) -> Result<UnaryFuture<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        let (observer, receiver) = future::unary_observer(self.rpc.clone());
        let call = self.invoke_client_streaming(observer)?;
        Ok(UnaryFuture::new(call, receiver))
    }

    /// Starts a bidirectional streaming call, passing responses to
    /// `on_next`, and returns a future for its completion status.
    ///
    /// # Errors
    ///
    /// As for [`MethodClient::invoke_unary`].
    pub fn invoke_bidirectional_streaming_future<Req, Resp>(
        &self,
        on_next: impl Fn(Resp) + Send + Sync + 'static,
    ) -> Result<StreamFuture<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        let (observer, receiver) = future::stream_observer(self.rpc.clone(), on_next);
        let call = self.invoke_bidirectional_streaming(observer)?;
        Ok(StreamFuture::new(call, receiver))
    }

    fn check<Req: 'static, Resp: 'static>(&self, method_type: MethodType) -> Result<(), PwrpcError> {
        let method = self.rpc.method();
        method.expect_type(method_type)?;
        method.expect_payloads::<Req, Resp>()
    }

    fn start<Req, Resp>(
        &self,
        observer: StreamObserver<Resp>,
        payload: Option<Vec<u8>>,
    ) -> Result<Call<Req, Resp>, PwrpcError>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        let call = Call::new(self.rpc.clone(), &self.rpcs, observer);
        let previous = self
            .rpcs
            .start(self.rpc.clone(), call.as_pending(), payload.as_deref())?;
        self.metrics.record_call_started();
        self.supersede(previous);
        Ok(call)
    }

    fn open<Req, Resp>(&self, observer: StreamObserver<Resp>) -> Call<Req, Resp>
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        let call = Call::new(self.rpc.clone(), &self.rpcs, observer);
        let previous = self.rpcs.open(self.rpc.clone(), call.as_pending());
        self.metrics.record_call_started();
        self.supersede(previous);
        call
    }

    fn supersede(&self, previous: Option<CallRef>) {
        if let Some(previous) = previous {
            warn!(rpc = %self.rpc, "New call replaced a pending call, cancelling the old call locally");
            previous.handle_released();
        }
    }
}
