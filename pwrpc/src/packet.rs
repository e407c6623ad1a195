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

//! RPC packet schema and the packet constructors used by the client.
//!
//! Every packet is a single protobuf message ([`RpcPacket`]). Packet types
//! sent by clients have even values and packet types sent by servers have odd
//! values, so an endpoint can reject traffic meant for the other side without
//! knowing every type.
//!
//! The constructors in this module return encoded bytes ready for
//! [`Channel::send`](crate::Channel::send). Encoding cannot fail.
//!
//! # Example
//!
//! ```rust
//! use pwrpc::packet::{self, PacketType, RpcPacket};
//! use prost::Message;
//!
//! let bytes = RpcPacket {
//!     r#type: PacketType::Response.into(),
//!     channel_id: 1,
//!     service_id: 0x1234,
//!     method_id: 0x5678,
//!     payload: vec![1, 2, 3],
//!     status: 0,
//! }
//! .encode_to_vec();
//!
//! let decoded = packet::decode(&bytes).unwrap();
//! assert_eq!(decoded.packet_type(), Some(PacketType::Response));
//! assert!(!decoded.is_server_bound());
//! ```

use crate::error::PacketDecodeError;
use crate::pending::PendingRpc;
use crate::status::Status;
use prost::Message;

/// Kind of an RPC packet.
///
/// Even values travel from client to server, odd values from server to
/// client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PacketType {
    /// Starts a call, optionally carrying the request payload.
    Request = 0,
    /// One message of a client stream.
    ClientStream = 2,
    /// The client reports an error or cancels a call.
    ClientError = 4,
    /// The client has finished its stream.
    ClientStreamEnd = 8,
    /// Final packet of a call, carrying the status and for non server
    /// streaming methods the response payload.
    Response = 1,
    /// The server aborted the call with an error status.
    ServerError = 5,
    /// One message of a server stream.
    ServerStream = 7,
}

impl PacketType {
    /// Returns `true` for packet types addressed to a server.
    #[must_use]
    pub const fn is_server_bound(self) -> bool {
        (self as i32) & 1 == 0
    }
}

/// A single RPC packet as it appears on the wire.
#[derive(Clone, PartialEq, Message)]
pub struct RpcPacket {
    /// Raw [`PacketType`] value. May hold values this client does not know.
    #[prost(enumeration = "PacketType", tag = "1")]
    pub r#type: i32,
    /// Channel the packet travels on.
    #[prost(uint32, tag = "2")]
    pub channel_id: u32,
    /// Hash of the fully qualified service name.
    #[prost(fixed32, tag = "3")]
    pub service_id: u32,
    /// Hash of the method name.
    #[prost(fixed32, tag = "4")]
    pub method_id: u32,
    /// Encoded request or response message, if any.
    #[prost(bytes = "vec", tag = "5")]
    pub payload: Vec<u8>,
    /// Raw [`Status`] code.
    #[prost(uint32, tag = "6")]
    pub status: u32,
}

impl RpcPacket {
    /// Returns the packet type, or `None` if the value is not one this
    /// client knows.
    #[must_use]
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::try_from(self.r#type).ok()
    }

    /// Returns `true` if the raw type value is even, i.e. the packet is
    /// addressed to a server. Unknown even values count as server bound.
    #[must_use]
    pub const fn is_server_bound(&self) -> bool {
        self.r#type & 1 == 0
    }

    /// Returns `true` if any of the channel, service or method ids is the
    /// reserved value 0.
    #[must_use]
    pub const fn has_unset_ids(&self) -> bool {
        self.channel_id == 0 || self.service_id == 0 || self.method_id == 0
    }

    fn for_rpc(rpc: &PendingRpc, packet_type: PacketType) -> Self {
        Self {
            r#type: packet_type.into(),
            channel_id: rpc.channel_id(),
            service_id: rpc.service_id(),
            method_id: rpc.method_id(),
            ..Self::default()
        }
    }
}

/// Encodes a REQUEST packet that starts `rpc`.
///
/// Client streaming calls start without a payload.
#[must_use]
pub fn request(rpc: &PendingRpc, payload: Option<&[u8]>) -> Vec<u8> {
    let mut packet = RpcPacket::for_rpc(rpc, PacketType::Request);
    if let Some(payload) = payload {
        packet.payload = payload.to_vec();
    }
    packet.encode_to_vec()
}

/// Encodes a CLIENT_ERROR packet that cancels `rpc`.
#[must_use]
pub fn cancel(rpc: &PendingRpc) -> Vec<u8> {
    let mut packet = RpcPacket::for_rpc(rpc, PacketType::ClientError);
    packet.status = Status::Cancelled.code();
    packet.encode_to_vec()
}

/// Encodes a CLIENT_ERROR packet answering `received`.
///
/// The ids are copied from the received packet, so this works for packets
/// naming services or methods the client does not know.
#[must_use]
pub fn error(received: &RpcPacket, status: Status) -> Vec<u8> {
    RpcPacket {
        r#type: PacketType::ClientError.into(),
        channel_id: received.channel_id,
        service_id: received.service_id,
        method_id: received.method_id,
        payload: Vec::new(),
        status: status.code(),
    }
    .encode_to_vec()
}

/// Encodes a CLIENT_STREAM packet carrying one message of `rpc`'s stream.
#[must_use]
pub fn client_stream(rpc: &PendingRpc, payload: &[u8]) -> Vec<u8> {
    let mut packet = RpcPacket::for_rpc(rpc, PacketType::ClientStream);
    packet.payload = payload.to_vec();
    packet.encode_to_vec()
}

/// Encodes a CLIENT_STREAM_END packet closing `rpc`'s client stream.
#[must_use]
pub fn client_stream_end(rpc: &PendingRpc) -> Vec<u8> {
    RpcPacket::for_rpc(rpc, PacketType::ClientStreamEnd).encode_to_vec()
}

/// Decodes an inbound packet.
///
/// # Errors
///
/// Returns a [`PacketDecodeError`] if the bytes are not a well-formed packet.
/// Empty input decodes successfully to a packet with every field unset.
pub fn decode(bytes: &[u8]) -> Result<RpcPacket, PacketDecodeError> {
    Ok(RpcPacket::decode(bytes)?)
}
