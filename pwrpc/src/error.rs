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

//! Error types for the RPC client.
//!
//! Errors fall into the layers the protocol distinguishes:
//!
//! 1. **Transport**: the injected channel output failed to send
//!    ([`ChannelOutputError`]). Propagated to whoever attempted the send,
//!    never retried.
//! 2. **Call**: an operation on a call that is no longer active
//!    ([`RpcError`]), or a call that ended with an error status.
//! 3. **Decode**: inbound bytes that are not a well-formed packet
//!    ([`PacketDecodeError`], returned by [`packet::decode`](crate::packet::decode)).
//!    The dispatcher absorbs these and reports the packet as not processed.
//!
//! Problems with a specific inbound packet never escape
//! [`Client::process_packet`](crate::Client::process_packet); they are
//! logged and, where the protocol asks for it, answered with a CLIENT_ERROR
//! packet. [`PwrpcError`] composes the transport and call layers together with
//! the lookup and validation failures of the invocation API.
//!
//! # Examples
//!
//! ```rust
//! use pwrpc::{ChannelOutputError, PwrpcError};
//!
//! let error: PwrpcError = ChannelOutputError::new("link down").into();
//! assert!(error.is_transport_error());
//! assert!(error.status().is_none());
//! ```

use crate::pending::PendingRpc;
use crate::service::MethodType;
use crate::status::Status;
use std::error::Error as StdError;
use thiserror::Error;

/// Failure reported by a channel's output when sending a packet.
///
/// Implementations of [`ChannelOutput`](crate::ChannelOutput) return this
/// error; the client never inspects it beyond "the attempt failed".
#[derive(Debug, Error)]
#[error("channel output failed: {message}")]
pub struct ChannelOutputError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ChannelOutputError {
    /// Creates a new channel output error with a message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pwrpc::ChannelOutputError;
    ///
    /// let error = ChannelOutputError::new("queue full");
    /// assert_eq!(error.message(), "queue full");
    /// ```
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new channel output error wrapping an underlying cause.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pwrpc::ChannelOutputError;
    /// use std::io;
    ///
    /// let io_error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
    /// let error = ChannelOutputError::with_source("write failed", io_error);
    /// assert!(std::error::Error::source(&error).is_some());
    /// ```
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An operation was attempted on a call that cannot accept it, or a call
/// finished with an error status.
///
/// Raised locally to the caller, for example when sending a client stream
/// message on a call that was already cancelled ([`Status::Cancelled`]) or
/// already completed ([`Status::FailedPrecondition`]).
#[derive(Debug, Clone, Error)]
#[error("{rpc} failed with status {status}")]
pub struct RpcError {
    rpc: PendingRpc,
    status: Status,
}

impl RpcError {
    /// Creates a new RPC error for the given call.
    #[must_use]
    pub fn new(rpc: PendingRpc, status: Status) -> Self {
        Self { rpc, status }
    }

    /// The call this error refers to.
    #[must_use]
    pub fn rpc(&self) -> &PendingRpc {
        &self.rpc
    }

    /// The status describing the failure.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }
}

/// Inbound bytes could not be decoded as an RPC packet.
#[derive(Debug, Clone, Error)]
#[error("failed to decode RPC packet: {source}")]
pub struct PacketDecodeError {
    #[from]
    source: prost::DecodeError,
}

/// Top-level error type for client operations.
///
/// # Examples
///
/// ```rust
/// use pwrpc::PwrpcError;
///
/// fn describe(error: &PwrpcError) -> &'static str {
///     if error.is_transport_error() {
///         "send failed"
///     } else if error.is_rpc_error() {
///         "call failed"
///     } else {
///         "invalid request"
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum PwrpcError {
    /// The channel output failed to send a packet.
    #[error(transparent)]
    ChannelOutput(#[from] ChannelOutputError),

    /// A call could not perform the operation or ended with an error.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// No channel with this id is registered with the client.
    #[error("unknown channel {channel_id}")]
    UnknownChannel {
        /// The requested channel id.
        channel_id: u32,
    },

    /// No service with this name or id is registered with the client.
    #[error("unknown service {service}")]
    UnknownService {
        /// The requested service name or id.
        service: String,
    },

    /// The service has no method with this name or id.
    #[error("service {service} has no method {method}")]
    UnknownMethod {
        /// The service that was searched.
        service: String,
        /// The requested method name or id.
        method: String,
    },

    /// A full method name could not be split into service and method.
    #[error("invalid method name '{name}'; expected 'pkg.Service/Method'")]
    InvalidMethodName {
        /// The name as given.
        name: String,
    },

    /// A name or id would be 0 on the wire, which the protocol reserves.
    #[error("{what} '{name}' has the reserved id 0")]
    InvalidId {
        /// What kind of entity carried the id.
        what: &'static str,
        /// The offending name or id.
        name: String,
    },

    /// Two entities of the same kind share an id.
    #[error("duplicate {what} id {id:#010x}")]
    DuplicateId {
        /// What kind of entity carried the id.
        what: &'static str,
        /// The duplicated id.
        id: u32,
    },

    /// A method was invoked through the API of a different RPC kind.
    #[error("{method} is a {actual} method, not {expected}")]
    WrongMethodType {
        /// Full method name.
        method: String,
        /// The kind the invocation required.
        expected: MethodType,
        /// The kind the method was declared with.
        actual: MethodType,
    },

    /// The request or response Rust type does not match the method.
    #[error("{method} expects payload type {expected}, got {actual}")]
    WrongPayloadType {
        /// Full method name.
        method: String,
        /// Type name the method was declared with.
        expected: &'static str,
        /// Type name used by the caller.
        actual: &'static str,
    },

    /// A unary call completed without a response payload.
    #[error("{rpc} completed without a response payload")]
    MissingResponse {
        /// The call.
        rpc: PendingRpc,
    },

    /// A unary call received more than one response payload.
    #[error("{rpc} received multiple response payloads")]
    MultipleResponses {
        /// The call.
        rpc: PendingRpc,
    },
}

impl PwrpcError {
    /// Returns `true` if the channel output failed.
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(self, Self::ChannelOutput(_))
    }

    /// Returns `true` if this is a call-level error carrying a status.
    #[must_use]
    pub const fn is_rpc_error(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }

    /// Returns the status of a call-level error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pwrpc::PwrpcError;
    ///
    /// let error = PwrpcError::UnknownChannel { channel_id: 3 };
    /// assert_eq!(error.status(), None);
    /// ```
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Rpc(error) => Some(error.status()),
            _ => None,
        }
    }
}
