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

//! Service and method descriptors.
//!
//! A [`Service`] is a named set of [`Method`]s. Both are addressed on the
//! wire by ids computed with [`ids::calculate`](crate::ids::calculate), so
//! every id in a registry must be nonzero and unique within its scope.
//!
//! # Example
//!
//! ```rust
//! use pwrpc::{ids, Method, MethodType, Service};
//!
//! #[derive(Clone, PartialEq, prost::Message)]
//! struct Chunk {
//!     #[prost(bytes = "vec", tag = "1")]
//!     data: Vec<u8>,
//! }
//!
//! let service = Service::new(
//!     "pw.transfer.Transfer",
//!     [
//!         Method::bidirectional_streaming::<Chunk, Chunk>("Read"),
//!         Method::bidirectional_streaming::<Chunk, Chunk>("Write"),
//!     ],
//! )
//! .unwrap();
//!
//! let read = service.method("Read").unwrap();
//! assert_eq!(read.id(), ids::calculate("Read"));
//! assert_eq!(read.service_id(), service.id());
//! assert_eq!(read.method_type(), MethodType::BidirectionalStreaming);
//! assert_eq!(read.full_name(), "pw.transfer.Transfer/Read");
//! ```

use crate::error::PwrpcError;
use crate::ids;
use prost::Message;
use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

/// The four kinds of RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MethodType {
    /// One request, one response.
    Unary,
    /// One request, a stream of responses.
    ServerStreaming,
    /// A stream of requests, one response.
    ClientStreaming,
    /// A stream of requests and a stream of responses.
    BidirectionalStreaming,
}

impl MethodType {
    /// Returns `true` if the server sends a stream of responses.
    ///
    /// Server streaming calls receive their responses in SERVER_STREAM
    /// packets and finish with a RESPONSE that carries no payload.
    #[must_use]
    pub const fn is_server_streaming(self) -> bool {
        matches!(self, Self::ServerStreaming | Self::BidirectionalStreaming)
    }

    /// Returns `true` if the client sends a stream of requests.
    #[must_use]
    pub const fn is_client_streaming(self) -> bool {
        matches!(self, Self::ClientStreaming | Self::BidirectionalStreaming)
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unary => "unary",
            Self::ServerStreaming => "server streaming",
            Self::ClientStreaming => "client streaming",
            Self::BidirectionalStreaming => "bidirectional streaming",
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct PayloadType {
    id: TypeId,
    name: &'static str,
}

impl PayloadType {
    fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

/// Descriptor of one RPC method.
///
/// Methods are created unbound with one of the typed constructors and bound
/// to their service by [`Service::new`].
#[derive(Debug, Clone)]
pub struct Method {
    service_name: Arc<str>,
    service_id: u32,
    name: String,
    id: u32,
    method_type: MethodType,
    request: PayloadType,
    response: PayloadType,
}

impl Method {
    fn with_type<Req, Resp>(name: impl Into<String>, method_type: MethodType) -> Self
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        let name = name.into();
        Self {
            service_name: Arc::from(""),
            service_id: 0,
            id: ids::calculate(&name),
            name,
            method_type,
            request: PayloadType::of::<Req>(),
            response: PayloadType::of::<Resp>(),
        }
    }

    /// Declares a unary method.
    #[must_use]
    pub fn unary<Req, Resp>(name: impl Into<String>) -> Self
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        Self::with_type::<Req, Resp>(name, MethodType::Unary)
    }

    /// Declares a server streaming method.
    #[must_use]
    pub fn server_streaming<Req, Resp>(name: impl Into<String>) -> Self
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        Self::with_type::<Req, Resp>(name, MethodType::ServerStreaming)
    }

    /// Declares a client streaming method.
    #[must_use]
    pub fn client_streaming<Req, Resp>(name: impl Into<String>) -> Self
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        Self::with_type::<Req, Resp>(name, MethodType::ClientStreaming)
    }

    /// Declares a bidirectional streaming method.
    #[must_use]
    pub fn bidirectional_streaming<Req, Resp>(name: impl Into<String>) -> Self
    where
        Req: Message + Default + 'static,
        Resp: Message + Default + 'static,
    {
        Self::with_type::<Req, Resp>(name, MethodType::BidirectionalStreaming)
    }

    /// The method name, without the service.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wire id of the method.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Fully qualified name of the owning service.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The wire id of the owning service.
    #[must_use]
    pub const fn service_id(&self) -> u32 {
        self.service_id
    }

    /// The kind of RPC.
    #[must_use]
    pub const fn method_type(&self) -> MethodType {
        self.method_type
    }

    /// Type name of the request message.
    #[must_use]
    pub const fn request_type_name(&self) -> &'static str {
        self.request.name
    }

    /// Type name of the response message.
    #[must_use]
    pub const fn response_type_name(&self) -> &'static str {
        self.response.name
    }

    /// Returns `pkg.Service/Method`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.service_name, self.name)
    }

    pub(crate) fn expect_type(&self, expected: MethodType) -> Result<(), PwrpcError> {
        if self.method_type == expected {
            Ok(())
        } else {
            Err(PwrpcError::WrongMethodType {
                method: self.full_name(),
                expected,
                actual: self.method_type,
            })
        }
    }

    pub(crate) fn expect_payloads<Req: 'static, Resp: 'static>(&self) -> Result<(), PwrpcError> {
        if !self.request.is::<Req>() {
            return Err(PwrpcError::WrongPayloadType {
                method: self.full_name(),
                expected: self.request.name,
                actual: type_name::<Req>(),
            });
        }
        if !self.response.is::<Resp>() {
            return Err(PwrpcError::WrongPayloadType {
                method: self.full_name(),
                expected: self.response.name,
                actual: type_name::<Resp>(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service_name, self.name)
    }
}

/// A named collection of methods.
#[derive(Debug)]
pub struct Service {
    name: Arc<str>,
    id: u32,
    methods: HashMap<u32, Arc<Method>>,
}

impl Service {
    /// Creates a service and binds its methods to it.
    ///
    /// # Errors
    ///
    /// Returns [`PwrpcError::InvalidId`] if the service name or a method name
    /// hashes to 0, and [`PwrpcError::DuplicateId`] if two methods share an
    /// id.
    pub fn new(
        name: impl Into<String>,
        methods: impl IntoIterator<Item = Method>,
    ) -> Result<Self, PwrpcError> {
        let name: String = name.into();
        let name: Arc<str> = Arc::from(name);
        let id = ids::calculate(&name);
        if id == 0 {
            return Err(PwrpcError::InvalidId {
                what: "service",
                name: name.to_string(),
            });
        }

        let mut bound = HashMap::new();
        for mut method in methods {
            if method.id == 0 {
                return Err(PwrpcError::InvalidId {
                    what: "method",
                    name: method.name,
                });
            }
            method.service_name = Arc::clone(&name);
            method.service_id = id;
            match bound.entry(method.id) {
                Entry::Occupied(_) => {
                    return Err(PwrpcError::DuplicateId {
                        what: "method",
                        id: method.id,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(method));
                }
            }
        }

        Ok(Self {
            name,
            id,
            methods: bound,
        })
    }

    /// The fully qualified service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wire id of the service.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Looks up a method by name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&Arc<Method>> {
        self.methods
            .get(&ids::calculate(name))
            .filter(|method| method.name == name)
    }

    /// Looks up a method by wire id.
    #[must_use]
    pub fn method_by_id(&self, id: u32) -> Option<&Arc<Method>> {
        self.methods.get(&id)
    }

    /// Iterates over the methods in no particular order.
    pub fn methods(&self) -> impl Iterator<Item = &Arc<Method>> {
        self.methods.values()
    }
}
