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

#![doc = include_str!("../../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! ## Architecture
//!
//! The crate is organized leaf to root:
//!
//! - **[`status`]** and **[`ids`]**: status codes and the name hash used for
//!   service and method ids
//! - **[`packet`]**: the `RpcPacket` wire message and the packets a client
//!   sends
//! - **[`channel`]**: channel ids bound to an injected output
//! - **[`service`]**: service and method descriptors
//! - **[`pending`]**: the key that addresses an in-flight call
//! - **[`call`]** and **[`observer`]**: the per-call state machine and the
//!   caller's event sink
//! - **[`manager`]**: the table of pending calls
//! - **[`client`]**: the inbound packet dispatcher and invocation surface
//! - **[`future`]**: futures layered over calls
//! - **[`config`]**, **[`metrics`]**, **[`error`]**: ambient concerns
//! - **[`testing`]**: an in-memory harness for code written against the client

pub mod call;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod future;
pub mod ids;
pub mod manager;
pub mod metrics;
pub mod observer;
pub mod packet;
pub mod pending;
pub mod service;
pub mod status;
pub mod testing;

pub use call::{Call, PendingCall};
pub use channel::{Channel, ChannelOutput};
pub use client::{Client, MethodClient};
pub use config::ClientConfig;
pub use error::{ChannelOutputError, PacketDecodeError, PwrpcError, RpcError};
pub use future::{StreamFuture, UnaryFuture, UnaryResult};
pub use manager::{CallRef, RpcManager};
pub use metrics::ClientMetrics;
pub use observer::StreamObserver;
pub use pending::PendingRpc;
pub use service::{Method, MethodType, Service};
pub use status::Status;
