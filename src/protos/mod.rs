// Copyright 2025 The ReefDB Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Wire message types exchanged with ReefDB tablet servers.
//!
//! The batcher never parses raw buffers itself. Response payloads arrive here
//! already decoded by the rpc layer; this module only defines their shapes.

use std::fmt::{Display, Error, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TabletId(u64);

impl From<u64> for TabletId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<TabletId> for u64 {
    fn from(id: TabletId) -> Self {
        id.0
    }
}

impl Display for TabletId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.write_fmt(format_args!("{:#x}", self.0))
    }
}

impl TabletId {
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn into_raw(self) -> u64 {
        self.0
    }
}

#[derive(Copy, Eq, PartialOrd, Ord, Hash)]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Timestamp {
    #[prost(uint64, tag = "1")]
    pub seconds: u64,
    #[prost(uint32, tag = "2")]
    pub nanoseconds: u32,
    #[prost(uint32, tag = "3")]
    pub logical: u32,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteResponse {
    #[prost(message, optional, tag = "1")]
    pub propagated_hybrid_time: Option<Timestamp>,
    #[prost(message, optional, tag = "2")]
    pub used_read_time: Option<Timestamp>,
    #[prost(message, repeated, tag = "3")]
    pub per_row_errors: Vec<PerRowError>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadResponse {
    #[prost(message, optional, tag = "1")]
    pub propagated_hybrid_time: Option<Timestamp>,
    #[prost(message, optional, tag = "2")]
    pub used_read_time: Option<Timestamp>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PerRowError {
    #[prost(uint32, tag = "1")]
    pub row_index: u32,
    #[prost(message, optional, tag = "2")]
    pub error: Option<WireError>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireError {
    #[prost(enumeration = "WireErrorCode", tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl WireError {
    pub fn new(code: WireErrorCode, message: impl Into<String>) -> Self {
        Self { code: code as i32, message: message.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireErrorCode {
    Unknown = 0,
    NotFound = 1,
    AlreadyPresent = 2,
    Busy = 3,
    InvalidArgument = 4,
    InternalError = 5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ConsistencyLevel {
    Strong = 0,
    ConsistentPrefix = 1,
}
