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

use std::sync::Arc;

use crate::batcher::Batcher;
use crate::clock::Timestamp;
use crate::in_flight_op::InFlightOpRef;
use crate::meta_cache::RemoteTabletRef;
pub use crate::protos::ConsistencyLevel;
use crate::protos::{ReadResponse, WriteResponse};

/// Everything an rpc needs to carry one group of operations to its tablet.
/// The rpc takes ownership of the in-flight ops; the batcher keeps them in
/// its tracking set until the rpc concludes.
pub struct RpcData {
    pub batcher: Arc<Batcher>,
    pub tablet: RemoteTabletRef,
    pub ops: Vec<InFlightOpRef>,
    pub allow_local_calls_in_curr_thread: bool,
    pub need_consistent_read: bool,
    pub need_metadata: bool,
    pub hybrid_time_for_write: Option<Timestamp>,
}

/// One in-flight rpc. `send` may hand off to the transport's thread pool;
/// completions come back through [`Batcher::rpc_finished`] on arbitrary
/// threads.
pub trait BatchRpc: Send + Sync {
    fn send(self: Arc<Self>);

    fn ops(&self) -> &[InFlightOpRef];

    fn tablet(&self) -> &RemoteTabletRef;

    fn trace(&self) -> &tracing::Span;
}

/// Builds the rpc variant matching an op group: writes, strong-consistency
/// reads, or consistent-prefix reads.
pub trait RpcFactory: Send + Sync {
    fn write_rpc(&self, data: RpcData) -> Arc<dyn BatchRpc>;

    fn read_rpc(&self, data: RpcData, consistency: ConsistencyLevel) -> Arc<dyn BatchRpc>;
}

/// Decoded payload of a finished rpc, as handed back to the batcher.
pub enum RpcResponse {
    Write(WriteResponse),
    Read(ReadResponse),
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlushExtra {
    pub propagated_hybrid_time: Option<Timestamp>,
    pub used_read_time: Option<Timestamp>,
}

impl RpcResponse {
    pub fn flush_extra(&self) -> FlushExtra {
        match self {
            Self::Write(response) => FlushExtra {
                propagated_hybrid_time: response.propagated_hybrid_time,
                used_read_time: response.used_read_time,
            },
            Self::Read(response) => FlushExtra {
                propagated_hybrid_time: response.propagated_hybrid_time,
                used_read_time: response.used_read_time,
            },
        }
    }
}
