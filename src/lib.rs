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

//! Client side batching core for the ReefDB distributed database.

pub mod batcher;
pub mod client;
pub mod clock;
pub mod error;
pub mod error_collector;
pub mod in_flight_op;
pub mod meta_cache;
pub mod operation;
pub mod protos;
pub mod rpc;
pub mod session;
pub mod table;
pub mod transaction;
