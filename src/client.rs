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

use tokio::runtime::Handle;

use crate::clock::{Clock, Timestamp};
use crate::meta_cache::MetaCache;
use crate::rpc::RpcFactory;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Synthesize one combined error as the batch status instead of the
    /// generic io error summary. Useful in tests that match on statuses.
    pub combine_batcher_errors: bool,
    /// Probability of simulating a resolved tablet that does not contain the
    /// looked up partition key. Only effective for tables in the `reef_test`
    /// namespace.
    pub simulate_lookup_mismatch_probability: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { combine_batcher_errors: false, simulate_lookup_mismatch_probability: 0.0 }
    }
}

/// Shared client environment: routing, transport, callback pool and the
/// latest hybrid time observed from tablet servers.
#[derive(Clone)]
pub struct Client {
    meta_cache: Arc<dyn MetaCache>,
    rpc_factory: Arc<dyn RpcFactory>,
    callback_pool: Option<Handle>,
    clock: Clock,
    config: ClientConfig,
}

impl Client {
    pub fn new(meta_cache: Arc<dyn MetaCache>, rpc_factory: Arc<dyn RpcFactory>) -> Self {
        Self { meta_cache, rpc_factory, callback_pool: None, clock: Clock::new(), config: ClientConfig::default() }
    }

    pub fn with_config(self, config: ClientConfig) -> Self {
        Self { config, ..self }
    }

    pub fn with_callback_pool(self, pool: Handle) -> Self {
        Self { callback_pool: Some(pool), ..self }
    }

    pub fn meta_cache(&self) -> &Arc<dyn MetaCache> {
        &self.meta_cache
    }

    pub fn rpc_factory(&self) -> &Arc<dyn RpcFactory> {
        &self.rpc_factory
    }

    pub fn callback_pool(&self) -> Option<&Handle> {
        self.callback_pool.as_ref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn latest_observed_hybrid_time(&self) -> Timestamp {
        self.clock.latest()
    }

    pub fn update_latest_observed_hybrid_time(&self, timestamp: Timestamp) {
        self.clock.update(timestamp);
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }
}
