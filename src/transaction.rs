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
use std::time::Instant;

use crate::clock::Timestamp;
use crate::error::ClientError;
use crate::in_flight_op::{InFlightOpRef, OpsInfo};

pub type ReadyCallback = Box<dyn FnOnce(Result<(), ClientError>) + Send + 'static>;

/// Transaction coordinator contract, as seen from a batcher. All entry points
/// are invoked without the batcher lock held.
pub trait Transaction: Send + Sync {
    /// Announces how many operations the coordinator should wait for before
    /// it may commit.
    fn expect_operations(&self, count: usize);

    /// Initializes rpc metadata for the grouped operations. Returns false
    /// when the transaction is not ready yet; it must then invoke `ready`
    /// once, strictly after returning, with the prepare outcome.
    fn prepare(
        &self,
        ops_info: &mut OpsInfo,
        force_consistent_read: bool,
        deadline: Instant,
        initial: bool,
        ready: ReadyCallback,
    ) -> bool;

    /// Reports operations whose rpc concluded, together with the read time
    /// the rpc used. Not called for failures the session is going to retry.
    fn flushed(&self, ops: &[InFlightOpRef], used_read_time: Option<Timestamp>, status: &Result<(), ClientError>);

    fn trace(&self) -> tracing::Span;
}

pub type TransactionRef = Arc<dyn Transaction>;

#[cfg(test)]
pub mod tests {
    use std::sync::Mutex;

    use tracing::Level;

    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    pub struct PrepareRecord {
        pub initial: bool,
        pub force_consistent_read: bool,
        pub groups: usize,
    }

    #[derive(Clone, Debug)]
    pub struct FlushRecord {
        pub sequence_numbers: Vec<u64>,
        pub used_read_time: Option<Timestamp>,
        pub ok: bool,
    }

    #[derive(Default)]
    struct TestTransactionInner {
        expected_operations: Vec<usize>,
        prepares: Vec<PrepareRecord>,
        ready: Option<ReadyCallback>,
        flushed: Vec<FlushRecord>,
    }

    /// Scripted coordinator: prepares inline by default, or parks the ready
    /// callback until the test releases it with `complete_prepare`.
    pub struct TestTransaction {
        deferred: bool,
        span: tracing::Span,
        inner: Mutex<TestTransactionInner>,
    }

    impl TestTransaction {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                deferred: false,
                span: tracing::span!(Level::DEBUG, "test_transaction"),
                inner: Mutex::new(Default::default()),
            })
        }

        pub fn deferred() -> Arc<Self> {
            Arc::new(Self {
                deferred: true,
                span: tracing::span!(Level::DEBUG, "test_transaction"),
                inner: Mutex::new(Default::default()),
            })
        }

        pub fn complete_prepare(&self, status: Result<(), ClientError>) {
            let ready = self.inner.lock().unwrap().ready.take().expect("no deferred prepare to complete");
            ready(status);
        }

        pub fn expected_operations(&self) -> Vec<usize> {
            self.inner.lock().unwrap().expected_operations.clone()
        }

        pub fn prepares(&self) -> Vec<PrepareRecord> {
            self.inner.lock().unwrap().prepares.clone()
        }

        pub fn flushed_records(&self) -> Vec<FlushRecord> {
            self.inner.lock().unwrap().flushed.clone()
        }
    }

    impl Transaction for TestTransaction {
        fn expect_operations(&self, count: usize) {
            self.inner.lock().unwrap().expected_operations.push(count);
        }

        fn prepare(
            &self,
            ops_info: &mut OpsInfo,
            force_consistent_read: bool,
            _deadline: Instant,
            initial: bool,
            ready: ReadyCallback,
        ) -> bool {
            for group in ops_info.groups.iter_mut() {
                group.need_metadata = true;
            }
            let mut inner = self.inner.lock().unwrap();
            inner.prepares.push(PrepareRecord { initial, force_consistent_read, groups: ops_info.groups.len() });
            if self.deferred && initial {
                inner.ready = Some(ready);
                return false;
            }
            true
        }

        fn flushed(&self, ops: &[InFlightOpRef], used_read_time: Option<Timestamp>, status: &Result<(), ClientError>) {
            let record = FlushRecord {
                sequence_numbers: ops.iter().map(|op| op.sequence_number()).collect(),
                used_read_time,
                ok: status.is_ok(),
            };
            self.inner.lock().unwrap().flushed.push(record);
        }

        fn trace(&self) -> tracing::Span {
            self.span.clone()
        }
    }
}
