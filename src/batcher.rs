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

//! Write/read batcher: groups per-row operations by destination tablet and
//! operation class, dispatches one rpc per group and reports the outcome
//! through a single callback.
//!
//! Lock ordering: session lock, then `ops_info`, then the batcher state lock,
//! then per-op state. Collaborators and user callbacks are never invoked with
//! the state lock held; each entry point snapshots what it needs under the
//! lock, releases, then acts.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use static_assertions::assert_impl_all;
use tracing::{debug, error, trace};

use crate::client::Client;
use crate::clock::{ReadPoint, Timestamp};
use crate::error::{ClientError, ClientErrorCode, StatusCode};
use crate::error_collector::{ErrorCollector, OperationError};
use crate::in_flight_op::{group_by_destination, sort_for_dispatch, InFlightOp, InFlightOpRef, OpState, OpsInfo};
use crate::meta_cache::RemoteTabletRef;
use crate::operation::{OpGroup, OperationRef};
use crate::protos::WriteResponse;
use crate::rpc::{BatchRpc, ConsistencyLevel, FlushExtra, RpcData, RpcResponse};
use crate::session::{RejectionScoreSource, Session};
use crate::table::PartitionSchema;
use crate::transaction::TransactionRef;

/// Summary status of a flush in which some operations failed. The details are
/// in the error collector.
pub const TABLET_SERVER_ERRORS_MESSAGE: &str = "errors occurred while reaching out to the tablet servers";

const SIMULATION_NAMESPACE: &str = "reef_test";
const DEFAULT_FLUSH_DEADLINE: Duration = Duration::from_secs(60);

static NEXT_BATCHER_ID: AtomicU64 = AtomicU64::new(1);

pub type FlushCallback = Box<dyn FnOnce(Result<(), ClientError>) + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatcherState {
    Gathering,
    Resolving,
    Preparing,
    Ready,
    Complete,
    Aborted,
}

struct BatcherInner {
    state: BatcherState,
    ops: HashMap<u64, InFlightOpRef>,
    ops_queue: Vec<InFlightOpRef>,
    outstanding_lookups: usize,
    next_op_sequence_number: u64,
    flush_callback: Option<FlushCallback>,
    deadline: Option<Instant>,
    combined_error: Option<ClientError>,
    hybrid_time_for_write: Option<Timestamp>,
    rejection_score_source: Option<Arc<dyn RejectionScoreSource>>,
}

/// Short-lived accumulator of operations belonging to one flush. Constructed
/// gathering, flushed once, destroyed only after it went through `Complete`
/// or `Aborted` with no operation left in flight.
pub struct Batcher {
    id: u64,
    client: Client,
    session: Weak<dyn Session>,
    transaction: Option<TransactionRef>,
    read_point: Option<ReadPoint>,
    force_consistent_read: bool,
    allow_local_calls_in_curr_thread: AtomicBool,
    had_errors: AtomicBool,
    error_collector: ErrorCollector,
    // Grouped dispatch queue. Acquired strictly before `inner`; the
    // transaction prepare call runs with only this mutex held.
    ops_info: Mutex<OpsInfo>,
    inner: Mutex<BatcherInner>,
}

assert_impl_all!(Batcher: Send, Sync);

impl Batcher {
    pub fn new(
        client: Client,
        session: &Arc<dyn Session>,
        transaction: Option<TransactionRef>,
        read_point: Option<ReadPoint>,
        force_consistent_read: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_BATCHER_ID.fetch_add(1, Ordering::Relaxed),
            client,
            session: Arc::downgrade(session),
            transaction,
            read_point,
            force_consistent_read,
            allow_local_calls_in_curr_thread: AtomicBool::new(true),
            had_errors: AtomicBool::new(false),
            error_collector: ErrorCollector::new(),
            ops_info: Mutex::new(OpsInfo::default()),
            inner: Mutex::new(BatcherInner {
                state: BatcherState::Gathering,
                ops: HashMap::new(),
                ops_queue: Vec::new(),
                outstanding_lookups: 0,
                next_op_sequence_number: 0,
                flush_callback: None,
                deadline: None,
                combined_error: None,
                hybrid_time_for_write: None,
                rejection_score_source: None,
            }),
        })
    }

    pub fn state(&self) -> BatcherState {
        self.inner.lock().unwrap().state
    }

    pub fn set_deadline(&self, deadline: Instant) {
        self.inner.lock().unwrap().deadline = Some(deadline);
    }

    pub fn set_hybrid_time_for_write(&self, hybrid_time: Timestamp) {
        self.inner.lock().unwrap().hybrid_time_for_write = Some(hybrid_time);
    }

    pub fn set_allow_local_calls_in_curr_thread(&self, allow: bool) {
        self.allow_local_calls_in_curr_thread.store(allow, Ordering::Release);
    }

    pub fn set_rejection_score_source(&self, source: Arc<dyn RejectionScoreSource>) {
        self.inner.lock().unwrap().rejection_score_source = Some(source);
    }

    pub fn rejection_score(&self, attempt_num: i32) -> f64 {
        let source = self.inner.lock().unwrap().rejection_score_source.clone();
        match source {
            Some(source) => source.rejection_score(attempt_num),
            None => 0.0,
        }
    }

    pub fn has_pending_operations(&self) -> bool {
        !self.inner.lock().unwrap().ops.is_empty()
    }

    pub fn count_buffered_operations(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        // Once a flush started the ops are not considered buffered anymore.
        match inner.state {
            BatcherState::Gathering => inner.ops.len(),
            _ => 0,
        }
    }

    pub fn get_and_clear_pending_errors(&self) -> Vec<OperationError> {
        self.error_collector.get_and_clear_errors()
    }

    /// Accepts one more operation and immediately starts resolving the tablet
    /// it belongs to, so that the batch is ready to go when flushed.
    pub fn add(self: &Arc<Self>, operation: OperationRef) -> Result<(), ClientError> {
        let state = self.state();
        if state != BatcherState::Gathering {
            let error = ClientError::WrongState(state);
            error!(batcher = self.id, %error, "adding operation to batcher in a wrong state");
            return Err(error);
        }

        let partition_key = operation.partition_key()?;

        if operation.table().maybe_refresh_partition_list() {
            self.client.meta_cache().invalidate_table_cache(operation.table());
        }

        if operation.table().partition_schema().is_hash_partitioning() {
            if operation.kind().is_write() {
                operation.set_hash_code(PartitionSchema::decode_hash_code(&partition_key)?);
            } else if !partition_key.is_empty() {
                operation.set_hash_code(PartitionSchema::decode_hash_code(&partition_key)?);
            }
        }

        let (in_flight_op, deadline) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != BatcherState::Gathering {
                let error = ClientError::WrongState(inner.state);
                drop(inner);
                error!(batcher = self.id, %error, "batcher state changed while adding operation");
                return Err(error);
            }
            let sequence_number = inner.next_op_sequence_number;
            inner.next_op_sequence_number += 1;
            let op = Arc::new(InFlightOp::new(operation.clone(), partition_key.clone(), sequence_number));
            inner.ops.insert(sequence_number, op.clone());
            inner.outstanding_lookups += 1;
            // The flush deadline is usually installed later, at flush time, so
            // lookups started from here may have to make up their own.
            let deadline = inner.deadline.unwrap_or_else(|| Instant::now() + DEFAULT_FLUSH_DEADLINE);
            (op, deadline)
        };

        trace!(batcher = self.id, op = %in_flight_op, "looking up tablet");
        if let Some(tablet) = operation.preassigned_tablet() {
            self.tablet_lookup_finished(in_flight_op, Ok(tablet));
        } else {
            let batcher = self.clone();
            let op = in_flight_op;
            self.client.meta_cache().lookup_tablet_by_key(
                operation.table(),
                partition_key,
                deadline,
                Box::new(move |result| batcher.tablet_lookup_finished(op, result)),
            );
        }
        Ok(())
    }

    /// Seals the batch and arranges for `callback` to run exactly once with
    /// its outcome. Ops retried within the same transaction are already
    /// accounted for by the coordinator, hence `is_within_transaction_retry`.
    pub fn flush_async(self: &Arc<Self>, callback: FlushCallback, is_within_transaction_retry: bool) {
        let session;
        let operations_count;
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != BatcherState::Gathering {
                let error = ClientError::WrongState(inner.state);
                drop(inner);
                error!(batcher = self.id, %error, "flushing batcher in a wrong state");
                self.run_callback(callback, Err(error));
                return;
            }
            inner.state = BatcherState::Resolving;
            inner.flush_callback = Some(callback);
            if inner.deadline.is_none() {
                inner.deadline = Some(Instant::now() + DEFAULT_FLUSH_DEADLINE);
            }
            operations_count = inner.ops.len();
            session = self.session.upgrade();
        }

        // The session lock comes before the batcher lock, so it must be
        // notified from the outside.
        if let Some(session) = session {
            session.flush_started(self);
        }

        if let Some(transaction) = &self.transaction {
            if !is_within_transaction_retry {
                transaction.expect_operations(operations_count);
            }
        }

        // Covers the empty batch: with nothing buffered the callback fires
        // right away instead of waiting for completions that will never come.
        self.check_for_finished_flush();
        self.flush_buffers_if_ready();
    }

    /// Drives the batcher to `Aborted`, failing every dispatchable op. Ops
    /// still looking up their tablet are failed by their own completion path.
    pub fn abort(&self, status: ClientError) {
        let callback;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.state = BatcherState::Aborted;
            let to_abort: Vec<InFlightOpRef> = inner
                .ops
                .values()
                .filter(|op| op.state() == OpState::BufferedToTabletServer)
                .cloned()
                .collect();
            for op in to_abort {
                trace!(batcher = self.id, op = %op, "aborting op");
                self.mark_in_flight_op_failed(&mut inner, &op, status.clone());
            }
            callback = inner.flush_callback.take();
        }
        if let Some(callback) = callback {
            self.run_callback(callback, Err(status));
        }
    }

    fn tablet_lookup_finished(self: &Arc<Self>, op: InFlightOpRef, result: Result<RemoteTabletRef, ClientError>) {
        // The lock is taken before anything else so that testing for abort
        // and switching the op state are one atomic step.
        let mut failed = false;
        let all_lookups_finished;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.outstanding_lookups -= 1;
            all_lookups_finished = inner.outstanding_lookups == 0;

            if inner.state == BatcherState::Aborted {
                trace!(batcher = self.id, op = %op, "lookup finished for aborted batch");
                self.mark_in_flight_op_failed(&mut inner, &op, ClientError::aborted("batch aborted"));
                return;
            }
            if inner.state != BatcherState::Resolving && inner.state != BatcherState::Gathering {
                error!(batcher = self.id, state = ?inner.state, "tablet lookup finished in a wrong state");
                debug_assert!(false, "tablet lookup finished in state {:?}", inner.state);
                return;
            }

            let result = result.and_then(|tablet| self.validate_lookup(&op, tablet));
            trace!(
                batcher = self.id,
                op = %op,
                outstanding = inner.outstanding_lookups,
                ok = result.is_ok(),
                "tablet lookup finished"
            );
            match result {
                Ok(tablet) => {
                    op.set_tablet(tablet);
                    if op.advance_state(OpState::LookingUpTablet, OpState::BufferedToTabletServer) {
                        inner.ops_queue.push(op.clone());
                    } else {
                        error!(batcher = self.id, op = %op, "lookup finished for op in a bad state");
                        debug_assert!(false, "lookup finished for op in state {:?}", op.state());
                    }
                },
                Err(status) => {
                    failed = true;
                    self.mark_in_flight_op_failed(&mut inner, &op, status);
                },
            }
        }

        if failed {
            self.check_for_finished_flush();
        }
        if all_lookups_finished {
            self.flush_buffers_if_ready();
        }
    }

    /// Rejects a resolved tablet whose partition does not actually contain
    /// the routing key. The partition list may have split while the lookup
    /// was in flight.
    fn validate_lookup(&self, op: &InFlightOp, tablet: RemoteTabletRef) -> Result<RemoteTabletRef, ClientError> {
        let contains_row = tablet.partition().contains_key(op.partition_key());
        if contains_row && !self.simulate_lookup_mismatch(op) {
            return Ok(tablet);
        }
        let message = format!("row of {op} not in partition of {tablet}");
        error!(batcher = self.id, "{message}");
        Err(ClientError::internal(message))
    }

    fn simulate_lookup_mismatch(&self, op: &InFlightOp) -> bool {
        let probability = self.client.config().simulate_lookup_mismatch_probability;
        probability > 0.0
            && op.operation().table().name().namespace() == SIMULATION_NAMESPACE
            && rand::random::<f64>() < probability
    }

    fn mark_in_flight_op_failed(&self, inner: &mut BatcherInner, op: &InFlightOpRef, status: ClientError) {
        let removed = inner.ops.remove(&op.sequence_number());
        if removed.is_none() {
            error!(batcher = self.id, op = %op, "failed op is not tracked by this batcher");
            debug_assert!(false, "failed op {op} is not tracked by this batcher");
        }
        if matches!(status, ClientError::TablePartitionListIsStale { .. }) {
            // Routing said the cached partition list is outdated. Tag the
            // operation so a retry refetches partitions first.
            op.operation().mark_table_partition_list_stale();
        }
        self.combine_error(inner, op, status);
    }

    fn combine_error(&self, inner: &mut BatcherInner, op: &InFlightOpRef, status: ClientError) {
        self.error_collector.add_error(op.operation().clone(), status.clone());
        if self.client.config().combine_batcher_errors {
            match inner.combined_error.as_ref().map(ClientError::code) {
                None => inner.combined_error = Some(status.clone().with_operation(format!("{op}"))),
                Some(StatusCode::Combined) => {},
                Some(code) if code != status.code() => inner.combined_error = Some(ClientError::Combined),
                Some(_) => {},
            }
        }
        self.had_errors.store(true, Ordering::Release);
    }

    /// Runs grouping once flushing started and every lookup concluded.
    /// Waiting for the last lookup keeps ops from trickling out one by one.
    fn flush_buffers_if_ready(self: &Arc<Self>) {
        let mut queue;
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.outstanding_lookups != 0 {
                trace!(batcher = self.id, outstanding = inner.outstanding_lookups, "ops still in lookup");
                return;
            }
            if inner.state != BatcherState::Resolving {
                return;
            }
            if inner.ops_queue.is_empty() {
                // Nothing to prepare. The finish check observes emptiness.
                inner.state = BatcherState::Ready;
                return;
            }
            inner.state = BatcherState::Preparing;
            queue = std::mem::take(&mut inner.ops_queue);
        }

        if self.had_errors.load(Ordering::Acquire) {
            // When any lookup failed, nothing is dispatched: the session
            // retries the whole batch, which keeps sequence numbers and hence
            // submission order meaningful across the retry.
            self.abort(ClientError::aborted_with_code(
                "tablet resolution failed for some ops, aborted the whole batch",
                ClientErrorCode::AbortedBatchDueToFailedTabletLookup,
            ));
            return;
        }

        // No lookup outstanding and no further ingress: the queue is complete
        // and can be worked on outside the lock.
        sort_for_dispatch(&mut queue);

        for op in &queue {
            let tablet = op.tablet().expect("buffered op has no resolved tablet");
            if let Some(version) = op.operation().partition_list_version() {
                if version != tablet.partition_list_version() {
                    self.abort(ClientError::aborted_with_code(
                        format!(
                            "op {} requested table partition list version {}, but ours is {}",
                            op,
                            version,
                            tablet.partition_list_version()
                        ),
                        ClientErrorCode::TablePartitionListVersionDoesNotMatch,
                    ));
                    return;
                }
            }
        }

        let groups = group_by_destination(&queue);
        *self.ops_info.lock().unwrap() = OpsInfo { ops: queue, groups };

        self.execute_operations(true);
    }

    fn transaction_ready(self: &Arc<Self>, status: Result<(), ClientError>) {
        match status {
            Ok(()) => self.execute_operations(false),
            Err(status) => self.abort(status),
        }
    }

    fn execute_operations(self: &Arc<Self>, initial: bool) {
        let mut ops_info = self.ops_info.lock().unwrap();

        if let Some(transaction) = &self.transaction {
            // The transaction initializes rpc metadata for the groups. If it
            // is not ready yet it reports back through the callback, strictly
            // after returning false.
            let deadline = {
                let inner = self.inner.lock().unwrap();
                inner.deadline.unwrap_or_else(|| Instant::now() + DEFAULT_FLUSH_DEADLINE)
            };
            let batcher = self.clone();
            let ready = Box::new(move |status| batcher.transaction_ready(status));
            if !transaction.prepare(&mut ops_info, self.force_consistent_read, deadline, initial, ready) {
                return;
            }
        }

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != BatcherState::Preparing {
                if inner.state != BatcherState::Aborted {
                    error!(batcher = self.id, state = ?inner.state, "batcher in a wrong state at transaction ready");
                    debug_assert!(false, "transaction ready in state {:?}", inner.state);
                }
                return;
            }
            inner.state = BatcherState::Ready;
        }

        if ops_info.ops.is_empty() {
            return;
        }

        let (hybrid_time_for_write, allow_local_calls) = {
            let inner = self.inner.lock().unwrap();
            (inner.hybrid_time_for_write, self.allow_local_calls_in_curr_thread.load(Ordering::Acquire))
        };

        let force_consistent_read = self.force_consistent_read || self.transaction.is_some();
        // Consistent read machinery is skipped when the whole batch fits into
        // one non-transactional command.
        let need_consistent_read = force_consistent_read || ops_info.groups.len() > 1;

        let ops_count = ops_info.ops.len();
        let mut rpcs = Vec::with_capacity(ops_info.groups.len());
        for (index, group) in ops_info.groups.iter().enumerate() {
            // Only the last group may run on the current thread; earlier ones
            // go through the rpc layer's pool and proceed in parallel.
            let last = index + 1 == ops_info.groups.len();
            let ops = group.ops(&ops_info.ops).to_vec();
            let tablet = ops[0].tablet().expect("buffered op has no resolved tablet").clone();
            let op_group = ops[0].operation().group();
            debug!(
                batcher = self.id,
                tablet = %tablet.tablet_id(),
                ops = ops.len(),
                ?op_group,
                "dispatching group"
            );
            let data = RpcData {
                batcher: self.clone(),
                tablet,
                ops,
                allow_local_calls_in_curr_thread: allow_local_calls && last,
                need_consistent_read,
                need_metadata: group.need_metadata,
                hybrid_time_for_write,
            };
            let rpc = match op_group {
                OpGroup::Write => self.client.rpc_factory().write_rpc(data),
                OpGroup::LeaderRead => self.client.rpc_factory().read_rpc(data, ConsistencyLevel::Strong),
                OpGroup::ConsistentPrefixRead => {
                    self.client.rpc_factory().read_rpc(data, ConsistencyLevel::ConsistentPrefix)
                },
            };
            rpcs.push(rpc);
        }

        debug_assert_eq!(ops_count, ops_info.ops.len(), "ops queue was modified while creating rpcs");
        // Ownership of the ops has moved into the rpcs.
        ops_info.ops.clear();
        ops_info.groups.clear();
        drop(ops_info);

        for rpc in rpcs {
            if let Some(transaction) = &self.transaction {
                rpc.trace().follows_from(transaction.trace().id());
            }
            rpc.send();
        }
    }

    /// Called by the rpc layer once per rpc, with the transport status and
    /// the decoded response payload.
    pub fn rpc_finished(&self, rpc: &dyn BatchRpc, status: Result<(), ClientError>, response: RpcResponse) {
        let extra = response.flush_extra();
        match &response {
            RpcResponse::Write(write) => self.process_write_response(rpc, &status, write),
            RpcResponse::Read(_) => self.process_rpc_status(rpc, &status),
        }
        self.remove_in_flight_ops_after_flushing(rpc.ops(), &status, extra);
        self.check_for_finished_flush();
    }

    fn process_rpc_status(&self, rpc: &dyn BatchRpc, status: &Result<(), ClientError>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != BatcherState::Ready {
            error!(batcher = self.id, state = ?inner.state, "rpc finished in a wrong state");
            debug_assert!(false, "rpc finished in state {:?}", inner.state);
            return;
        }
        if let Err(error) = status {
            // The whole rpc failed, so every op in it shares the outcome.
            for op in rpc.ops() {
                self.combine_error(&mut inner, op, error.clone());
            }
        }
    }

    fn process_write_response(&self, rpc: &dyn BatchRpc, status: &Result<(), ClientError>, response: &WriteResponse) {
        self.process_rpc_status(rpc, status);

        if status.is_ok() {
            if let Some(propagated) = response.propagated_hybrid_time {
                self.client.update_latest_observed_hybrid_time(propagated);
            }
        }

        let ops = rpc.ops();
        for row_error in &response.per_row_errors {
            let index = row_error.row_index as usize;
            if index >= ops.len() {
                error!(
                    batcher = self.id,
                    tablet = %rpc.tablet().tablet_id(),
                    index,
                    ops = ops.len(),
                    "received a per-row error for an out-of-bound op index"
                );
                continue;
            }
            let row_status = match &row_error.error {
                Some(wire) => ClientError::from(wire),
                None => ClientError::internal("per-row error carries no payload"),
            };
            debug!(batcher = self.id, op = %ops[index], error = %row_status, "row error");
            let mut inner = self.inner.lock().unwrap();
            self.combine_error(&mut inner, &ops[index], row_status);
        }
    }

    fn remove_in_flight_ops_after_flushing(
        &self,
        ops: &[InFlightOpRef],
        status: &Result<(), ClientError>,
        extra: FlushExtra,
    ) {
        if let Some(transaction) = &self.transaction {
            // Failures the session is going to retry are withheld from the
            // transaction so it keeps running until the retries conclude.
            let ops_will_be_retried = matches!(status, Err(error) if error.retriable_at_session());
            if !ops_will_be_retried {
                transaction.flushed(ops, extra.used_read_time, status);
            }
        }
        if status.is_ok() {
            if let Some(read_point) = &self.read_point {
                read_point.update_clock(extra.propagated_hybrid_time);
            }
        }

        let mut inner = self.inner.lock().unwrap();
        for op in ops {
            op.finish();
            if inner.ops.remove(&op.sequence_number()).is_none() {
                error!(batcher = self.id, op = %op, "flushed op is not tracked by this batcher");
                debug_assert!(false, "flushed op {op} is not tracked by this batcher");
            }
        }
    }

    fn check_for_finished_flush(&self) {
        let session;
        let callback;
        let status;
        {
            let mut inner = self.inner.lock().unwrap();
            if !inner.ops.is_empty() {
                return;
            }
            match inner.state {
                // Complete: another thread finished the last op first.
                // Gathering: a lookup failed while the batch was still
                // filling up. Aborted: abort already ran the callback.
                BatcherState::Complete | BatcherState::Gathering | BatcherState::Aborted => return,
                BatcherState::Resolving | BatcherState::Ready => {},
                BatcherState::Preparing => {
                    error!(batcher = self.id, state = ?inner.state, "batcher finished in a wrong state");
                    debug_assert!(false, "batcher finished in state {:?}", inner.state);
                    return;
                },
            }
            inner.state = BatcherState::Complete;
            session = self.session.upgrade();
            callback = inner.flush_callback.take();
            status = if let Some(combined) = inner.combined_error.clone() {
                Err(combined)
            } else if self.had_errors.load(Ordering::Acquire) {
                // The session fetches details from the error collector.
                Err(ClientError::io_error(TABLET_SERVER_ERRORS_MESSAGE))
            } else {
                Ok(())
            };
        }

        if let Some(session) = session {
            session.flush_finished(self);
        }
        if let Some(callback) = callback {
            self.run_callback(callback, status);
        }
    }

    /// Hands the stored callback to the client's callback pool, or runs it
    /// inline when there is none. The callback is moved out, so it cannot run
    /// twice.
    fn run_callback(&self, callback: FlushCallback, status: Result<(), ClientError>) {
        match self.client.callback_pool() {
            Some(pool) => {
                let _ = pool.spawn(async move { callback(status) });
            },
            None => callback(status),
        }
    }
}

impl Drop for Batcher {
    fn drop(&mut self) {
        let Ok(inner) = self.inner.get_mut() else { return };
        if !inner.ops.is_empty() {
            for op in inner.ops.values() {
                error!(batcher = self.id, op = %op, "orphaned operation");
            }
            debug_assert!(false, "batcher {} dropped with {} ops in flight", self.id, inner.ops.len());
        }
        if inner.state != BatcherState::Complete && inner.state != BatcherState::Aborted {
            error!(batcher = self.id, state = ?inner.state, "batcher dropped in a non-terminal state");
            debug_assert!(
                matches!(inner.state, BatcherState::Complete | BatcherState::Aborted),
                "batcher {} dropped in state {:?}",
                self.id,
                inner.state
            );
        }
    }
}
