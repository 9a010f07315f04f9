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

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::ops::Range;
use std::sync::atomic::{self, AtomicU8};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use crate::meta_cache::RemoteTabletRef;
use crate::operation::{OpGroup, OperationRef};
use crate::protos::TabletId;

/// Per-operation progress. Transitions are monotonic and go through
/// compare-and-set, so a lookup completion can be validated without holding
/// the batcher lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum OpState {
    LookingUpTablet = 0,
    BufferedToTabletServer = 1,
    Complete = 2,
}

impl OpState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::LookingUpTablet,
            1 => Self::BufferedToTabletServer,
            _ => Self::Complete,
        }
    }
}

/// One operation tracked by a batcher, from ingress to rpc completion. Shared
/// between the batcher, its dispatch queue and the rpc that carries it; the
/// longest holder keeps it alive.
pub struct InFlightOp {
    operation: OperationRef,
    partition_key: Bytes,
    sequence_number: u64,
    tablet: OnceLock<RemoteTabletRef>,
    state: AtomicU8,
}

pub type InFlightOpRef = Arc<InFlightOp>;

impl InFlightOp {
    pub fn new(operation: OperationRef, partition_key: Bytes, sequence_number: u64) -> Self {
        Self {
            operation,
            partition_key,
            sequence_number,
            tablet: OnceLock::new(),
            state: AtomicU8::new(OpState::LookingUpTablet as u8),
        }
    }

    pub fn operation(&self) -> &OperationRef {
        &self.operation
    }

    pub fn partition_key(&self) -> &Bytes {
        &self.partition_key
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn state(&self) -> OpState {
        OpState::from_raw(self.state.load(atomic::Ordering::Acquire))
    }

    /// Forward-only transition. Returns false when another thread got there
    /// first or the op is not in `from` anymore.
    pub fn advance_state(&self, from: OpState, to: OpState) -> bool {
        debug_assert!(from < to);
        self.state
            .compare_exchange(from as u8, to as u8, atomic::Ordering::AcqRel, atomic::Ordering::Acquire)
            .is_ok()
    }

    pub fn finish(&self) {
        self.state.fetch_max(OpState::Complete as u8, atomic::Ordering::AcqRel);
    }

    pub fn set_tablet(&self, tablet: RemoteTabletRef) {
        let set = self.tablet.set(tablet).is_ok();
        debug_assert!(set, "tablet resolved twice for {self}");
    }

    pub fn tablet(&self) -> Option<&RemoteTabletRef> {
        self.tablet.get()
    }

    fn destination(&self) -> (TabletId, OpGroup) {
        let tablet = self.tablet().expect("in-flight op has no resolved tablet");
        (tablet.tablet_id(), self.operation.group())
    }
}

impl Display for InFlightOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} seq {} ({:?})", self.operation, self.sequence_number, self.state())
    }
}

impl std::fmt::Debug for InFlightOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// Contiguous run of the dispatch queue destined for one (tablet, op group)
/// pair. `need_metadata` is filled in by the transaction during prepare.
#[derive(Clone, Debug)]
pub struct InFlightOpsGroup {
    pub need_metadata: bool,
    range: Range<usize>,
}

impl InFlightOpsGroup {
    fn new(range: Range<usize>) -> Self {
        Self { need_metadata: false, range }
    }

    pub fn ops<'a>(&self, queue: &'a [InFlightOpRef]) -> &'a [InFlightOpRef] {
        &queue[self.range.clone()]
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Sorted dispatch queue plus its grouping, handed to the transaction for
/// prepare and consumed once when rpcs are built.
#[derive(Default)]
pub struct OpsInfo {
    pub ops: Vec<InFlightOpRef>,
    pub groups: Vec<InFlightOpsGroup>,
}

/// Orders ops so that the sort key doubles as the intra-group dispatch order:
/// ops of one (tablet, op group) pair become adjacent, in submission order.
pub fn sort_for_dispatch(queue: &mut [InFlightOpRef]) {
    queue.sort_unstable_by(|lhs, rhs| {
        let by_destination = lhs.destination().cmp(&rhs.destination());
        match by_destination {
            Ordering::Equal => lhs.sequence_number().cmp(&rhs.sequence_number()),
            ordering => ordering,
        }
    });
}

/// Partitions a queue sorted by [`sort_for_dispatch`] into maximal contiguous
/// groups sharing (tablet, op group). Pure: re-running on its own output is a
/// fixed point.
pub fn group_by_destination(queue: &[InFlightOpRef]) -> Vec<InFlightOpsGroup> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=queue.len() {
        if i == queue.len() || queue[i].destination() != queue[start].destination() {
            groups.push(InFlightOpsGroup::new(start..i));
            start = i;
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use assertor::*;

    use super::*;
    use crate::meta_cache::tests::test_tablet;
    use crate::operation::tests::{test_table, TestOperation};

    fn buffered_op(sequence_number: u64, key: &[u8], tablet: RemoteTabletRef) -> InFlightOpRef {
        let operation = TestOperation::write(test_table(), key.to_vec()).into_ref();
        let partition_key = operation.partition_key().unwrap();
        let op = InFlightOp::new(operation, partition_key, sequence_number);
        op.set_tablet(tablet);
        assert!(op.advance_state(OpState::LookingUpTablet, OpState::BufferedToTabletServer));
        Arc::new(op)
    }

    fn buffered_read(sequence_number: u64, key: &[u8], tablet: RemoteTabletRef) -> InFlightOpRef {
        let operation = TestOperation::read(test_table(), key.to_vec()).into_ref();
        let partition_key = operation.partition_key().unwrap();
        let op = InFlightOp::new(operation, partition_key, sequence_number);
        op.set_tablet(tablet);
        assert!(op.advance_state(OpState::LookingUpTablet, OpState::BufferedToTabletServer));
        Arc::new(op)
    }

    #[test]
    fn test_op_state_is_monotonic() {
        let operation = TestOperation::write(test_table(), &b"k"[..]).into_ref();
        let op = InFlightOp::new(operation, Bytes::from_static(b"k"), 0);
        assert_that!(op.state()).is_equal_to(OpState::LookingUpTablet);

        assert_that!(op.advance_state(OpState::LookingUpTablet, OpState::BufferedToTabletServer)).is_true();
        assert_that!(op.state()).is_equal_to(OpState::BufferedToTabletServer);
        assert_that!(op.advance_state(OpState::LookingUpTablet, OpState::BufferedToTabletServer)).is_false();

        op.finish();
        assert_that!(op.state()).is_equal_to(OpState::Complete);
        op.finish();
        assert_that!(op.state()).is_equal_to(OpState::Complete);
    }

    #[test]
    fn test_grouping_single_group() {
        let tablet = test_tablet(1, b"", b"");
        let mut queue = vec![
            buffered_op(0, b"a", tablet.clone()),
            buffered_op(1, b"b", tablet.clone()),
            buffered_op(2, b"c", tablet),
        ];
        sort_for_dispatch(&mut queue);
        let groups = group_by_destination(&queue);
        assert_that!(groups.len()).is_equal_to(1);
        assert_that!(groups[0].len()).is_equal_to(3);
        let sequences: Vec<_> = groups[0].ops(&queue).iter().map(|op| op.sequence_number()).collect();
        assert_that!(sequences).is_equal_to(vec![0, 1, 2]);
    }

    #[test]
    fn test_grouping_by_tablet_and_class() {
        let tablet_a = test_tablet(1, b"", b"m");
        let tablet_b = test_tablet(2, b"m", b"");
        let mut queue = vec![
            buffered_op(0, b"a", tablet_a.clone()),
            buffered_op(1, b"x", tablet_b.clone()),
            buffered_read(2, b"b", tablet_a.clone()),
            buffered_op(3, b"c", tablet_a),
            buffered_read(4, b"y", tablet_b),
        ];
        sort_for_dispatch(&mut queue);
        let groups = group_by_destination(&queue);
        assert_that!(groups.len()).is_equal_to(4);

        let shape: Vec<(u64, Vec<u64>)> = groups
            .iter()
            .map(|group| {
                let ops = group.ops(&queue);
                let tablet_id = ops[0].tablet().unwrap().tablet_id().into_raw();
                (tablet_id, ops.iter().map(|op| op.sequence_number()).collect())
            })
            .collect();
        assert_that!(shape).is_equal_to(vec![(1, vec![0, 3]), (1, vec![2]), (2, vec![1]), (2, vec![4])]);
    }

    #[test]
    fn test_grouping_preserves_submission_order() {
        let tablet = test_tablet(7, b"", b"");
        let mut queue = vec![
            buffered_op(4, b"d", tablet.clone()),
            buffered_op(1, b"a", tablet.clone()),
            buffered_op(3, b"c", tablet.clone()),
            buffered_op(2, b"b", tablet),
        ];
        sort_for_dispatch(&mut queue);
        let groups = group_by_destination(&queue);
        assert_that!(groups.len()).is_equal_to(1);
        let sequences: Vec<_> = queue.iter().map(|op| op.sequence_number()).collect();
        assert_that!(sequences).is_equal_to(vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_grouping_is_fixed_point() {
        let tablet_a = test_tablet(1, b"", b"m");
        let tablet_b = test_tablet(2, b"m", b"");
        let mut queue = vec![
            buffered_op(0, b"z", tablet_b.clone()),
            buffered_read(1, b"a", tablet_a.clone()),
            buffered_op(2, b"b", tablet_a),
            buffered_op(3, b"x", tablet_b),
        ];
        sort_for_dispatch(&mut queue);
        let first: Vec<_> = queue.iter().map(|op| op.sequence_number()).collect();
        let first_groups: Vec<_> = group_by_destination(&queue).iter().map(InFlightOpsGroup::len).collect();

        sort_for_dispatch(&mut queue);
        let second: Vec<_> = queue.iter().map(|op| op.sequence_number()).collect();
        let second_groups: Vec<_> = group_by_destination(&queue).iter().map(InFlightOpsGroup::len).collect();

        assert_that!(second).is_equal_to(first);
        assert_that!(second_groups).is_equal_to(first_groups);
    }
}
