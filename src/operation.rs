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

use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::ClientError;
use crate::meta_cache::RemoteTabletRef;
use crate::table::TableRef;

/// Protocol family and direction of a user operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    CqlRead,
    CqlWrite,
    PgsqlRead,
    PgsqlWrite,
    RedisRead,
    RedisWrite,
}

impl OperationKind {
    pub fn is_write(self) -> bool {
        matches!(self, Self::CqlWrite | Self::PgsqlWrite | Self::RedisWrite)
    }

    pub fn is_read(self) -> bool {
        !self.is_write()
    }
}

/// Determines which rpc variant carries a group of operations. The order is
/// load bearing: it is part of the dispatch sort key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpGroup {
    Write,
    LeaderRead,
    ConsistentPrefixRead,
}

/// A user operation as the batcher sees it. Implementations are shared and
/// read-mostly; the mutating entry points take `&self` and use interior
/// mutability, because the batcher stamps hash codes and staleness hints
/// through shared handles during ingress.
pub trait Operation: Debug + Send + Sync {
    fn kind(&self) -> OperationKind;

    fn table(&self) -> &TableRef;

    /// Opaque routing key of the row this operation touches.
    fn partition_key(&self) -> Result<Bytes, ClientError>;

    fn group(&self) -> OpGroup {
        if self.kind().is_write() {
            OpGroup::Write
        } else {
            OpGroup::LeaderRead
        }
    }

    fn set_hash_code(&self, hash_code: u16);

    /// Partition list version this operation was prepared against, when known.
    fn partition_list_version(&self) -> Option<u32> {
        None
    }

    /// Caller-chosen destination tablet, bypassing the meta-cache lookup.
    fn preassigned_tablet(&self) -> Option<RemoteTabletRef> {
        None
    }

    fn mark_table_partition_list_stale(&self) {
        self.table().mark_partition_list_stale();
    }
}

pub type OperationRef = Arc<dyn Operation>;

#[cfg(test)]
pub mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::table::{PartitionSchema, Table, TableName};

    pub fn test_table() -> TableRef {
        Table::new(TableName::new("acme", "users"), PartitionSchema::hash_partitioned())
    }

    pub fn test_range_table() -> TableRef {
        Table::new(TableName::new("acme", "events"), PartitionSchema::range_partitioned())
    }

    pub struct TestOperation {
        kind: OperationKind,
        group: OpGroup,
        table: TableRef,
        partition_key: Bytes,
        partition_list_version: Option<u32>,
        preassigned_tablet: Option<RemoteTabletRef>,
        hash_code: Mutex<Option<u16>>,
        marked_stale: AtomicBool,
    }

    impl TestOperation {
        pub fn write(table: TableRef, partition_key: impl Into<Bytes>) -> Self {
            Self::new(OperationKind::PgsqlWrite, OpGroup::Write, table, partition_key)
        }

        pub fn read(table: TableRef, partition_key: impl Into<Bytes>) -> Self {
            Self::new(OperationKind::PgsqlRead, OpGroup::LeaderRead, table, partition_key)
        }

        pub fn consistent_prefix_read(table: TableRef, partition_key: impl Into<Bytes>) -> Self {
            Self::new(OperationKind::CqlRead, OpGroup::ConsistentPrefixRead, table, partition_key)
        }

        fn new(kind: OperationKind, group: OpGroup, table: TableRef, partition_key: impl Into<Bytes>) -> Self {
            Self {
                kind,
                group,
                table,
                partition_key: partition_key.into(),
                partition_list_version: None,
                preassigned_tablet: None,
                hash_code: Mutex::new(None),
                marked_stale: AtomicBool::new(false),
            }
        }

        pub fn with_partition_list_version(mut self, version: u32) -> Self {
            self.partition_list_version = Some(version);
            self
        }

        pub fn with_preassigned_tablet(mut self, tablet: RemoteTabletRef) -> Self {
            self.preassigned_tablet = Some(tablet);
            self
        }

        pub fn into_ref(self) -> OperationRef {
            Arc::new(self)
        }

        pub fn hash_code(&self) -> Option<u16> {
            *self.hash_code.lock().unwrap()
        }

        pub fn marked_stale(&self) -> bool {
            self.marked_stale.load(Ordering::Acquire)
        }
    }

    impl Operation for TestOperation {
        fn kind(&self) -> OperationKind {
            self.kind
        }

        fn table(&self) -> &TableRef {
            &self.table
        }

        fn partition_key(&self) -> Result<Bytes, ClientError> {
            Ok(self.partition_key.clone())
        }

        fn group(&self) -> OpGroup {
            self.group
        }

        fn set_hash_code(&self, hash_code: u16) {
            *self.hash_code.lock().unwrap() = Some(hash_code);
        }

        fn partition_list_version(&self) -> Option<u32> {
            self.partition_list_version
        }

        fn preassigned_tablet(&self) -> Option<RemoteTabletRef> {
            self.preassigned_tablet.clone()
        }

        fn mark_table_partition_list_stale(&self) {
            self.marked_stale.store(true, Ordering::Release);
            self.table.mark_partition_list_stale();
        }
    }

    impl Debug for TestOperation {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?} {} {:?}", self.kind, self.table.name(), self.partition_key)
        }
    }
}
