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

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use compact_str::CompactString;

use crate::error::ClientError;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableName {
    namespace: CompactString,
    name: CompactString,
}

impl TableName {
    pub fn new(namespace: impl Into<CompactString>, name: impl Into<CompactString>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for TableName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// Key range owned by one tablet. `end` is exclusive; an empty `end` means
/// unbounded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    start: Bytes,
    end: Bytes,
}

impl Partition {
    pub fn new(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self { start: start.into(), end: end.into() }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn start(&self) -> &[u8] {
        &self.start
    }

    pub fn end(&self) -> &[u8] {
        &self.end
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.start.as_ref() && (self.end.is_empty() || key < self.end.as_ref())
    }
}

impl Display for Partition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}, {:?})", self.start, self.end)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartitionSchema {
    hash_partitioning: bool,
}

impl PartitionSchema {
    pub fn hash_partitioned() -> Self {
        Self { hash_partitioning: true }
    }

    pub fn range_partitioned() -> Self {
        Self { hash_partitioning: false }
    }

    pub fn is_hash_partitioning(&self) -> bool {
        self.hash_partitioning
    }

    /// Decodes the multi-column hash value a hash-partitioned partition key
    /// starts with.
    pub fn decode_hash_code(partition_key: &[u8]) -> Result<u16, ClientError> {
        match partition_key {
            [high, low, ..] => Ok(u16::from_be_bytes([*high, *low])),
            _ => Err(ClientError::invalid_argument(format!(
                "partition key {partition_key:?} is too short to carry a hash code"
            ))),
        }
    }
}

/// Client-side table handle. The partition list carried by the meta-cache for
/// this table is versioned; operations record the version they were prepared
/// against so routing staleness is detectable at dispatch time.
pub struct Table {
    name: TableName,
    partition_schema: PartitionSchema,
    partition_list_version: AtomicU32,
    partition_list_stale: AtomicBool,
}

pub type TableRef = Arc<Table>;

impl Table {
    pub fn new(name: TableName, partition_schema: PartitionSchema) -> TableRef {
        Arc::new(Self {
            name,
            partition_schema,
            partition_list_version: AtomicU32::new(0),
            partition_list_stale: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub fn partition_schema(&self) -> &PartitionSchema {
        &self.partition_schema
    }

    pub fn partition_list_version(&self) -> u32 {
        self.partition_list_version.load(Ordering::Acquire)
    }

    pub fn set_partition_list_version(&self, version: u32) {
        self.partition_list_version.store(version, Ordering::Release);
    }

    pub fn mark_partition_list_stale(&self) {
        self.partition_list_stale.store(true, Ordering::Release);
    }

    pub fn partition_list_stale(&self) -> bool {
        self.partition_list_stale.load(Ordering::Acquire)
    }

    /// Consumes the staleness hint. Returns true when the cached partition
    /// list was marked stale and the caller should invalidate routing state.
    pub fn maybe_refresh_partition_list(&self) -> bool {
        self.partition_list_stale.swap(false, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("partition_schema", &self.partition_schema)
            .field("partition_list_version", &self.partition_list_version())
            .finish()
    }
}
