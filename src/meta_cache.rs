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
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use crate::error::ClientError;
use crate::protos::TabletId;
use crate::table::{Partition, TableRef};

/// Resolved shard handle: the replica group currently owning a contiguous
/// range of partition keys, snapshotted at some partition list version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteTablet {
    tablet_id: TabletId,
    partition: Partition,
    partition_list_version: u32,
}

pub type RemoteTabletRef = Arc<RemoteTablet>;

impl RemoteTablet {
    pub fn new(tablet_id: TabletId, partition: Partition, partition_list_version: u32) -> RemoteTabletRef {
        Arc::new(Self { tablet_id, partition, partition_list_version })
    }

    pub fn tablet_id(&self) -> TabletId {
        self.tablet_id
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn partition_list_version(&self) -> u32 {
        self.partition_list_version
    }
}

impl Display for RemoteTablet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "tablet {} {}", self.tablet_id, self.partition)
    }
}

pub type LookupCallback = Box<dyn FnOnce(Result<RemoteTabletRef, ClientError>) + Send + 'static>;

/// Routing oracle of the client. Lookups are asynchronous and may complete on
/// arbitrary threads, before or after the initiating call returns.
pub trait MetaCache: Send + Sync {
    fn lookup_tablet_by_key(&self, table: &TableRef, partition_key: Bytes, deadline: Instant, callback: LookupCallback);

    /// Best-effort hint that the cached partition list of `table` is outdated.
    fn invalidate_table_cache(&self, table: &TableRef);
}
