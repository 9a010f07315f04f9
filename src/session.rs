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

use crate::batcher::Batcher;

/// Owner of a batcher. The batcher holds it weakly to avoid a reference
/// cycle, and notifies it strictly outside the batcher lock: the session lock
/// always comes before the batcher lock.
pub trait Session: Send + Sync {
    fn flush_started(&self, batcher: &Batcher);

    fn flush_finished(&self, batcher: &Batcher);
}

/// Load feedback for tablet servers, injected by the session. The batcher
/// only forwards queries to it.
pub trait RejectionScoreSource: Send + Sync {
    fn rejection_score(&self, attempt_num: i32) -> f64;
}
