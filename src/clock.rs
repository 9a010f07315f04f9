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

use std::ops::Add;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use static_assertions::{assert_impl_all, assert_not_impl_any};

pub use crate::protos::Timestamp;

/// Client's view of hybrid time: monotone, advanced by timestamps propagated
/// from tablet servers.
#[derive(Clone)]
pub struct Clock {
    inner: Arc<HybridClock>,
}

impl Clock {
    pub fn new() -> Self {
        Self { inner: Arc::new(HybridClock::new()) }
    }

    pub fn now(&self) -> Timestamp {
        self.inner.now()
    }

    pub fn update(&self, timestamp: Timestamp) {
        self.inner.update(timestamp)
    }

    pub fn latest(&self) -> Timestamp {
        self.inner.latest()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Consistent read point of a session. Snapshot bookkeeping lives with the
/// session; the batcher only feeds propagated server time back into it.
#[derive(Clone)]
pub struct ReadPoint {
    clock: Clock,
}

impl ReadPoint {
    pub fn new(clock: Clock) -> Self {
        Self { clock }
    }

    pub fn update_clock(&self, propagated: Option<Timestamp>) {
        if let Some(timestamp) = propagated {
            self.clock.update(timestamp);
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

fn system_time_now() -> Timestamp {
    let now = SystemTime::now();
    let elapsed = now.duration_since(SystemTime::UNIX_EPOCH).unwrap();
    Timestamp { seconds: elapsed.as_secs(), nanoseconds: elapsed.subsec_nanos(), logical: 0 }
}

struct HybridClock {
    mutex: spin::Mutex<Timestamp>,
}

assert_impl_all!(HybridClock: Send, Sync);
assert_not_impl_any!(HybridClock: Clone, Copy);

impl HybridClock {
    fn new() -> Self {
        Self { mutex: spin::Mutex::new(system_time_now()) }
    }

    fn now(&self) -> Timestamp {
        let mut now = system_time_now();
        let mut cache = self.mutex.lock();
        if now <= *cache {
            cache.logical += 1;
            now = *cache;
        } else {
            *cache = now;
        }
        now
    }

    fn update(&self, timestamp: Timestamp) {
        let mut cache = self.mutex.lock();
        if timestamp > *cache {
            *cache = timestamp;
        }
    }

    fn latest(&self) -> Timestamp {
        *self.mutex.lock()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}+{}", self.seconds, self.nanoseconds, self.logical)
    }
}

impl Timestamp {
    pub const fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanoseconds == 0 && self.logical == 0
    }

    pub const fn zero() -> Self {
        Self { seconds: 0, nanoseconds: 0, logical: 0 }
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        let sum = Duration::new(self.seconds, self.nanoseconds) + rhs;
        Self { seconds: sum.as_secs(), nanoseconds: sum.subsec_nanos(), logical: self.logical }
    }
}

#[cfg(test)]
mod tests {
    use assertor::*;

    use super::*;

    #[test]
    fn test_clock_monotonic() {
        let clock = Clock::new();
        let mut old = clock.now();
        for _ in 0..5000 {
            clock.update(old);
            let now = clock.now();
            assert_that!(now).is_greater_than(old);
            old = now;
        }
    }

    #[test]
    fn test_clock_advances_from_propagated_time() {
        let clock = Clock::new();
        let future = clock.now() + Duration::from_secs(3000);
        clock.update(future);
        assert_that!(clock.latest()).is_equal_to(future);
        assert_that!(clock.now()).is_greater_than(future);
    }

    #[test]
    fn test_clock_ignores_past_time() {
        let clock = Clock::new();
        let now = clock.now();
        clock.update(Timestamp::zero());
        assert_that!(clock.latest()).is_equal_to(now);
    }

    #[test]
    fn test_read_point_propagation() {
        let clock = Clock::new();
        let read_point = ReadPoint::new(clock.clone());
        let future = clock.now() + Duration::from_secs(100);

        read_point.update_clock(None);
        assert_that!(clock.latest()).is_less_than(future);

        read_point.update_clock(Some(future));
        assert_that!(clock.latest()).is_equal_to(future);
        assert_that!(read_point.now()).is_greater_than(future);
    }
}
