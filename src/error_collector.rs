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

use std::sync::Mutex;

use tracing::debug;

use crate::error::ClientError;
use crate::operation::OperationRef;

/// One failed operation together with the status that failed it.
#[derive(Clone)]
pub struct OperationError {
    pub operation: OperationRef,
    pub error: ClientError,
}

/// Append-only sink of per-operation failures. The owning session drains it
/// after the flush callback fires to decide what to retry.
#[derive(Default)]
pub struct ErrorCollector {
    errors: Mutex<Vec<OperationError>>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&self, operation: OperationRef, error: ClientError) {
        debug!(%error, "operation {operation:?} failed");
        self.errors.lock().unwrap().push(OperationError { operation, error });
    }

    pub fn len(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().unwrap().is_empty()
    }

    pub fn get_and_clear_errors(&self) -> Vec<OperationError> {
        std::mem::take(&mut self.errors.lock().unwrap())
    }
}
