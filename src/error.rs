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

use compact_str::CompactString;
use thiserror::Error;

use crate::batcher::BatcherState;
use crate::protos::{WireError, WireErrorCode};

/// Refinement carried by some `Aborted` statuses. The session inspects it to
/// decide whether another attempt of the whole batch makes sense.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClientErrorCode {
    AbortedBatchDueToFailedTabletLookup,
    TablePartitionListVersionDoesNotMatch,
}

/// Coarse classification of a status, used when combining per-operation
/// failures into a single batch status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    WrongState,
    Aborted,
    TablePartitionListIsStale,
    NotFound,
    AlreadyPresent,
    Busy,
    InvalidArgument,
    TimedOut,
    InternalError,
    IoError,
    Combined,
    Remote,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("batcher is in {0:?} state")]
    WrongState(BatcherState),
    #[error("{message}")]
    Aborted {
        message: CompactString,
        code: Option<ClientErrorCode>,
    },
    #[error("partition list of table {table} is stale")]
    TablePartitionListIsStale { table: CompactString },
    #[error("{0}")]
    NotFound(CompactString),
    #[error("{0}")]
    AlreadyPresent(CompactString),
    #[error("{0}")]
    Busy(CompactString),
    #[error("{0}")]
    InvalidArgument(CompactString),
    #[error("{0}")]
    TimedOut(CompactString),
    #[error("{0}")]
    InternalError(CompactString),
    #[error("{0}")]
    IoError(CompactString),
    #[error("multiple failures")]
    Combined,
    #[error("{operation}: {source}")]
    OperationError {
        operation: CompactString,
        #[source]
        source: Box<ClientError>,
    },
    #[error("remote error {code:?}: {message}")]
    Remote { code: tonic::Code, message: CompactString },
}

impl ClientError {
    pub fn aborted(message: impl Into<CompactString>) -> Self {
        Self::Aborted { message: message.into(), code: None }
    }

    pub fn aborted_with_code(message: impl Into<CompactString>, code: ClientErrorCode) -> Self {
        Self::Aborted { message: message.into(), code: Some(code) }
    }

    pub fn not_found(message: impl Into<CompactString>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_argument(message: impl Into<CompactString>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn timed_out(message: impl Into<CompactString>) -> Self {
        Self::TimedOut(message.into())
    }

    pub fn internal(message: impl Into<CompactString>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn io_error(message: impl Into<CompactString>) -> Self {
        Self::IoError(message.into())
    }

    /// Prefixes this status with the description of the operation it failed.
    pub fn with_operation(self, operation: impl Into<CompactString>) -> Self {
        Self::OperationError { operation: operation.into(), source: Box::new(self) }
    }

    pub fn code(&self) -> StatusCode {
        match self {
            Self::WrongState(_) => StatusCode::WrongState,
            Self::Aborted { .. } => StatusCode::Aborted,
            Self::TablePartitionListIsStale { .. } => StatusCode::TablePartitionListIsStale,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::AlreadyPresent(_) => StatusCode::AlreadyPresent,
            Self::Busy(_) => StatusCode::Busy,
            Self::InvalidArgument(_) => StatusCode::InvalidArgument,
            Self::TimedOut(_) => StatusCode::TimedOut,
            Self::InternalError(_) => StatusCode::InternalError,
            Self::IoError(_) => StatusCode::IoError,
            Self::Combined => StatusCode::Combined,
            Self::OperationError { source, .. } => source.code(),
            Self::Remote { .. } => StatusCode::Remote,
        }
    }

    pub fn client_error_code(&self) -> Option<ClientErrorCode> {
        match self {
            Self::Aborted { code, .. } => *code,
            Self::OperationError { source, .. } => source.client_error_code(),
            _ => None,
        }
    }

    /// Whether the session should repair this failure by retrying the whole
    /// batch against possibly refreshed routing.
    pub fn retriable_at_session(&self) -> bool {
        match self {
            Self::TablePartitionListIsStale { .. } => true,
            Self::OperationError { source, .. } => source.retriable_at_session(),
            _ => self.client_error_code() == Some(ClientErrorCode::AbortedBatchDueToFailedTabletLookup),
        }
    }
}

impl From<tonic::Status> for ClientError {
    fn from(status: tonic::Status) -> Self {
        Self::Remote { code: status.code(), message: status.message().into() }
    }
}

impl From<&WireError> for ClientError {
    fn from(error: &WireError) -> Self {
        let message = CompactString::from(error.message.as_str());
        match error.code() {
            WireErrorCode::NotFound => Self::NotFound(message),
            WireErrorCode::AlreadyPresent => Self::AlreadyPresent(message),
            WireErrorCode::Busy => Self::Busy(message),
            WireErrorCode::InvalidArgument => Self::InvalidArgument(message),
            WireErrorCode::InternalError | WireErrorCode::Unknown => Self::InternalError(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use assertor::*;

    use super::*;

    #[test]
    fn test_retriable_at_session() {
        let lookup_failed =
            ClientError::aborted_with_code("whole batch aborted", ClientErrorCode::AbortedBatchDueToFailedTabletLookup);
        assert_that!(lookup_failed.retriable_at_session()).is_true();

        let stale = ClientError::TablePartitionListIsStale { table: "acme.users".into() };
        assert_that!(stale.retriable_at_session()).is_true();
        assert_that!(stale.with_operation("write acme.users").retriable_at_session()).is_true();

        let version_mismatch = ClientError::aborted_with_code(
            "partition list version skew",
            ClientErrorCode::TablePartitionListVersionDoesNotMatch,
        );
        assert_that!(version_mismatch.retriable_at_session()).is_false();
        assert_that!(ClientError::aborted("aborted by user").retriable_at_session()).is_false();
        assert_that!(ClientError::not_found("no such tablet").retriable_at_session()).is_false();
    }

    #[test]
    fn test_operation_error_delegates_code() {
        let error = ClientError::timed_out("deadline exceeded").with_operation("read acme.users");
        assert_that!(error.code()).is_equal_to(StatusCode::TimedOut);
        assert_that!(error.to_string()).is_equal_to("read acme.users: deadline exceeded".to_string());
    }

    #[test]
    fn test_wire_error_decoding() {
        let error = WireError::new(WireErrorCode::NotFound, "row gone");
        assert_that!(ClientError::from(&error)).is_equal_to(ClientError::not_found("row gone"));

        let unknown = WireError { code: 12345, message: "who knows".to_string() };
        assert_that!(ClientError::from(&unknown)).is_equal_to(ClientError::internal("who knows"));
    }

    #[test]
    fn test_remote_status_conversion() {
        let status = tonic::Status::unavailable("tablet server is down");
        let error = ClientError::from(status);
        assert_that!(error.code()).is_equal_to(StatusCode::Remote);
        assert_that!(error.to_string().contains("tablet server is down")).is_true();
    }
}
