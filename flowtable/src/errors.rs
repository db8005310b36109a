// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors returned by flow table operations.
//! Every operation checks for all of its failure conditions before touching any
//! index, so an error always leaves the table as it was.

use crate::task::TaskId;
use crate::types::{FlowId, TableId};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlowTableError {
    #[error("A flow with the same table, priority and match already exists")]
    Duplicate,
    #[error("Flow id {0} is already in use")]
    DuplicateFlowId(FlowId),
    #[error("No such flow")]
    NotFound,
    #[error("Invalid checksum bucket count {0}: must be a non-zero power of two")]
    InvalidBucketSize(u32),
    #[error("Invalid table id {0}")]
    InvalidTableId(u8),
    #[error("Flow {0} is being deleted")]
    EntryDeleting(FlowId),
    #[error("Flow {0} has a different table or priority than the descriptor")]
    KeyMismatch(FlowId),
    #[error("Goto-table from table {from} to table {to} is not allowed")]
    InvalidGotoTable { from: TableId, to: u8 },
    #[error("Too many iteration tasks ({0} pending)")]
    TooManyTasks(usize),
    #[error("No such iteration task {0}")]
    NoSuchTask(TaskId),
    #[error("Flow table is inconsistent: {0}")]
    Inconsistent(String),
}

pub type FlowTableResult<T> = Result<T, FlowTableError>;
