// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Identifiers and constants shared by the flow table

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::errors::FlowTableError;

/// Number of flow tables an instance keeps checksum state for
pub const MAX_TABLES: usize = 32;

/// Length of the cookie prefix used to bucket flows
pub const COOKIE_PREFIX_LEN: u32 = 8;
pub const COOKIE_PREFIX_MASK: u64 = !0u64 << (64 - COOKIE_PREFIX_LEN);
pub(crate) const COOKIE_BUCKETS: usize = 1 << COOKIE_PREFIX_LEN;

pub type Priority = u16;
pub type Cookie = u64;

/// Bucket of a cookie, i.e. its top [`COOKIE_PREFIX_LEN`] bits
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn cookie_prefix(cookie: Cookie) -> usize {
    (cookie >> (64 - COOKIE_PREFIX_LEN)) as usize
}

/// Flow identifier, chosen by the owner of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FlowId(pub u64);

impl Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for FlowId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Flow table identifier. Only `0..MAX_TABLES` designate a table, [`TableId::ALL`] may
/// only be used in queries.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct TableId(u8);

impl TableId {
    pub const ALL: TableId = TableId(0xff);

    /// Build a table id for an actual table.
    ///
    /// # Errors
    ///
    /// Returns [`FlowTableError::InvalidTableId`] if the id is out of range.
    pub fn new(id: u8) -> Result<Self, FlowTableError> {
        if usize::from(id) < MAX_TABLES {
            Ok(Self(id))
        } else {
            Err(FlowTableError::InvalidTableId(id))
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_all(self) -> bool {
        self.0 == Self::ALL.0
    }

    #[must_use]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check that this id designates an actual table
    pub(crate) fn check(self) -> Result<Self, FlowTableError> {
        Self::new(self.0)
    }
}

impl TryFrom<u8> for TableId {
    type Error = FlowTableError;
    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_all() {
            write!(f, "all")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
