// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow queries, as used by flow-mod and flow-stats requests

use crate::entry::FlowEntry;
use crate::errors::FlowTableError;
use crate::instructions::{GroupId, PortNo};
use crate::minimatch::Minimatch;
use crate::types::{COOKIE_PREFIX_MASK, Cookie, Priority, TableId, cookie_prefix};

/// How the match of a query is compared with the match of an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// the entry match must be contained in the query match
    #[default]
    NonStrict,
    /// same priority and identical match
    Strict,
    /// same priority and some packet matched by both
    Overlap,
}

/// A set of flows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaMatch {
    pub table_id: TableId,
    pub cookie: Cookie,
    pub cookie_mask: Cookie,
    pub minimatch: Minimatch,
    pub priority: Priority,
    pub mode: MatchMode,
    pub out_port: Option<PortNo>,
    pub out_group: Option<GroupId>,
}

impl Default for MetaMatch {
    /// Every flow of every table
    fn default() -> Self {
        Self {
            table_id: TableId::ALL,
            cookie: 0,
            cookie_mask: 0,
            minimatch: Minimatch::match_all(),
            priority: 0,
            mode: MatchMode::NonStrict,
            out_port: None,
            out_group: None,
        }
    }
}

impl MetaMatch {
    /// The query selecting exactly the flow with the given key
    #[must_use]
    pub fn strict(table_id: TableId, priority: Priority, minimatch: Minimatch) -> Self {
        Self {
            table_id,
            priority,
            minimatch,
            mode: MatchMode::Strict,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn table(mut self, table_id: TableId) -> Self {
        self.table_id = table_id;
        self
    }

    #[must_use]
    pub fn cookie(mut self, cookie: Cookie, mask: Cookie) -> Self {
        self.cookie = cookie;
        self.cookie_mask = mask;
        self
    }

    #[must_use]
    pub fn matching(mut self, minimatch: Minimatch, mode: MatchMode) -> Self {
        self.minimatch = minimatch;
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn out_port(mut self, port: PortNo) -> Self {
        self.out_port = Some(port);
        self
    }

    #[must_use]
    pub fn out_group(mut self, group: GroupId) -> Self {
        self.out_group = Some(group);
        self
    }

    /// Check that the query designates a table, or all of them.
    ///
    /// # Errors
    ///
    /// [`FlowTableError::InvalidTableId`] for an out of range table.
    pub fn validate(&self) -> Result<(), FlowTableError> {
        if !self.table_id.is_all() {
            self.table_id.check()?;
        }
        Ok(())
    }

    /// If the query only selects cookies of one prefix, the prefix
    #[must_use]
    pub fn cookie_bucket(&self) -> Option<usize> {
        (self.cookie_mask & COOKIE_PREFIX_MASK == COOKIE_PREFIX_MASK)
            .then(|| cookie_prefix(self.cookie))
    }

    /// Check the cookie, out-port and out-group filters only
    pub(crate) fn matches_filters(&self, entry: &FlowEntry) -> bool {
        (entry.cookie() ^ self.cookie) & self.cookie_mask == 0
            && self
                .out_port
                .is_none_or(|port| entry.effects().outputs_to(port))
            && self
                .out_group
                .is_none_or(|group| entry.effects().outputs_to_group(group))
    }

    /// Tell whether an entry belongs to the set
    #[must_use]
    pub fn matches(&self, entry: &FlowEntry) -> bool {
        if !self.table_id.is_all() && self.table_id != entry.table_id() {
            return false;
        }
        let key_matches = match self.mode {
            MatchMode::Strict => {
                entry.priority() == self.priority && *entry.minimatch() == self.minimatch
            }
            MatchMode::NonStrict => entry.minimatch().is_more_specific_than(&self.minimatch),
            MatchMode::Overlap => {
                entry.priority() == self.priority && entry.minimatch().overlaps(&self.minimatch)
            }
        };
        key_matches && self.matches_filters(entry)
    }
}
