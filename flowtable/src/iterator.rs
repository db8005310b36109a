// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Iteration over a flow table that survives changes to the table.
//!
//! An iterator remembers the next entry it will return and is parked on it. When
//! that entry is deleted, the table moves every iterator parked on it to the next
//! entry they would return. Entries added during the iteration may or may not be
//! returned.

use tracing::{trace, warn};

use crate::entry::{EntryState, FlowEntry};
use crate::errors::{FlowTableError, FlowTableResult};
use crate::list::{Chain, Entries};
use crate::query::MetaMatch;
use crate::table::FlowTable;
use crate::types::FlowId;

use tracectl::trace_target;
trace_target!("flowtable-iter", tracectl::LevelFilter::INFO, &["flowtable"]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IterId(pub(crate) u64);

/// Position of an iterator, kept in the table
#[derive(Debug)]
pub(crate) struct Cursor {
    pub(crate) chain: Chain,
    /// the next entry to return, which the iterator is parked on
    pub(crate) next: Option<FlowId>,
    pub(crate) query: MetaMatch,
}

/// Handle to an iterator over the entries of a [`FlowTable`] matching a query.
///
/// The handle must be given back with [`FlowTable::iterator_cleanup`].
#[must_use]
#[derive(Debug)]
pub struct FtIterator {
    id: IterId,
    registered: bool,
}

impl FtIterator {
    #[must_use]
    pub fn id(&self) -> IterId {
        self.id
    }

    /// Tell whether the iterator still holds state in its table
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }
}

impl Drop for FtIterator {
    fn drop(&mut self) {
        if self.registered {
            warn!("Iterator {:?} dropped without cleanup", self.id);
        }
    }
}

/// Tell whether an iteration should return an entry
pub(crate) fn selects(query: &MetaMatch, entry: &FlowEntry) -> bool {
    entry.state() != EntryState::Deleting && query.matches(entry)
}

/// Find the first entry selected by `query`, starting at `from` and following `chain`
pub(crate) fn seek(
    entries: &Entries,
    chain: Chain,
    mut from: Option<FlowId>,
    query: &MetaMatch,
) -> Option<FlowId> {
    while let Some(id) = from {
        let entry = entries.get(&id)?;
        if selects(query, entry) {
            return Some(id);
        }
        from = entry.links(chain).next;
    }
    None
}

pub(crate) fn park(entries: &mut Entries, at: Option<FlowId>, iter: IterId) {
    if let Some(entry) = at.and_then(|id| entries.get_mut(&id)) {
        entry.park(iter);
    }
}

pub(crate) fn unpark(entries: &mut Entries, at: Option<FlowId>, iter: IterId) {
    if let Some(entry) = at.and_then(|id| entries.get_mut(&id)) {
        entry.unpark(iter);
    }
}

impl FlowTable {
    /// Start an iteration over the entries matching `query`.
    ///
    /// If the query selects a single cookie prefix, only the entries with that
    /// prefix are visited.
    ///
    /// # Errors
    ///
    /// Fails if the query designates an invalid table.
    pub fn iterator(&mut self, query: MetaMatch) -> FlowTableResult<FtIterator> {
        let chain = if query.cookie_bucket().is_some() {
            Chain::Cookie
        } else {
            Chain::All
        };
        self.iterator_on(query, chain)
    }

    /// Start an iteration walking the given list. The list of all entries is the
    /// only one whose order never changes.
    pub(crate) fn iterator_on(
        &mut self,
        query: MetaMatch,
        chain: Chain,
    ) -> FlowTableResult<FtIterator> {
        query.validate()?;
        let first = match chain {
            Chain::All => self.all.first(),
            Chain::Cookie => {
                let Some(list) = query
                    .cookie_bucket()
                    .and_then(|bucket| self.cookie_lists.get(bucket))
                else {
                    return Err(FlowTableError::Inconsistent(
                        "cookie list walk without a cookie prefix".to_string(),
                    ));
                };
                list.first()
            }
        };
        let id = IterId(self.next_iter_id);
        self.next_iter_id += 1;

        let next = seek(&self.entries, chain, first, &query);
        park(&mut self.entries, next, id);
        trace!("iterator: new iterator {id:?} over {chain:?} list, first {next:?}");
        self.cursors.insert(id, Cursor { chain, next, query });
        Ok(FtIterator {
            id,
            registered: true,
        })
    }

    /// Get the next entry of an iteration, or `None` once it is over
    pub fn iterator_next(&mut self, iter: &mut FtIterator) -> Option<&FlowEntry> {
        if !iter.registered {
            return None;
        }
        let cursor = self.cursors.get_mut(&iter.id)?;
        loop {
            let current = cursor.next?;
            let entry = self.entries.get(&current)?;
            // the entry may have changed since the iterator parked on it
            let selected = selects(&cursor.query, entry);
            let successor = entry.links(cursor.chain).next;

            unpark(&mut self.entries, Some(current), iter.id);
            cursor.next = seek(&self.entries, cursor.chain, successor, &cursor.query);
            park(&mut self.entries, cursor.next, iter.id);
            if selected {
                trace!("iterator_next: {:?} -> {current}", iter.id);
                return self.entries.get(&current);
            }
        }
    }

    /// Release the state of an iterator. Cleaning up twice is harmless.
    pub fn iterator_cleanup(&mut self, iter: &mut FtIterator) {
        if !iter.registered {
            return;
        }
        iter.registered = false;
        if let Some(cursor) = self.cursors.remove(&iter.id) {
            unpark(&mut self.entries, cursor.next, iter.id);
        }
        trace!("iterator_cleanup: released {:?}", iter.id);
    }

    /// Move the iterators parked on `id` to the next entry they would return
    /// after it. Must be called before the entry leaves its lists.
    pub(crate) fn advance_parked(&mut self, id: FlowId, only: Option<Chain>) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let parked = entry.take_parked();
        let mut kept = Vec::new();
        for iter in parked {
            let Some(cursor) = self.cursors.get_mut(&iter) else {
                continue;
            };
            if only.is_some_and(|chain| chain != cursor.chain) {
                kept.push(iter);
                continue;
            }
            let successor = self
                .entries
                .get(&id)
                .and_then(|e| e.links(cursor.chain).next);
            cursor.next = seek(&self.entries, cursor.chain, successor, &cursor.query);
            park(&mut self.entries, cursor.next, iter);
            trace!("advance_parked: {iter:?} moved from {id} to {:?}", cursor.next);
        }
        if let Some(entry) = self.entries.get_mut(&id) {
            for iter in kept {
                entry.park(iter);
            }
        }
    }
}
