// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Doubly linked lists threaded through the entry arena.
//!
//! Entries are owned by a single map keyed by [`FlowId`]. Lists do not own
//! anything: each entry carries one pair of [`Links`] per [`Chain`] it is on,
//! and a [`ListHead`] only remembers the two ends.

use std::collections::HashMap;

use ahash::RandomState;

use crate::entry::FlowEntry;
use crate::types::FlowId;

pub(crate) type Entries = HashMap<FlowId, FlowEntry, RandomState>;

/// The lists an entry is a member of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Chain {
    /// the list of all entries, in insertion order
    All,
    /// the list of entries sharing a cookie prefix
    Cookie,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Links {
    pub(crate) prev: Option<FlowId>,
    pub(crate) next: Option<FlowId>,
}

#[derive(Debug, Default)]
pub(crate) struct ListHead {
    first: Option<FlowId>,
    last: Option<FlowId>,
    len: usize,
}

impl ListHead {
    pub(crate) fn first(&self) -> Option<FlowId> {
        self.first
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Append an entry that is already in the arena
    pub(crate) fn push_back(&mut self, entries: &mut Entries, chain: Chain, id: FlowId) {
        let Some(entry) = entries.get_mut(&id) else {
            return;
        };
        *entry.links_mut(chain) = Links {
            prev: self.last,
            next: None,
        };
        match self.last.and_then(|last| entries.get_mut(&last)) {
            Some(last) => last.links_mut(chain).next = Some(id),
            None => self.first = Some(id),
        }
        self.last = Some(id);
        self.len += 1;
    }

    /// Remove an entry from the list. The entry stays in the arena.
    pub(crate) fn unlink(&mut self, entries: &mut Entries, chain: Chain, id: FlowId) {
        let Some(links) = entries.get_mut(&id).map(|e| std::mem::take(e.links_mut(chain))) else {
            return;
        };
        match links.prev.and_then(|prev| entries.get_mut(&prev)) {
            Some(prev) => prev.links_mut(chain).next = links.next,
            None => self.first = links.next,
        }
        match links.next.and_then(|next| entries.get_mut(&next)) {
            Some(next) => next.links_mut(chain).prev = links.prev,
            None => self.last = links.prev,
        }
        self.len -= 1;
    }

    pub(crate) fn iter<'a>(&self, entries: &'a Entries, chain: Chain) -> ListIter<'a> {
        ListIter {
            entries,
            chain,
            cur: self.first,
        }
    }
}

/// Plain (unsafe under mutation) walk of a list, for use while the table is borrowed
pub(crate) struct ListIter<'a> {
    entries: &'a Entries,
    chain: Chain,
    cur: Option<FlowId>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a FlowEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(&self.cur?)?;
        self.cur = entry.links(self.chain).next;
        Some(entry)
    }
}
