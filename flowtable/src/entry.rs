// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow table entries

use std::time::{Duration, Instant};

use crate::flowmod::{FlowAdd, FlowFlags};
use crate::instructions::FlowEffects;
use crate::iterator::IterId;
use crate::list::{Chain, Links};
use crate::minimatch::Minimatch;
use crate::types::{Cookie, FlowId, Priority, TableId};

/// Where an entry stands with respect to the forwarding backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// inserted in the table, the backend has not confirmed it yet
    Creating,
    /// programmed by the backend
    Stable,
    /// removal is pending
    Deleting,
}

/// Which timeout a flow ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    IdleTimeout,
    HardTimeout,
}

/// One row of the flow table.
///
/// Callers only ever get shared references to entries: all changes go through
/// [`FlowTable`](crate::FlowTable) so that the indexes stay coherent.
#[derive(Debug)]
pub struct FlowEntry {
    id: FlowId,
    table_id: TableId,
    priority: Priority,
    minimatch: Minimatch,
    cookie: Cookie,
    flags: FlowFlags,
    idle_timeout: u16,
    hard_timeout: u16,
    importance: u16,
    insert_time: Instant,
    last_counter_change: Instant,
    packets: u64,
    bytes: u64,
    effects: FlowEffects,
    state: EntryState,

    all_links: Links,
    cookie_links: Links,
    /// iterators whose next entry is this one
    parked: Vec<IterId>,
}

impl FlowEntry {
    pub(crate) fn new(id: FlowId, flow_add: &FlowAdd, minimatch: Minimatch, now: Instant) -> Self {
        Self {
            id,
            table_id: flow_add.table_id,
            priority: flow_add.priority,
            minimatch,
            cookie: flow_add.cookie,
            flags: flow_add.flags,
            idle_timeout: flow_add.idle_timeout,
            hard_timeout: flow_add.hard_timeout,
            importance: flow_add.importance,
            insert_time: now,
            last_counter_change: now,
            packets: 0,
            bytes: 0,
            effects: FlowEffects::new(flow_add.instructions.clone()),
            state: EntryState::Creating,
            all_links: Links::default(),
            cookie_links: Links::default(),
            parked: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> FlowId {
        self.id
    }
    #[must_use]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }
    #[must_use]
    pub fn minimatch(&self) -> &Minimatch {
        &self.minimatch
    }
    #[must_use]
    pub fn cookie(&self) -> Cookie {
        self.cookie
    }
    #[must_use]
    pub fn flags(&self) -> FlowFlags {
        self.flags
    }
    #[must_use]
    pub fn idle_timeout(&self) -> u16 {
        self.idle_timeout
    }
    #[must_use]
    pub fn hard_timeout(&self) -> u16 {
        self.hard_timeout
    }
    #[must_use]
    pub fn importance(&self) -> u16 {
        self.importance
    }
    #[must_use]
    pub fn insert_time(&self) -> Instant {
        self.insert_time
    }
    #[must_use]
    pub fn effects(&self) -> &FlowEffects {
        &self.effects
    }
    #[must_use]
    pub fn state(&self) -> EntryState {
        self.state
    }
    #[must_use]
    pub fn packets(&self) -> u64 {
        self.packets
    }
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Time since the flow was installed (or last overwritten)
    #[must_use]
    pub fn duration(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.insert_time)
    }

    /// Tell whether the flow has timed out at `now`. The hard timeout wins if both expired.
    #[must_use]
    pub fn expiry(&self, now: Instant) -> Option<RemovalReason> {
        let elapsed = |since: Instant, secs: u16| {
            secs != 0 && now.saturating_duration_since(since) >= Duration::from_secs(secs.into())
        };
        if elapsed(self.insert_time, self.hard_timeout) {
            Some(RemovalReason::HardTimeout)
        } else if elapsed(self.last_counter_change, self.idle_timeout) {
            Some(RemovalReason::IdleTimeout)
        } else {
            None
        }
    }

    pub(crate) fn strict_key(&self) -> crate::table::StrictKey {
        crate::table::StrictKey::new(self.table_id, self.priority, self.minimatch.clone())
    }

    /// Apply the mutable part of a flow-add over an existing entry. Table, priority and
    /// match are left alone, and so is the cookie: the table relinks it separately.
    /// Both timeouts restart from `now`.
    pub(crate) fn overwrite(&mut self, flow_add: &FlowAdd, now: Instant) {
        self.flags = flow_add.flags;
        self.idle_timeout = flow_add.idle_timeout;
        self.hard_timeout = flow_add.hard_timeout;
        self.importance = flow_add.importance;
        self.effects = FlowEffects::new(flow_add.instructions.clone());
        self.insert_time = now;
        self.last_counter_change = now;
        if flow_add.flags.contains(FlowFlags::RESET_COUNTS) {
            self.packets = 0;
            self.bytes = 0;
        }
    }

    pub(crate) fn set_cookie(&mut self, cookie: Cookie) {
        self.cookie = cookie;
    }

    pub(crate) fn set_effects(&mut self, effects: FlowEffects) {
        self.effects = effects;
    }

    pub(crate) fn set_state(&mut self, state: EntryState) {
        self.state = state;
    }

    pub(crate) fn update_counters(&mut self, packets: u64, bytes: u64, now: Instant) {
        if packets != self.packets || bytes != self.bytes {
            self.last_counter_change = now;
        }
        self.packets = packets;
        self.bytes = bytes;
    }

    pub(crate) fn links(&self, chain: Chain) -> &Links {
        match chain {
            Chain::All => &self.all_links,
            Chain::Cookie => &self.cookie_links,
        }
    }

    pub(crate) fn links_mut(&mut self, chain: Chain) -> &mut Links {
        match chain {
            Chain::All => &mut self.all_links,
            Chain::Cookie => &mut self.cookie_links,
        }
    }

    pub(crate) fn parked(&self) -> &[IterId] {
        &self.parked
    }

    pub(crate) fn park(&mut self, iter: IterId) {
        self.parked.push(iter);
    }

    pub(crate) fn unpark(&mut self, iter: IterId) {
        if let Some(pos) = self.parked.iter().position(|i| *i == iter) {
            self.parked.swap_remove(pos);
        }
    }

    pub(crate) fn take_parked(&mut self) -> Vec<IterId> {
        std::mem::take(&mut self.parked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowmod::FlowAdd;

    fn entry(idle: u16, hard: u16, now: Instant) -> FlowEntry {
        let flow_add = FlowAdd::builder()
            .idle_timeout(idle)
            .hard_timeout(hard)
            .build()
            .unwrap();
        FlowEntry::new(FlowId(1), &flow_add, Minimatch::match_all(), now)
    }

    #[test]
    fn test_no_timeouts() {
        let now = Instant::now();
        let e = entry(0, 0, now);
        assert_eq!(e.expiry(now + Duration::from_secs(3600)), None);
        assert_eq!(e.state(), EntryState::Creating);
    }

    #[test]
    fn test_idle_timeout_is_refreshed_by_traffic() {
        let now = Instant::now();
        let mut e = entry(10, 0, now);
        assert_eq!(e.expiry(now + Duration::from_secs(9)), None);
        e.update_counters(5, 500, now + Duration::from_secs(9));
        assert_eq!(e.expiry(now + Duration::from_secs(15)), None);
        // same counters: no refresh
        e.update_counters(5, 500, now + Duration::from_secs(15));
        assert_eq!(
            e.expiry(now + Duration::from_secs(19)),
            Some(RemovalReason::IdleTimeout)
        );
    }

    #[test]
    fn test_hard_timeout_wins() {
        let now = Instant::now();
        let e = entry(5, 5, now);
        assert_eq!(
            e.expiry(now + Duration::from_secs(5)),
            Some(RemovalReason::HardTimeout)
        );
    }

    #[test]
    fn test_overwrite_reset_counts() {
        let now = Instant::now();
        let mut e = entry(0, 0, now);
        e.update_counters(10, 1000, now);
        let keep = FlowAdd::builder().idle_timeout(30).build().unwrap();
        e.overwrite(&keep, now);
        assert_eq!(e.packets(), 10);
        assert_eq!(e.idle_timeout(), 30);
        let reset = FlowAdd::builder()
            .flags(FlowFlags::RESET_COUNTS)
            .build()
            .unwrap();
        e.overwrite(&reset, now);
        assert_eq!((e.packets(), e.bytes()), (0, 0));
    }

    #[test]
    fn test_overwrite_restarts_idle_timeout() {
        let now = Instant::now();
        let mut e = entry(0, 0, now);
        let later = now + Duration::from_secs(100);
        let idle = FlowAdd::builder().idle_timeout(10).build().unwrap();
        e.overwrite(&idle, later);
        assert_eq!(e.expiry(later + Duration::from_secs(5)), None);
        assert_eq!(
            e.expiry(later + Duration::from_secs(10)),
            Some(RemovalReason::IdleTimeout)
        );
    }
}
