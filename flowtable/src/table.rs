// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The flow table.
//!
//! Entries live in a single map keyed by [`FlowId`]. On top of it the table keeps
//! a list of all entries in insertion order, one list per cookie prefix, an index
//! keyed by (table, priority, match) and per-table cookie checksums. Every
//! operation either fails before touching any of them or updates all of them.

use std::collections::HashMap;
use std::time::Instant;

use ahash::RandomState;
use tracing::{debug, error, warn};

use crate::checksum::TableChecksum;
use crate::config::{ConfigError, FlowTableConfig};
use crate::counters::{Counters, FlowTableCounters};
use crate::entry::{EntryState, FlowEntry, RemovalReason};
use crate::errors::{FlowTableError, FlowTableResult};
use crate::flowmod::{FlowAdd, FlowModify};
use crate::instructions::FlowEffects;
use crate::iterator::{Cursor, IterId};
use crate::list::{Chain, Entries, ListHead};
use crate::minimatch::Minimatch;
use crate::query::MetaMatch;
use crate::task::TaskQueue;
use crate::types::{COOKIE_BUCKETS, FlowId, MAX_TABLES, Priority, TableId, cookie_prefix};

use tracectl::trace_target;
trace_target!("flowtable", tracectl::LevelFilter::INFO, &["flowtable"]);

pub(crate) fn hasher_state() -> &'static RandomState {
    use std::sync::OnceLock;
    static HASHER_STATE: OnceLock<RandomState> = OnceLock::new();
    HASHER_STATE.get_or_init(|| RandomState::with_seeds(0, 0, 0, 0))
}

/// Key of the strict-match index. Two entries with the same key cannot coexist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct StrictKey {
    table_id: TableId,
    priority: Priority,
    minimatch: Minimatch,
}

impl StrictKey {
    pub(crate) fn new(table_id: TableId, priority: Priority, minimatch: Minimatch) -> Self {
        Self {
            table_id,
            priority,
            minimatch,
        }
    }
}

pub struct FlowTable {
    pub(crate) config: FlowTableConfig,
    pub(crate) entries: Entries,
    pub(crate) all: ListHead,
    pub(crate) cookie_lists: [ListHead; COOKIE_BUCKETS],
    pub(crate) strict: HashMap<StrictKey, FlowId, RandomState>,
    pub(crate) checksums: [TableChecksum; MAX_TABLES],
    pub(crate) cursors: HashMap<IterId, Cursor, RandomState>,
    pub(crate) next_iter_id: u64,
    pub(crate) tasks: TaskQueue,
    counters: Counters,
}

impl Default for FlowTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowTable {
    /// Create a table with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::build(FlowTableConfig::default())
    }

    /// Create a table with the given configuration.
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not validate or its tracing setup cannot be applied.
    pub fn with_config(config: FlowTableConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        config.apply_tracing()?;
        Ok(Self::build(config))
    }

    fn build(config: FlowTableConfig) -> Self {
        let mut checksums: [TableChecksum; MAX_TABLES] =
            std::array::from_fn(|_| TableChecksum::default());
        if config.checksum_buckets_size != 0 {
            for checksum in &mut checksums {
                if let Err(e) = checksum.rebuild(config.checksum_buckets_size, std::iter::empty()) {
                    error!("Could not set up checksum buckets: {e}");
                }
            }
        }
        debug!("new: creating flow table '{}'", config.name);
        Self {
            counters: Counters::new(&config.name),
            entries: HashMap::with_hasher(hasher_state().clone()),
            all: ListHead::default(),
            cookie_lists: std::array::from_fn(|_| ListHead::default()),
            strict: HashMap::with_hasher(hasher_state().clone()),
            checksums,
            cursors: HashMap::with_hasher(hasher_state().clone()),
            next_iter_id: 0,
            tasks: TaskQueue::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &FlowTableConfig {
        &self.config
    }

    /// Insert a new flow.
    ///
    /// # Errors
    ///
    /// Fails if the id is taken, if a flow with the same table, priority and match
    /// exists, or if the flow-add designates an invalid table. The table is left
    /// unchanged.
    pub fn add(
        &mut self,
        id: FlowId,
        flow_add: &FlowAdd,
        minimatch: Minimatch,
    ) -> FlowTableResult<FlowId> {
        let table_id = flow_add.table_id.check()?;
        FlowEffects::validate(&flow_add.instructions, table_id)?;
        if self.entries.contains_key(&id) {
            warn!("add: flow id {id} already in use");
            return Err(FlowTableError::DuplicateFlowId(id));
        }
        let key = StrictKey::new(table_id, flow_add.priority, minimatch);
        if self.strict.contains_key(&key) {
            warn!(
                "add: flow {id} duplicates table {table_id} priority {} match {}",
                flow_add.priority, key.minimatch
            );
            return Err(FlowTableError::Duplicate);
        }

        let entry = FlowEntry::new(id, flow_add, key.minimatch.clone(), Instant::now());
        let cookie = entry.cookie();
        self.entries.insert(id, entry);
        self.all.push_back(&mut self.entries, Chain::All, id);
        self.strict.insert(key, id);
        self.cookie_lists[cookie_prefix(cookie)].push_back(&mut self.entries, Chain::Cookie, id);
        self.checksums[table_id.index()].toggle(cookie);
        self.counters.added();
        debug!("add: flow {id} in table {table_id} with cookie {cookie:#x}");
        Ok(id)
    }

    /// Remove a flow and return it. Iterators about to return it move on to their
    /// next entry.
    ///
    /// # Errors
    ///
    /// [`FlowTableError::NotFound`] if there is no such flow.
    pub fn delete(&mut self, id: FlowId) -> FlowTableResult<FlowEntry> {
        let Some(entry) = self.entries.get(&id) else {
            return Err(FlowTableError::NotFound);
        };
        let key = entry.strict_key();
        let cookie = entry.cookie();
        let table_id = entry.table_id();

        self.advance_parked(id, None);
        self.strict.remove(&key);
        self.cookie_lists[cookie_prefix(cookie)].unlink(&mut self.entries, Chain::Cookie, id);
        self.checksums[table_id.index()].toggle(cookie);
        self.all.unlink(&mut self.entries, Chain::All, id);
        let entry = self
            .entries
            .remove(&id)
            .ok_or(FlowTableError::NotFound)?;
        self.counters.deleted();
        debug!("delete: flow {id} removed from table {table_id}");
        Ok(entry)
    }

    fn modifiable(&self, id: FlowId) -> FlowTableResult<&FlowEntry> {
        let entry = self.entries.get(&id).ok_or(FlowTableError::NotFound)?;
        if entry.state() == EntryState::Deleting {
            warn!("Flow {id} is being deleted, refusing to change it");
            return Err(FlowTableError::EntryDeleting(id));
        }
        Ok(entry)
    }

    /// Replace the cookie, flags, timeouts, importance and effects of a flow.
    /// Counters are kept unless the flow-add asks for them to be reset.
    ///
    /// # Errors
    ///
    /// Fails if there is no such flow, if it is being deleted, if the flow-add does
    /// not have the table and priority of the flow, or carries invalid instructions.
    pub fn overwrite(&mut self, id: FlowId, flow_add: &FlowAdd) -> FlowTableResult<()> {
        let entry = self.modifiable(id)?;
        if entry.table_id() != flow_add.table_id || entry.priority() != flow_add.priority {
            return Err(FlowTableError::KeyMismatch(id));
        }
        let table_id = entry.table_id();
        FlowEffects::validate(&flow_add.instructions, table_id)?;
        let old = entry.cookie();
        let new = flow_add.cookie;

        if cookie_prefix(old) != cookie_prefix(new) {
            // the entry changes cookie list, iterators walking that list must not follow it
            self.advance_parked(id, Some(Chain::Cookie));
            self.cookie_lists[cookie_prefix(old)].unlink(&mut self.entries, Chain::Cookie, id);
            self.cookie_lists[cookie_prefix(new)].push_back(&mut self.entries, Chain::Cookie, id);
        }
        if old != new {
            let checksum = &mut self.checksums[table_id.index()];
            checksum.toggle(old);
            checksum.toggle(new);
        }
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(FlowTableError::NotFound)?;
        entry.set_cookie(new);
        entry.overwrite(flow_add, Instant::now());
        self.counters.modified();
        debug!("overwrite: flow {id} cookie {old:#x} -> {new:#x}");
        Ok(())
    }

    /// Replace the effects of a flow, leaving everything else alone.
    ///
    /// # Errors
    ///
    /// Fails if there is no such flow, if it is being deleted, or if the instructions
    /// are not valid in the table of the flow.
    pub fn modify_effects(&mut self, id: FlowId, modify: &FlowModify) -> FlowTableResult<()> {
        let table_id = self.modifiable(id)?.table_id();
        FlowEffects::validate(&modify.instructions, table_id)?;
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(FlowTableError::NotFound)?;
        entry.set_effects(FlowEffects::new(modify.instructions.clone()));
        self.counters.modified();
        debug!("modify_effects: flow {id}");
        Ok(())
    }

    /// Find the flow with exactly the table, priority and match of the query.
    /// The cookie, out-port and out-group filters of the query apply too.
    ///
    /// # Errors
    ///
    /// Fails if the query does not designate a single table, or if there is no such flow.
    pub fn strict_match(&self, query: &MetaMatch) -> FlowTableResult<&FlowEntry> {
        let table_id = query.table_id.check()?;
        let key = StrictKey::new(table_id, query.priority, query.minimatch.clone());
        let id = self.strict.get(&key).ok_or(FlowTableError::NotFound)?;
        let Some(entry) = self.entries.get(id) else {
            error!("strict_match: index refers to missing flow {id}");
            return Err(FlowTableError::Inconsistent(format!(
                "strict index refers to missing flow {id}"
            )));
        };
        if query.matches_filters(entry) {
            Ok(entry)
        } else {
            Err(FlowTableError::NotFound)
        }
    }

    #[must_use]
    pub fn entry(&self, id: FlowId) -> Option<&FlowEntry> {
        self.entries.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in insertion order. The table cannot change meanwhile: use
    /// [`FlowTable::iterator`] to change it along the way.
    pub fn iter(&self) -> impl Iterator<Item = &FlowEntry> {
        self.all.iter(&self.entries, Chain::All)
    }

    #[must_use]
    pub fn counters(&self) -> FlowTableCounters {
        self.counters.snapshot()
    }

    /// Split the cookie checksum of a table in `size` buckets.
    ///
    /// # Errors
    ///
    /// Fails if the table id is invalid or the size is not a non-zero power of two.
    pub fn set_checksum_buckets_size(
        &mut self,
        table_id: TableId,
        size: u32,
    ) -> FlowTableResult<()> {
        let table_id = table_id.check()?;
        if let Err(e) = TableChecksum::validate_size(size) {
            warn!("set_checksum_buckets_size: table {table_id}: {e}");
            return Err(e);
        }
        let cookies = self
            .all
            .iter(&self.entries, Chain::All)
            .filter(|e| e.table_id() == table_id)
            .map(FlowEntry::cookie);
        self.checksums[table_id.index()].rebuild(size, cookies)
    }

    /// # Errors
    ///
    /// Fails if the table id is invalid.
    pub fn table_checksum(&self, table_id: TableId) -> FlowTableResult<u64> {
        Ok(self.checksums[table_id.check()?.index()].checksum())
    }

    /// Bucketed checksum of a table, empty if the table is not bucketed.
    ///
    /// # Errors
    ///
    /// Fails if the table id is invalid.
    pub fn checksum_buckets(&self, table_id: TableId) -> FlowTableResult<&[u64]> {
        Ok(self.checksums[table_id.check()?.index()].buckets())
    }

    /// The forwarding backend installed the flow.
    ///
    /// # Errors
    ///
    /// Fails if there is no such flow or if it is being deleted.
    pub fn mark_stable(&mut self, id: FlowId) -> FlowTableResult<()> {
        self.modifiable(id)?;
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.set_state(EntryState::Stable);
        }
        debug!("mark_stable: flow {id}");
        Ok(())
    }

    /// The flow is about to be removed. It can no longer be changed and iterations skip it.
    ///
    /// # Errors
    ///
    /// [`FlowTableError::NotFound`] if there is no such flow.
    pub fn mark_deleting(&mut self, id: FlowId) -> FlowTableResult<()> {
        let entry = self.entries.get_mut(&id).ok_or(FlowTableError::NotFound)?;
        entry.set_state(EntryState::Deleting);
        debug!("mark_deleting: flow {id}");
        Ok(())
    }

    /// The forwarding backend failed to install the flow.
    ///
    /// # Errors
    ///
    /// [`FlowTableError::NotFound`] if there is no such flow.
    pub fn record_forwarding_add_error(&mut self, id: FlowId) -> FlowTableResult<()> {
        if !self.entries.contains_key(&id) {
            return Err(FlowTableError::NotFound);
        }
        self.counters.forwarding_add_error();
        warn!("Forwarding backend failed to add flow {id}");
        Ok(())
    }

    /// Record the packet and byte counts of a flow, as read from the backend.
    ///
    /// # Errors
    ///
    /// [`FlowTableError::NotFound`] if there is no such flow.
    pub fn update_stats(
        &mut self,
        id: FlowId,
        packets: u64,
        bytes: u64,
        now: Instant,
    ) -> FlowTableResult<()> {
        let entry = self.entries.get_mut(&id).ok_or(FlowTableError::NotFound)?;
        entry.update_counters(packets, bytes, now);
        Ok(())
    }

    /// Flows that timed out at `now` and are not being deleted yet
    #[must_use]
    pub fn expired(&self, now: Instant) -> Vec<(FlowId, RemovalReason)> {
        self.iter()
            .filter(|e| e.state() != EntryState::Deleting)
            .filter_map(|e| e.expiry(now).map(|reason| (e.id(), reason)))
            .collect()
    }

    /// Delete every flow and cancel every task. Checksum bucket sizes are kept.
    pub fn clear(&mut self) {
        self.cancel_all_tasks();
        let ids: Vec<FlowId> = self.iter().map(FlowEntry::id).collect();
        for id in ids {
            if let Err(e) = self.delete(id) {
                error!("clear: could not delete flow {id}: {e}");
            }
        }
        debug!("clear: flow table '{}' emptied", self.config.name);
    }

    /// Tear the table down
    pub fn destroy(mut self) {
        self.clear();
    }
}

impl Drop for FlowTable {
    fn drop(&mut self) {
        self.clear();
        if !self.cursors.is_empty() {
            warn!(
                "Flow table '{}' dropped with {} iterators still registered",
                self.config.name,
                self.cursors.len()
            );
        }
    }
}

impl std::fmt::Debug for FlowTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowTable")
            .field("name", &self.config.name)
            .field("flows", &self.entries.len())
            .field("iterators", &self.cursors.len())
            .field("tasks", &self.tasks)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::{Action, Instruction};
    use crate::types::COOKIE_PREFIX_MASK;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn t(id: u8) -> TableId {
        TableId::new(id).unwrap()
    }

    fn flow(table: u8, priority: Priority, cookie: u64) -> FlowAdd {
        FlowAdd::builder()
            .table_id(t(table))
            .priority(priority)
            .cookie(cookie)
            .build()
            .unwrap()
    }

    fn port(p: u32) -> Minimatch {
        Minimatch::builder().in_port(p).build()
    }

    #[test]
    fn test_table_is_send() {
        fn is_send<T: Send>() {}
        is_send::<FlowTable>();
    }

    #[test]
    fn test_add_strict_match_delete() {
        let mut ft = FlowTable::new();
        ft.add(FlowId(1), &flow(0, 10, 0xAB), port(1)).unwrap();
        assert_eq!(ft.len(), 1);
        assert_eq!(ft.table_checksum(t(0)).unwrap(), 0xAB);

        let query = MetaMatch::strict(t(0), 10, port(1));
        let entry = ft.strict_match(&query).unwrap();
        assert_eq!(entry.id(), FlowId(1));
        assert_eq!(entry.state(), EntryState::Creating);

        let removed = ft.delete(FlowId(1)).unwrap();
        assert_eq!(removed.cookie(), 0xAB);
        assert_eq!(ft.strict_match(&query).unwrap_err(), FlowTableError::NotFound);
        assert_eq!(ft.table_checksum(t(0)).unwrap(), 0);
        assert!(ft.is_empty());
        assert_eq!(ft.delete(FlowId(1)).unwrap_err(), FlowTableError::NotFound);
        ft.audit().unwrap();
    }

    #[test]
    #[traced_test]
    fn test_duplicates_leave_table_unchanged() {
        let mut ft = FlowTable::new();
        ft.add(FlowId(1), &flow(0, 10, 0x1), port(1)).unwrap();
        assert_eq!(
            ft.add(FlowId(2), &flow(0, 10, 0x2), port(1)),
            Err(FlowTableError::Duplicate)
        );
        assert_eq!(
            ft.add(FlowId(1), &flow(0, 11, 0x2), port(1)),
            Err(FlowTableError::DuplicateFlowId(FlowId(1)))
        );
        assert!(logs_contain("duplicates table 0 priority 10"));
        // other priority or table: not a duplicate
        ft.add(FlowId(3), &flow(0, 11, 0x4), port(1)).unwrap();
        ft.add(FlowId(4), &flow(1, 10, 0x8), port(1)).unwrap();
        assert_eq!(ft.len(), 3);
        assert_eq!(ft.table_checksum(t(0)).unwrap(), 0x5);
        assert_eq!(ft.counters().adds, 3);
        ft.audit().unwrap();
    }

    #[test]
    fn test_decoded_match_is_a_duplicate() {
        let mut ft = FlowTable::new();
        let subnet = Minimatch::builder()
            .ipv4_dst_masked(0x0a00_0000, 0xffff_ff00)
            .build();
        ft.add(FlowId(1), &flow(0, 10, 0x1), subnet.clone()).unwrap();
        let yaml = serde_yaml_ng::to_string(&subnet)
            .unwrap()
            .replacen("ipv4_dst: 167772160", "ipv4_dst: 167772165", 1);
        let decoded: Minimatch = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(
            ft.add(FlowId(2), &flow(0, 10, 0x2), decoded),
            Err(FlowTableError::Duplicate)
        );
        assert_eq!(ft.len(), 1);
    }

    #[test]
    fn test_invalid_table() {
        let mut ft = FlowTable::new();
        let bad: FlowAdd = serde_table(40);
        assert_eq!(
            ft.add(FlowId(1), &bad, port(1)),
            Err(FlowTableError::InvalidTableId(40))
        );
        assert_eq!(
            ft.strict_match(&MetaMatch::default()).unwrap_err(),
            FlowTableError::InvalidTableId(0xff)
        );
        assert_eq!(
            ft.table_checksum(TableId::ALL),
            Err(FlowTableError::InvalidTableId(0xff))
        );
        assert!(ft.is_empty());
    }

    fn serde_table(id: u8) -> FlowAdd {
        // only deserialization can produce an out of range table id
        let table_id: TableId = serde_yaml_ng::from_str(&id.to_string()).unwrap();
        FlowAdd {
            table_id,
            ..FlowAdd::default()
        }
    }

    #[test]
    fn test_goto_validation() {
        let mut ft = FlowTable::new();
        let add = FlowAdd::builder()
            .table_id(t(3))
            .instructions(vec![Instruction::GotoTable(1)])
            .build()
            .unwrap();
        assert_eq!(
            ft.add(FlowId(1), &add, port(1)),
            Err(FlowTableError::InvalidGotoTable { from: t(3), to: 1 })
        );
        assert!(ft.is_empty());
    }

    #[test]
    fn test_overwrite_moves_cookie() {
        let mut ft = FlowTable::new();
        ft.set_checksum_buckets_size(t(0), 4).unwrap();
        ft.add(FlowId(1), &flow(0, 10, 0x0000_0000_0000_0001), port(1))
            .unwrap();
        ft.add(FlowId(2), &flow(0, 10, 0x4000_0000_0000_0002), port(2))
            .unwrap();
        assert_eq!(ft.checksum_buckets(t(0)).unwrap(), &[0x1, 0x4000_0000_0000_0002, 0, 0]);

        ft.overwrite(FlowId(1), &flow(0, 10, 0xC000_0000_0000_0001))
            .unwrap();
        assert_eq!(
            ft.checksum_buckets(t(0)).unwrap(),
            &[0, 0x4000_0000_0000_0002, 0, 0xC000_0000_0000_0001]
        );
        assert_eq!(ft.entry(FlowId(1)).unwrap().cookie(), 0xC000_0000_0000_0001);
        let in_bucket: Vec<_> = ft
            .iter()
            .filter(|e| e.cookie() & COOKIE_PREFIX_MASK == 0xC000_0000_0000_0000)
            .map(FlowEntry::id)
            .collect();
        assert_eq!(in_bucket, vec![FlowId(1)]);
        assert_eq!(ft.counters().modifies, 1);
        ft.audit().unwrap();
    }

    #[test]
    fn test_overwrite_errors() {
        let mut ft = FlowTable::new();
        ft.add(FlowId(1), &flow(0, 10, 0x1), port(1)).unwrap();
        assert_eq!(
            ft.overwrite(FlowId(9), &flow(0, 10, 0x1)),
            Err(FlowTableError::NotFound)
        );
        assert_eq!(
            ft.overwrite(FlowId(1), &flow(0, 11, 0x1)),
            Err(FlowTableError::KeyMismatch(FlowId(1)))
        );
        ft.mark_deleting(FlowId(1)).unwrap();
        assert_eq!(
            ft.overwrite(FlowId(1), &flow(0, 10, 0x2)),
            Err(FlowTableError::EntryDeleting(FlowId(1)))
        );
        assert_eq!(
            ft.modify_effects(FlowId(1), &FlowModify::default()),
            Err(FlowTableError::EntryDeleting(FlowId(1)))
        );
        assert_eq!(ft.table_checksum(t(0)).unwrap(), 0x1);
        assert_eq!(ft.counters().modifies, 0);
    }

    #[test]
    fn test_modify_effects() {
        let mut ft = FlowTable::new();
        ft.add(FlowId(1), &flow(0, 10, 0x1), port(1)).unwrap();
        let modify = FlowModify::new(vec![Instruction::ApplyActions(vec![Action::Output {
            port: 9,
            max_len: 0,
        }])]);
        ft.modify_effects(FlowId(1), &modify).unwrap();
        let query = MetaMatch::strict(t(0), 10, port(1)).out_port(9);
        assert_eq!(ft.strict_match(&query).unwrap().id(), FlowId(1));
        let other_port = MetaMatch::strict(t(0), 10, port(1)).out_port(8);
        assert_eq!(ft.strict_match(&other_port).unwrap_err(), FlowTableError::NotFound);
    }

    #[test]
    fn test_lifecycle() {
        let mut ft = FlowTable::new();
        ft.add(FlowId(1), &flow(0, 10, 0x1), port(1)).unwrap();
        ft.record_forwarding_add_error(FlowId(1)).unwrap();
        ft.mark_stable(FlowId(1)).unwrap();
        assert_eq!(ft.entry(FlowId(1)).unwrap().state(), EntryState::Stable);
        ft.mark_deleting(FlowId(1)).unwrap();
        assert_eq!(
            ft.mark_stable(FlowId(1)),
            Err(FlowTableError::EntryDeleting(FlowId(1)))
        );
        assert_eq!(ft.counters().forwarding_add_errors, 1);
        assert_eq!(ft.mark_deleting(FlowId(2)), Err(FlowTableError::NotFound));
    }

    #[test]
    fn test_expired() {
        let mut ft = FlowTable::new();
        let idle = FlowAdd::builder().idle_timeout(10).build().unwrap();
        let hard = FlowAdd::builder().hard_timeout(10).build().unwrap();
        ft.add(FlowId(1), &idle, port(1)).unwrap();
        ft.add(FlowId(2), &hard, port(2)).unwrap();
        ft.add(FlowId(3), &FlowAdd::default(), port(3)).unwrap();
        let later = Instant::now() + std::time::Duration::from_secs(11);
        ft.update_stats(FlowId(1), 1, 64, later).unwrap();
        assert_eq!(ft.expired(later), vec![(FlowId(2), RemovalReason::HardTimeout)]);
        ft.mark_deleting(FlowId(2)).unwrap();
        assert!(ft.expired(later).is_empty());
    }

    #[test]
    fn test_bucket_size_validation() {
        let mut ft = FlowTable::new();
        ft.add(FlowId(1), &flow(0, 10, 0x1), port(1)).unwrap();
        assert_eq!(
            ft.set_checksum_buckets_size(t(0), 3),
            Err(FlowTableError::InvalidBucketSize(3))
        );
        assert_eq!(
            ft.set_checksum_buckets_size(t(0), 0),
            Err(FlowTableError::InvalidBucketSize(0))
        );
        assert!(ft.checksum_buckets(t(0)).unwrap().is_empty());
        ft.set_checksum_buckets_size(t(0), 1).unwrap();
        assert_eq!(ft.checksum_buckets(t(0)).unwrap(), &[0x1]);
    }

    #[test]
    fn test_configured_buckets() {
        let config = FlowTableConfig {
            checksum_buckets_size: 2,
            ..Default::default()
        };
        let mut ft = FlowTable::with_config(config).unwrap();
        ft.add(FlowId(1), &flow(5, 10, 0x8000_0000_0000_0000), port(1))
            .unwrap();
        assert_eq!(ft.checksum_buckets(t(5)).unwrap(), &[0, 0x8000_0000_0000_0000]);
        assert_eq!(ft.checksum_buckets(t(6)).unwrap(), &[0, 0]);
    }

    #[test]
    fn test_clear() {
        let mut ft = FlowTable::new();
        for id in 0..10 {
            ft.add(FlowId(id), &flow(0, 10, id), port(u32::try_from(id).unwrap()))
                .unwrap();
        }
        let mut iter = ft.iterator(MetaMatch::default()).unwrap();
        ft.clear();
        assert!(ft.iterator_next(&mut iter).is_none());
        ft.iterator_cleanup(&mut iter);
        assert!(ft.is_empty());
        assert_eq!(ft.counters().deletes, 10);
        assert_eq!(ft.counters().flows, 0);
        ft.audit().unwrap();
        ft.destroy();
    }
}
