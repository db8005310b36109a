// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Consistency checks over the indexes of a flow table

use tracing::error;

use crate::errors::{FlowTableError, FlowTableResult};
use crate::list::{Chain, ListHead};
use crate::table::FlowTable;
use crate::types::{FlowId, MAX_TABLES, cookie_prefix};

fn inconsistent(what: String) -> FlowTableError {
    error!("audit: {what}");
    FlowTableError::Inconsistent(what)
}

impl FlowTable {
    /// Walk a list checking its back links, and return the ids on it
    fn audit_list(&self, list: &ListHead, chain: Chain) -> FlowTableResult<Vec<FlowId>> {
        let mut ids = Vec::with_capacity(list.len());
        let mut prev = None;
        for entry in list.iter(&self.entries, chain) {
            if entry.links(chain).prev != prev {
                return Err(inconsistent(format!(
                    "{chain:?} list: flow {} has back link {:?}, expected {prev:?}",
                    entry.id(),
                    entry.links(chain).prev
                )));
            }
            prev = Some(entry.id());
            ids.push(entry.id());
            if ids.len() > self.entries.len() {
                return Err(inconsistent(format!("{chain:?} list loops")));
            }
        }
        if ids.len() != list.len() {
            return Err(inconsistent(format!(
                "{chain:?} list holds {} flows but counts {}",
                ids.len(),
                list.len()
            )));
        }
        Ok(ids)
    }

    /// Check that every index agrees with the entries.
    ///
    /// # Errors
    ///
    /// [`FlowTableError::Inconsistent`] describing the first problem found.
    pub fn audit(&self) -> FlowTableResult<()> {
        let all = self.audit_list(&self.all, Chain::All)?;
        if all.len() != self.entries.len() || self.strict.len() != self.entries.len() {
            return Err(inconsistent(format!(
                "{} flows, {} listed, {} indexed",
                self.entries.len(),
                all.len(),
                self.strict.len()
            )));
        }
        if self.counters().flows != self.entries.len() as u64 {
            return Err(inconsistent(format!(
                "flow gauge {} for {} flows",
                self.counters().flows,
                self.entries.len()
            )));
        }

        let mut checksums = [0u64; MAX_TABLES];
        let mut buckets: [Vec<u64>; MAX_TABLES] =
            std::array::from_fn(|table| vec![0; self.checksums[table].size()]);
        for id in &all {
            let Some(entry) = self.entries.get(id) else {
                return Err(inconsistent(format!("listed flow {id} does not exist")));
            };
            if self.strict.get(&entry.strict_key()) != Some(id) {
                return Err(inconsistent(format!("flow {id} is not indexed under its key")));
            }
            let table = entry.table_id().index();
            checksums[table] ^= entry.cookie();
            let index = self.checksums[table].bucket_index(entry.cookie());
            if let Some(bucket) = buckets[table].get_mut(index) {
                *bucket ^= entry.cookie();
            }
        }

        let mut bucketed = 0;
        for (prefix, list) in self.cookie_lists.iter().enumerate() {
            for id in self.audit_list(list, Chain::Cookie)? {
                let cookie = self.entries.get(&id).map(|e| e.cookie()).unwrap_or_default();
                if cookie_prefix(cookie) != prefix {
                    return Err(inconsistent(format!(
                        "flow {id} with cookie {cookie:#x} is in cookie list {prefix:#x}"
                    )));
                }
                bucketed += 1;
            }
        }
        if bucketed != self.entries.len() {
            return Err(inconsistent(format!(
                "{bucketed} flows in cookie lists for {} flows",
                self.entries.len()
            )));
        }

        for (table, ((checksum, expected), expected_buckets)) in self
            .checksums
            .iter()
            .zip(checksums)
            .zip(&buckets)
            .enumerate()
        {
            if checksum.checksum() != expected {
                return Err(inconsistent(format!(
                    "table {table} checksum {:#x}, flows add up to {expected:#x}",
                    checksum.checksum()
                )));
            }
            if !checksum.is_consistent() {
                return Err(inconsistent(format!(
                    "table {table} checksum buckets do not add up"
                )));
            }
            if let Some((index, (bucket, expected))) = checksum
                .buckets()
                .iter()
                .zip(expected_buckets)
                .enumerate()
                .find(|(_, (bucket, expected))| bucket != expected)
            {
                return Err(inconsistent(format!(
                    "table {table} checksum bucket {index} is {bucket:#x}, flows add up to {expected:#x}"
                )));
            }
        }

        for (iter, cursor) in &self.cursors {
            let Some(next) = cursor.next else {
                continue;
            };
            if !self
                .entries
                .get(&next)
                .is_some_and(|e| e.parked().contains(iter))
            {
                return Err(inconsistent(format!(
                    "iterator {iter:?} is not parked on its next flow {next}"
                )));
            }
        }
        for entry in self.entries.values() {
            for iter in entry.parked() {
                if self.cursors.get(iter).and_then(|c| c.next) != Some(entry.id()) {
                    return Err(inconsistent(format!(
                        "flow {} holds stale iterator {iter:?}",
                        entry.id()
                    )));
                }
            }
        }
        Ok(())
    }
}
