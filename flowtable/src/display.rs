// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::fmt::Display;

use crate::entry::{EntryState, FlowEntry};
use crate::table::FlowTable;

impl Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            EntryState::Creating => "creating",
            EntryState::Stable => "stable",
            EntryState::Deleting => "deleting",
        };
        write!(f, "{state}")
    }
}

impl Display for FlowEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{ id:{} table:{} prio:{} cookie:{:#x} [{}] match:{} n_packets:{} n_bytes:{}",
            self.id(),
            self.table_id(),
            self.priority(),
            self.cookie(),
            self.state(),
            self.minimatch(),
            self.packets(),
            self.bytes(),
        )?;
        if self.idle_timeout() != 0 {
            write!(f, " idle:{}", self.idle_timeout())?;
        }
        if self.hard_timeout() != 0 {
            write!(f, " hard:{}", self.hard_timeout())?;
        }
        if self.effects().is_drop() {
            write!(f, " actions:drop }}")
        } else {
            write!(f, " instructions:{:?} }}", self.effects().instructions())
        }
    }
}

impl Display for FlowTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counters = self.counters();
        writeln!(
            f,
            "flow table '{}': {} flows (adds:{} deletes:{} modifies:{} fwd add errors:{})",
            self.config().name,
            counters.flows,
            counters.adds,
            counters.deletes,
            counters.modifies,
            counters.forwarding_add_errors
        )?;
        for (table, checksum) in self.checksums.iter().enumerate() {
            if checksum.checksum() != 0 || checksum.size() != 0 {
                writeln!(
                    f,
                    "  table {table}: checksum {:#018x}, {} buckets",
                    checksum.checksum(),
                    checksum.size()
                )?;
            }
        }
        for entry in self.iter() {
            writeln!(f, "  {entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::flowmod::FlowAdd;
    use crate::minimatch::Minimatch;
    use crate::table::FlowTable;
    use crate::types::FlowId;

    #[test]
    fn test_display_entry() {
        let mut ft = FlowTable::new();
        let add = FlowAdd::builder()
            .priority(10)
            .cookie(0x2a)
            .idle_timeout(5)
            .build()
            .unwrap();
        ft.add(FlowId(7), &add, Minimatch::builder().in_port(1).build())
            .unwrap();
        let entry = ft.entry(FlowId(7)).unwrap();
        assert_eq!(
            entry.to_string(),
            "{ id:7 table:0 prio:10 cookie:0x2a [creating] match:in_port=0x1 n_packets:0 n_bytes:0 idle:5 actions:drop }"
        );
        let dump = ft.to_string();
        assert!(dump.starts_with("flow table 'flowtable': 1 flows"));
        assert!(dump.contains("table 0: checksum 0x000000000000002a, 0 buckets"));
    }
}
