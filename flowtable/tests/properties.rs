// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use ofsm_flowtable as flowtable;

use flowtable::{FlowAdd, FlowEntry, FlowId, FlowTable, MetaMatch, Minimatch, TableId};
use std::collections::BTreeSet;

/// Insert a flow, ignoring the duplicates the generated input may contain
fn insert(ft: &mut FlowTable, id: u64, table: u8, cookie: u64) -> bool {
    let add = FlowAdd::builder()
        .table_id(TableId::new(table % 4).unwrap())
        .cookie(cookie)
        .build()
        .unwrap();
    let mm = Minimatch::builder().metadata(id).build();
    ft.add(FlowId(id), &add, mm).is_ok()
}

#[test]
fn add_then_delete_restores_checksums() {
    bolero::check!()
        .with_type()
        .for_each(|(flows, log2): &(Vec<(u8, u8, u64)>, u8)| {
            let mut ft = FlowTable::new();
            let table = TableId::new(0).unwrap();
            ft.set_checksum_buckets_size(table, 1 << (log2 % 9)).unwrap();
            let before = ft.checksum_buckets(table).unwrap().to_vec();

            let mut added = Vec::new();
            for (id, t, cookie) in flows {
                if insert(&mut ft, u64::from(*id), *t, *cookie) {
                    added.push(FlowId(u64::from(*id)));
                }
            }
            ft.audit().unwrap();
            for id in added.iter().rev() {
                ft.delete(*id).unwrap();
            }
            for t in 0..4 {
                assert_eq!(ft.table_checksum(TableId::new(t).unwrap()).unwrap(), 0);
            }
            assert_eq!(ft.checksum_buckets(table).unwrap(), before.as_slice());
            assert!(ft.is_empty());
            ft.audit().unwrap();
        });
}

#[test]
fn resize_matches_incremental_buckets() {
    bolero::check!()
        .with_type()
        .for_each(|(cookies, log2): &(Vec<u64>, u8)| {
            let size = 1u32 << (log2 % 9);
            let table = TableId::new(0).unwrap();

            // buckets set before the flows arrive
            let mut early = FlowTable::new();
            early.set_checksum_buckets_size(table, size).unwrap();
            // buckets computed from the flows already there
            let mut late = FlowTable::new();
            for (id, cookie) in cookies.iter().enumerate() {
                insert(&mut early, id as u64, 0, *cookie);
                insert(&mut late, id as u64, 0, *cookie);
            }
            late.set_checksum_buckets_size(table, size).unwrap();

            let buckets = late.checksum_buckets(table).unwrap();
            assert_eq!(buckets.len(), size as usize);
            assert_eq!(buckets, early.checksum_buckets(table).unwrap());
            assert_eq!(
                buckets.iter().fold(0, |acc, b| acc ^ b),
                late.table_checksum(table).unwrap()
            );
        });
}

#[test]
fn iteration_survives_interleaved_deletes() {
    bolero::check!()
        .with_type()
        .for_each(|(count, deletes): &(u8, Vec<u8>)| {
            let mut ft = FlowTable::new();
            let count = u64::from(*count % 64);
            for id in 0..count {
                insert(&mut ft, id, 0, id << 56);
            }
            let mut iter = ft.iterator(MetaMatch::default()).unwrap();
            let mut deleted = BTreeSet::new();
            let mut seen = Vec::new();
            let mut pending = deletes.iter();
            loop {
                // drop some flow, possibly the one the iterator is parked on
                if let Some(victim) = pending.next() {
                    let victim = FlowId(u64::from(*victim) % count.max(1));
                    if ft.delete(victim).is_ok() {
                        deleted.insert(victim);
                    }
                }
                ft.audit().unwrap();
                let Some(id) = ft.iterator_next(&mut iter).map(FlowEntry::id) else {
                    break;
                };
                assert!(!deleted.contains(&id), "returned deleted flow {id}");
                seen.push(id);
            }
            ft.iterator_cleanup(&mut iter);

            // ids come back in insertion order, and every survivor is seen
            assert!(seen.windows(2).all(|w| w[0] < w[1]));
            let survivors: Vec<_> = ft.iter().map(FlowEntry::id).collect();
            for id in survivors {
                assert!(seen.contains(&id));
            }
        });
}
