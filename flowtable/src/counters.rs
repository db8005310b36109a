// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow table activity counters.
//!
//! Counts are kept locally, so that they can be read back without a recorder, and
//! mirrored to whatever `metrics` recorder is installed. Every metric carries an
//! `instance` label with the name of the table.

use metrics::{Counter, Gauge, Key, Label, Level, Metadata, Unit};

/// A point-in-time copy of the counters of a table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowTableCounters {
    /// live entries
    pub flows: u64,
    pub adds: u64,
    pub deletes: u64,
    pub modifies: u64,
    pub forwarding_add_errors: u64,
}

struct MetricDesc {
    id: &'static str,
    unit: Unit,
    description: &'static str,
}

const FLOWS: MetricDesc = MetricDesc {
    id: "flowtable.flows",
    unit: Unit::Count,
    description: "Number of flows in the table",
};
const ADDS: MetricDesc = MetricDesc {
    id: "flowtable.adds",
    unit: Unit::Count,
    description: "Flows added",
};
const DELETES: MetricDesc = MetricDesc {
    id: "flowtable.deletes",
    unit: Unit::Count,
    description: "Flows deleted",
};
const MODIFIES: MetricDesc = MetricDesc {
    id: "flowtable.modifies",
    unit: Unit::Count,
    description: "Flows overwritten or modified",
};
const FWD_ADD_ERRORS: MetricDesc = MetricDesc {
    id: "flowtable.forwarding_add_errors",
    unit: Unit::Count,
    description: "Flows the forwarding backend failed to install",
};

const METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

impl MetricDesc {
    fn key(&self, instance: &str) -> Key {
        Key::from_parts(self.id, vec![Label::new("instance", instance.to_string())])
    }

    fn counter(&self, instance: &str) -> Counter {
        let key = self.key(instance);
        metrics::with_recorder(|r| {
            r.describe_counter(self.id.into(), Some(self.unit), self.description.into());
            r.register_counter(&key, &METADATA)
        })
    }

    fn gauge(&self, instance: &str) -> Gauge {
        let key = self.key(instance);
        metrics::with_recorder(|r| {
            r.describe_gauge(self.id.into(), Some(self.unit), self.description.into());
            r.register_gauge(&key, &METADATA)
        })
    }
}

/// Counters of a table, with their registered metric handles
pub(crate) struct Counters {
    snapshot: FlowTableCounters,
    flows: Gauge,
    adds: Counter,
    deletes: Counter,
    modifies: Counter,
    forwarding_add_errors: Counter,
}

impl Counters {
    pub(crate) fn new(instance: &str) -> Self {
        Self {
            snapshot: FlowTableCounters::default(),
            flows: FLOWS.gauge(instance),
            adds: ADDS.counter(instance),
            deletes: DELETES.counter(instance),
            modifies: MODIFIES.counter(instance),
            forwarding_add_errors: FWD_ADD_ERRORS.counter(instance),
        }
    }

    pub(crate) fn snapshot(&self) -> FlowTableCounters {
        self.snapshot
    }

    #[allow(clippy::cast_precision_loss)]
    fn set_flows(&mut self, flows: u64) {
        self.snapshot.flows = flows;
        self.flows.set(flows as f64);
    }

    pub(crate) fn added(&mut self) {
        self.snapshot.adds += 1;
        self.adds.increment(1);
        self.set_flows(self.snapshot.flows + 1);
    }

    pub(crate) fn deleted(&mut self) {
        self.snapshot.deletes += 1;
        self.deletes.increment(1);
        self.set_flows(self.snapshot.flows.saturating_sub(1));
    }

    pub(crate) fn modified(&mut self) {
        self.snapshot.modifies += 1;
        self.modifies.increment(1);
    }

    pub(crate) fn forwarding_add_error(&mut self) {
        self.snapshot.forwarding_add_errors += 1;
        self.forwarding_add_errors.increment(1);
    }
}

impl std::fmt::Debug for Counters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.snapshot.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_without_recorder() {
        let mut c = Counters::new("test");
        c.added();
        c.added();
        c.deleted();
        c.modified();
        c.forwarding_add_error();
        assert_eq!(
            c.snapshot(),
            FlowTableCounters {
                flows: 1,
                adds: 2,
                deletes: 1,
                modifies: 1,
                forwarding_add_errors: 1,
            }
        );
    }
}
