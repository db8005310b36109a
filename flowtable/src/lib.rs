// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::module_name_repetitions)]

//! The OpenFlow flow table of a switch agent.
//!
//! A [`FlowTable`] records every flow programmed on the switch. It indexes flows
//! by id, by (table, priority, match) and by cookie prefix, keeps per-table cookie
//! checksums for controller audits, and can be iterated while it changes, either
//! directly with [`FlowTable::iterator`] or in the background with
//! [`FlowTable::spawn_iter_task`].

mod audit;
pub mod checksum;
pub mod config;
mod counters;
mod display;
pub mod entry;
pub mod errors;
pub mod flowmod;
pub mod instructions;
pub mod iterator;
mod list;
pub mod minimatch;
pub mod query;
mod table;
pub mod task;
pub mod types;

pub use checksum::TableChecksum;
pub use config::{ConfigError, FlowTableConfig, FlowTableConfigBuilder};
pub use counters::FlowTableCounters;
pub use entry::{EntryState, FlowEntry, RemovalReason};
pub use errors::{FlowTableError, FlowTableResult};
pub use flowmod::{FlowAdd, FlowAddBuilder, FlowFlags, FlowModify};
pub use instructions::{Action, FlowEffects, GroupId, Instruction, PortNo};
pub use iterator::{FtIterator, IterId};
pub use minimatch::{MatchFields, Minimatch, MinimatchBuilder};
pub use query::{MatchMode, MetaMatch};
pub use table::FlowTable;
pub use task::{IterTaskCallback, TaskId, TaskStatus};
pub use types::{COOKIE_PREFIX_LEN, COOKIE_PREFIX_MASK, Cookie, FlowId, MAX_TABLES, Priority, TableId};
