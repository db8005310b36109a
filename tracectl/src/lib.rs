// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime control of the log levels of the flow-table agent.
//!
//! Every module that logs declares a target with [`trace_target!`]. Targets are
//! collected at link time and their levels can be changed at runtime, either one
//! by one or in groups sharing a tag.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::missing_panics_doc)]

pub mod control;
pub mod targets;

pub use control::{TraceCtlError, TracingControl, get_trace_ctl};
pub use tracing_subscriber::filter::LevelFilter;

/// Level applied to anything that has not registered a target
pub const DEFAULT_LOGLEVEL: LevelFilter = LevelFilter::INFO;
