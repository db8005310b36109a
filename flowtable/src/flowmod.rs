// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow-mod descriptors, as handed over by the protocol decode layer

use bitflags::bitflags;
use derive_builder::Builder;

use crate::instructions::Instruction;
use crate::types::{Cookie, Priority, TableId};

bitflags! {
    /// Flow-mod flags that the table records on the entry
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct FlowFlags: u16 {
        const SEND_FLOW_REM = 1 << 0;
        const CHECK_OVERLAP = 1 << 1;
        const RESET_COUNTS = 1 << 2;
        const NO_PKT_COUNTS = 1 << 3;
        const NO_BYT_COUNTS = 1 << 4;
    }
}

/// Contents of a flow-add, used both to create an entry and to overwrite one
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(default)]
pub struct FlowAdd {
    pub table_id: TableId,
    pub priority: Priority,
    pub cookie: Cookie,
    pub flags: FlowFlags,
    /// seconds, 0 means no timeout
    pub idle_timeout: u16,
    /// seconds, 0 means no timeout
    pub hard_timeout: u16,
    pub importance: u16,
    #[builder(setter(into))]
    pub instructions: Vec<Instruction>,
}

impl Default for FlowAdd {
    fn default() -> Self {
        Self {
            table_id: TableId::default(),
            priority: 0x8000,
            cookie: 0,
            flags: FlowFlags::empty(),
            idle_timeout: 0,
            hard_timeout: 0,
            importance: 0,
            instructions: Vec::new(),
        }
    }
}

impl FlowAdd {
    #[must_use]
    pub fn builder() -> FlowAddBuilder {
        FlowAddBuilder::default()
    }
}

/// Contents of a (non-strict) flow-modify: only the effects change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowModify {
    pub instructions: Vec<Instruction>,
}

impl FlowModify {
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }
}
