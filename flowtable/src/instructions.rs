// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Instructions and actions of a flow, and the metadata derived from them

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::FlowTableError;
use crate::types::{MAX_TABLES, TableId};

pub type PortNo = u32;
pub type GroupId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Output { port: PortNo, max_len: u16 },
    Group(GroupId),
    SetQueue(u32),
    PushVlan(u16),
    PopVlan,
    SetVlanVid(u16),
    SetEthSrc(u64),
    SetEthDst(u64),
    DecNwTtl,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    ApplyActions(Vec<Action>),
    WriteActions(Vec<Action>),
    ClearActions,
    GotoTable(u8),
    WriteMetadata { value: u64, mask: u64 },
    Meter(u32),
}

impl Instruction {
    fn actions(&self) -> &[Action] {
        match self {
            Instruction::ApplyActions(actions) | Instruction::WriteActions(actions) => actions,
            _ => &[],
        }
    }
}

/// What a flow does to the packets it matches.
///
/// Besides the instructions themselves, this keeps the ports and groups the flow
/// may send packets to, which is what `out_port` and `out_group` filters look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowEffects {
    instructions: Vec<Instruction>,
    out_ports: BTreeSet<PortNo>,
    out_groups: BTreeSet<GroupId>,
}

impl FlowEffects {
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let mut out_ports = BTreeSet::new();
        let mut out_groups = BTreeSet::new();
        for action in instructions.iter().flat_map(Instruction::actions) {
            match action {
                Action::Output { port, .. } => {
                    out_ports.insert(*port);
                }
                Action::Group(group) => {
                    out_groups.insert(*group);
                }
                _ => {}
            }
        }
        Self {
            instructions,
            out_ports,
            out_groups,
        }
    }

    /// Check that the instructions can be installed in the given table.
    ///
    /// # Errors
    ///
    /// A goto-table must point to a valid table after `table_id`.
    pub fn validate(instructions: &[Instruction], table_id: TableId) -> Result<(), FlowTableError> {
        for inst in instructions {
            let Instruction::GotoTable(to) = inst else {
                continue;
            };
            if *to <= table_id.as_u8() || usize::from(*to) >= MAX_TABLES {
                return Err(FlowTableError::InvalidGotoTable {
                    from: table_id,
                    to: *to,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    #[must_use]
    pub fn outputs_to(&self, port: PortNo) -> bool {
        self.out_ports.contains(&port)
    }

    #[must_use]
    pub fn outputs_to_group(&self, group: GroupId) -> bool {
        self.out_groups.contains(&group)
    }

    #[must_use]
    pub fn is_drop(&self) -> bool {
        self.out_ports.is_empty()
            && self.out_groups.is_empty()
            && !self
                .instructions
                .iter()
                .any(|i| matches!(i, Instruction::GotoTable(_)))
    }
}
