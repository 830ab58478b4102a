use crate::binary::{InstrAddr, Instruction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A basic block.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Block {
    /// The address of the first instruction of the block.
    address: InstrAddr,
    /// The instructions of the block, in address order.
    instructions: BTreeMap<InstrAddr, Instruction>,
}

impl Block {
    pub fn new(address: InstrAddr) -> Block {
        Block {
            address,
            instructions: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> &InstrAddr {
        &self.address
    }

    /// Add an instruction to this block, replacing any instruction at the same
    /// address.
    pub fn add_instruction(&mut self, instruction: Instruction) {
        self.instructions
            .insert(instruction.address().clone(), instruction);
    }

    pub fn instruction(&self, address: &InstrAddr) -> Option<&Instruction> {
        self.instructions.get(address)
    }

    pub fn instructions(&self) -> &BTreeMap<InstrAddr, Instruction> {
        &self.instructions
    }

    /// The instructions of this block which perform a call.
    pub fn call_instructions(&self) -> Vec<&Instruction> {
        self.instructions
            .values()
            .filter(|instruction| instruction.is_call_instruction())
            .collect()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "[ Block: {} ]", self.address)?;
        for instruction in self.instructions.values() {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}
