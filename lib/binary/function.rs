use crate::analysis::{StackLayout, StackLayoutBuilder};
use crate::binary::{Block, InstrAddr, Instruction};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Function {
    // The address of the function entry
    address: InstrAddr,
    // The name of the function, when a symbol is available
    name: Option<String>,
    // Basic blocks, keyed by the address of their first instruction
    blocks: BTreeMap<InstrAddr, Block>,
}

impl Function {
    pub fn new(address: InstrAddr) -> Function {
        Function {
            address,
            name: None,
            blocks: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> &InstrAddr {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub fn add_block(&mut self, block: Block) {
        self.blocks.insert(block.address().clone(), block);
    }

    pub fn block(&self, address: &InstrAddr) -> Option<&Block> {
        self.blocks.get(address)
    }

    pub fn blocks(&self) -> &BTreeMap<InstrAddr, Block> {
        &self.blocks
    }

    /// All instructions of this function, in program order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks
            .values()
            .flat_map(|block| block.instructions().values())
    }

    pub fn has_instruction(&self, address: &InstrAddr) -> bool {
        self.blocks
            .values()
            .any(|block| block.instruction(address).is_some())
    }

    pub fn instruction(&self, address: &InstrAddr) -> Result<&Instruction, Error> {
        self.blocks
            .values()
            .find_map(|block| block.instruction(address))
            .ok_or_else(|| {
                Error::Custom(format!(
                    "No instruction found at address {} in function {}",
                    address, self.address
                ))
            })
    }

    /// Call instructions of this function, keyed by block address.
    pub fn call_instructions(&self) -> BTreeMap<&InstrAddr, Vec<&Instruction>> {
        self.blocks
            .iter()
            .filter_map(|(address, block)| {
                let calls = block.call_instructions();
                if calls.is_empty() {
                    None
                } else {
                    Some((address, calls))
                }
            })
            .collect()
    }

    /// Reconstruct the stack layout of this function from the instructions
    /// which touch the stack.
    pub fn stack_layout(&self) -> Result<StackLayout<'_>, Error> {
        let mut builder = StackLayoutBuilder::new();
        for instruction in self.instructions() {
            if instruction.touches_stack() {
                builder.add_access(instruction);
            }
        }
        builder.build()
    }
}
