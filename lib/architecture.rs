//! Information and types for supported architectures.

use crate::binary::{Block, InstrAddr};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// An architecture's endanness.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Endian {
    Big,
    Little,
}

/// Necessary functions for analysis over architectures.
pub trait Architecture: Debug + Send + Sync {
    /// Get the name of this architecture.
    fn name(&self) -> &str;
    /// Get the endianness of this architecture.
    fn endian(&self) -> Endian;
    /// Get the name of the register used as the stack pointer.
    fn stack_pointer(&self) -> &str;
    /// Get the size of a natural word for this architecture in bits.
    fn word_size(&self) -> usize;
    /// Find an instruction at or before `iaddr` in `block` which a patch may
    /// overwrite to make room for a call to a bounds-checked replacement.
    fn spare_instruction(&self, _block: &Block, _iaddr: &InstrAddr) -> Option<InstrAddr> {
        None
    }
}

/// Create the architecture with the given name.
pub fn from_name(name: &str) -> Result<Box<dyn Architecture>, Error> {
    Ok(match name {
        "amd64" | "x86_64" | "x64" => Box::new(Amd64::new()),
        "arm" => Box::new(Arm::new()),
        "mips" => Box::new(Mips::new()),
        "mipsel" => Box::new(Mipsel::new()),
        "ppc" | "powerpc" => Box::new(Ppc::new()),
        "x86" => Box::new(X86::new()),
        _ => return Err(Error::Custom(format!("Unsupported architecture {}", name))),
    })
}

// On MIPS the call target is loaded into t9 right before a call through the
// PLT. Once the call is redirected, that load is free for the patch.
fn mips_t9_load(block: &Block, iaddr: &InstrAddr) -> Option<InstrAddr> {
    block
        .instructions()
        .range(..=iaddr.clone())
        .rev()
        .map(|(_, instruction)| instruction)
        .find(|instruction| {
            instruction.is_load_instruction()
                && instruction
                    .operands()
                    .first()
                    .map(|operand| operand.trim_start_matches('$') == "t9")
                    .unwrap_or(false)
        })
        .map(|instruction| instruction.address().clone())
}

/// The 64-bit X86 Architecture.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Amd64 {}

impl Amd64 {
    pub fn new() -> Amd64 {
        Amd64 {}
    }
}

impl Architecture for Amd64 {
    fn name(&self) -> &str {
        "amd64"
    }
    fn endian(&self) -> Endian {
        Endian::Little
    }
    fn stack_pointer(&self) -> &str {
        "rsp"
    }
    fn word_size(&self) -> usize {
        64
    }
}

/// The 32-bit ARM Architecture.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Arm {}

impl Arm {
    pub fn new() -> Arm {
        Arm {}
    }
}

impl Architecture for Arm {
    fn name(&self) -> &str {
        "arm"
    }
    fn endian(&self) -> Endian {
        Endian::Little
    }
    fn stack_pointer(&self) -> &str {
        "sp"
    }
    fn word_size(&self) -> usize {
        32
    }
}

/// The 32-bit Mips Architecture.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Mips {}

impl Mips {
    pub fn new() -> Mips {
        Mips {}
    }
}

impl Architecture for Mips {
    fn name(&self) -> &str {
        "mips"
    }
    fn endian(&self) -> Endian {
        Endian::Big
    }
    fn stack_pointer(&self) -> &str {
        "$sp"
    }
    fn word_size(&self) -> usize {
        32
    }
    fn spare_instruction(&self, block: &Block, iaddr: &InstrAddr) -> Option<InstrAddr> {
        mips_t9_load(block, iaddr)
    }
}

/// The 32-bit Mipsel Architecture.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Mipsel {}

impl Mipsel {
    pub fn new() -> Mipsel {
        Mipsel {}
    }
}

impl Architecture for Mipsel {
    fn name(&self) -> &str {
        "mipsel"
    }
    fn endian(&self) -> Endian {
        Endian::Little
    }
    fn stack_pointer(&self) -> &str {
        "$sp"
    }
    fn word_size(&self) -> usize {
        32
    }
    fn spare_instruction(&self, block: &Block, iaddr: &InstrAddr) -> Option<InstrAddr> {
        mips_t9_load(block, iaddr)
    }
}

/// The 32-bit PowerPC Architecture.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Ppc {}

impl Ppc {
    pub fn new() -> Ppc {
        Ppc {}
    }
}

impl Architecture for Ppc {
    fn name(&self) -> &str {
        "ppc"
    }
    fn endian(&self) -> Endian {
        Endian::Big
    }
    fn stack_pointer(&self) -> &str {
        "r1"
    }
    fn word_size(&self) -> usize {
        32
    }
}

/// The 32-bit X86 Architecture.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct X86 {}

impl X86 {
    pub fn new() -> X86 {
        X86 {}
    }
}

impl Architecture for X86 {
    fn name(&self) -> &str {
        "x86"
    }
    fn endian(&self) -> Endian {
        Endian::Little
    }
    fn stack_pointer(&self) -> &str {
        "esp"
    }
    fn word_size(&self) -> usize {
        32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StackPointerOffset;
    use crate::binary::Instruction;

    fn load(address: u64, register: &str) -> Instruction {
        let mut instruction = Instruction::new(
            InstrAddr::from_u64(address),
            "lw",
            StackPointerOffset::exact(-32),
        )
        .with_operands(vec![register.to_string(), "-0x7fd0(gp)".to_string()]);
        instruction.set_load(true);
        instruction
    }

    #[test]
    fn mips_spare_is_latest_t9_load() {
        let mut block = Block::new(InstrAddr::from_u64(0x400100));
        block.add_instruction(load(0x400100, "t9"));
        block.add_instruction(load(0x400104, "a0"));
        block.add_instruction(load(0x400108, "$t9"));
        block.add_instruction(Instruction::new(
            InstrAddr::from_u64(0x40010c),
            "jalr",
            StackPointerOffset::exact(-32),
        ));
        block.add_instruction(load(0x400110, "t9"));

        let mips = Mips::new();
        assert_eq!(
            mips.spare_instruction(&block, &InstrAddr::from_u64(0x40010c)),
            Some(InstrAddr::from_u64(0x400108))
        );
        assert_eq!(
            mips.spare_instruction(&block, &InstrAddr::from_u64(0x400104)),
            Some(InstrAddr::from_u64(0x400100))
        );
        assert_eq!(
            X86::new().spare_instruction(&block, &InstrAddr::from_u64(0x40010c)),
            None
        );
    }

    #[test]
    fn architecture_from_name() {
        assert_eq!(from_name("mipsel").unwrap().endian(), Endian::Little);
        assert_eq!(from_name("mips").unwrap().stack_pointer(), "$sp");
        assert!(from_name("vax").is_err());
    }
}
