//! Memory accesses performed by an instruction.

use crate::invariants::Xpr;
use crate::Error;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Whether a memory access reads, writes, or both.
    #[derive(Deserialize, Serialize)]
    pub struct AccessMode: u8 {
        const READ       = 0b01;
        const WRITE      = 0b10;
        const READ_WRITE = 0b11;
    }
}

/// What a memory access is used for.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum MemoryAccessKind {
    Access,
    /// The named register is saved to memory.
    RegisterSpill(String),
    /// The named register is restored from memory.
    RegisterRestore(String),
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MemoryAccess {
    address: Xpr,
    mode: AccessMode,
    size: Option<i32>,
    kind: MemoryAccessKind,
}

impl MemoryAccess {
    pub fn new(address: Xpr, mode: AccessMode, size: Option<i32>) -> MemoryAccess {
        MemoryAccess {
            address,
            mode,
            size,
            kind: MemoryAccessKind::Access,
        }
    }

    pub fn read(address: Xpr, size: Option<i32>) -> MemoryAccess {
        MemoryAccess::new(address, AccessMode::READ, size)
    }

    pub fn write(address: Xpr, size: Option<i32>) -> MemoryAccess {
        MemoryAccess::new(address, AccessMode::WRITE, size)
    }

    /// A write that saves `register` to `address`.
    pub fn register_spill<S>(register: S, address: Xpr, size: Option<i32>) -> MemoryAccess
    where
        S: Into<String>,
    {
        MemoryAccess {
            address,
            mode: AccessMode::WRITE,
            size,
            kind: MemoryAccessKind::RegisterSpill(register.into()),
        }
    }

    /// A read that restores `register` from `address`.
    pub fn register_restore<S>(register: S, address: Xpr, size: Option<i32>) -> MemoryAccess
    where
        S: Into<String>,
    {
        MemoryAccess {
            address,
            mode: AccessMode::READ,
            size,
            kind: MemoryAccessKind::RegisterRestore(register.into()),
        }
    }

    pub fn address(&self) -> &Xpr {
        &self.address
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// The size of the access in bytes, if known.
    pub fn size(&self) -> Option<i32> {
        self.size
    }

    pub fn kind(&self) -> &MemoryAccessKind {
        &self.kind
    }

    pub fn is_read(&self) -> bool {
        self.mode.contains(AccessMode::READ)
    }

    pub fn is_write(&self) -> bool {
        self.mode.contains(AccessMode::WRITE)
    }

    pub fn is_stack_address(&self) -> bool {
        self.address.is_stack_address()
    }

    pub fn stack_offset(&self) -> Result<i64, Error> {
        self.address.stack_address_offset()
    }

    pub fn is_register_spill(&self) -> bool {
        matches!(self.kind, MemoryAccessKind::RegisterSpill(_))
    }

    pub fn is_register_restore(&self) -> bool {
        matches!(self.kind, MemoryAccessKind::RegisterRestore(_))
    }

    /// The register saved or restored by this access.
    pub fn register(&self) -> Option<&str> {
        match self.kind {
            MemoryAccessKind::RegisterSpill(ref register)
            | MemoryAccessKind::RegisterRestore(ref register) => Some(register),
            MemoryAccessKind::Access => None,
        }
    }
}

impl fmt::Display for MemoryAccess {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mode = match (self.is_read(), self.is_write()) {
            (true, true) => "RW",
            (true, false) => "R",
            (false, true) => "W",
            (false, false) => "-",
        };
        write!(f, "{} {}", mode, self.address)?;
        if let Some(size) = self.size {
            write!(f, " ({})", size)?;
        }
        match self.kind {
            MemoryAccessKind::RegisterSpill(ref register) => write!(f, " spill {}", register),
            MemoryAccessKind::RegisterRestore(ref register) => write!(f, " restore {}", register),
            MemoryAccessKind::Access => Ok(()),
        }
    }
}
