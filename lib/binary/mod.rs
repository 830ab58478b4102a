//! Facts about a binary, as computed by the analysis engine.
//!
//! A `Binary` holds `Function`s, a `Function` holds basic `Block`s, and a
//! `Block` holds `Instruction`s. Every instruction carries the stack pointer
//! offset computed for it, the memory it accesses and, for call instructions,
//! the call target and the symbolic values of the call arguments.

mod address;
#[allow(clippy::module_inception)]
mod binary;
mod block;
mod function;
mod instruction;
mod memory_access;

pub use self::address::*;
pub use self::binary::*;
pub use self::block::*;
pub use self::function::*;
pub use self::instruction::*;
pub use self::memory_access::*;
