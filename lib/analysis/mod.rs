//! Stack analysis over the facts computed for a function.

mod stack_layout;
mod stack_pointer_offset;

pub use self::stack_layout::*;
pub use self::stack_pointer_offset::*;
