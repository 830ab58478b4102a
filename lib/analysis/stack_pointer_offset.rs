//! Offset of the stack pointer from function entry.
//!
//! The analysis engine reports, for every instruction, the value of the stack
//! pointer as an interval relative to its value at function entry. Inside
//! re-entrant contexts (for example a loop that adjusts the stack pointer on
//! every iteration) the offset is reported together with a nesting level.

use crate::invariants::{Interval, NonRelationalValue};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The offset of the stack pointer from its value at function entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StackPointerOffset {
    nesting_level: u32,
    offset: Interval,
}

impl StackPointerOffset {
    pub fn new(nesting_level: u32, offset: Interval) -> StackPointerOffset {
        StackPointerOffset {
            nesting_level,
            offset,
        }
    }

    /// A stack pointer offset known to be exactly `offset`, outside of any
    /// nested context.
    pub fn exact(offset: i64) -> StackPointerOffset {
        StackPointerOffset::new(0, Interval::singleton(offset))
    }

    /// Nothing is known about the stack pointer.
    pub fn unknown() -> StackPointerOffset {
        StackPointerOffset::new(0, Interval::unbounded())
    }

    /// Derive a stack pointer offset from an invariant on the stack pointer.
    ///
    /// Only base-offset values over the stack base symbol describe the stack
    /// pointer relative to function entry.
    pub fn from_invariant(
        nesting_level: u32,
        value: &NonRelationalValue,
    ) -> Option<StackPointerOffset> {
        match value.base() {
            Some(base) if base.is_stack_base() => value
                .to_interval()
                .map(|offset| StackPointerOffset::new(nesting_level, offset)),
            _ => None,
        }
    }

    pub fn nesting_level(&self) -> u32 {
        self.nesting_level
    }

    pub fn offset(&self) -> &Interval {
        &self.offset
    }

    pub fn is_lower_bounded(&self) -> bool {
        self.offset.is_lower_bounded()
    }

    pub fn is_upper_bounded(&self) -> bool {
        self.offset.is_upper_bounded()
    }

    pub fn is_closed(&self) -> bool {
        self.offset.is_closed()
    }

    pub fn is_singleton(&self) -> bool {
        self.offset.is_singleton()
    }

    pub fn lowerbound(&self) -> Result<i64, Error> {
        self.offset.lowerbound()
    }

    pub fn upperbound(&self) -> Result<i64, Error> {
        self.offset.upperbound()
    }

    /// The exact offset, if the offset is a singleton.
    pub fn value(&self) -> Option<i64> {
        self.offset.value().ok()
    }
}

impl fmt::Display for StackPointerOffset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let depth = self.nesting_level as usize + 1;
        write!(
            f,
            "{}{}{}",
            "[".repeat(depth),
            self.offset,
            "]".repeat(depth)
        )
    }
}

/// Returns true if every stack pointer offset is known exactly.
pub fn perfect<'s, I>(stack_pointer_offsets: I) -> bool
where
    I: IntoIterator<Item = &'s StackPointerOffset>,
{
    stack_pointer_offsets
        .into_iter()
        .all(|spo| spo.is_singleton())
}
