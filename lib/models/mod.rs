//! Summaries of library functions.
//!
//! A `FunctionSummary` lists the parameters of a library function and the
//! preconditions a call must satisfy. Preconditions are stated with `BTerm`s
//! over the parameter names.

mod bterm;
mod precondition;
mod summary;

pub use self::bterm::*;
pub use self::precondition::*;
pub use self::summary::*;
