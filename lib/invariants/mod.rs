//! The value domain: bounds, intervals, symbolic expressions and
//! non-relational invariant facts.

mod bound;
mod non_relational_value;
mod xpr;

pub use self::bound::*;
pub use self::non_relational_value::*;
pub use self::xpr::*;
