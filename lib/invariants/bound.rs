//! Possibly-unbounded numeric bounds and the intervals built from them.
//!
//! An `Interval` is a pair of `Bound`s. Either side may be infinite, in which
//! case the interval is open on that side. Extracting a bound from an open
//! side is an error, not a panic.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single bound of an interval.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Bound {
    MinusInfinity,
    PlusInfinity,
    Numeric(i64),
}

impl Bound {
    /// True only for `Bound::Numeric`.
    pub fn is_bounded(&self) -> bool {
        matches!(self, Bound::Numeric(_))
    }

    pub fn is_minus_infinity(&self) -> bool {
        matches!(self, Bound::MinusInfinity)
    }

    pub fn is_plus_infinity(&self) -> bool {
        matches!(self, Bound::PlusInfinity)
    }

    /// The numeric value of this bound, if it has one.
    pub fn value(&self) -> Option<i64> {
        match *self {
            Bound::Numeric(value) => Some(value),
            Bound::MinusInfinity | Bound::PlusInfinity => None,
        }
    }

    /// Add two bounds. Adding opposite infinities has no meaningful result.
    pub fn add(&self, other: &Bound) -> Result<Bound, Error> {
        Ok(match (*self, *other) {
            (Bound::Numeric(lhs), Bound::Numeric(rhs)) => match lhs.checked_add(rhs) {
                Some(value) => Bound::Numeric(value),
                None => {
                    if lhs < 0 {
                        Bound::MinusInfinity
                    } else {
                        Bound::PlusInfinity
                    }
                }
            },
            (Bound::MinusInfinity, Bound::PlusInfinity)
            | (Bound::PlusInfinity, Bound::MinusInfinity) => {
                return Err(Error::Interval(format!(
                    "cannot add bounds {} and {}",
                    self, other
                )))
            }
            (Bound::MinusInfinity, _) | (_, Bound::MinusInfinity) => Bound::MinusInfinity,
            (Bound::PlusInfinity, _) | (_, Bound::PlusInfinity) => Bound::PlusInfinity,
        })
    }
}

impl Ord for Bound {
    fn cmp(&self, other: &Bound) -> Ordering {
        match (*self, *other) {
            (Bound::MinusInfinity, Bound::MinusInfinity) => Ordering::Equal,
            (Bound::MinusInfinity, _) => Ordering::Less,
            (_, Bound::MinusInfinity) => Ordering::Greater,
            (Bound::PlusInfinity, Bound::PlusInfinity) => Ordering::Equal,
            (Bound::PlusInfinity, _) => Ordering::Greater,
            (_, Bound::PlusInfinity) => Ordering::Less,
            (Bound::Numeric(lhs), Bound::Numeric(rhs)) => lhs.cmp(&rhs),
        }
    }
}

impl PartialOrd for Bound {
    fn partial_cmp(&self, other: &Bound) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Bound::MinusInfinity => write!(f, "-oo"),
            Bound::PlusInfinity => write!(f, "+oo"),
            Bound::Numeric(value) => write!(f, "{}", value),
        }
    }
}

/// An interval between two bounds, both inclusive.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Interval {
    lower: Bound,
    upper: Bound,
}

impl Interval {
    /// Create an interval from two bounds.
    ///
    /// A lower bound of `+oo` or an upper bound of `-oo` is rejected.
    pub fn new(lower: Bound, upper: Bound) -> Result<Interval, Error> {
        if lower.is_plus_infinity() || upper.is_minus_infinity() {
            return Err(Error::Interval(format!(
                "invalid interval bounds {} and {}",
                lower, upper
            )));
        }
        Ok(Interval { lower, upper })
    }

    /// `[lower, upper]`
    pub fn closed(lower: i64, upper: i64) -> Interval {
        Interval {
            lower: Bound::Numeric(lower),
            upper: Bound::Numeric(upper),
        }
    }

    /// `[value, value]`
    pub fn singleton(value: i64) -> Interval {
        Interval::closed(value, value)
    }

    /// `[lower, +oo)`
    pub fn lower_only(lower: i64) -> Interval {
        Interval {
            lower: Bound::Numeric(lower),
            upper: Bound::PlusInfinity,
        }
    }

    /// `(-oo, upper]`
    pub fn upper_only(upper: i64) -> Interval {
        Interval {
            lower: Bound::MinusInfinity,
            upper: Bound::Numeric(upper),
        }
    }

    /// `(-oo, +oo)`
    pub fn unbounded() -> Interval {
        Interval {
            lower: Bound::MinusInfinity,
            upper: Bound::PlusInfinity,
        }
    }

    /// Build an interval from optional numeric bounds, where `None` means the
    /// side is open.
    pub fn from_options(lower: Option<i64>, upper: Option<i64>) -> Interval {
        Interval {
            lower: lower.map(Bound::Numeric).unwrap_or(Bound::MinusInfinity),
            upper: upper.map(Bound::Numeric).unwrap_or(Bound::PlusInfinity),
        }
    }

    pub fn lower(&self) -> &Bound {
        &self.lower
    }

    pub fn upper(&self) -> &Bound {
        &self.upper
    }

    pub fn is_lower_bounded(&self) -> bool {
        self.lower.is_bounded()
    }

    pub fn is_upper_bounded(&self) -> bool {
        self.upper.is_bounded()
    }

    pub fn is_closed(&self) -> bool {
        self.is_lower_bounded() && self.is_upper_bounded()
    }

    pub fn is_singleton(&self) -> bool {
        match (self.lower, self.upper) {
            (Bound::Numeric(lower), Bound::Numeric(upper)) => lower == upper,
            _ => false,
        }
    }

    pub fn lowerbound(&self) -> Result<i64, Error> {
        self.lower
            .value()
            .ok_or_else(|| Error::Interval(format!("interval {} has no lower bound", self)))
    }

    pub fn upperbound(&self) -> Result<i64, Error> {
        self.upper
            .value()
            .ok_or_else(|| Error::Interval(format!("interval {} has no upper bound", self)))
    }

    /// The single value of a singleton interval.
    pub fn value(&self) -> Result<i64, Error> {
        if self.is_singleton() {
            self.lowerbound()
        } else {
            Err(Error::NotASingleton(self.to_string()))
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.lower <= Bound::Numeric(value) && Bound::Numeric(value) <= self.upper
    }

    /// The smallest interval containing both intervals.
    pub fn join(&self, other: &Interval) -> Interval {
        Interval {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    /// Interval addition, `[a, b] + [c, d] = [a + c, b + d]`.
    pub fn add(&self, other: &Interval) -> Result<Interval, Error> {
        Interval::new(self.lower.add(&other.lower)?, self.upper.add(&other.upper)?)
    }

    /// Shift this interval by a constant.
    pub fn shift(&self, offset: i64) -> Result<Interval, Error> {
        self.add(&Interval::singleton(offset))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.lower, self.upper) {
            (Bound::Numeric(lower), Bound::Numeric(upper)) => {
                if lower == upper {
                    write!(f, "{}", lower)
                } else {
                    write!(f, "[{};{}]", lower, upper)
                }
            }
            (Bound::Numeric(lower), _) => write!(f, "[{}; ->", lower),
            (_, Bound::Numeric(upper)) => write!(f, "<- ; {}]", upper),
            _ => write!(f, "<- ; ->"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_order() {
        assert!(Bound::MinusInfinity < Bound::Numeric(i64::MIN));
        assert!(Bound::Numeric(i64::MAX) < Bound::PlusInfinity);
        assert!(Bound::Numeric(-4) < Bound::Numeric(4));
        assert_eq!(Bound::Numeric(3).max(Bound::PlusInfinity), Bound::PlusInfinity);
    }

    #[test]
    fn test_bound_add() {
        assert_eq!(
            Bound::Numeric(3).add(&Bound::Numeric(-5)).unwrap(),
            Bound::Numeric(-2)
        );
        assert_eq!(
            Bound::Numeric(3).add(&Bound::PlusInfinity).unwrap(),
            Bound::PlusInfinity
        );
        assert!(Bound::MinusInfinity.add(&Bound::PlusInfinity).is_err());
    }

    #[test]
    fn test_singleton_is_closed() {
        let intervals = vec![
            Interval::closed(-20, -20),
            Interval::closed(-20, -16),
            Interval::lower_only(-16),
            Interval::upper_only(8),
            Interval::unbounded(),
            Interval::singleton(0),
        ];

        for interval in intervals {
            if interval.is_singleton() {
                assert!(interval.is_closed());
                assert_eq!(
                    interval.lowerbound().unwrap(),
                    interval.upperbound().unwrap()
                );
            }
        }
    }

    #[test]
    fn test_open_bounds_are_errors() {
        let interval = Interval::lower_only(-16);
        assert!(interval.is_lower_bounded());
        assert!(!interval.is_upper_bounded());
        assert!(!interval.is_closed());
        assert_eq!(interval.lowerbound().unwrap(), -16);
        assert!(interval.upperbound().is_err());
        assert!(interval.value().is_err());

        let interval = Interval::upper_only(4);
        assert!(interval.lowerbound().is_err());
        assert_eq!(interval.upperbound().unwrap(), 4);
    }

    #[test]
    fn test_value() {
        assert_eq!(Interval::singleton(-40).value().unwrap(), -40);
        assert!(matches!(
            Interval::closed(-40, -36).value(),
            Err(Error::NotASingleton(_))
        ));
    }

    #[test]
    fn test_new_rejects_inverted_infinities() {
        assert!(Interval::new(Bound::PlusInfinity, Bound::PlusInfinity).is_err());
        assert!(Interval::new(Bound::MinusInfinity, Bound::MinusInfinity).is_err());
        assert!(Interval::new(Bound::MinusInfinity, Bound::Numeric(0)).is_ok());
    }

    #[test]
    fn test_join_and_shift() {
        let joined = Interval::closed(-8, -4).join(&Interval::lower_only(0));
        assert_eq!(joined, Interval::lower_only(-8));
        assert!(joined.contains(1024));
        assert!(!joined.contains(-9));

        assert_eq!(
            Interval::closed(-8, -4).shift(-16).unwrap(),
            Interval::closed(-24, -20)
        );
        assert_eq!(
            Interval::upper_only(0).shift(4).unwrap(),
            Interval::upper_only(4)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Interval::singleton(-40).to_string(), "-40");
        assert_eq!(Interval::closed(-40, -32).to_string(), "[-40;-32]");
        assert_eq!(Interval::lower_only(-16).to_string(), "[-16; ->");
        assert_eq!(Interval::upper_only(16).to_string(), "<- ; 16]");
        assert_eq!(Interval::unbounded().to_string(), "<- ; ->");
    }

    #[test]
    fn test_from_options() {
        assert_eq!(Interval::from_options(Some(1), Some(1)), Interval::singleton(1));
        assert_eq!(Interval::from_options(None, Some(1)), Interval::upper_only(1));
        assert_eq!(Interval::from_options(None, None), Interval::unbounded());
    }
}
