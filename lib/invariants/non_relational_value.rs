//! Non-relational invariant facts.
//!
//! A non-relational value describes what is known about a single variable at
//! an instruction: either a symbolic expression, a ground interval, or a
//! symbolic base (e.g. the stack pointer at function entry) plus an interval
//! offset.

use crate::invariants::{Interval, Xpr};
use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// The name of the symbol denoting the stack pointer at function entry.
pub const STACK_BASE_SYMBOL: &str = "sp_in";

/// A named symbolic base.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Symbol {
    name: String,
}

impl Symbol {
    pub fn new<S>(name: S) -> Symbol
    where
        S: Into<String>,
    {
        Symbol { name: name.into() }
    }

    pub fn stack_base() -> Symbol {
        Symbol::new(STACK_BASE_SYMBOL)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_stack_base(&self) -> bool {
        self.name == STACK_BASE_SYMBOL
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonRelationalValue {
    SymbolicExpr(Xpr),
    IntervalValue {
        lower: Option<i64>,
        upper: Option<i64>,
    },
    BaseOffsetValue {
        base: Symbol,
        lower: Option<i64>,
        upper: Option<i64>,
        nullable: bool,
    },
}

impl NonRelationalValue {
    pub fn is_symbolic_expression(&self) -> bool {
        matches!(self, NonRelationalValue::SymbolicExpr(_))
    }

    pub fn is_interval_value(&self) -> bool {
        matches!(self, NonRelationalValue::IntervalValue { .. })
    }

    pub fn is_base_offset_value(&self) -> bool {
        matches!(self, NonRelationalValue::BaseOffsetValue { .. })
    }

    pub fn lowerbound(&self) -> Option<i64> {
        match *self {
            NonRelationalValue::SymbolicExpr(_) => None,
            NonRelationalValue::IntervalValue { lower, .. }
            | NonRelationalValue::BaseOffsetValue { lower, .. } => lower,
        }
    }

    pub fn upperbound(&self) -> Option<i64> {
        match *self {
            NonRelationalValue::SymbolicExpr(_) => None,
            NonRelationalValue::IntervalValue { upper, .. }
            | NonRelationalValue::BaseOffsetValue { upper, .. } => upper,
        }
    }

    pub fn is_lower_bounded(&self) -> bool {
        self.lowerbound().is_some()
    }

    pub fn is_upper_bounded(&self) -> bool {
        self.upperbound().is_some()
    }

    pub fn is_bounded(&self) -> bool {
        self.is_lower_bounded() && self.is_upper_bounded()
    }

    pub fn is_singleton(&self) -> bool {
        match (self.lowerbound(), self.upperbound()) {
            (Some(lower), Some(upper)) => lower == upper,
            _ => false,
        }
    }

    /// True if this is a ground interval holding exactly one value.
    pub fn is_singleton_value(&self) -> bool {
        self.is_interval_value() && self.is_singleton()
    }

    pub fn singleton_value(&self) -> Result<i64, Error> {
        match (self, self.lowerbound()) {
            (NonRelationalValue::IntervalValue { .. }, Some(lower)) if self.is_singleton() => {
                Ok(lower)
            }
            _ => Err(Error::NotASingleton(self.to_string())),
        }
    }

    pub fn expr(&self) -> Result<&Xpr, Error> {
        match *self {
            NonRelationalValue::SymbolicExpr(ref expr) => Ok(expr),
            _ => Err(format!("Non-relational value is not a symbolic expression: {}", self).into()),
        }
    }

    pub fn base(&self) -> Option<&Symbol> {
        match *self {
            NonRelationalValue::BaseOffsetValue { ref base, .. } => Some(base),
            _ => None,
        }
    }

    /// The interval of a ground interval, or the offset interval of a
    /// base-offset value.
    pub fn to_interval(&self) -> Option<Interval> {
        match *self {
            NonRelationalValue::SymbolicExpr(_) => None,
            NonRelationalValue::IntervalValue { lower, upper }
            | NonRelationalValue::BaseOffsetValue { lower, upper, .. } => {
                Some(Interval::from_options(lower, upper))
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut content = match *self {
            NonRelationalValue::SymbolicExpr(ref expr) => json!({
                "kind": "sx",
                "sym-expr": expr.to_string(),
            }),
            NonRelationalValue::IntervalValue { lower, upper } => match (lower, upper) {
                (Some(lower), Some(upper)) if lower == upper => {
                    json!({"kind": "civ", "value": lower})
                }
                (None, upper) => json!({"kind": "ub-itv", "ub": upper}),
                (lower, None) => json!({"kind": "lb-itv", "lb": lower}),
                (lower, upper) => json!({"kind": "itv", "lb": lower, "ub": upper}),
            },
            NonRelationalValue::BaseOffsetValue {
                ref base,
                lower,
                upper,
                ..
            } => {
                let mut content = match (lower, upper) {
                    (Some(lower), Some(upper)) if lower == upper => {
                        json!({"kind": "b-civ", "value": lower})
                    }
                    (None, None) => json!({"kind": "b-unb"}),
                    (lower, None) => json!({"kind": "b-lb-itv", "lb": lower}),
                    (None, upper) => json!({"kind": "b-ub-itv", "ub": upper}),
                    (lower, upper) => json!({"kind": "b-itv", "lb": lower, "ub": upper}),
                };
                content["base"] = json!(base.name());
                content
            }
        };
        content["txtrep"] = json!(self.to_string());
        content
    }
}

/// Hexadecimal with an explicit sign, so -8 prints as `-0x8`.
fn signed_hex(value: i64) -> String {
    if value < 0 {
        format!("-{:#x}", value.unsigned_abs())
    } else {
        format!("{:#x}", value)
    }
}

impl fmt::Display for NonRelationalValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            NonRelationalValue::SymbolicExpr(ref expr) => write!(f, "{}", expr),
            NonRelationalValue::IntervalValue { lower, upper } => match (lower, upper) {
                (Some(lower), Some(upper)) if lower == upper => write!(f, "{}", signed_hex(lower)),
                (Some(lower), Some(upper)) => {
                    write!(f, "[{};{}]", signed_hex(lower), signed_hex(upper))
                }
                (Some(lower), None) => write!(f, "[{}; ->", lower),
                (None, Some(upper)) => write!(f, "<- ; {}]", upper),
                (None, None) => write!(f, "<- ; ->"),
            },
            NonRelationalValue::BaseOffsetValue {
                ref base,
                lower,
                upper,
                ..
            } => match (lower, upper) {
                (Some(0), Some(0)) => write!(f, "{}", base),
                (Some(lower), Some(upper)) if lower == upper => write!(f, "{} + {}", base, lower),
                (Some(lower), Some(upper)) => write!(f, "{}[{};{}]", base, lower, upper),
                (Some(lower), None) => write!(f, "{}[{}; ->", base, lower),
                (None, Some(upper)) => write!(f, "{}<- ; {}]", base, upper),
                (None, None) => write!(f, "{}<- ; ->", base),
            },
        }
    }
}

/// A non-relational fact about one variable at one instruction.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NonRelationalFact {
    variable: String,
    value: NonRelationalValue,
}

impl NonRelationalFact {
    pub fn new<S>(variable: S, value: NonRelationalValue) -> NonRelationalFact
    where
        S: Into<String>,
    {
        NonRelationalFact {
            variable: variable.into(),
            value,
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn value(&self) -> &NonRelationalValue {
        &self.value
    }
}

impl fmt::Display for NonRelationalFact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} == {}", self.variable, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(lower: Option<i64>, upper: Option<i64>) -> NonRelationalValue {
        NonRelationalValue::IntervalValue { lower, upper }
    }

    fn stack_offset(lower: Option<i64>, upper: Option<i64>) -> NonRelationalValue {
        NonRelationalValue::BaseOffsetValue {
            base: Symbol::stack_base(),
            lower,
            upper,
            nullable: false,
        }
    }

    #[test]
    fn test_interval_value() {
        let value = interval(Some(4), Some(4));
        assert!(value.is_bounded());
        assert!(value.is_singleton());
        assert!(value.is_singleton_value());
        assert_eq!(value.singleton_value().unwrap(), 4);
        assert_eq!(value.to_string(), "0x4");

        let value = interval(Some(4), None);
        assert!(value.is_lower_bounded());
        assert!(!value.is_bounded());
        assert!(!value.is_singleton());
        assert!(value.singleton_value().is_err());
        assert_eq!(value.to_interval(), Some(Interval::lower_only(4)));
    }

    #[test]
    fn test_negative_hex() {
        assert_eq!(interval(Some(-8), Some(-8)).to_string(), "-0x8");
        assert_eq!(interval(Some(-16), Some(8)).to_string(), "[-0x10;0x8]");
        assert_eq!(
            interval(Some(i64::MIN), Some(i64::MIN)).to_string(),
            "-0x8000000000000000"
        );
    }

    #[test]
    fn test_base_offset_value() {
        let value = stack_offset(Some(-40), Some(-40));
        assert!(value.is_singleton());
        // singleton offsets are not singleton values, they have a symbolic base
        assert!(!value.is_singleton_value());
        assert!(value.base().unwrap().is_stack_base());
        assert_eq!(value.to_string(), "sp_in + -40");
        assert_eq!(value.to_interval(), Some(Interval::singleton(-40)));

        assert_eq!(stack_offset(Some(0), Some(0)).to_string(), "sp_in");
    }

    #[test]
    fn test_symbolic_expression() {
        let value = NonRelationalValue::SymbolicExpr(Xpr::stack_address(-16));
        assert!(value.is_symbolic_expression());
        assert!(!value.is_bounded());
        assert_eq!(value.expr().unwrap(), &Xpr::stack_address(-16));
        assert_eq!(value.to_interval(), None);
        assert!(interval(None, None).expr().is_err());
    }

    #[test]
    fn test_to_json() {
        assert_eq!(interval(Some(1), Some(1)).to_json()["kind"], "civ");
        assert_eq!(interval(None, Some(1)).to_json()["kind"], "ub-itv");
        assert_eq!(interval(Some(1), None).to_json()["kind"], "lb-itv");
        assert_eq!(interval(Some(1), Some(2)).to_json()["kind"], "itv");

        let content = stack_offset(None, None).to_json();
        assert_eq!(content["kind"], "b-unb");
        assert_eq!(content["base"], "sp_in");
        assert_eq!(stack_offset(Some(-8), None).to_json()["kind"], "b-lb-itv");
        assert_eq!(stack_offset(None, Some(-8)).to_json()["kind"], "b-ub-itv");
        assert_eq!(stack_offset(Some(-8), Some(-4)).to_json()["kind"], "b-itv");
    }
}
