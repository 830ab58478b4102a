//! Terms over the parameters of a library function.
//!
//! Function summaries state what a call writes and reads with terms over the
//! names of the function's parameters. `ci:dest` names the parameter `dest`,
//! `cn:4` is the constant 4, and `null-terminator-pos(ci:src)` is the position
//! of the null terminator of the string `src` points to.

use crate::Error;
use serde_json::Value;
use std::fmt;

/// Arithmetic over two terms.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArithmeticOp {
    Plus,
    Times,
}

impl ArithmeticOp {
    pub fn tag(&self) -> &'static str {
        match *self {
            ArithmeticOp::Plus => "plus",
            ArithmeticOp::Times => "times",
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum BTerm {
    /// A value only known at runtime.
    RuntimeValue,
    Constant(i64),
    /// A reference to the parameter with this name.
    Named(String),
    IndexSize(Box<BTerm>),
    AddressedValue(Box<BTerm>, Box<BTerm>),
    /// The position of the null terminator of a string.
    NullTerminatorPos(Box<BTerm>),
    Arithmetic {
        op: ArithmeticOp,
        arg1: Box<BTerm>,
        arg2: Box<BTerm>,
    },
}

impl BTerm {
    pub fn constant(value: i64) -> BTerm {
        BTerm::Constant(value)
    }

    pub fn named<S>(name: S) -> BTerm
    where
        S: Into<String>,
    {
        BTerm::Named(name.into())
    }

    pub fn index_size(arg: BTerm) -> BTerm {
        BTerm::IndexSize(Box::new(arg))
    }

    pub fn addressed_value(arg1: BTerm, arg2: BTerm) -> BTerm {
        BTerm::AddressedValue(Box::new(arg1), Box::new(arg2))
    }

    pub fn null_terminator_pos(ntstring: BTerm) -> BTerm {
        BTerm::NullTerminatorPos(Box::new(ntstring))
    }

    pub fn arithmetic(op: ArithmeticOp, arg1: BTerm, arg2: BTerm) -> BTerm {
        BTerm::Arithmetic {
            op,
            arg1: Box::new(arg1),
            arg2: Box::new(arg2),
        }
    }

    pub fn plus(arg1: BTerm, arg2: BTerm) -> BTerm {
        BTerm::arithmetic(ArithmeticOp::Plus, arg1, arg2)
    }

    pub fn times(arg1: BTerm, arg2: BTerm) -> BTerm {
        BTerm::arithmetic(ArithmeticOp::Times, arg1, arg2)
    }

    /// The tag this term is written with.
    pub fn tag(&self) -> &'static str {
        match *self {
            BTerm::RuntimeValue => "runtime-value",
            BTerm::Constant(_) => "cn",
            BTerm::Named(_) => "ci",
            BTerm::IndexSize(_) => "indexsize",
            BTerm::AddressedValue(..) => "addressed-value",
            BTerm::NullTerminatorPos(_) => "null-terminator-pos",
            BTerm::Arithmetic { op, .. } => op.tag(),
        }
    }

    pub fn is_arithmetic_expr(&self) -> bool {
        matches!(self, BTerm::Arithmetic { .. })
    }

    /// The name of the parameter this term refers to, if it is a parameter
    /// reference.
    pub fn parameter_name(&self) -> Option<&str> {
        match *self {
            BTerm::Named(ref name) => Some(name),
            _ => None,
        }
    }

    pub fn refers_to_parameter(&self, name: &str) -> bool {
        match *self {
            BTerm::RuntimeValue | BTerm::Constant(_) => false,
            BTerm::Named(ref n) => n == name,
            BTerm::IndexSize(ref arg) | BTerm::NullTerminatorPos(ref arg) => {
                arg.refers_to_parameter(name)
            }
            BTerm::AddressedValue(ref arg1, ref arg2)
            | BTerm::Arithmetic {
                ref arg1, ref arg2, ..
            } => arg1.refers_to_parameter(name) || arg2.refers_to_parameter(name),
        }
    }

    /// Paths to every occurrence of the parameter `name` in this term.
    ///
    /// Each step of a path is the tag of a term and the position of the
    /// argument taken, such as `:plus:arg2:null-terminator-pos:ntstring`. A
    /// parameter reference is the empty path.
    pub fn parameter_refs(&self, name: &str) -> Vec<String> {
        fn prefixed(tag: &str, position: &str, arg: &BTerm, name: &str) -> Vec<String> {
            arg.parameter_refs(name)
                .into_iter()
                .map(|path| format!(":{}:{}{}", tag, position, path))
                .collect()
        }

        match *self {
            BTerm::RuntimeValue | BTerm::Constant(_) => Vec::new(),
            BTerm::Named(ref n) => {
                if n == name {
                    vec![String::new()]
                } else {
                    Vec::new()
                }
            }
            BTerm::IndexSize(ref arg) => prefixed(self.tag(), "arg", arg, name),
            BTerm::NullTerminatorPos(ref arg) => prefixed(self.tag(), "ntstring", arg, name),
            BTerm::AddressedValue(ref arg1, ref arg2)
            | BTerm::Arithmetic {
                ref arg1, ref arg2, ..
            } => {
                let mut paths = prefixed(self.tag(), "arg1", arg1, name);
                paths.append(&mut prefixed(self.tag(), "arg2", arg2, name));
                paths
            }
        }
    }

    /// Parse a term from its JSON form.
    ///
    /// A term is an object with a `tag`. Constants and parameter references
    /// carry their value in `text`, compound terms carry their arguments in
    /// `args`. The bare string `"runtime-value"` is accepted as well.
    pub fn from_json(value: &Value) -> Result<BTerm, Error> {
        let tag = match *value {
            Value::String(ref tag) => tag.as_str(),
            Value::Object(_) => match value["tag"] {
                Value::String(ref tag) => tag.as_str(),
                _ => return Err(Error::MalformedTerm(format!("tag missing in {}", value))),
            },
            _ => return Err(Error::MalformedTerm(value.to_string())),
        };

        let arg = |index: usize| -> Result<BTerm, Error> {
            match value["args"].get(index) {
                Some(arg) => BTerm::from_json(arg),
                None => Err(Error::MalformedTerm(format!(
                    "{} is missing argument {}",
                    tag, index
                ))),
            }
        };

        Ok(match tag {
            "runtime-value" => BTerm::RuntimeValue,
            "cn" => match value["text"] {
                Value::Number(ref number) => match number.as_i64() {
                    Some(n) => BTerm::Constant(n),
                    None => return Err(Error::MalformedTerm(format!("cn {} not i64", number))),
                },
                Value::String(ref text) => BTerm::Constant(text.parse::<i64>().map_err(|_| {
                    Error::MalformedTerm(format!("cn {} is not a number", text))
                })?),
                _ => return Err(Error::MalformedTerm("cn without text".to_string())),
            },
            "ci" => match value["text"] {
                Value::String(ref name) => BTerm::named(name.as_str()),
                _ => return Err(Error::MalformedTerm("ci without text".to_string())),
            },
            "indexsize" => BTerm::index_size(arg(0)?),
            "addressed-value" => BTerm::addressed_value(arg(0)?, arg(1)?),
            "null-terminator-pos" => BTerm::null_terminator_pos(arg(0)?),
            "plus" => BTerm::plus(arg(0)?, arg(1)?),
            "times" => BTerm::times(arg(0)?, arg(1)?),
            _ => return Err(Error::UnknownTag(format!("Unknown bterm type: {}", tag))),
        })
    }
}

impl fmt::Display for BTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            BTerm::RuntimeValue => write!(f, "runtime-value"),
            BTerm::Constant(value) => write!(f, "cn:{}", value),
            BTerm::Named(ref name) => write!(f, "ci:{}", name),
            BTerm::IndexSize(ref arg) => write!(f, "indexsize({})", arg),
            BTerm::NullTerminatorPos(ref arg) => write!(f, "null-terminator-pos({})", arg),
            BTerm::AddressedValue(ref arg1, ref arg2)
            | BTerm::Arithmetic {
                ref arg1, ref arg2, ..
            } => write!(f, "{}({}, {})", self.tag(), arg1, arg2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display() {
        let term = BTerm::plus(
            BTerm::null_terminator_pos(BTerm::named("dest")),
            BTerm::null_terminator_pos(BTerm::named("src")),
        );
        assert_eq!(
            term.to_string(),
            "plus(null-terminator-pos(ci:dest), null-terminator-pos(ci:src))"
        );
        assert_eq!(BTerm::constant(4).to_string(), "cn:4");
        assert_eq!(BTerm::RuntimeValue.to_string(), "runtime-value");
        assert_eq!(
            BTerm::addressed_value(BTerm::named("p"), BTerm::constant(0)).to_string(),
            "addressed-value(ci:p, cn:0)"
        );
        assert_eq!(
            BTerm::index_size(BTerm::named("n")).to_string(),
            "indexsize(ci:n)"
        );
    }

    #[test]
    fn parameter_refs() {
        let term = BTerm::times(BTerm::named("size"), BTerm::named("nmemb"));
        assert!(term.refers_to_parameter("size"));
        assert!(term.refers_to_parameter("nmemb"));
        assert!(!term.refers_to_parameter("ptr"));
        assert_eq!(term.parameter_refs("nmemb"), vec![":times:arg2".to_string()]);

        let term = BTerm::plus(
            BTerm::null_terminator_pos(BTerm::named("s")),
            BTerm::index_size(BTerm::named("s")),
        );
        assert_eq!(
            term.parameter_refs("s"),
            vec![
                ":plus:arg1:null-terminator-pos:ntstring".to_string(),
                ":plus:arg2:indexsize:arg".to_string(),
            ]
        );

        assert_eq!(BTerm::named("s").parameter_refs("s"), vec![String::new()]);
        assert!(BTerm::constant(1).parameter_refs("s").is_empty());
        assert!(!BTerm::RuntimeValue.refers_to_parameter("s"));
    }

    #[test]
    fn from_json() {
        let value = json!({
            "tag": "times",
            "args": [
                {"tag": "cn", "text": "1"},
                {"tag": "ci", "text": "n"}
            ]
        });
        assert_eq!(
            BTerm::from_json(&value).unwrap(),
            BTerm::times(BTerm::constant(1), BTerm::named("n"))
        );
        assert_eq!(
            BTerm::from_json(&json!({"tag": "cn", "text": 12})).unwrap(),
            BTerm::constant(12)
        );
        assert_eq!(
            BTerm::from_json(&json!("runtime-value")).unwrap(),
            BTerm::RuntimeValue
        );
    }

    #[test]
    fn from_json_errors() {
        assert!(matches!(
            BTerm::from_json(&json!({"tag": "minus", "args": []})),
            Err(Error::UnknownTag(_))
        ));
        assert!(matches!(
            BTerm::from_json(&json!({"tag": "plus", "args": [{"tag": "cn", "text": 1}]})),
            Err(Error::MalformedTerm(_))
        ));
        assert!(matches!(
            BTerm::from_json(&json!({"tag": "ci"})),
            Err(Error::MalformedTerm(_))
        ));
        assert!(BTerm::from_json(&json!(3)).is_err());
    }
}
