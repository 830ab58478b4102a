use crate::models::BTerm;
use crate::Error;
use serde_json::Value;
use std::fmt;

/// Comparison of a relational precondition.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RelationalOp {
    Geq,
    Gt,
}

impl RelationalOp {
    pub fn tag(&self) -> &'static str {
        match *self {
            RelationalOp::Geq => "geq",
            RelationalOp::Gt => "gt",
        }
    }
}

/// A condition on the arguments of a call for the call to be well-defined.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum FunctionPrecondition {
    /// The call reads `length` bytes of `type_` from `source`.
    DerefRead {
        tag: String,
        type_: String,
        source: BTerm,
        length: BTerm,
    },
    /// The call writes `length` bytes of `type_` to `destination`.
    DerefWrite {
        tag: String,
        type_: String,
        destination: BTerm,
        length: BTerm,
    },
    RelationalCondition {
        op: RelationalOp,
        arg1: BTerm,
        arg2: BTerm,
    },
}

impl FunctionPrecondition {
    pub fn deref_read<S>(type_: S, source: BTerm, length: BTerm) -> FunctionPrecondition
    where
        S: Into<String>,
    {
        FunctionPrecondition::DerefRead {
            tag: "deref-read".to_string(),
            type_: type_.into(),
            source,
            length,
        }
    }

    pub fn deref_write<S>(type_: S, destination: BTerm, length: BTerm) -> FunctionPrecondition
    where
        S: Into<String>,
    {
        FunctionPrecondition::DerefWrite {
            tag: "deref-write".to_string(),
            type_: type_.into(),
            destination,
            length,
        }
    }

    pub fn relational(op: RelationalOp, arg1: BTerm, arg2: BTerm) -> FunctionPrecondition {
        FunctionPrecondition::RelationalCondition { op, arg1, arg2 }
    }

    pub fn tag(&self) -> &str {
        match *self {
            FunctionPrecondition::DerefRead { ref tag, .. }
            | FunctionPrecondition::DerefWrite { ref tag, .. } => tag,
            FunctionPrecondition::RelationalCondition { op, .. } => op.tag(),
        }
    }

    pub fn is_deref_write(&self) -> bool {
        matches!(self, FunctionPrecondition::DerefWrite { .. })
    }

    pub fn is_deref_read(&self) -> bool {
        matches!(self, FunctionPrecondition::DerefRead { .. })
    }

    pub fn refers_to_parameter(&self, name: &str) -> bool {
        match *self {
            FunctionPrecondition::DerefRead {
                source: ref term,
                ref length,
                ..
            }
            | FunctionPrecondition::DerefWrite {
                destination: ref term,
                ref length,
                ..
            } => term.refers_to_parameter(name) || length.refers_to_parameter(name),
            FunctionPrecondition::RelationalCondition {
                ref arg1, ref arg2, ..
            } => arg1.refers_to_parameter(name) || arg2.refers_to_parameter(name),
        }
    }

    /// The roles the parameter `name` plays in this precondition, such as
    /// `deref-write:destination` or `deref-write:length:null-terminator-pos:ntstring`.
    pub fn parameter_roles(&self, name: &str) -> Vec<String> {
        let roles = |role: &str, term: &BTerm| -> Vec<String> {
            term.parameter_refs(name)
                .into_iter()
                .map(|path| format!("{}:{}{}", self.tag(), role, path))
                .collect::<Vec<String>>()
        };

        match *self {
            FunctionPrecondition::DerefRead {
                ref source,
                ref length,
                ..
            } => {
                let mut result = roles("source", source);
                result.append(&mut roles("length", length));
                result
            }
            FunctionPrecondition::DerefWrite {
                ref destination,
                ref length,
                ..
            } => {
                let mut result = roles("destination", destination);
                result.append(&mut roles("length", length));
                result
            }
            FunctionPrecondition::RelationalCondition {
                op,
                ref arg1,
                ref arg2,
            } => {
                let mut result = Vec::new();
                if arg1.refers_to_parameter(name) {
                    result.push(format!("{}:arg1", op.tag()));
                }
                if arg2.refers_to_parameter(name) {
                    result.push(format!("{}:arg2", op.tag()));
                }
                result
            }
        }
    }

    /// The term written to, if this is a write.
    pub fn destination(&self) -> Option<&BTerm> {
        match *self {
            FunctionPrecondition::DerefWrite {
                ref destination, ..
            } => Some(destination),
            _ => None,
        }
    }

    /// The number of bytes read or written.
    pub fn length(&self) -> Option<&BTerm> {
        match *self {
            FunctionPrecondition::DerefRead { ref length, .. }
            | FunctionPrecondition::DerefWrite { ref length, .. } => Some(length),
            FunctionPrecondition::RelationalCondition { .. } => None,
        }
    }

    /// Parse a precondition from its JSON form.
    ///
    /// Reads and writes name their terms (`source` or `destination`, and
    /// `length`), relational conditions list theirs in `args`.
    pub fn from_json(value: &Value) -> Result<FunctionPrecondition, Error> {
        let tag = match value["tag"] {
            Value::String(ref tag) => tag.as_str(),
            _ => {
                return Err(Error::MalformedTerm(format!(
                    "precondition tag missing in {}",
                    value
                )))
            }
        };

        let term = |field: &str| -> Result<BTerm, Error> {
            match value.get(field) {
                Some(term) => BTerm::from_json(term),
                None => Err(Error::MalformedTerm(format!("{} is missing {}", tag, field))),
            }
        };
        let arg = |index: usize| -> Result<BTerm, Error> {
            match value["args"].get(index) {
                Some(term) => BTerm::from_json(term),
                None => Err(Error::MalformedTerm(format!(
                    "{} is missing argument {}",
                    tag, index
                ))),
            }
        };
        let type_ = match value["type"] {
            Value::String(ref type_) => type_.to_string(),
            _ => "unknown".to_string(),
        };

        Ok(match tag {
            "deref-read" | "deref-read-null" => FunctionPrecondition::DerefRead {
                tag: tag.to_string(),
                type_,
                source: term("source")?,
                length: term("length")?,
            },
            "deref-write" | "deref-write-null" => FunctionPrecondition::DerefWrite {
                tag: tag.to_string(),
                type_,
                destination: term("destination")?,
                length: term("length")?,
            },
            "geq" => FunctionPrecondition::relational(RelationalOp::Geq, arg(0)?, arg(1)?),
            "gt" => FunctionPrecondition::relational(RelationalOp::Gt, arg(0)?, arg(1)?),
            _ => {
                return Err(Error::UnknownTag(format!(
                    "Unknown precondition predicate type: {}",
                    tag
                )))
            }
        })
    }
}

impl fmt::Display for FunctionPrecondition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FunctionPrecondition::DerefRead {
                ref tag,
                ref type_,
                source: ref term,
                ref length,
            }
            | FunctionPrecondition::DerefWrite {
                ref tag,
                ref type_,
                destination: ref term,
                ref length,
            } => write!(f, "{}({}, {}, {})", tag, type_, term, length),
            FunctionPrecondition::RelationalCondition {
                op,
                ref arg1,
                ref arg2,
            } => write!(f, "{}({}, {})", op.tag(), arg1, arg2),
        }
    }
}
