//! Symbolic expressions produced by the analysis engine.
//!
//! These are the values the engine computes for call arguments and memory
//! addresses. The classification predicates (`is_stack_address`,
//! `is_heap_address`, ...) are what the stack layout and the call-site
//! classifier use to decide where a value points.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A constant in a symbolic expression.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum XConstant {
    IntConst(i64),
    /// The address of a string literal, with the string it refers to.
    StringRef { address: u64, string: String },
    GlobalAddress(u64),
}

/// A variable in a symbolic expression.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum XVariable {
    /// The current value of a register, with no further denotation.
    Register(String),
    /// The value a register held at function entry.
    InitialRegisterValue(String),
    /// The value of the stack pointer at function entry.
    StackBase,
    /// The base address of the heap region returned by the named allocation.
    HeapBase(String),
    GlobalVariable(u64),
    /// The return value of a call to the named function.
    ReturnValue(String),
    Temporary(String),
}

/// Operators of compound expressions.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum XOperator {
    Plus,
    Minus,
    Mult,
    Div,
    Mod,
    ShiftLeft,
    ShiftRight,
    BitwiseAnd,
    BitwiseOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl XOperator {
    pub fn symbol(&self) -> &'static str {
        match *self {
            XOperator::Plus => "+",
            XOperator::Minus => "-",
            XOperator::Mult => "*",
            XOperator::Div => "/",
            XOperator::Mod => "%",
            XOperator::ShiftLeft => "<<",
            XOperator::ShiftRight => ">>",
            XOperator::BitwiseAnd => "&",
            XOperator::BitwiseOr => "|",
            XOperator::Eq => "==",
            XOperator::Ne => "!=",
            XOperator::Lt => "<",
            XOperator::Le => "<=",
            XOperator::Gt => ">",
            XOperator::Ge => ">=",
        }
    }
}

/// A symbolic expression.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Xpr {
    Constant(XConstant),
    Variable(XVariable),
    Compound { op: XOperator, operands: Vec<Xpr> },
}

impl Xpr {
    /// Create an integer constant expression.
    pub fn int_constant(value: i64) -> Xpr {
        Xpr::Constant(XConstant::IntConst(value))
    }

    /// Create a reference to a string literal.
    pub fn string_reference<S>(address: u64, string: S) -> Xpr
    where
        S: Into<String>,
    {
        Xpr::Constant(XConstant::StringRef {
            address,
            string: string.into(),
        })
    }

    pub fn global_address(address: u64) -> Xpr {
        Xpr::Constant(XConstant::GlobalAddress(address))
    }

    pub fn variable(variable: XVariable) -> Xpr {
        Xpr::Variable(variable)
    }

    pub fn register<S>(name: S) -> Xpr
    where
        S: Into<String>,
    {
        Xpr::Variable(XVariable::Register(name.into()))
    }

    pub fn initial_register_value<S>(name: S) -> Xpr
    where
        S: Into<String>,
    {
        Xpr::Variable(XVariable::InitialRegisterValue(name.into()))
    }

    /// Create a binary compound expression.
    pub fn binary(op: XOperator, lhs: Xpr, rhs: Xpr) -> Xpr {
        Xpr::Compound {
            op,
            operands: vec![lhs, rhs],
        }
    }

    /// The address `offset` bytes away from the stack pointer at function
    /// entry.
    pub fn stack_address(offset: i64) -> Xpr {
        let base = Xpr::Variable(XVariable::StackBase);
        match offset.checked_neg() {
            Some(magnitude) if offset < 0 => {
                Xpr::binary(XOperator::Minus, base, Xpr::int_constant(magnitude))
            }
            // i64::MIN has no positive magnitude
            _ => Xpr::binary(XOperator::Plus, base, Xpr::int_constant(offset)),
        }
    }

    /// The address `offset` bytes into the heap region allocated by `site`.
    pub fn heap_address<S>(site: S, offset: i64) -> Xpr
    where
        S: Into<String>,
    {
        Xpr::binary(
            XOperator::Plus,
            Xpr::Variable(XVariable::HeapBase(site.into())),
            Xpr::int_constant(offset),
        )
    }

    pub fn operands(&self) -> &[Xpr] {
        match *self {
            Xpr::Compound { ref operands, .. } => operands,
            Xpr::Constant(_) | Xpr::Variable(_) => &[],
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Xpr::Constant(_))
    }

    pub fn is_int_constant(&self) -> bool {
        matches!(self, Xpr::Constant(XConstant::IntConst(_)))
    }

    /// The value of an integer constant.
    pub fn intvalue(&self) -> Option<i64> {
        match *self {
            Xpr::Constant(XConstant::IntConst(value)) => Some(value),
            _ => None,
        }
    }

    pub fn is_int_const_value(&self, n: i64) -> bool {
        self.intvalue() == Some(n)
    }

    pub fn is_string_reference(&self) -> bool {
        matches!(self, Xpr::Constant(XConstant::StringRef { .. }))
    }

    /// The string literal this expression refers to.
    pub fn string_reference_value(&self) -> Option<&str> {
        match *self {
            Xpr::Constant(XConstant::StringRef { ref string, .. }) => Some(string),
            _ => None,
        }
    }

    pub fn is_global_address(&self) -> bool {
        matches!(
            self,
            Xpr::Constant(XConstant::GlobalAddress(_)) | Xpr::Constant(XConstant::StringRef { .. })
        )
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Xpr::Variable(_))
    }

    pub fn is_register_variable(&self) -> bool {
        matches!(self, Xpr::Variable(XVariable::Register(_)))
    }

    pub fn is_initial_register_value(&self) -> bool {
        matches!(self, Xpr::Variable(XVariable::InitialRegisterValue(_)))
    }

    pub fn is_global_variable(&self) -> bool {
        matches!(self, Xpr::Variable(XVariable::GlobalVariable(_)))
    }

    pub fn is_function_return_value(&self) -> bool {
        matches!(self, Xpr::Variable(XVariable::ReturnValue(_)))
    }

    /// True if this is a value passed into the function, i.e. the initial
    /// value of an argument register.
    pub fn is_argument_value(&self) -> bool {
        self.is_initial_register_value()
    }

    pub fn is_stack_base_address(&self) -> bool {
        matches!(self, Xpr::Variable(XVariable::StackBase))
    }

    pub fn is_heap_base_address(&self) -> bool {
        matches!(self, Xpr::Variable(XVariable::HeapBase(_)))
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Xpr::Compound { .. })
    }

    fn is_base_offset(&self, is_base: fn(&Xpr) -> bool) -> bool {
        match *self {
            Xpr::Compound { op, ref operands } => {
                operands.len() == 2
                    && (op == XOperator::Plus || op == XOperator::Minus)
                    && is_base(&operands[0])
                    && operands[1].is_int_constant()
            }
            _ => false,
        }
    }

    /// True if this is a constant offset from the stack pointer at function
    /// entry.
    pub fn is_stack_address(&self) -> bool {
        self.is_base_offset(Xpr::is_stack_base_address)
    }

    pub fn is_heap_address(&self) -> bool {
        self.is_base_offset(Xpr::is_heap_base_address)
    }

    /// The offset of a stack address from the stack pointer at function
    /// entry.
    pub fn stack_address_offset(&self) -> Result<i64, Error> {
        if !self.is_stack_address() {
            return Err(Error::NotAStackAddress(self.to_string()));
        }
        match *self {
            Xpr::Compound { op, ref operands } => {
                let value = operands[1]
                    .intvalue()
                    .ok_or_else(|| Error::NotAStackAddress(self.to_string()))?;
                if op == XOperator::Minus {
                    value
                        .checked_neg()
                        .ok_or_else(|| Error::NotAStackAddress(self.to_string()))
                } else {
                    Ok(value)
                }
            }
            _ => Err(Error::NotAStackAddress(self.to_string())),
        }
    }
}

impl fmt::Display for XConstant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            XConstant::IntConst(value) => write!(f, "{}", value),
            XConstant::StringRef { address, ref string } => {
                write!(f, "0x{:x}:{:?}", address, string)
            }
            XConstant::GlobalAddress(address) => write!(f, "0x{:x}", address),
        }
    }
}

impl fmt::Display for XVariable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            XVariable::Register(ref name) => write!(f, "{}", name),
            XVariable::InitialRegisterValue(ref name) => write!(f, "{}_in", name),
            XVariable::StackBase => write!(f, "sp_in"),
            XVariable::HeapBase(ref site) => write!(f, "heap@{}", site),
            XVariable::GlobalVariable(address) => write!(f, "gv_0x{:x}", address),
            XVariable::ReturnValue(ref callee) => write!(f, "rtn_{}", callee),
            XVariable::Temporary(ref name) => write!(f, "tmp_{}", name),
        }
    }
}

impl fmt::Display for Xpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Xpr::Constant(ref constant) => write!(f, "{}", constant),
            Xpr::Variable(ref variable) => write!(f, "{}", variable),
            Xpr::Compound { op, ref operands } => {
                if operands.len() == 2 {
                    write!(f, "({} {} {})", operands[0], op.symbol(), operands[1])
                } else {
                    let operands = operands
                        .iter()
                        .map(|operand| operand.to_string())
                        .collect::<Vec<String>>();
                    write!(f, "{}({})", op.symbol(), operands.join(", "))
                }
            }
        }
    }
}
