use crate::analysis::StackPointerOffset;
use crate::binary::{InstrAddr, MemoryAccess};
use crate::invariants::{NonRelationalFact, Xpr};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The target of a call instruction.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CallTarget {
    /// A function in a shared library, called through a stub.
    Stub { name: String },
    /// A function in the binary itself.
    App { address: u64, name: Option<String> },
    Unknown,
}

impl CallTarget {
    pub fn stub<S>(name: S) -> CallTarget
    where
        S: Into<String>,
    {
        CallTarget::Stub { name: name.into() }
    }

    pub fn is_stub(&self) -> bool {
        matches!(self, CallTarget::Stub { .. })
    }

    pub fn name(&self) -> Option<&str> {
        match *self {
            CallTarget::Stub { ref name } => Some(name),
            CallTarget::App { ref name, .. } => name.as_deref(),
            CallTarget::Unknown => None,
        }
    }
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CallTarget::Stub { ref name } => write!(f, "{}", name),
            CallTarget::App {
                address,
                name: Some(ref name),
            } => write!(f, "{}@{:#x}", name, address),
            CallTarget::App { address, name: None } => write!(f, "sub_{:x}", address),
            CallTarget::Unknown => write!(f, "?"),
        }
    }
}

/// The call performed by a call instruction.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Call {
    target: CallTarget,
    arguments: Vec<Xpr>,
}

impl Call {
    pub fn new(target: CallTarget, arguments: Vec<Xpr>) -> Call {
        Call { target, arguments }
    }

    pub fn target(&self) -> &CallTarget {
        &self.target
    }

    pub fn arguments(&self) -> &[Xpr] {
        &self.arguments
    }
}

/// An instruction, with the facts the analysis engine computed for it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Instruction {
    address: InstrAddr,
    mnemonic: String,
    operands: Vec<String>,
    stackpointer_offset: StackPointerOffset,
    memory_accesses: Vec<MemoryAccess>,
    call: Option<Call>,
    load: bool,
    invariants: Vec<NonRelationalFact>,
    annotation: Option<String>,
}

impl Instruction {
    pub fn new<S>(
        address: InstrAddr,
        mnemonic: S,
        stackpointer_offset: StackPointerOffset,
    ) -> Instruction
    where
        S: Into<String>,
    {
        Instruction {
            address,
            mnemonic: mnemonic.into(),
            operands: Vec::new(),
            stackpointer_offset,
            memory_accesses: Vec::new(),
            call: None,
            load: false,
            invariants: Vec::new(),
            annotation: None,
        }
    }

    pub fn with_operands(mut self, operands: Vec<String>) -> Instruction {
        self.operands = operands;
        self
    }

    pub fn with_memory_access(mut self, memory_access: MemoryAccess) -> Instruction {
        self.memory_accesses.push(memory_access);
        self
    }

    pub fn with_call(mut self, call: Call) -> Instruction {
        self.call = Some(call);
        self
    }

    pub fn with_invariant(mut self, invariant: NonRelationalFact) -> Instruction {
        self.invariants.push(invariant);
        self
    }

    /// Mark this instruction as a load from memory into its first operand.
    pub fn set_load(&mut self, load: bool) {
        self.load = load;
    }

    pub fn set_annotation(&mut self, annotation: Option<String>) {
        self.annotation = annotation;
    }

    pub fn address(&self) -> &InstrAddr {
        &self.address
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn operands(&self) -> &[String] {
        &self.operands
    }

    pub fn stackpointer_offset(&self) -> &StackPointerOffset {
        &self.stackpointer_offset
    }

    pub fn memory_accesses(&self) -> &[MemoryAccess] {
        &self.memory_accesses
    }

    pub fn invariants(&self) -> &[NonRelationalFact] {
        &self.invariants
    }

    pub fn is_load_instruction(&self) -> bool {
        self.load
    }

    pub fn is_call_instruction(&self) -> bool {
        self.call.is_some()
    }

    pub fn call(&self) -> Option<&Call> {
        self.call.as_ref()
    }

    pub fn call_target(&self) -> Option<&CallTarget> {
        self.call.as_ref().map(|call| call.target())
    }

    /// The name of the function this instruction calls, if known.
    pub fn call_target_name(&self) -> Option<&str> {
        self.call_target().and_then(|target| target.name())
    }

    /// The arguments of this call. Empty for instructions which do not call.
    pub fn call_arguments(&self) -> &[Xpr] {
        match self.call {
            Some(ref call) => call.arguments(),
            None => &[],
        }
    }

    /// True if this instruction accesses the stack, or passes a stack address
    /// to a call.
    pub fn touches_stack(&self) -> bool {
        self.memory_accesses
            .iter()
            .any(|access| access.is_stack_address())
            || self
                .call_arguments()
                .iter()
                .any(|argument| argument.is_stack_address())
    }

    /// A human-readable description of this instruction.
    pub fn annotation(&self) -> String {
        match self.annotation {
            Some(ref annotation) => annotation.clone(),
            None => match self.call {
                Some(ref call) => {
                    let arguments = call
                        .arguments()
                        .iter()
                        .map(|argument| argument.to_string())
                        .collect::<Vec<String>>();
                    format!("call {}({})", call.target(), arguments.join(", "))
                }
                None => format!("{} {}", self.mnemonic, self.operands.join(", ")),
            },
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.address,
            self.stackpointer_offset,
            self.annotation()
        )
    }
}
