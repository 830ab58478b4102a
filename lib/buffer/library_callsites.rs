//! Classification of calls to library functions.
//!
//! A call to a summarized library function writes to memory for every
//! `deref-write` precondition of the summary. Each such write is a
//! `LibraryCallSideeffect`. Its destination and length are resolved against
//! the arguments of the call, and classified by where the destination points
//! and how the length is determined. Writes into the stack through a length
//! which is not a constant are patch candidates.

use crate::binary::{InstrAddr, Instruction};
use crate::invariants::{XOperator, Xpr};
use crate::models::{
    ArithmeticOp, BTerm, FunctionPrecondition, FunctionSummary, FunctionSummaryLibrary,
};
use crate::{Error, RC};
use log::{info, warn};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A write to memory performed by a call to a library function.
#[derive(Clone, Debug)]
pub struct LibraryCallSideeffect<'a> {
    summary: RC<FunctionSummary>,
    faddr: InstrAddr,
    baddr: InstrAddr,
    instruction: &'a Instruction,
    tag: String,
    destination: BTerm,
    length: BTerm,
}

impl<'a> LibraryCallSideeffect<'a> {
    /// The side effect of `precondition`, if it is a `deref-write`.
    pub fn new(
        summary: RC<FunctionSummary>,
        faddr: InstrAddr,
        baddr: InstrAddr,
        instruction: &'a Instruction,
        precondition: &FunctionPrecondition,
    ) -> Option<LibraryCallSideeffect<'a>> {
        match *precondition {
            FunctionPrecondition::DerefWrite {
                ref tag,
                ref destination,
                ref length,
                ..
            } => Some(LibraryCallSideeffect {
                summary,
                faddr,
                baddr,
                instruction,
                tag: tag.clone(),
                destination: destination.clone(),
                length: length.clone(),
            }),
            _ => None,
        }
    }

    pub fn summary(&self) -> &FunctionSummary {
        &self.summary
    }

    pub fn faddr(&self) -> &InstrAddr {
        &self.faddr
    }

    pub fn baddr(&self) -> &InstrAddr {
        &self.baddr
    }

    pub fn instruction(&self) -> &'a Instruction {
        self.instruction
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn destination(&self) -> &BTerm {
        &self.destination
    }

    pub fn length(&self) -> &BTerm {
        &self.length
    }

    /// The argument passed for the parameter `name`.
    fn argument(&self, name: &str) -> Option<&'a Xpr> {
        let index = self.summary.parameter_index(name)?;
        let arguments = self.instruction.call_arguments();
        if arguments.len() >= index {
            Some(&arguments[index - 1])
        } else {
            None
        }
    }

    /// The argument the destination of the write is passed in.
    pub fn dstarg(&self) -> Option<&'a Xpr> {
        self.destination
            .parameter_name()
            .and_then(|name| self.argument(name))
    }

    /// Where the destination of the write points.
    pub fn dsttype(&self) -> &'static str {
        match self.dstarg() {
            None => "unknown",
            Some(dstarg) => {
                if dstarg.is_stack_address() {
                    "stack"
                } else if dstarg.is_heap_address() {
                    "heap"
                } else if dstarg.is_global_address() {
                    "global"
                } else if dstarg.is_global_variable() {
                    "global-var"
                } else if dstarg.is_function_return_value() {
                    "function-returnvalue"
                } else if dstarg.is_argument_value() {
                    "function-argument"
                } else {
                    "unknown"
                }
            }
        }
    }

    /// The length of the write, for a length computed from two arguments.
    ///
    /// Operands are parameter references, resolved to the arguments of the
    /// call, or constants. Multiplication by a constant 1 yields the other
    /// operand, and the product of two constants is folded. Any other
    /// combination yields a new compound expression over the two operands.
    pub fn compound_lenarg(&self) -> Option<Xpr> {
        let (op, arg1, arg2) = match self.length {
            BTerm::Arithmetic {
                op,
                ref arg1,
                ref arg2,
            } => (op, arg1, arg2),
            _ => {
                info!(
                    "Length in {} is not an arithmetic expression: {}",
                    self.summary.name(),
                    self.length
                );
                return None;
            }
        };

        let arguments = self.instruction.call_arguments();
        let mut resolved: Vec<Xpr> = Vec::with_capacity(2);
        for term in [&**arg1, &**arg2] {
            match *term {
                BTerm::Constant(value) => resolved.push(Xpr::int_constant(value)),
                BTerm::Named(ref name) => {
                    let index = match self.summary.parameter_index(name) {
                        Some(index) => index,
                        None => {
                            warn!(
                                "No parameter found with name {} in summary for {}",
                                name,
                                self.summary.name()
                            );
                            return None;
                        }
                    };
                    if index > arguments.len() {
                        warn!(
                            "Parameter index {} is out of range in summary for {}",
                            index,
                            self.summary.name()
                        );
                        return None;
                    }
                    resolved.push(arguments[index - 1].clone());
                }
                _ => {
                    info!(
                        "Length arg in {} does not refer to argument: {}",
                        self.summary.name(),
                        self.length
                    );
                    return None;
                }
            }
        }
        let (x1, x2) = (&resolved[0], &resolved[1]);

        if op == ArithmeticOp::Times {
            if x1.is_int_const_value(1) {
                return Some(x2.clone());
            }
            if x2.is_int_const_value(1) {
                return Some(x1.clone());
            }
            if let (Some(v1), Some(v2)) = (x1.intvalue(), x2.intvalue()) {
                if let Some(product) = v1.checked_mul(v2) {
                    return Some(Xpr::int_constant(product));
                }
            }
        }

        let op = match op {
            ArithmeticOp::Times => XOperator::Mult,
            ArithmeticOp::Plus => XOperator::Plus,
        };
        Some(Xpr::binary(op, x1.clone(), x2.clone()))
    }

    /// The expression for the length of the write.
    pub fn lenarg(&self) -> Option<Xpr> {
        if self.length.is_arithmetic_expr() {
            return self.compound_lenarg();
        }
        self.length
            .parameter_name()
            .and_then(|name| self.argument(name))
            .cloned()
    }

    /// How the length of the write is determined.
    pub fn lentype(&self) -> String {
        match self.lenarg() {
            Some(lenarg) => {
                if lenarg.is_constant() {
                    "constant".to_string()
                } else {
                    "expr".to_string()
                }
            }
            None => {
                let lenterm = self.length.to_string();
                if lenterm.starts_with("cn") {
                    "constant".to_string()
                } else if lenterm.starts_with("null-terminator") {
                    "string-length".to_string()
                } else if lenterm == "runtime-value" {
                    lenterm
                } else if lenterm.starts_with("plus(null") {
                    "string-concatenation".to_string()
                } else {
                    lenterm
                }
            }
        }
    }
}

impl<'a> fmt::Display for LibraryCallSideeffect<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.instruction.address(),
            self.instruction.annotation()
        )
    }
}

/// A call to a library function.
#[derive(Clone, Debug)]
pub struct LibraryCallCallsite<'a> {
    faddr: InstrAddr,
    baddr: InstrAddr,
    instruction: &'a Instruction,
    tgtname: String,
    summary: Option<RC<FunctionSummary>>,
}

impl<'a> LibraryCallCallsite<'a> {
    /// Create the call site of `instruction`, looking up the summary of its
    /// target in `library`. The instruction must call a library stub.
    pub fn new(
        faddr: InstrAddr,
        baddr: InstrAddr,
        instruction: &'a Instruction,
        library: &FunctionSummaryLibrary,
    ) -> Result<LibraryCallCallsite<'a>, Error> {
        let tgtname = match instruction.call_target() {
            Some(target) if target.is_stub() => target.to_string(),
            _ => return Err(Error::NotAStubTarget(instruction.address().to_string())),
        };
        let summary = library.get_function_summary(&tgtname);
        Ok(LibraryCallCallsite {
            faddr,
            baddr,
            instruction,
            tgtname,
            summary,
        })
    }

    pub fn faddr(&self) -> &InstrAddr {
        &self.faddr
    }

    pub fn baddr(&self) -> &InstrAddr {
        &self.baddr
    }

    pub fn iaddr(&self) -> &InstrAddr {
        self.instruction.address()
    }

    pub fn instruction(&self) -> &'a Instruction {
        self.instruction
    }

    /// The name of the library function called.
    pub fn tgtname(&self) -> &str {
        &self.tgtname
    }

    pub fn has_summary(&self) -> bool {
        self.summary.is_some()
    }

    pub fn summary(&self) -> Result<&RC<FunctionSummary>, Error> {
        self.summary
            .as_ref()
            .ok_or_else(|| Error::MissingSummary(self.iaddr().to_string()))
    }

    pub fn preconditions(&self) -> &[FunctionPrecondition] {
        match self.summary {
            Some(ref summary) => summary.preconditions(),
            None => &[],
        }
    }

    /// The writes this call performs.
    pub fn derefwrites(&self) -> Vec<LibraryCallSideeffect<'a>> {
        let summary = match self.summary {
            Some(ref summary) => summary,
            None => return Vec::new(),
        };
        summary
            .preconditions()
            .iter()
            .filter_map(|precondition| {
                LibraryCallSideeffect::new(
                    summary.clone(),
                    self.faddr.clone(),
                    self.baddr.clone(),
                    self.instruction,
                    precondition,
                )
            })
            .collect()
    }

    /// Length expressions of writes whose length is computed at runtime.
    pub fn lenarg_exprs(&self) -> Vec<Xpr> {
        self.derefwrites()
            .iter()
            .filter(|write| write.lentype() == "expr")
            .filter_map(|write| write.lenarg())
            .collect()
    }

    /// A reason the length of the input of this call is known, which makes
    /// the call safe regardless of how its writes are classified.
    pub fn known_input_length(&self) -> Option<&'static str> {
        let arguments = self.instruction.call_arguments();
        let literal_without_s = |index: usize| {
            arguments
                .get(index)
                .and_then(|argument| argument.string_reference_value())
                .map(|format| !format.contains("%s"))
                .unwrap_or(false)
        };
        match self.tgtname.as_str() {
            "strcpy" => match arguments.get(1) {
                Some(source) if source.is_string_reference() => Some("strcpy:constant_src"),
                _ => None,
            },
            "sprintf" if literal_without_s(1) => Some("sprintf:max_length_fmt"),
            "snprintf" if literal_without_s(2) => Some("snprintf:max_length_fmt"),
            _ => None,
        }
    }

    /// Writes into the stack through a length which is not constant.
    pub fn patch_candidates(&self) -> Vec<LibraryCallSideeffect<'a>> {
        if self.known_input_length().is_some() {
            return Vec::new();
        }
        self.derefwrites()
            .into_iter()
            .filter(|write| write.dsttype() == "stack")
            .filter(|write| write.lentype() != "constant")
            .collect()
    }
}

fn distribution(counts: BTreeMap<String, usize>) -> Value {
    Value::Array(
        counts
            .into_iter()
            .map(|(name, count)| json!({"name": name, "count": count}))
            .collect(),
    )
}

/// All calls to library functions in a binary, by function address and
/// instruction address.
#[derive(Clone, Debug)]
pub struct LibraryCallCallsites<'a> {
    library: &'a FunctionSummaryLibrary,
    callsites: BTreeMap<InstrAddr, BTreeMap<InstrAddr, LibraryCallCallsite<'a>>>,
    duplicates: BTreeMap<InstrAddr, BTreeMap<InstrAddr, Vec<LibraryCallCallsite<'a>>>>,
}

impl<'a> LibraryCallCallsites<'a> {
    pub fn new(library: &'a FunctionSummaryLibrary) -> LibraryCallCallsites<'a> {
        LibraryCallCallsites {
            library,
            callsites: BTreeMap::new(),
            duplicates: BTreeMap::new(),
        }
    }

    pub fn callsites(
        &self,
    ) -> &BTreeMap<InstrAddr, BTreeMap<InstrAddr, LibraryCallCallsite<'a>>> {
        &self.callsites
    }

    /// Call sites added for an instruction which was already added.
    pub fn duplicates(
        &self,
    ) -> &BTreeMap<InstrAddr, BTreeMap<InstrAddr, Vec<LibraryCallCallsite<'a>>>> {
        &self.duplicates
    }

    pub fn callsite(
        &self,
        faddr: &InstrAddr,
        iaddr: &InstrAddr,
    ) -> Option<&LibraryCallCallsite<'a>> {
        self.callsites
            .get(faddr)
            .and_then(|callsites| callsites.get(iaddr))
    }

    /// Add the call performed by `instruction`. The first call site added for
    /// an instruction is kept; later ones are recorded as duplicates.
    pub fn add_library_callsite(
        &mut self,
        faddr: &InstrAddr,
        baddr: &InstrAddr,
        instruction: &'a Instruction,
    ) -> Result<(), Error> {
        let iaddr = instruction.address().clone();
        let callsite =
            LibraryCallCallsite::new(faddr.clone(), baddr.clone(), instruction, self.library)?;
        let callsites = self.callsites.entry(faddr.clone()).or_default();
        if callsites.contains_key(&iaddr) {
            warn!("Duplicate instruction in {}: {}", faddr, iaddr);
            self.duplicates
                .entry(faddr.clone())
                .or_default()
                .entry(iaddr)
                .or_default()
                .push(callsite);
        } else {
            callsites.insert(iaddr, callsite);
        }
        Ok(())
    }

    fn iter(&self) -> impl Iterator<Item = &LibraryCallCallsite<'a>> {
        self.callsites.values().flat_map(|callsites| callsites.values())
    }

    fn count<F, I>(&self, f: F) -> BTreeMap<String, usize>
    where
        F: Fn(&LibraryCallCallsite<'a>) -> I,
        I: IntoIterator<Item = String>,
    {
        let mut result = BTreeMap::new();
        for callsite in self.iter() {
            for name in f(callsite) {
                *result.entry(name).or_insert(0) += 1;
            }
        }
        result
    }

    pub fn n_librarycalls(&self) -> usize {
        self.iter().count()
    }

    pub fn n_summarized(&self) -> usize {
        self.iter().filter(|callsite| callsite.has_summary()).count()
    }

    pub fn n_writing_sideeffect(&self) -> usize {
        self.iter()
            .map(|callsite| callsite.derefwrites().len())
            .sum()
    }

    pub fn sideeffect_destination_types(&self) -> BTreeMap<String, usize> {
        self.count(|callsite| {
            callsite
                .derefwrites()
                .iter()
                .map(|write| write.dsttype().to_string())
                .collect::<Vec<String>>()
        })
    }

    pub fn sideeffect_length_types(&self) -> BTreeMap<String, usize> {
        self.count(|callsite| {
            callsite
                .derefwrites()
                .iter()
                .map(|write| write.lentype())
                .collect::<Vec<String>>()
        })
    }

    /// Length expressions computed at runtime, with register contents
    /// reported as `unknown` and argument values as `function argument`.
    pub fn sideeffect_length_exprs(&self) -> BTreeMap<String, usize> {
        self.count(|callsite| {
            callsite
                .lenarg_exprs()
                .iter()
                .map(|x| {
                    if x.is_register_variable() {
                        "unknown".to_string()
                    } else if x.is_initial_register_value() {
                        "function argument".to_string()
                    } else {
                        x.to_string()
                    }
                })
                .collect::<Vec<String>>()
        })
    }

    pub fn known_input_length_sideeffect_writes(&self) -> BTreeMap<String, usize> {
        self.count(|callsite| callsite.known_input_length().map(|r| r.to_string()))
    }

    /// Instructions performing a write which is a patch candidate.
    pub fn patch_candidates(&self) -> Vec<&'a Instruction> {
        self.iter()
            .flat_map(|callsite| callsite.patch_candidates())
            .map(|write| write.instruction())
            .collect()
    }

    pub fn patch_callsites(&self) -> Vec<LibraryCallSideeffect<'a>> {
        self.iter()
            .flat_map(|callsite| callsite.patch_candidates())
            .collect()
    }

    /// Patch candidates by the name of the function called.
    pub fn patch_candidates_distribution(&self) -> BTreeMap<String, usize> {
        self.count(|callsite| {
            callsite
                .patch_candidates()
                .iter()
                .map(|write| write.summary().name().to_string())
                .collect::<Vec<String>>()
        })
    }

    /// Calls to library functions without a summary, by function name.
    pub fn missing_summaries(&self) -> BTreeMap<String, usize> {
        self.count(|callsite| {
            if callsite.has_summary() {
                None
            } else {
                Some(callsite.tgtname().to_string())
            }
        })
    }

    /// A report of the statistics over all call sites.
    pub fn to_json(&self) -> Value {
        let instructions = self
            .patch_candidates()
            .into_iter()
            .map(|instruction| {
                let annotation = instruction.annotation();
                let annotation = annotation
                    .strip_prefix("call ")
                    .unwrap_or(&annotation)
                    .to_string();
                json!({
                    "address": instruction.address().as_str(),
                    "annotation": annotation,
                })
            })
            .collect::<Vec<Value>>();

        json!({
            "library-calls": self.n_librarycalls(),
            "summarized": self.n_summarized(),
            "sideeffect": self.n_writing_sideeffect(),
            "patch-candidates": instructions.len(),
            "sideeffect-destination-types": distribution(self.sideeffect_destination_types()),
            "sideeffect-length-types": distribution(self.sideeffect_length_types()),
            "known-input-length-types": distribution(self.known_input_length_sideeffect_writes()),
            "length-expressions": distribution(self.sideeffect_length_exprs()),
            "patch-candidate-instructions": instructions,
            "patch-candidates-distribution": distribution(self.patch_candidates_distribution()),
            "missing-summaries": distribution(self.missing_summaries()),
        })
    }
}
