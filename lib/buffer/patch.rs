//! Patch records for calls which may overflow a stack buffer.

use crate::analysis::{StackBuffer, StackLayout};
use crate::architecture::Architecture;
use crate::binary::{Binary, Block, InstrAddr, Instruction};
use crate::buffer::Options;
use crate::invariants::Xpr;
use crate::Error;
use log::{debug, trace};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// A call which may overflow a stack buffer, with the facts needed to patch
/// it.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchRecord {
    iaddr: InstrAddr,
    spare: Option<InstrAddr>,
    faddr: InstrAddr,
    fname: Option<String>,
    callee: String,
    arguments: Vec<Xpr>,
    buffer: StackBuffer,
}

impl PatchRecord {
    pub fn new<S>(
        iaddr: InstrAddr,
        spare: Option<InstrAddr>,
        faddr: InstrAddr,
        fname: Option<String>,
        callee: S,
        arguments: Vec<Xpr>,
        buffer: StackBuffer,
    ) -> PatchRecord
    where
        S: Into<String>,
    {
        PatchRecord {
            iaddr,
            spare,
            faddr,
            fname,
            callee: callee.into(),
            arguments,
            buffer,
        }
    }

    pub fn iaddr(&self) -> &InstrAddr {
        &self.iaddr
    }

    pub fn spare(&self) -> Option<&InstrAddr> {
        self.spare.as_ref()
    }

    pub fn faddr(&self) -> &InstrAddr {
        &self.faddr
    }

    pub fn fname(&self) -> Result<&str, Error> {
        self.fname
            .as_deref()
            .ok_or_else(|| Error::Custom(format!("Function does not have a name: {}", self.faddr)))
    }

    pub fn callee(&self) -> &str {
        &self.callee
    }

    pub fn arguments(&self) -> &[Xpr] {
        &self.arguments
    }

    pub fn buffer(&self) -> &StackBuffer {
        &self.buffer
    }

    /// The format string of a call to `sprintf`, when it is a string literal.
    pub fn formatstring(&self) -> Option<&str> {
        if self.callee != "sprintf" {
            return None;
        }
        self.arguments
            .get(1)
            .and_then(|argument| argument.string_reference_value())
    }

    pub fn has_size(&self) -> bool {
        self.buffer.size().is_some()
    }

    pub fn to_json(&self) -> Value {
        let mut result = json!({
            "faddr": self.faddr.as_str(),
            "iaddr": self.iaddr.as_str(),
        });
        if let Some(ref spare) = self.spare {
            result["spare"] = json!(spare.as_str());
        }
        if let Some(size) = self.buffer.size() {
            result["buffersize"] = json!(size);
        }
        if let Some(fmtstring) = self.formatstring() {
            result["fmtstring"] = json!(fmtstring);
            result["fmtspecs"] = json!(fmtstring.matches('%').count());
        }
        result
    }
}

/// The stack buffer a call to `callee` writes to, if its destination is a
/// stack address.
pub fn get_stackbuffer(
    stack_layout: &StackLayout,
    callee: &str,
    instruction: &Instruction,
) -> Result<Option<StackBuffer>, Error> {
    match callee {
        "strcpy" | "sprintf" => match instruction.call_arguments().first() {
            Some(dstarg) if dstarg.is_stack_address() => {
                let offset = dstarg.stack_address_offset()?;
                Ok(stack_layout.stackbuffer(offset))
            }
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

/// True if the arguments of a call to `callee` may not all be known
/// statically.
///
/// A `strcpy` from a string literal and an `sprintf` with a literal format
/// which has no `%s` conversion are known. A non-literal `sprintf` format is
/// not.
pub fn has_non_constant_args(callee: &str, instruction: &Instruction) -> bool {
    let arguments = instruction.call_arguments();
    match callee {
        "strcpy" => !arguments
            .get(1)
            .map(|source| source.is_string_reference())
            .unwrap_or(false),
        "sprintf" => match arguments.get(1).and_then(|format| format.string_reference_value()) {
            Some(format) => format.contains("%s"),
            None => true,
        },
        _ => false,
    }
}

/// An instruction a patch for the call at `iaddr` may overwrite.
pub fn find_spare_instruction(
    architecture: &dyn Architecture,
    block: &Block,
    iaddr: &InstrAddr,
) -> Option<InstrAddr> {
    architecture.spare_instruction(block, iaddr)
}

/// Find every call to a selected library function which may overflow a
/// stack buffer.
pub fn get_patch_records(binary: &Binary, options: &Options) -> Result<Vec<PatchRecord>, Error> {
    let mut results: BTreeMap<InstrAddr, PatchRecord> = BTreeMap::new();

    for (faddr, function) in binary.functions() {
        debug!(
            "Finding patch records in {}",
            function.name().unwrap_or_else(|| faddr.as_str())
        );
        let mut stack_layout: Option<StackLayout> = None;

        for (baddr, instructions) in function.call_instructions() {
            for instruction in instructions {
                let callee = match instruction.call_target_name() {
                    Some(callee) => callee,
                    None => continue,
                };
                if !options.is_selected(callee) || !has_non_constant_args(callee, instruction) {
                    continue;
                }

                if stack_layout.is_none() {
                    stack_layout = Some(function.stack_layout()?);
                }
                let buffer = match stack_layout {
                    Some(ref stack_layout) => get_stackbuffer(stack_layout, callee, instruction)?,
                    None => None,
                };
                let buffer = match buffer {
                    Some(buffer) => buffer,
                    None => {
                        trace!("No stack buffer for {} at {}", callee, instruction.address());
                        continue;
                    }
                };

                let spare = if options.find_spare() {
                    function.block(baddr).and_then(|block| {
                        find_spare_instruction(binary.architecture(), block, instruction.address())
                    })
                } else {
                    None
                };

                let iaddr = instruction.address().clone();
                results.insert(
                    iaddr.clone(),
                    PatchRecord::new(
                        iaddr,
                        spare,
                        faddr.clone(),
                        function.name().map(|name| name.to_string()),
                        callee,
                        instruction.call_arguments().to_vec(),
                        buffer,
                    ),
                );
            }
        }
    }

    Ok(results.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StackPointerOffset;
    use crate::binary::{Call, CallTarget};

    fn call(callee: &str, arguments: Vec<Xpr>) -> Instruction {
        Instruction::new(
            InstrAddr::from_u64(0x400100),
            "jalr",
            StackPointerOffset::exact(-48),
        )
        .with_call(Call::new(CallTarget::stub(callee), arguments))
    }

    fn record(callee: &str, arguments: Vec<Xpr>, buffer: StackBuffer) -> PatchRecord {
        PatchRecord::new(
            InstrAddr::from_u64(0x400100),
            None,
            InstrAddr::from_u64(0x400000),
            None,
            callee,
            arguments,
            buffer,
        )
    }

    #[test]
    fn non_constant_args() {
        let dest = Xpr::stack_address(-40);
        let literal = |s: &str| Xpr::string_reference(0x41_0000, s);

        assert!(has_non_constant_args(
            "strcpy",
            &call("strcpy", vec![dest.clone(), Xpr::register("a1")])
        ));
        assert!(!has_non_constant_args(
            "strcpy",
            &call("strcpy", vec![dest.clone(), literal("hello")])
        ));
        assert!(has_non_constant_args(
            "sprintf",
            &call("sprintf", vec![dest.clone(), literal("%s:%d")])
        ));
        assert!(!has_non_constant_args(
            "sprintf",
            &call("sprintf", vec![dest.clone(), literal("%d")])
        ));
        assert!(has_non_constant_args(
            "sprintf",
            &call("sprintf", vec![dest.clone(), Xpr::register("a1")])
        ));
        assert!(!has_non_constant_args(
            "memcpy",
            &call("memcpy", vec![dest, Xpr::register("a1")])
        ));
    }

    #[test]
    fn formatstring() {
        let buffer = StackBuffer::new(-40, Some(-4), Some(-4));
        let record_ = record(
            "sprintf",
            vec![
                Xpr::stack_address(-40),
                Xpr::string_reference(0x41_0000, "%s-%d%%"),
            ],
            buffer,
        );
        assert_eq!(record_.formatstring(), Some("%s-%d%%"));
        assert!(record_.has_size());

        let value = record_.to_json();
        assert_eq!(value["faddr"], "0x400000");
        assert_eq!(value["iaddr"], "0x400100");
        assert_eq!(value["buffersize"], 36);
        assert_eq!(value["fmtstring"], "%s-%d%%");
        assert_eq!(value["fmtspecs"], 4);
        assert!(value.get("spare").is_none());

        let record_ = record(
            "strcpy",
            vec![
                Xpr::stack_address(-40),
                Xpr::string_reference(0x41_0000, "%s"),
            ],
            StackBuffer::new(-40, None, None),
        );
        assert_eq!(record_.formatstring(), None);
        assert!(!record_.has_size());
        let value = record_.to_json();
        assert!(value.get("buffersize").is_none());
        assert!(value.get("fmtstring").is_none());
        assert!(record_.fname().is_err());
    }
}
