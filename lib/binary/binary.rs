use crate::architecture::Architecture;
use crate::binary::{Function, InstrAddr};
use crate::buffer::LibraryCallCallsites;
use crate::models::FunctionSummaryLibrary;
use crate::Error;
use std::collections::BTreeMap;

/// All facts about one binary: its functions, the architecture it was
/// compiled for, and the summaries of the library functions it calls.
#[derive(Debug)]
pub struct Binary {
    architecture: Box<dyn Architecture>,
    functions: BTreeMap<InstrAddr, Function>,
    summaries: FunctionSummaryLibrary,
}

impl Binary {
    pub fn new(
        architecture: Box<dyn Architecture>,
        summaries: FunctionSummaryLibrary,
    ) -> Binary {
        Binary {
            architecture,
            functions: BTreeMap::new(),
            summaries,
        }
    }

    pub fn architecture(&self) -> &dyn Architecture {
        self.architecture.as_ref()
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.insert(function.address().clone(), function);
    }

    pub fn function(&self, address: &InstrAddr) -> Option<&Function> {
        self.functions.get(address)
    }

    pub fn functions(&self) -> &BTreeMap<InstrAddr, Function> {
        &self.functions
    }

    pub fn summaries(&self) -> &FunctionSummaryLibrary {
        &self.summaries
    }

    /// Collect every call to a library function in this binary.
    pub fn library_callsites(&self) -> Result<LibraryCallCallsites<'_>, Error> {
        let mut callsites = LibraryCallCallsites::new(&self.summaries);
        for (faddr, function) in &self.functions {
            for (baddr, instructions) in function.call_instructions() {
                for instruction in instructions {
                    let is_stub = instruction
                        .call_target()
                        .map(|target| target.is_stub())
                        .unwrap_or(false);
                    if is_stub {
                        callsites.add_library_callsite(faddr, baddr, instruction)?;
                    }
                }
            }
        }
        Ok(callsites)
    }
}
