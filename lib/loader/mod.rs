//! Loading the facts computed for a binary.
//!
//! The analysis engine writes its results for every function of a binary:
//! blocks, instructions, stack pointer offsets, memory accesses and call
//! arguments. A `Loader` reads them back into a `Binary`.

pub mod json;

use crate::architecture::Architecture;
use crate::binary::{Binary, Function};
use crate::models::FunctionSummaryLibrary;
use crate::Error;

/// Generic trait for all loaders
pub trait Loader {
    /// Get the architecture of the binary
    fn architecture(&self) -> Result<Box<dyn Architecture>, Error>;

    /// Get the functions of the binary, with the facts computed for them
    fn functions(&self) -> Result<Vec<Function>, Error>;

    /// Load the binary, calling library functions summarized in `summaries`
    fn binary(&self, summaries: FunctionSummaryLibrary) -> Result<Binary, Error> {
        let mut binary = Binary::new(self.architecture()?, summaries);
        for function in self.functions()? {
            binary.add_function(function);
        }
        Ok(binary)
    }
}
