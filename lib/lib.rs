//! Stack frame reconstruction and buffer-overflow patch candidates.
//!
//! `stackpatch` is a post-processing layer over the output of a binary
//! abstract-interpretation engine. Given per-instruction facts (stack pointer
//! offsets, memory accesses, call arguments) and a library of function
//! summaries, it reconstructs the stack layout of every function and finds
//! library calls that write into a stack buffer through a length which cannot
//! be bounded statically.
//!
//! # Pipeline
//!
//! * [`invariants`] holds the value domain: bounds, intervals, symbolic
//! expressions and non-relational invariant facts.
//! * [`binary`] holds the facts consumed from the analysis engine: functions,
//! blocks, instructions and their memory accesses.
//! * [`analysis`] reconstructs stack pointer offsets and stack layouts.
//! * [`models`] holds function summaries, their precondition terms and
//! preconditions.
//! * [`buffer`] classifies library call sites and derives patch records.
//! * [`loader`] reads facts and summaries from JSON.
//!
//! ```ignore
//! use stackpatch::buffer;
//! use stackpatch::loader::json;
//!
//! let summaries = json::load_summaries(&summaries_text)?;
//! let binary = json::load_binary(&facts_text, summaries)?;
//! let records = buffer::get_patch_records(&binary, &buffer::Options::new())?;
//! for record in records {
//!     println!("{}", record.to_json());
//! }
//! ```

pub mod analysis;
pub mod architecture;
pub mod binary;
pub mod buffer;
pub mod invariants;
pub mod loader;
pub mod models;
#[cfg(test)]
mod tests;

#[cfg(not(feature = "thread_safe"))]
use std::rc::Rc;
#[cfg(not(feature = "thread_safe"))]
pub type RC<T> = Rc<T>;

#[cfg(feature = "thread_safe")]
use std::sync::Arc;
#[cfg(feature = "thread_safe")]
pub type RC<T> = Arc<T>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Custom(String),
    #[error("Interval error: {0}")]
    Interval(String),
    #[error("Not a singleton: {0}")]
    NotASingleton(String),
    #[error("Expression is not a stack address: {0}")]
    NotAStackAddress(String),
    #[error("Not a library stub target: {0}")]
    NotAStubTarget(String),
    #[error("Call site does not have a summary: {0}")]
    MissingSummary(String),
    #[error("Malformed term: {0}")]
    MalformedTerm(String),
    #[error("Unknown tag: {0}")]
    UnknownTag(String),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
