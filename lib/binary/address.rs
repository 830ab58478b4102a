//! Instruction and function addresses.
//!
//! The analysis engine names instructions by their address in hex, such as
//! `0x400f20`. Instructions lifted in a synthetic or relocated context carry
//! a prefix, such as `F:0x400a00:0x400f20`, naming that context. Addresses are
//! ordered by their numeric value, then by their text, so instructions of one
//! block sort in program order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct InstrAddr(String);

impl InstrAddr {
    pub fn new<S>(address: S) -> InstrAddr
    where
        S: Into<String>,
    {
        InstrAddr(address.into())
    }

    /// Create an address from its numeric value.
    pub fn from_u64(address: u64) -> InstrAddr {
        InstrAddr(format!("{:#x}", address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric value of the address, ignoring any context prefix.
    pub fn value(&self) -> Option<u64> {
        let address = self.0.rsplit(':').next().unwrap_or(&self.0);
        let address = address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
            .unwrap_or(address);
        u64::from_str_radix(address, 16).ok()
    }

    /// The context prefix of the address, if there is one.
    pub fn context(&self) -> Option<&str> {
        self.0.rfind(':').map(|position| &self.0[..position])
    }
}

impl Ord for InstrAddr {
    fn cmp(&self, other: &InstrAddr) -> Ordering {
        self.value()
            .cmp(&other.value())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for InstrAddr {
    fn partial_cmp(&self, other: &InstrAddr) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for InstrAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrAddr {
    fn from(address: &str) -> InstrAddr {
        InstrAddr::new(address)
    }
}

impl From<u64> for InstrAddr {
    fn from(address: u64) -> InstrAddr {
        InstrAddr::from_u64(address)
    }
}
