//! Buffer-overflow candidates among calls to library functions.

mod library_callsites;
mod options;
mod patch;

pub use self::library_callsites::*;
pub use self::options::*;
pub use self::patch::*;
