use crate::Error;
use serde::{Deserialize, Serialize};

const DEFAULT_CALLEES: [&str; 2] = ["strcpy", "sprintf"];

fn default_callees() -> Vec<String> {
    DEFAULT_CALLEES.iter().map(|callee| callee.to_string()).collect()
}

fn default_find_spare() -> bool {
    true
}

/// Options for deriving patch records.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Options {
    #[serde(default = "default_callees")]
    callees: Vec<String>,
    #[serde(default = "default_find_spare")]
    find_spare: bool,
}

impl Options {
    /// Create a new set of Options with the default settings.
    pub fn new() -> Options {
        Options::default()
    }

    /// Read options from a JSON configuration, such as
    /// `{"callees": ["strcpy"], "find_spare": false}`. Missing fields keep
    /// their defaults.
    pub fn from_json(text: &str) -> Result<Options, Error> {
        Ok(serde_json::from_str(text)?)
    }

    /// The library functions whose call sites are checked.
    pub fn callees(&self) -> &[String] {
        &self.callees
    }

    pub fn set_callees(&mut self, callees: Vec<String>) {
        self.callees = callees;
    }

    pub fn is_selected(&self, callee: &str) -> bool {
        self.callees.iter().any(|c| c == callee)
    }

    /// Whether to look for an instruction a patch may overwrite.
    pub fn find_spare(&self) -> bool {
        self.find_spare
    }

    pub fn set_find_spare(&mut self, find_spare: bool) {
        self.find_spare = find_spare;
    }
}

impl Default for Options {
    fn default() -> Options {
        Options {
            callees: default_callees(),
            find_spare: default_find_spare(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = Options::new();
        assert!(options.is_selected("strcpy"));
        assert!(options.is_selected("sprintf"));
        assert!(!options.is_selected("memcpy"));
        assert!(options.find_spare());
    }

    #[test]
    fn from_json() {
        let options = Options::from_json(r#"{"callees": ["strcat"]}"#).unwrap();
        assert_eq!(options.callees(), &["strcat".to_string()]);
        assert!(options.find_spare());

        let options = Options::from_json(r#"{"find_spare": false}"#).unwrap();
        assert!(options.is_selected("strcpy"));
        assert!(!options.find_spare());

        assert!(Options::from_json("[1, 2]").is_err());
    }
}
