use crate::models::{BTerm, FunctionPrecondition};
use crate::RC;
use log::debug;
use rustc_hash::FxHashMap;

/// A parameter precondition declaring a pointer to a null-terminated string
/// which the function reads.
pub const DEREF_READ_NT: &str = "deref-read-nt";

/// A formal parameter of a library function.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FunctionParameter {
    name: String,
    type_: Option<String>,
    preconditions: Vec<String>,
}

impl FunctionParameter {
    pub fn new<S>(name: S, type_: Option<String>) -> FunctionParameter
    where
        S: Into<String>,
    {
        FunctionParameter {
            name: name.into(),
            type_,
            preconditions: Vec::new(),
        }
    }

    /// Declare a precondition on this parameter by its tag.
    pub fn with_precondition<S>(mut self, tag: S) -> FunctionParameter
    where
        S: Into<String>,
    {
        self.preconditions.push(tag.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_(&self) -> Option<&str> {
        self.type_.as_deref()
    }

    /// The type this parameter points to, if it is a pointer.
    pub fn pointee_type(&self) -> Option<&str> {
        self.type_
            .as_deref()
            .map(str::trim_end)
            .and_then(|type_| type_.strip_suffix('*'))
            .map(str::trim_end)
    }

    /// The preconditions this parameter declares.
    pub fn preconditions(&self) -> Vec<FunctionPrecondition> {
        let mut result = Vec::new();
        for tag in &self.preconditions {
            if tag != DEREF_READ_NT {
                debug!("ignoring parameter precondition {} on {}", tag, self.name);
                continue;
            }
            match self.pointee_type() {
                Some(pointee) => {
                    let string = BTerm::named(self.name.as_str());
                    let length = BTerm::null_terminator_pos(string.clone());
                    result.push(FunctionPrecondition::deref_read(pointee, string, length));
                }
                None => debug!("{} declared on non-pointer parameter {}", tag, self.name),
            }
        }
        result
    }
}

/// The semantics section of a function summary.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FunctionSemantics {
    preconditions: Vec<FunctionPrecondition>,
}

impl FunctionSemantics {
    pub fn new(preconditions: Vec<FunctionPrecondition>) -> FunctionSemantics {
        FunctionSemantics { preconditions }
    }

    pub fn preconditions(&self) -> &[FunctionPrecondition] {
        &self.preconditions
    }
}

/// Signature and semantics of a library function.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FunctionSummary {
    name: String,
    library: Option<String>,
    parameters: Vec<FunctionParameter>,
    semantics: FunctionSemantics,
}

impl FunctionSummary {
    /// Create a summary. Preconditions declared on parameters are added to
    /// the preconditions of the semantics.
    pub fn new<S>(
        name: S,
        parameters: Vec<FunctionParameter>,
        preconditions: Vec<FunctionPrecondition>,
    ) -> FunctionSummary
    where
        S: Into<String>,
    {
        let mut preconditions = preconditions;
        for parameter in &parameters {
            preconditions.append(&mut parameter.preconditions());
        }
        FunctionSummary {
            name: name.into(),
            library: None,
            parameters,
            semantics: FunctionSemantics::new(preconditions),
        }
    }

    pub fn with_library<S>(mut self, library: S) -> FunctionSummary
    where
        S: Into<String>,
    {
        self.library = Some(library.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn library(&self) -> Option<&str> {
        self.library.as_deref()
    }

    pub fn parameters(&self) -> &[FunctionParameter] {
        &self.parameters
    }

    /// The 1-based position of the parameter `name`.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters
            .iter()
            .position(|parameter| parameter.name() == name)
            .map(|index| index + 1)
    }

    pub fn semantics(&self) -> &FunctionSemantics {
        &self.semantics
    }

    pub fn preconditions(&self) -> &[FunctionPrecondition] {
        self.semantics.preconditions()
    }
}

/// Function summaries, by function name.
#[derive(Clone, Debug, Default)]
pub struct FunctionSummaryLibrary {
    summaries: FxHashMap<String, RC<FunctionSummary>>,
}

impl FunctionSummaryLibrary {
    pub fn new() -> FunctionSummaryLibrary {
        FunctionSummaryLibrary {
            summaries: FxHashMap::default(),
        }
    }

    /// Add a summary, replacing any summary of a function with the same name.
    pub fn add_summary(&mut self, summary: FunctionSummary) {
        self.summaries
            .insert(summary.name().to_string(), RC::new(summary));
    }

    pub fn has_function_summary(&self, name: &str) -> bool {
        self.summaries.contains_key(name)
    }

    pub fn get_function_summary(&self, name: &str) -> Option<RC<FunctionSummary>> {
        self.summaries.get(name).cloned()
    }

    pub fn summaries(&self) -> impl Iterator<Item = &RC<FunctionSummary>> {
        self.summaries.values()
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}
