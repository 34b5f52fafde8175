//! Execution strategies.

use std::fmt;

/// How a generated adapter runs the rule's logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Event, condition and action are inlined as bytecode.
    Compiled,
    /// Dispatch goes through the rule engine's tree-walking evaluator.
    Interpreted,
}

impl Strategy {
    /// Tag embedded in generated class names.
    pub fn tag(self) -> &'static str {
        match self {
            Strategy::Compiled => "Compiled",
            Strategy::Interpreted => "Interpreted",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Compiled => f.write_str("compiled"),
            Strategy::Interpreted => f.write_str("interpreted"),
        }
    }
}
