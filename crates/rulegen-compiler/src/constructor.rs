//! Superclass constructor resolution.

use rulegen_core::{CompileCause, HelperClass, JvmType, MethodDescriptor};

/// The helper constructor an adapter's `<init>` chains to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperConstructor {
    /// `Helper(Rule)`.
    RuleArg,
    /// `Helper()`.
    Default,
    /// Neither is declared.
    NotFound,
}

impl SuperConstructor {
    /// Rank the helper's declared constructors: `(Rule)` first, then `()`.
    ///
    /// A private match is an error rather than a reason to try the next
    /// rank, since the generated subclass could never call it.
    pub fn resolve(helper: &HelperClass, rule_type: &JvmType) -> Result<Self, CompileCause> {
        let ranked = [
            (SuperConstructor::RuleArg, vec![rule_type.clone()]),
            (SuperConstructor::Default, Vec::new()),
        ];
        for (choice, params) in ranked {
            if let Some(ctor) = helper.declared_constructor(&params) {
                if !ctor.access.is_subclass_accessible() {
                    return Err(CompileCause::InaccessibleConstructor(helper.binary_name()));
                }
                return Ok(choice);
            }
        }
        Ok(SuperConstructor::NotFound)
    }

    /// Descriptor of the chosen constructor, or `None` when not found.
    pub fn descriptor(self, rule_type: &JvmType) -> Option<MethodDescriptor> {
        match self {
            SuperConstructor::RuleArg => Some(MethodDescriptor::new(
                vec![rule_type.clone()],
                JvmType::Void,
            )),
            SuperConstructor::Default => Some(MethodDescriptor::void()),
            SuperConstructor::NotFound => None,
        }
    }
}
