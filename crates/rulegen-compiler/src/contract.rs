//! Names of the rule engine types a generated adapter links against.

use rulegen_core::{JvmType, MethodDescriptor};

/// JVM internal names of the runtime classes referenced by generated code.
///
/// The defaults name the Byteman agent's classes. Embedders running a
/// repackaged engine override individual names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeClasses {
    /// The rule object handed to the adapter constructor.
    pub rule: String,
    /// Interface every adapter implements.
    pub helper_adapter: String,
    /// Checked exception declared by `execute` and the strategy methods.
    pub execute_exception: String,
    /// Event logic node type.
    pub event: String,
    /// Condition logic node type.
    pub condition: String,
    /// Action logic node type.
    pub action: String,
    /// Class whose static predicate gates execution tracing.
    pub trace_gate: String,
    /// Name of the `()Z` static predicate on [`trace_gate`](Self::trace_gate).
    pub trace_gate_method: String,
    /// Generator name written into `SourceDebugExtension`.
    pub generator: String,
}

impl Default for RuntimeClasses {
    fn default() -> Self {
        Self {
            rule: "org/jboss/byteman/rule/Rule".into(),
            helper_adapter: "org/jboss/byteman/rule/helper/HelperAdapter".into(),
            execute_exception: "org/jboss/byteman/rule/exception/ExecuteException".into(),
            event: "org/jboss/byteman/rule/Event".into(),
            condition: "org/jboss/byteman/rule/Condition".into(),
            action: "org/jboss/byteman/rule/Action".into(),
            trace_gate: "org/jboss/byteman/agent/Transformer".into(),
            trace_gate_method: "isVerbose".into(),
            generator: "rulegen".into(),
        }
    }
}

impl RuntimeClasses {
    /// The rule type.
    pub fn rule_type(&self) -> JvmType {
        JvmType::class(&self.rule)
    }

    /// `(HelperAdapter)Object`, the signature of `interpret` on every logic node.
    pub fn interpret_descriptor(&self) -> MethodDescriptor {
        MethodDescriptor::new(
            vec![JvmType::class(&self.helper_adapter)],
            JvmType::object(),
        )
    }

    /// `(Rule)V`, the adapter constructor and the preferred helper constructor.
    pub fn rule_constructor_descriptor(&self) -> MethodDescriptor {
        MethodDescriptor::new(vec![self.rule_type()], JvmType::Void)
    }
}
