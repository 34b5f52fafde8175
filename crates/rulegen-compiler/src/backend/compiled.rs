//! Compiled strategy: the rule's logic is inlined into `execute0()`.

use rulegen_classfile::{AccessFlags, Opcode};
use rulegen_core::{CompileCause, JvmType, MethodDescriptor, Strategy};

use super::ExecutionBackend;
use crate::UnitBuilder;

/// Inlines event, condition and action.
///
/// ```text
/// private void execute0() throws ExecuteException {
///     <event>
///     if (<condition>) {
///         <action>
///     }
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CompiledBackend;

impl ExecutionBackend for CompiledBackend {
    fn strategy(&self) -> Strategy {
        Strategy::Compiled
    }

    fn emit(&self, unit: &mut UnitBuilder<'_>) -> Result<(), CompileCause> {
        let rule = unit.rule();
        let exception = unit.runtime().execute_exception.as_str();

        unit.method(
            AccessFlags::PRIVATE,
            "execute0",
            &MethodDescriptor::void(),
            &[exception],
            |em, adapter| {
                // The rule line must be in place before the first instruction.
                em.notify_source_line(rule.line());

                rule.event().compile(em, adapter)?;
                em.assert_balanced();

                rule.condition().compile(em, adapter)?;
                let depth = em.context().stack_depth();
                assert!(
                    depth == 1,
                    "unexpected stack count: condition left {} slots, expected 1",
                    depth
                );
                let skip = em.new_label();
                em.branch(Opcode::Ifeq, skip);

                rule.action().compile(em, adapter)?;
                em.assert_balanced();
                em.place_label(skip);

                em.notify_source_end();
                em.return_value(&JvmType::Void);
                Ok(())
            },
        )
    }
}
