//! Interpreted strategy: `execute0()` hands each logic node to the rule
//! engine's evaluator.

use rulegen_classfile::{AccessFlags, Opcode};
use rulegen_core::{CompileCause, JvmType, MethodDescriptor, Strategy};

use super::ExecutionBackend;
use crate::UnitBuilder;
use crate::builder::RULE_FIELD;

/// Dispatches through `bind()`, `test()` and `fire()`.
///
/// ```text
/// private void execute0() throws ExecuteException {
///     bind();
///     if (test()) {
///         fire();
///     }
/// }
/// private void bind()    { rule.getEvent().interpret(this); }
/// private boolean test() { return ((Boolean) rule.getCondition().interpret(this)).booleanValue(); }
/// private void fire()    { rule.getAction().interpret(this); }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpretedBackend;

/// One node dispatch method.
struct Dispatch<'r> {
    method: &'static str,
    getter: &'static str,
    node_class: &'r str,
    ret: JvmType,
}

impl ExecutionBackend for InterpretedBackend {
    fn strategy(&self) -> Strategy {
        Strategy::Interpreted
    }

    fn emit(&self, unit: &mut UnitBuilder<'_>) -> Result<(), CompileCause> {
        let class = unit.class_name();
        let runtime = unit.runtime();
        let exception = runtime.execute_exception.as_str();

        let bind = MethodDescriptor::void();
        let test = MethodDescriptor::returning(JvmType::Boolean);

        unit.method(
            AccessFlags::PRIVATE,
            "execute0",
            &MethodDescriptor::void(),
            &[exception],
            |em, _| {
                let skip = em.new_label();
                em.aload(0);
                em.invokespecial(class, "bind", &bind);
                em.aload(0);
                em.invokespecial(class, "test", &test);
                em.branch(Opcode::Ifeq, skip);
                em.aload(0);
                em.invokespecial(class, "fire", &bind);
                em.place_label(skip);
                em.return_value(&JvmType::Void);
                Ok(())
            },
        )?;

        let dispatches = [
            Dispatch {
                method: "bind",
                getter: "getEvent",
                node_class: &runtime.event,
                ret: JvmType::Void,
            },
            Dispatch {
                method: "test",
                getter: "getCondition",
                node_class: &runtime.condition,
                ret: JvmType::Boolean,
            },
            Dispatch {
                method: "fire",
                getter: "getAction",
                node_class: &runtime.action,
                ret: JvmType::Void,
            },
        ];

        for dispatch in dispatches {
            let desc = MethodDescriptor::returning(dispatch.ret.clone());
            unit.method(AccessFlags::PRIVATE, dispatch.method, &desc, &[exception], |em, _| {
                let node = JvmType::class(dispatch.node_class);
                em.aload(0);
                em.getfield(class, RULE_FIELD, &runtime.rule_type());
                em.invokevirtual(&runtime.rule, dispatch.getter, &MethodDescriptor::returning(node));
                em.aload(0);
                em.invokevirtual(dispatch.node_class, "interpret", &runtime.interpret_descriptor());
                if dispatch.ret == JvmType::Boolean {
                    em.checkcast(&JvmType::class("java/lang/Boolean"));
                    em.invokevirtual(
                        "java/lang/Boolean",
                        "booleanValue",
                        &MethodDescriptor::returning(JvmType::Boolean),
                    );
                } else {
                    em.pop_value(&JvmType::object());
                }
                em.return_value(&dispatch.ret);
                Ok(())
            })?;
        }
        Ok(())
    }
}
