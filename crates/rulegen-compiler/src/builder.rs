//! UnitBuilder - assembles one helper adapter class.
//!
//! ## Layout of a generated adapter
//!
//! ```text
//! public class <Helper>_HelperAdapter_<Strategy>_<n> extends <Helper>
//!         implements HelperAdapter {
//!     private <T> <binding>;          // one per stored binding
//!     private Rule rule;
//!
//!     public <init>(Rule)
//!     public void execute(Object recipient, Object[] args) throws ExecuteException
//!     public void setBinding(String, Object)
//!     public Object getBinding(String)
//!     public String getName()
//!     public Object getAccessibleField(Object, int)
//!     public void setAccessibleField(Object, Object, int)
//!     public Object invokeAccessibleMethod(Object, Object[], int)
//!     private void execute0() throws ExecuteException   // plus strategy methods
//! }
//! ```
//!
//! Steps run in a fixed order and never backtrack. The first failure aborts
//! the build; no partial class is returned.

use rulegen_classfile::{AccessFlags, ClassWriter, Label, Opcode};
use rulegen_core::{CompileCause, HelperClass, JvmType, MethodDescriptor, Strategy};
use tracing::{debug, trace};

use crate::backend;
use crate::constructor::SuperConstructor;
use crate::layout::{BindingLayout, Slot};
use crate::rule::{AdapterView, Rule};
use crate::{CompilerOptions, MethodEmitter, RuntimeClasses};

/// Name of the field holding the rule.
pub const RULE_FIELD: &str = "rule";

/// Builds the class file for one adapter.
pub struct UnitBuilder<'a> {
    rule: &'a dyn Rule,
    helper: &'a HelperClass,
    class_name: &'a str,
    strategy: Strategy,
    options: &'a CompilerOptions,
    layout: BindingLayout<'a>,
    writer: ClassWriter,
}

impl<'a> UnitBuilder<'a> {
    /// Prepare a build of `rule`'s adapter, named `class_name` (internal form).
    pub fn new(
        rule: &'a dyn Rule,
        helper: &'a HelperClass,
        class_name: &'a str,
        strategy: Strategy,
        options: &'a CompilerOptions,
    ) -> Self {
        let runtime = &options.runtime;
        let writer = ClassWriter::new(
            options.version,
            AccessFlags::PUBLIC | AccessFlags::SUPER,
            class_name,
            helper.internal_name(),
            &[runtime.helper_adapter.as_str()],
        );
        Self {
            rule,
            helper,
            class_name,
            strategy,
            options,
            layout: BindingLayout::plan_all(rule.bindings(), rule.access_policy()),
            writer,
        }
    }

    /// Run every step and serialize the class.
    pub fn build(mut self) -> Result<Vec<u8>, CompileCause> {
        self.emit_header();
        self.emit_fields();
        self.emit_constructor()?;
        self.emit_execute()?;
        self.emit_set_binding()?;
        self.emit_get_binding()?;
        self.emit_get_name()?;
        self.emit_forwarders()?;
        backend::for_strategy(self.strategy).emit(&mut self)?;

        let bytes = self.writer.to_bytes()?;
        debug!(
            helper = self.helper.internal_name(),
            strategy = %self.strategy,
            class = self.class_name,
            fields = self.layout.field_count(),
            methods = self.writer.method_count(),
            bytes = bytes.len(),
            "built helper adapter"
        );
        Ok(bytes)
    }

    pub(crate) fn rule(&self) -> &'a dyn Rule {
        self.rule
    }

    pub(crate) fn class_name(&self) -> &'a str {
        self.class_name
    }

    pub(crate) fn runtime(&self) -> &'a RuntimeClasses {
        &self.options.runtime
    }

    /// Add a method whose body `body` emits. The receiver and parameters
    /// occupy the first local slots.
    pub(crate) fn method<F>(
        &mut self,
        access: AccessFlags,
        name: &str,
        desc: &MethodDescriptor,
        exceptions: &[&str],
        body: F,
    ) -> Result<(), CompileCause>
    where
        F: FnOnce(&mut MethodEmitter<'_>, &AdapterView<'_>) -> Result<(), CompileCause>,
    {
        let view = AdapterView::new(self.class_name, &self.layout);
        emit_method(&mut self.writer, access, name, desc, exceptions, |em| {
            body(em, &view)
        })
    }

    // ==========================================================================
    // Header and Fields
    // ==========================================================================

    fn emit_header(&mut self) {
        let file = self.rule.file();
        let base = file.rsplit(['/', '\\']).next().unwrap_or(file);
        let debug = format!(
            "// compiled from: {}\n// generated by {}\n",
            file,
            self.runtime().generator
        );
        self.writer.set_source_file(base);
        self.writer.set_source_debug_extension(&debug);
    }

    fn emit_fields(&mut self) {
        for entry in self.layout.fields() {
            if let Some((name, ty)) = entry.slot.field() {
                self.writer.add_field(AccessFlags::PRIVATE, name, ty);
            }
        }
        let rule_type = self.runtime().rule_type();
        self.writer
            .add_field(AccessFlags::PRIVATE, RULE_FIELD, &rule_type);
    }

    // ==========================================================================
    // Constructor
    // ==========================================================================

    fn emit_constructor(&mut self) -> Result<(), CompileCause> {
        let rule_type = self.runtime().rule_type();
        let choice = SuperConstructor::resolve(self.helper, &rule_type)?;
        let Some(super_desc) = choice.descriptor(&rule_type) else {
            return Err(CompileCause::NoValidConstructor(self.helper.binary_name()));
        };
        let helper = self.helper.internal_name();
        let class = self.class_name;
        let desc = self.runtime().rule_constructor_descriptor();

        self.method(AccessFlags::PUBLIC, "<init>", &desc, &[], |em, _| {
            em.aload(0);
            if choice == SuperConstructor::RuleArg {
                em.aload(1);
            }
            em.invokespecial(helper, "<init>", &super_desc);
            em.assert_balanced();

            em.aload(0);
            em.aload(1);
            em.putfield(class, RULE_FIELD, &rule_type);
            em.assert_balanced();
            em.return_value(&JvmType::Void);
            Ok(())
        })
    }

    // ==========================================================================
    // Entry Point
    // ==========================================================================

    fn emit_execute(&mut self) -> Result<(), CompileCause> {
        let desc = MethodDescriptor::new(
            vec![JvmType::object(), JvmType::object().array_of()],
            JvmType::Void,
        );
        let class = self.class_name;
        let runtime = self.runtime();
        let emit_trace = self.options.emit_trace;
        let layout = &self.layout;

        emit_method(
            &mut self.writer,
            AccessFlags::PUBLIC,
            "execute",
            &desc,
            &[runtime.execute_exception.as_str()],
            |em| {
                if emit_trace {
                    emit_trace_line(em, class, runtime);
                }

                // Load the trigger's values into the binding fields.
                for entry in layout.entries() {
                    let binding = entry.binding;
                    let Slot::Field { name, ty, .. } = &entry.slot else {
                        continue;
                    };
                    if binding.is_recipient() {
                        em.aload(0);
                        em.aload(1);
                    } else if !binding.is_bind_var() {
                        em.aload(0);
                        em.aload(2);
                        em.iconst(i32::from(binding.call_array_index()));
                        em.aaload();
                    } else {
                        continue;
                    }
                    if entry.needs_conversion() {
                        em.from_generic(ty);
                    }
                    em.putfield(class, name, ty);
                    em.assert_balanced();
                }

                em.aload(0);
                em.invokespecial(class, "execute0", &MethodDescriptor::void());
                em.assert_balanced();

                // Write updated values back into the argument array.
                for entry in layout.entries() {
                    let binding = entry.binding;
                    let Slot::Field { name, ty, .. } = &entry.slot else {
                        continue;
                    };
                    if !binding.is_updated() || binding.is_bind_var() {
                        continue;
                    }
                    em.aload(2);
                    em.iconst(i32::from(binding.call_array_index()));
                    em.aload(0);
                    em.getfield(class, name, ty);
                    em.to_generic(ty);
                    em.aastore();
                    em.assert_balanced();
                }

                em.return_value(&JvmType::Void);
                Ok(())
            },
        )
    }

    // ==========================================================================
    // Binding Accessors
    // ==========================================================================

    fn emit_set_binding(&mut self) -> Result<(), CompileCause> {
        let desc = MethodDescriptor::new(vec![JvmType::string(), JvmType::object()], JvmType::Void);
        let class = self.class_name;
        let layout = &self.layout;

        emit_method(&mut self.writer, AccessFlags::PUBLIC, "setBinding", &desc, &[], |em| {
            for entry in layout.entries() {
                let Slot::Field { name, ty, .. } = &entry.slot else {
                    continue;
                };
                let skip = em.new_label();
                emit_name_test(em, entry.binding.name(), skip);
                em.aload(0);
                em.aload(2);
                if entry.needs_conversion() {
                    em.from_generic(ty);
                }
                em.putfield(class, name, ty);
                // No return: every binding sharing the name receives the value.
                em.place_label(skip);
                em.assert_balanced();
            }
            em.return_value(&JvmType::Void);
            Ok(())
        })
    }

    fn emit_get_binding(&mut self) -> Result<(), CompileCause> {
        let desc = MethodDescriptor::new(vec![JvmType::string()], JvmType::object());
        let class = self.class_name;
        let layout = &self.layout;

        emit_method(&mut self.writer, AccessFlags::PUBLIC, "getBinding", &desc, &[], |em| {
            for entry in layout.entries() {
                let skip = match &entry.slot {
                    Slot::NoStorage => continue,
                    Slot::SelfReference => {
                        let skip = em.new_label();
                        emit_name_test(em, entry.binding.name(), skip);
                        em.aload(0);
                        skip
                    }
                    Slot::Field { name, ty, .. } => {
                        let skip = em.new_label();
                        emit_name_test(em, entry.binding.name(), skip);
                        em.aload(0);
                        em.getfield(class, name, ty);
                        em.to_generic(ty);
                        skip
                    }
                };
                em.return_value(&JvmType::object());
                em.place_label(skip);
                em.assert_balanced();
            }
            em.aconst_null();
            em.return_value(&JvmType::object());
            Ok(())
        })
    }

    // ==========================================================================
    // Identity and Reflection Forwarders
    // ==========================================================================

    fn emit_get_name(&mut self) -> Result<(), CompileCause> {
        let class = self.class_name;
        let runtime = self.runtime();
        let desc = MethodDescriptor::returning(JvmType::string());

        self.method(AccessFlags::PUBLIC, "getName", &desc, &[], |em, _| {
            em.aload(0);
            em.getfield(class, RULE_FIELD, &runtime.rule_type());
            em.invokevirtual(&runtime.rule, "getName", &desc);
            em.return_value(&JvmType::string());
            Ok(())
        })
    }

    fn emit_forwarders(&mut self) -> Result<(), CompileCause> {
        let object = JvmType::object();
        let forwarders = [
            (
                "getAccessibleField",
                MethodDescriptor::new(vec![object.clone(), JvmType::Int], object.clone()),
            ),
            (
                "setAccessibleField",
                MethodDescriptor::new(
                    vec![object.clone(), object.clone(), JvmType::Int],
                    JvmType::Void,
                ),
            ),
            (
                "invokeAccessibleMethod",
                MethodDescriptor::new(
                    vec![object.clone(), object.clone().array_of(), JvmType::Int],
                    object.clone(),
                ),
            ),
        ];

        let class = self.class_name;
        let runtime = self.runtime();
        for (name, desc) in forwarders {
            self.method(AccessFlags::PUBLIC, name, &desc, &[], |em, _| {
                em.aload(0);
                em.getfield(class, RULE_FIELD, &runtime.rule_type());
                let mut slot = 1;
                for param in &desc.params {
                    em.load(param, slot);
                    slot += param.slots();
                }
                em.invokevirtual(&runtime.rule, name, &desc);
                em.return_value(&desc.ret);
                Ok(())
            })?;
        }
        Ok(())
    }
}

/// Emit one method into `writer`.
fn emit_method<F>(
    writer: &mut ClassWriter,
    access: AccessFlags,
    name: &str,
    desc: &MethodDescriptor,
    exceptions: &[&str],
    body: F,
) -> Result<(), CompileCause>
where
    F: FnOnce(&mut MethodEmitter<'_>) -> Result<(), CompileCause>,
{
    let receiver = u16::from(!access.contains(AccessFlags::STATIC));
    let mut em = MethodEmitter::new(writer.pool_mut(), receiver + desc.arg_slots());
    body(&mut em)?;
    let code = em.finish()?;
    trace!(
        method = name,
        descriptor = %desc,
        max_stack = code.max_stack,
        max_locals = code.max_locals,
        code_len = code.code.len(),
        "emitted method"
    );
    writer.add_method(access, name, desc, Some(code), exceptions);
    Ok(())
}

/// `if (<gate>.isVerbose()) System.out.println(rule.getName() + " execute()")`
fn emit_trace_line(em: &mut MethodEmitter<'_>, class: &str, runtime: &RuntimeClasses) {
    const BUILDER: &str = "java/lang/StringBuilder";
    let append = MethodDescriptor::new(vec![JvmType::string()], JvmType::class(BUILDER));

    let skip = em.new_label();
    em.invokestatic(
        &runtime.trace_gate,
        &runtime.trace_gate_method,
        &MethodDescriptor::returning(JvmType::Boolean),
    );
    em.branch(Opcode::Ifeq, skip);

    em.getstatic("java/lang/System", "out", &JvmType::class("java/io/PrintStream"));
    em.new_object(BUILDER);
    em.dup();
    em.invokespecial(BUILDER, "<init>", &MethodDescriptor::void());
    em.aload(0);
    em.getfield(class, RULE_FIELD, &runtime.rule_type());
    em.invokevirtual(
        &runtime.rule,
        "getName",
        &MethodDescriptor::returning(JvmType::string()),
    );
    em.invokevirtual(BUILDER, "append", &append);
    em.ldc_string(" execute()");
    em.invokevirtual(BUILDER, "append", &append);
    em.invokevirtual(
        BUILDER,
        "toString",
        &MethodDescriptor::returning(JvmType::string()),
    );
    em.invokevirtual(
        "java/io/PrintStream",
        "println",
        &MethodDescriptor::new(vec![JvmType::string()], JvmType::Void),
    );
    em.assert_balanced();
    em.place_label(skip);
}

/// `if (!"<name>".equals(arg1)) goto skip`
fn emit_name_test(em: &mut MethodEmitter<'_>, name: &str, skip: Label) {
    em.ldc_string(name);
    em.aload(1);
    em.invokevirtual(
        "java/lang/String",
        "equals",
        &MethodDescriptor::new(vec![JvmType::object()], JvmType::Boolean),
    );
    em.branch(Opcode::Ifeq, skip);
}
