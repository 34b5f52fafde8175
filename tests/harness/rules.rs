//! Test rules.
//!
//! A [`Script`] is a tiny rule body that can both compile itself into an
//! adapter (compiled strategy) and produce an [`Evaluator`] that does the same
//! work through `getBinding`/`setBinding` (interpreted strategy).

use std::rc::Rc;
use std::sync::Mutex;

use rulegen::classfile::Opcode;
use rulegen::core::{AccessPolicy, Binding, CompileCause, InaccessibleTypes, JvmType, LoadError};
use rulegen::{AdapterView, ClassHandle, LoaderRef, MethodEmitter, ModuleSystem, Rule, RuleNode};

use super::jvm::{Evaluator, Jvm, Ref, Trap, Value};

/// One step of a rule body.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// `binding = binding + delta`
    AddInt { binding: &'static str, delta: i32 },
    /// `binding = value`
    SetString {
        binding: &'static str,
        value: &'static str,
    },
    /// Condition: `binding > than`
    IntGreater { binding: &'static str, than: i32 },
    /// Condition constant.
    Const(bool),
    /// Line marker.
    Line(u32),
}

/// A rule body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script(pub Vec<Step>);

impl Script {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// A condition that always holds.
    pub fn always() -> Self {
        Self(vec![Step::Const(true)])
    }

    pub fn never() -> Self {
        Self(vec![Step::Const(false)])
    }

    /// The interpreted form of this body.
    pub fn evaluator(&self) -> Evaluator {
        let steps = self.0.clone();
        Rc::new(move |jvm: &mut Jvm, adapter: Ref| -> Result<Value, Trap> {
            let mut result = Value::Null;
            for step in &steps {
                result = run_step(jvm, adapter, step)?;
            }
            Ok(result)
        })
    }
}

fn run_step(jvm: &mut Jvm, adapter: Ref, step: &Step) -> Result<Value, Trap> {
    match *step {
        Step::AddInt { binding, delta } => {
            let current = jvm.get_binding(adapter, binding)?;
            let current = jvm
                .unboxed(current)
                .map_or(0, |(_, value)| match value {
                    Value::Long(v) => v as i32,
                    other => other.int(),
                });
            let next = jvm.boxed("java/lang/Integer", Value::Int(current.wrapping_add(delta)));
            jvm.set_binding(adapter, binding, next)?;
            Ok(Value::Null)
        }
        Step::SetString { binding, value } => {
            let value = jvm.new_string(value);
            jvm.set_binding(adapter, binding, value)?;
            Ok(Value::Null)
        }
        Step::IntGreater { binding, than } => {
            let current = jvm.get_binding(adapter, binding)?;
            let current = jvm.unboxed(current).map_or(0, |(_, value)| value.int());
            Ok(jvm.boxed("java/lang/Boolean", Value::Int(i32::from(current > than))))
        }
        Step::Const(value) => Ok(jvm.boxed("java/lang/Boolean", Value::Int(i32::from(value)))),
        Step::Line(_) => Ok(Value::Null),
    }
}

impl RuleNode for Script {
    fn compile(
        &self,
        em: &mut MethodEmitter<'_>,
        adapter: &AdapterView<'_>,
    ) -> Result<(), CompileCause> {
        for step in &self.0 {
            match *step {
                Step::AddInt { binding, delta } => {
                    adapter.store_binding(em, binding, |em, ty| {
                        let loaded = adapter.load_binding(em, binding)?;
                        em.convert(&loaded, &JvmType::Int);
                        em.iconst(delta);
                        em.emit(Opcode::Iadd);
                        em.convert(&JvmType::Int, ty);
                        Ok(())
                    })?;
                }
                Step::SetString { binding, value } => {
                    adapter.store_binding(em, binding, |em, ty| {
                        em.ldc_string(value);
                        em.convert(&JvmType::string(), ty);
                        Ok(())
                    })?;
                }
                Step::IntGreater { binding, than } => {
                    let loaded = adapter.load_binding(em, binding)?;
                    em.convert(&loaded, &JvmType::Int);
                    em.iconst(than);
                    let yes = em.new_label();
                    let done = em.new_label();
                    em.branch(Opcode::IfIcmpgt, yes);
                    em.iconst(0);
                    em.goto(done);
                    em.place_label(yes);
                    em.iconst(1);
                    em.place_label(done);
                }
                Step::Const(value) => em.iconst(i32::from(value)),
                Step::Line(line) => em.notify_source_line(line),
            }
        }
        Ok(())
    }
}

/// A module system that records what it defines.
#[derive(Debug, Default)]
pub struct RecordingModules {
    /// `(loader, external name, size)` per defined class.
    pub defined: Mutex<Vec<(String, String, usize)>>,
    /// Reject every class with this reason.
    pub reject: Option<String>,
}

impl ModuleSystem for RecordingModules {
    fn load_helper_adapter(
        &self,
        loader: &LoaderRef,
        external_name: &str,
        bytes: &[u8],
    ) -> Result<ClassHandle, LoadError> {
        if let Some(reason) = &self.reject {
            return Err(LoadError::Rejected {
                name: external_name.to_string(),
                loader: loader.to_string(),
                reason: reason.clone(),
            });
        }
        let mut defined = self.defined.lock().expect("module system poisoned");
        if defined.iter().any(|(_, name, _)| name == external_name) {
            return Err(LoadError::Duplicate(external_name.to_string()));
        }
        defined.push((loader.to_string(), external_name.to_string(), bytes.len()));
        Ok(ClassHandle::new(
            external_name,
            loader.clone(),
            defined.len() as u64,
        ))
    }
}

/// A rule built from scripts.
#[derive(Debug)]
pub struct TestRule {
    pub name: String,
    pub bindings: Vec<Binding>,
    pub event: Script,
    pub condition: Script,
    pub action: Script,
    pub file: String,
    pub line: u32,
    pub policy: InaccessibleTypes,
    pub loader: LoaderRef,
    pub modules: RecordingModules,
}

impl TestRule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bindings: Vec::new(),
            event: Script::empty(),
            condition: Script::always(),
            action: Script::empty(),
            file: "scripts/test.btm".to_string(),
            line: 1,
            policy: InaccessibleTypes::new(),
            loader: LoaderRef::new("app"),
            modules: RecordingModules::default(),
        }
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn with_event(mut self, steps: Vec<Step>) -> Self {
        self.event = Script(steps);
        self
    }

    pub fn with_condition(mut self, steps: Vec<Step>) -> Self {
        self.condition = Script(steps);
        self
    }

    pub fn with_action(mut self, steps: Vec<Step>) -> Self {
        self.action = Script(steps);
        self
    }

    pub fn at(mut self, file: &str, line: u32) -> Self {
        self.file = file.to_string();
        self.line = line;
        self
    }

    pub fn with_inaccessible(mut self, class: &str) -> Self {
        self.policy = self.policy.with_class(class);
        self
    }

    /// Evaluators for the interpreted strategy.
    pub fn logic(&self) -> [Evaluator; 3] {
        [
            self.event.evaluator(),
            self.condition.evaluator(),
            self.action.evaluator(),
        ]
    }
}

impl Rule for TestRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    fn event(&self) -> &dyn RuleNode {
        &self.event
    }

    fn condition(&self) -> &dyn RuleNode {
        &self.condition
    }

    fn action(&self) -> &dyn RuleNode {
        &self.action
    }

    fn file(&self) -> &str {
        &self.file
    }

    fn line(&self) -> u32 {
        self.line
    }

    fn access_policy(&self) -> &dyn AccessPolicy {
        &self.policy
    }

    fn loader(&self) -> &LoaderRef {
        &self.loader
    }

    fn module_system(&self) -> &dyn ModuleSystem {
        &self.modules
    }
}
