//! The rule engine's side of adapter generation.
//!
//! The generator reads a parsed rule through [`Rule`], asks each logic node to
//! inline itself through [`RuleNode`], and hands the finished class to the
//! engine's [`ModuleSystem`] for definition.

use std::fmt;

use rulegen_core::{AccessPolicy, Binding, CompileCause, JvmType, LoadError};

use crate::MethodEmitter;
use crate::layout::{BindingLayout, PlannedBinding, Slot};

/// A parsed rule, as seen by the generator.
pub trait Rule {
    /// The rule's name at generation time.
    fn name(&self) -> &str;

    /// Bindings in declaration order.
    fn bindings(&self) -> &[Binding];

    /// The `BIND` clause.
    fn event(&self) -> &dyn RuleNode;

    /// The `IF` clause. Compiles to code leaving one `int` on the stack.
    fn condition(&self) -> &dyn RuleNode;

    /// The `DO` clause.
    fn action(&self) -> &dyn RuleNode;

    /// Path of the script that declared the rule.
    fn file(&self) -> &str;

    /// Line of the `RULE` keyword.
    fn line(&self) -> u32;

    /// Decides which binding types are inaccessible to generated code.
    fn access_policy(&self) -> &dyn AccessPolicy;

    /// The loader that defines the rule's helper class.
    fn loader(&self) -> &LoaderRef;

    /// Defines generated classes.
    fn module_system(&self) -> &dyn ModuleSystem;
}

/// A logic node of a rule: the event, condition or action.
///
/// Used only by the compiled strategy. The interpreted strategy reaches the
/// node's evaluator on the JVM side by name.
pub trait RuleNode {
    /// Append the node's code to `execute0`.
    ///
    /// Events and actions leave the stack as they found it; conditions push
    /// one `int`, non-zero when the rule should fire. Binding values are
    /// reached through `adapter`.
    fn compile(
        &self,
        em: &mut MethodEmitter<'_>,
        adapter: &AdapterView<'_>,
    ) -> Result<(), CompileCause>;
}

/// The adapter being generated, as seen by compiled rule nodes.
#[derive(Debug, Clone, Copy)]
pub struct AdapterView<'u> {
    class_name: &'u str,
    layout: &'u BindingLayout<'u>,
}

impl<'u> AdapterView<'u> {
    pub fn new(class_name: &'u str, layout: &'u BindingLayout<'u>) -> Self {
        Self { class_name, layout }
    }

    /// Internal name of the adapter class.
    pub fn class_name(&self) -> &'u str {
        self.class_name
    }

    /// The first binding named `name` that has storage.
    pub fn entry(&self, name: &str) -> Option<&'u PlannedBinding<'u>> {
        self.layout
            .entries()
            .iter()
            .find(|e| e.binding.name() == name && e.slot != Slot::NoStorage)
    }

    /// The slot of the first binding named `name`.
    pub fn slot(&self, name: &str) -> Option<&'u Slot> {
        self.entry(name).map(|e| &e.slot)
    }

    /// Push the value of binding `name` and return its type as loaded.
    ///
    /// Generalized bindings load as `java.lang.Object`.
    pub fn load_binding(
        &self,
        em: &mut MethodEmitter<'_>,
        name: &str,
    ) -> Result<JvmType, CompileCause> {
        let entry = self.entry(name).ok_or_else(|| unknown_binding(name))?;
        em.aload(0);
        if let Slot::Field { name, ty, .. } = &entry.slot {
            em.getfield(self.class_name, name, ty);
        }
        Ok(entry.value_type().clone())
    }

    /// Store into binding `name` the value `value` pushes.
    ///
    /// `value` receives the field type and must push exactly one value of it.
    pub fn store_binding<F>(
        &self,
        em: &mut MethodEmitter<'_>,
        name: &str,
        value: F,
    ) -> Result<(), CompileCause>
    where
        F: FnOnce(&mut MethodEmitter<'_>, &JvmType) -> Result<(), CompileCause>,
    {
        let Some(Slot::Field { name: field, ty, .. }) = self.slot(name) else {
            return Err(unknown_binding(name));
        };
        em.aload(0);
        value(em, ty)?;
        em.putfield(self.class_name, field, ty);
        Ok(())
    }
}

fn unknown_binding(name: &str) -> CompileCause {
    CompileCause::node("binding", format!("no stored binding named '{}'", name))
}

/// A node that compiles to nothing.
///
/// As a condition it pushes `1`, so the action always runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyNode {
    /// Whether the node stands in a condition position.
    pub condition: bool,
}

impl RuleNode for EmptyNode {
    fn compile(&self, em: &mut MethodEmitter<'_>, _: &AdapterView<'_>) -> Result<(), CompileCause> {
        if self.condition {
            em.iconst(1);
        }
        Ok(())
    }
}

/// Identity of a class loader, opaque to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoaderRef(String);

impl LoaderRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoaderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A class defined by a [`ModuleSystem`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassHandle {
    name: String,
    loader: LoaderRef,
    token: u64,
}

impl ClassHandle {
    /// `token` is any value the module system uses to find the class again.
    pub fn new(name: impl Into<String>, loader: LoaderRef, token: u64) -> Self {
        Self {
            name: name.into(),
            loader,
            token,
        }
    }

    /// Binary name of the class.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The defining loader.
    pub fn loader(&self) -> &LoaderRef {
        &self.loader
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

/// Defines generated adapter classes.
pub trait ModuleSystem {
    /// Define `bytes` as class `external_name` in `loader`.
    fn load_helper_adapter(
        &self,
        loader: &LoaderRef,
        external_name: &str,
        bytes: &[u8],
    ) -> Result<ClassHandle, LoadError>;
}
