//! Binding layout planning.
//!
//! Decides, per binding, where its value lives in the generated class. The
//! plan is computed once and shared by every method the builder emits, and
//! by both execution strategies.

use rulegen_core::{AccessPolicy, Binding, JvmType};

/// Storage for one binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// An alias; reads and writes go through the aliased binding.
    NoStorage,
    /// The helper self-binding; the value is the adapter instance itself.
    SelfReference,
    /// A private instance field.
    Field {
        /// Field name.
        name: String,
        /// Field type.
        ty: JvmType,
        /// The declared type is not accessible and the field holds an
        /// `Object` instead. Values are stored without conversion.
        generalized: bool,
    },
}

impl Slot {
    /// The field name and type, if the binding has a field.
    pub fn field(&self) -> Option<(&str, &JvmType)> {
        match self {
            Slot::Field { name, ty, .. } => Some((name, ty)),
            _ => None,
        }
    }

    /// Check if the field type was generalized to `Object`.
    pub fn is_generalized(&self) -> bool {
        matches!(self, Slot::Field { generalized: true, .. })
    }
}

/// Plan the storage of a single binding.
pub fn plan(binding: &Binding, policy: &dyn AccessPolicy) -> Slot {
    if binding.is_alias() {
        return Slot::NoStorage;
    }
    if binding.is_helper() {
        return Slot::SelfReference;
    }
    let generalized = policy.requires_access(binding.ty());
    let ty = if generalized {
        JvmType::object()
    } else {
        binding.ty().clone()
    };
    Slot::Field {
        name: binding.ivar_name().to_string(),
        ty,
        generalized,
    }
}

/// A binding paired with its planned slot.
#[derive(Debug, Clone)]
pub struct PlannedBinding<'r> {
    pub binding: &'r Binding,
    pub slot: Slot,
}

impl PlannedBinding<'_> {
    /// Type values have once loaded from the slot: the field type, or the
    /// declared type for the helper self-binding.
    pub fn value_type(&self) -> &JvmType {
        match &self.slot {
            Slot::Field { ty, .. } => ty,
            _ => self.binding.ty(),
        }
    }

    /// Check if values need conversion between `Object` and the slot type.
    pub fn needs_conversion(&self) -> bool {
        !self.slot.is_generalized()
    }
}

/// The layout of every binding, in declaration order.
#[derive(Debug, Clone)]
pub struct BindingLayout<'r> {
    entries: Vec<PlannedBinding<'r>>,
}

impl<'r> BindingLayout<'r> {
    /// Plan every binding.
    pub fn plan_all(bindings: &'r [Binding], policy: &dyn AccessPolicy) -> Self {
        let entries = bindings
            .iter()
            .map(|binding| PlannedBinding {
                binding,
                slot: plan(binding, policy),
            })
            .collect();
        Self { entries }
    }

    /// All bindings in declaration order.
    pub fn entries(&self) -> &[PlannedBinding<'r>] {
        &self.entries
    }

    /// Bindings with a field, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &PlannedBinding<'r>> {
        self.entries.iter().filter(|e| e.slot.field().is_some())
    }

    /// Number of generated binding fields.
    pub fn field_count(&self) -> usize {
        self.fields().count()
    }
}
