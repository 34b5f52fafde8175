//! Rule bindings.
//!
//! A binding names a rule variable. Depending on its classification it is
//! copied in from the trigger call's argument array, taken from the receiver,
//! refers to the helper instance itself, or is an alias of another binding.

use bitflags::bitflags;

use crate::JvmType;

bitflags! {
    /// Classification of a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BindingFlags: u8 {
        /// Refers to another binding's storage.
        const ALIAS = 1 << 0;
        /// Refers to the helper instance itself.
        const HELPER = 1 << 1;
        /// The trigger method's receiver (`$0`).
        const RECIPIENT = 1 << 2;
        /// Declared in the rule's BIND clause; never copied from or to the call.
        const BIND_VAR = 1 << 3;
        /// Assigned by the rule; copied back to the call after dispatch.
        const UPDATED = 1 << 4;
    }
}

/// A named rule variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    name: String,
    ivar_name: String,
    ty: JvmType,
    call_array_index: u16,
    flags: BindingFlags,
}

impl Binding {
    /// Create a plain binding whose field name equals its external name.
    pub fn new(name: impl Into<String>, ty: JvmType) -> Self {
        let name = name.into();
        Self {
            ivar_name: name.clone(),
            name,
            ty,
            call_array_index: 0,
            flags: BindingFlags::empty(),
        }
    }

    /// Set the generated field name.
    pub fn with_ivar_name(mut self, ivar_name: impl Into<String>) -> Self {
        self.ivar_name = ivar_name.into();
        self
    }

    /// Set the index into the trigger call's argument array.
    pub fn with_call_array_index(mut self, index: u16) -> Self {
        self.call_array_index = index;
        self
    }

    /// Add classification flags.
    pub fn with_flags(mut self, flags: BindingFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Mark as updated by the rule.
    pub fn updated(self) -> Self {
        self.with_flags(BindingFlags::UPDATED)
    }

    /// Mark as a BIND clause variable.
    pub fn bind_var(self) -> Self {
        self.with_flags(BindingFlags::BIND_VAR)
    }

    /// Mark as the trigger receiver.
    pub fn recipient(self) -> Self {
        self.with_flags(BindingFlags::RECIPIENT)
    }

    /// Mark as the helper self-binding.
    pub fn helper(self) -> Self {
        self.with_flags(BindingFlags::HELPER)
    }

    /// Mark as an alias.
    pub fn alias(self) -> Self {
        self.with_flags(BindingFlags::ALIAS)
    }

    /// External name used by `getBinding`/`setBinding`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the generated field.
    pub fn ivar_name(&self) -> &str {
        &self.ivar_name
    }

    /// Declared type.
    pub fn ty(&self) -> &JvmType {
        &self.ty
    }

    /// Index into the argument array.
    pub fn call_array_index(&self) -> u16 {
        self.call_array_index
    }

    /// Classification flags.
    pub fn flags(&self) -> BindingFlags {
        self.flags
    }

    pub fn is_alias(&self) -> bool {
        self.flags.contains(BindingFlags::ALIAS)
    }

    pub fn is_helper(&self) -> bool {
        self.flags.contains(BindingFlags::HELPER)
    }

    pub fn is_recipient(&self) -> bool {
        self.flags.contains(BindingFlags::RECIPIENT)
    }

    pub fn is_bind_var(&self) -> bool {
        self.flags.contains(BindingFlags::BIND_VAR)
    }

    pub fn is_updated(&self) -> bool {
        self.flags.contains(BindingFlags::UPDATED)
    }
}
