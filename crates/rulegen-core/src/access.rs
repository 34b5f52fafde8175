//! Accessibility queries.
//!
//! A generated adapter lives in its helper's package and is defined by the
//! helper's loader. Some binding types are not visible from there; fields for
//! those bindings are generalized to `java.lang.Object`. Which types need this
//! is decided by the rule engine, injected through [`AccessPolicy`].

use rustc_hash::FxHashSet;

use crate::JvmType;

/// Decides whether a type must be reached reflectively from generated code.
pub trait AccessPolicy {
    /// Returns true when `ty` is not accessible from the generated unit.
    fn requires_access(&self, ty: &JvmType) -> bool;
}

/// Every type is accessible.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllAccessible;

impl AccessPolicy for AllAccessible {
    fn requires_access(&self, _ty: &JvmType) -> bool {
        false
    }
}

/// A fixed set of inaccessible classes, matched against a type's element class.
#[derive(Debug, Clone, Default)]
pub struct InaccessibleTypes {
    classes: FxHashSet<String>,
}

impl InaccessibleTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class by internal or binary name.
    pub fn with_class(mut self, name: &str) -> Self {
        self.classes.insert(name.replace('.', "/"));
        self
    }
}

impl AccessPolicy for InaccessibleTypes {
    fn requires_access(&self, ty: &JvmType) -> bool {
        ty.element_class()
            .is_some_and(|class| self.classes.contains(class))
    }
}

impl<F> AccessPolicy for F
where
    F: Fn(&JvmType) -> bool,
{
    fn requires_access(&self, ty: &JvmType) -> bool {
        self(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inaccessible_set_matches_arrays() {
        let policy = InaccessibleTypes::new().with_class("com.acme.Secret");
        assert!(policy.requires_access(&JvmType::class("com/acme/Secret")));
        assert!(policy.requires_access(&JvmType::class("com/acme/Secret").array_of()));
        assert!(!policy.requires_access(&JvmType::Int));
        assert!(!policy.requires_access(&JvmType::string()));
    }

    #[test]
    fn closure_policy() {
        let policy = |ty: &JvmType| ty.is_string();
        assert!(policy.requires_access(&JvmType::string()));
        assert!(!AllAccessible.requires_access(&JvmType::string()));
    }
}
