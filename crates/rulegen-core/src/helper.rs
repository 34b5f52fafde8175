//! Helper class descriptions.
//!
//! The generated adapter subclasses the rule's helper class. The rule engine
//! describes that class by its internal name and declared constructors, which
//! is all the generator needs to pick a superclass constructor.

use crate::JvmType;

/// Access level of a class member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberAccess {
    Public,
    Protected,
    Package,
    Private,
}

impl MemberAccess {
    /// Whether a subclass in the same package may invoke the member.
    pub fn is_subclass_accessible(self) -> bool {
        !matches!(self, MemberAccess::Private)
    }
}

/// A constructor declared directly on the helper class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorInfo {
    /// Parameter types.
    pub params: Vec<JvmType>,
    /// Declared access.
    pub access: MemberAccess,
}

/// The rule's helper class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperClass {
    internal_name: String,
    constructors: Vec<ConstructorInfo>,
}

impl HelperClass {
    /// Describe a helper class by internal or binary name, with no constructors.
    pub fn new(name: &str) -> Self {
        Self {
            internal_name: name.replace('.', "/"),
            constructors: Vec::new(),
        }
    }

    /// Declare a constructor.
    pub fn with_constructor(mut self, params: Vec<JvmType>, access: MemberAccess) -> Self {
        self.constructors.push(ConstructorInfo { params, access });
        self
    }

    /// Internal name (`org/acme/Helper`).
    pub fn internal_name(&self) -> &str {
        &self.internal_name
    }

    /// Binary name (`org.acme.Helper`).
    pub fn binary_name(&self) -> String {
        self.internal_name.replace('/', ".")
    }

    /// Declared constructors.
    pub fn constructors(&self) -> &[ConstructorInfo] {
        &self.constructors
    }

    /// The constructor declared with exactly these parameter types.
    pub fn declared_constructor(&self, params: &[JvmType]) -> Option<&ConstructorInfo> {
        self.constructors.iter().find(|c| c.params == params)
    }
}
