//! rulegen core types
//!
//! Shared vocabulary for the helper adapter generator:
//!
//! - [`JvmType`] and [`MethodDescriptor`]: JVM types and their encodings
//! - [`Binding`] and [`BindingFlags`]: rule variables and their classification
//! - [`AccessPolicy`]: injected accessibility decisions
//! - [`HelperClass`]: the superclass of every generated adapter
//! - [`Strategy`]: compiled or interpreted execution
//! - [`error`]: the error hierarchy for every phase

pub mod access;
pub mod binding;
pub mod descriptor;
pub mod error;
pub mod helper;
pub mod strategy;
pub mod types;

pub use access::{AccessPolicy, AllAccessible, InaccessibleTypes};
pub use binding::{Binding, BindingFlags};
pub use descriptor::MethodDescriptor;
pub use error::{ClassFileError, CompileCause, CompileError, LoadError, ReadError, VerifyError};
pub use helper::{ConstructorInfo, HelperClass, MemberAccess};
pub use strategy::Strategy;
pub use types::{JvmType, NUMBER_CLASS, OBJECT_CLASS, STRING_CLASS};
