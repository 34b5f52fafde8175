//! rulegen
//!
//! Generates JVM helper adapter classes for Byteman-style rules.
//!
//! A rule's bindings and event/condition/action logic become a class that
//! subclasses the rule's helper, copies trigger values in and out of typed
//! fields, and runs the rule either inlined (compiled) or through the rule
//! engine's evaluator (interpreted).
//!
//! ## Crates
//!
//! - [`core`]: types, bindings, access policy and errors
//! - [`classfile`]: class file writer, reader and structural verifier
//! - [`compiler`]: the adapter generator

pub use rulegen_classfile as classfile;
pub use rulegen_compiler as compiler;
pub use rulegen_core as core;

pub use rulegen_compiler::{
    AdapterCompiler, AdapterView, ClassHandle, CompilerOptions, GeneratedUnit, LoadedAdapter, LoaderRef,
    MethodEmitter, ModuleSystem, Rule, RuleNode, compile_bytes, get_helper_adapter,
};
pub use rulegen_core::{
    AccessPolicy, Binding, BindingFlags, CompileCause, CompileError, HelperClass, JvmType,
    MemberAccess, Strategy,
};

pub mod prelude {
    pub use crate::compiler::{
        AdapterCompiler, CompilerOptions, GeneratedUnit, LoadedAdapter, Rule, RuleNode,
    };
    pub use crate::core::{
        AccessPolicy, AllAccessible, Binding, CompileError, HelperClass, InaccessibleTypes,
        JvmType, MemberAccess, Strategy,
    };
}
