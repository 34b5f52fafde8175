//! JVM class file support for rulegen.
//!
//! - [`ConstantPool`]: deduplicating constant pool
//! - [`Opcode`]: the supported instruction subset and its stack effects
//! - [`CodeBuffer`]: method bodies with labels and line numbers
//! - [`ClassWriter`]: class file serialization
//! - [`ParsedClass`]: class file parsing
//! - [`verify_class`]: structural verification by stack-depth re-derivation

pub mod code;
pub mod constant;
pub mod opcode;
pub mod reader;
pub mod verify;
pub mod writer;

pub use code::{CodeAttribute, CodeBuffer, ExceptionHandler, Label, LineNumber};
pub use constant::{Constant, ConstantPool, MemberKind, MemberRef};
pub use opcode::{Opcode, StackEffect};
pub use reader::{ParsedClass, ParsedField, ParsedMethod};
pub use verify::{MethodSummary, VerifyReport, verify_class, verify_method};
pub use writer::{AccessFlags, ClassVersion, ClassWriter, MAGIC};
