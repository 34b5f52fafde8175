//! Unified error types for rulegen.
//!
//! ## Error Hierarchy
//!
//! ```text
//! CompileError (user-facing, carries helper class and strategy)
//! └── CompileCause
//!     ├── NoValidConstructor / InaccessibleConstructor
//!     ├── ClassFileError  - class file emission limits
//!     ├── Node            - a rule node refused to compile
//!     ├── VerifyError     - self-verification of the generated bytes
//!     │   └── ReadError   - the bytes could not be parsed back
//!     └── LoadError       - the module system rejected the class
//! ```
//!
//! Operand-stack bookkeeping violations are generator defects. They panic
//! and never appear in this hierarchy.

use thiserror::Error;

use crate::Strategy;

// ============================================================================
// Class File Errors
// ============================================================================

/// Errors raised while assembling a class file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
    /// More constants than a 16-bit index can address.
    #[error("constant pool overflow: more than 65535 entries")]
    ConstantPoolOverflow,

    /// A branch offset does not fit its encoding.
    #[error("branch at offset {at} cannot reach offset {target}")]
    BranchOutOfRange {
        /// Offset of the branch instruction.
        at: usize,
        /// Offset of the target label.
        target: usize,
    },

    /// A branch refers to a label that was never placed.
    #[error("label {0} was never placed")]
    UnplacedLabel(u32),

    /// A method body exceeds the 64KiB code limit.
    #[error("method code is {0} bytes, exceeding the 65535 byte limit")]
    CodeTooLarge(usize),

    /// A string constant exceeds the modified UTF-8 length limit.
    #[error("string constant of {0} bytes exceeds the 65535 byte limit")]
    StringTooLong(usize),

    /// Too many members of one kind for a 16-bit count.
    #[error("too many {what}: {count}")]
    TooMany {
        /// What overflowed (fields, methods, ...).
        what: &'static str,
        /// How many were declared.
        count: usize,
    },

    /// The output sink failed.
    #[error("i/o error writing class file: {0}")]
    Io(String),
}

impl From<std::io::Error> for ClassFileError {
    fn from(err: std::io::Error) -> Self {
        ClassFileError::Io(err.to_string())
    }
}

// ============================================================================
// Read Errors
// ============================================================================

/// Errors raised while parsing a class file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// The input ended early.
    #[error("unexpected end of class file")]
    Truncated,

    /// The input does not start with `0xCAFEBABE`.
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    /// A constant pool entry has an unknown tag.
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag {
        /// The tag byte.
        tag: u8,
        /// Constant pool index.
        index: u16,
    },

    /// A constant pool index is zero, out of range or unusable.
    #[error("constant pool index {0} is invalid")]
    BadConstantIndex(u16),

    /// A constant pool entry has the wrong kind.
    #[error("constant {index} is not a {expected}")]
    ConstantKind {
        /// Constant pool index.
        index: u16,
        /// Expected kind.
        expected: &'static str,
    },

    /// A UTF-8 constant could not be decoded.
    #[error("invalid modified UTF-8 in constant {0}")]
    BadUtf8(u16),

    /// A descriptor is malformed.
    #[error("malformed descriptor '{0}'")]
    BadDescriptor(String),

    /// Bytes remain after the class structure.
    #[error("{0} trailing bytes after class file")]
    TrailingBytes(usize),
}

impl From<std::io::Error> for ReadError {
    fn from(_: std::io::Error) -> Self {
        ReadError::Truncated
    }
}

// ============================================================================
// Verify Errors
// ============================================================================

/// Structural verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The class could not be parsed.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// A method with a body has no `Code` attribute.
    #[error("{method}: missing Code attribute")]
    MissingCode {
        /// Method name and descriptor.
        method: String,
    },

    /// An opcode outside the supported instruction set.
    #[error("{method}: unsupported opcode {opcode:#04x} at {pc}")]
    UnsupportedOpcode {
        /// Method name and descriptor.
        method: String,
        /// Instruction offset.
        pc: usize,
        /// Opcode byte.
        opcode: u8,
    },

    /// An instruction's operands run past the end of the code.
    #[error("{method}: truncated instruction at {pc}")]
    TruncatedInstruction {
        /// Method name and descriptor.
        method: String,
        /// Instruction offset.
        pc: usize,
    },

    /// An instruction pops more than the stack holds.
    #[error("{method}: operand stack underflow at {pc}")]
    StackUnderflow {
        /// Method name and descriptor.
        method: String,
        /// Instruction offset.
        pc: usize,
    },

    /// The stack grows past the declared `max_stack`.
    #[error("{method}: stack depth {depth} exceeds max_stack {max} at {pc}")]
    StackOverflow {
        /// Method name and descriptor.
        method: String,
        /// Instruction offset.
        pc: usize,
        /// Depth reached.
        depth: u32,
        /// Declared maximum.
        max: u16,
    },

    /// Two paths reach one instruction with different stack depths.
    #[error("{method}: inconsistent stack depth at {pc} ({first} vs {second})")]
    InconsistentDepth {
        /// Method name and descriptor.
        method: String,
        /// Instruction offset.
        pc: usize,
        /// Depth from the first path.
        first: u32,
        /// Depth from the second path.
        second: u32,
    },

    /// A branch lands outside the code or inside an instruction.
    #[error("{method}: branch at {pc} targets invalid offset {target}")]
    BadBranchTarget {
        /// Method name and descriptor.
        method: String,
        /// Instruction offset.
        pc: usize,
        /// Target offset.
        target: i64,
    },

    /// A local variable index is outside `max_locals`.
    #[error("{method}: local {index} out of range (max_locals {max}) at {pc}")]
    LocalOutOfRange {
        /// Method name and descriptor.
        method: String,
        /// Instruction offset.
        pc: usize,
        /// Local index.
        index: u16,
        /// Declared maximum.
        max: u16,
    },

    /// Execution can run past the last instruction.
    #[error("{method}: execution falls off the end of the code")]
    FallsOffEnd {
        /// Method name and descriptor.
        method: String,
    },

    /// An instruction operand names an unusable constant.
    #[error("{method}: bad constant reference {index} at {pc}")]
    BadConstant {
        /// Method name and descriptor.
        method: String,
        /// Instruction offset.
        pc: usize,
        /// Constant pool index.
        index: u16,
    },

    /// A return instruction does not match the method's return type.
    #[error("{method}: return instruction does not match descriptor at {pc}")]
    ReturnMismatch {
        /// Method name and descriptor.
        method: String,
        /// Instruction offset.
        pc: usize,
    },

    /// A line number entry points outside the code.
    #[error("{method}: line number entry at invalid offset {pc}")]
    BadLineNumber {
        /// Method name and descriptor.
        method: String,
        /// Entry start offset.
        pc: usize,
    },
}

// ============================================================================
// Load Errors
// ============================================================================

/// Errors reported by the module system when defining a generated class.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The loader refused the class bytes.
    #[error("class {name} rejected by loader {loader}: {reason}")]
    Rejected {
        /// External class name.
        name: String,
        /// Loader description.
        loader: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A class with this name was already defined by the loader.
    #[error("class {0} is already defined")]
    Duplicate(String),
}

// ============================================================================
// Compile Errors
// ============================================================================

/// The underlying reason a generation request failed.
#[derive(Debug, Error)]
pub enum CompileCause {
    /// The helper declares neither a `(Rule)` nor a `()` constructor.
    #[error("no valid constructor found for helper class {0}")]
    NoValidConstructor(String),

    /// The matching helper constructor cannot be invoked from a subclass.
    #[error("unable to access constructor for helper class {0}")]
    InaccessibleConstructor(String),

    /// Class file assembly failed.
    #[error(transparent)]
    ClassFile(#[from] ClassFileError),

    /// A rule node could not emit its logic.
    #[error("{node} failed to compile: {message}")]
    Node {
        /// Which node (event, condition, action).
        node: String,
        /// Description of the failure.
        message: String,
    },

    /// The generated bytes failed self-verification.
    #[error("generated class failed verification: {0}")]
    Verify(#[from] VerifyError),

    /// The module system refused the class.
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl CompileCause {
    /// Convenience constructor for rule node failures.
    pub fn node(node: impl Into<String>, message: impl Into<String>) -> Self {
        CompileCause::Node {
            node: node.into(),
            message: message.into(),
        }
    }
}

/// A failed generation request.
///
/// This is the only error a caller of the generator sees. It names the helper
/// class and the attempted strategy and wraps the underlying cause.
#[derive(Debug, Error)]
#[error("exception creating {strategy} helper adapter for {helper}: {cause}")]
pub struct CompileError {
    /// Binary name of the helper class.
    pub helper: String,
    /// The strategy that was attempted.
    pub strategy: Strategy,
    /// What went wrong.
    #[source]
    pub cause: CompileCause,
}

impl CompileError {
    /// Wrap a cause.
    pub fn new(helper: impl Into<String>, strategy: Strategy, cause: impl Into<CompileCause>) -> Self {
        Self {
            helper: helper.into(),
            strategy,
            cause: cause.into(),
        }
    }

    /// Check if constructor resolution failed.
    pub fn is_constructor_error(&self) -> bool {
        matches!(
            self.cause,
            CompileCause::NoValidConstructor(_) | CompileCause::InaccessibleConstructor(_)
        )
    }
}
