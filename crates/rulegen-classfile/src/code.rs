//! Method body assembly.
//!
//! A [`CodeBuffer`] holds the bytes of a single method body along with the
//! source line table. Forward branches are emitted against a [`Label`] with a
//! placeholder offset and patched when the body is finished.

use rulegen_core::ClassFileError;

use crate::Opcode;

/// A branch target inside one method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) u32);

impl Label {
    /// Label id, unique within its buffer.
    pub fn id(self) -> u32 {
        self.0
    }
}

/// A `LineNumberTable` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    /// First instruction offset covered by the line.
    pub start_pc: u16,
    /// Source line.
    pub line: u16,
}

/// An exception table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Catch type class index, 0 for any.
    pub catch_type: u16,
}

/// A finished `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub line_numbers: Vec<LineNumber>,
}

/// A branch awaiting its target offset.
#[derive(Debug, Clone, Copy)]
struct Fixup {
    /// Offset of the branch opcode.
    at: usize,
    /// Offset of the 16-bit operand.
    operand: usize,
    label: Label,
}

/// Bytecode for a single method, with line information.
#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    /// The bytecode instructions.
    code: Vec<u8>,
    /// Line table in offset order.
    lines: Vec<LineNumber>,
    /// Offset of each label, once placed.
    labels: Vec<Option<usize>>,
    /// Pending branch operands.
    fixups: Vec<Fixup>,
}

impl CodeBuffer {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an opcode.
    pub fn write_op(&mut self, op: Opcode) {
        self.code.push(op.into());
    }

    /// Write a byte operand.
    pub fn write_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    /// Write a 16-bit operand (big-endian).
    pub fn write_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_be_bytes());
    }

    /// Get current code offset.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Allocate a new, unplaced label.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Bind `label` to the current offset.
    ///
    /// # Panics
    ///
    /// Panics if the label was already placed.
    pub fn place_label(&mut self, label: Label) {
        let slot = &mut self.labels[label.0 as usize];
        assert!(slot.is_none(), "label {} placed twice", label.0);
        *slot = Some(self.code.len());
    }

    /// Offset of a placed label.
    pub fn label_offset(&self, label: Label) -> Option<usize> {
        self.labels.get(label.0 as usize).copied().flatten()
    }

    /// Emit a branch instruction targeting `label`.
    ///
    /// The offset is written as a placeholder and patched by [`finish`](Self::finish).
    pub fn emit_branch(&mut self, op: Opcode, label: Label) {
        debug_assert!(op.is_branch() && op != Opcode::GotoW);
        let at = self.code.len();
        self.write_op(op);
        let operand = self.code.len();
        self.write_u16(0xFFFF); // Placeholder
        self.fixups.push(Fixup { at, operand, label });
    }

    /// Record that code emitted from here on belongs to `line`.
    ///
    /// A second line at the same offset replaces the first.
    pub fn mark_line(&mut self, line: u16) {
        let pc = self.code.len() as u16;
        match self.lines.last_mut() {
            Some(last) if last.start_pc == pc => last.line = line,
            Some(last) if last.line == line => {}
            _ => self.lines.push(LineNumber { start_pc: pc, line }),
        }
    }

    /// Get the raw code bytes.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Get the line table.
    pub fn lines(&self) -> &[LineNumber] {
        &self.lines
    }

    /// Resolve branch offsets and produce the `Code` attribute.
    pub fn finish(mut self, max_stack: u16, max_locals: u16) -> Result<CodeAttribute, ClassFileError> {
        if self.code.len() > u16::MAX as usize {
            return Err(ClassFileError::CodeTooLarge(self.code.len()));
        }

        for fixup in &self.fixups {
            let target = self.labels[fixup.label.0 as usize]
                .ok_or(ClassFileError::UnplacedLabel(fixup.label.0))?;
            let delta = target as i64 - fixup.at as i64;
            let delta = i16::try_from(delta).map_err(|_| ClassFileError::BranchOutOfRange {
                at: fixup.at,
                target,
            })?;
            self.code[fixup.operand..fixup.operand + 2].copy_from_slice(&delta.to_be_bytes());
        }

        // A trailing entry past the last instruction covers nothing.
        let len = self.code.len() as u16;
        self.lines.retain(|l| l.start_pc < len);

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code: self.code,
            exception_table: Vec::new(),
            line_numbers: self.lines,
        })
    }
}
