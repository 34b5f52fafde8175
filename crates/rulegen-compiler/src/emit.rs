//! Method body emitter.
//!
//! The [`MethodEmitter`] provides a typed API for generating one method body.
//! Every instruction declares its stack effect to the method's
//! [`CompileContext`], so `max_stack` and `max_locals` fall out of emission,
//! and labels check that all paths meeting at them agree on stack depth.
//!
//! # Example
//!
//! ```ignore
//! let mut pool = ConstantPool::new();
//! let mut em = MethodEmitter::new(&mut pool, 1);
//!
//! em.notify_source_line(12);
//! em.aload(0);
//! em.getfield("a/Adapter", "rule", &JvmType::class("a/Rule"));
//! em.invokevirtual("a/Rule", "getName", &MethodDescriptor::returning(JvmType::string()));
//! em.return_value(&JvmType::string());
//!
//! let code = em.finish()?;
//! ```

use rulegen_classfile::{CodeAttribute, CodeBuffer, ConstantPool, Label, Opcode};
use rulegen_core::{ClassFileError, JvmType, MethodDescriptor};

use crate::CompileContext;

/// Emits the bytecode of a single method.
///
/// Uses the class-level constant pool for deduplication across methods.
pub struct MethodEmitter<'pool> {
    /// The method body being built
    code: CodeBuffer,

    /// Shared class-level constant pool (deduplicated)
    pool: &'pool mut ConstantPool,

    /// Stack and local accounting
    cc: CompileContext,

    /// Expected stack depth at each label, indexed by label id
    label_depths: Vec<Option<u16>>,

    /// Whether the next instruction can be reached by falling through
    reachable: bool,
}

impl<'pool> MethodEmitter<'pool> {
    /// Create an emitter for a method whose receiver and parameters occupy
    /// `param_slots` local slots.
    pub fn new(pool: &'pool mut ConstantPool, param_slots: u16) -> Self {
        Self {
            code: CodeBuffer::new(),
            pool,
            cc: CompileContext::new(param_slots),
            label_depths: Vec::new(),
            reachable: true,
        }
    }

    /// The method's stack and local accounting.
    pub fn context(&self) -> &CompileContext {
        &self.cc
    }

    /// Mutable access to the accounting, for local allocation.
    pub fn context_mut(&mut self) -> &mut CompileContext {
        &mut self.cc
    }

    /// The class-level constant pool.
    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        self.pool
    }

    /// Assert the stack is empty at a statement boundary.
    pub fn assert_balanced(&self) {
        self.cc.assert_balanced();
    }

    /// Check whether the next instruction is reachable by fall-through.
    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    /// Current code length.
    pub fn code_len(&self) -> usize {
        self.code.offset()
    }

    // ==========================================================================
    // Basic Emission
    // ==========================================================================

    /// Emit an instruction with no operands and a fixed stack effect.
    ///
    /// # Panics
    ///
    /// Panics for opcodes that carry operands or whose effect depends on the
    /// constant pool; those have dedicated methods.
    pub fn emit(&mut self, op: Opcode) {
        assert!(
            op.operand_size() == 0,
            "{} needs operands; use its dedicated emitter",
            op
        );
        let Some(effect) = op.fixed_effect() else {
            panic!("{} has no fixed stack effect", op);
        };
        self.cc.pop(effect.pop);
        self.cc.push(effect.push);
        self.code.write_op(op);
        if op.is_terminal() {
            self.reachable = false;
        }
    }

    fn emit_u16(&mut self, op: Opcode, operand: u16) {
        self.code.write_op(op);
        self.code.write_u16(operand);
    }

    // ==========================================================================
    // Constants
    // ==========================================================================

    /// Push `null`.
    pub fn aconst_null(&mut self) {
        self.emit(Opcode::AconstNull);
    }

    /// Push an `int`, using the shortest encoding.
    pub fn iconst(&mut self, value: i32) {
        match value {
            -1 => self.emit(Opcode::IconstM1),
            0 => self.emit(Opcode::Iconst0),
            1 => self.emit(Opcode::Iconst1),
            2 => self.emit(Opcode::Iconst2),
            3 => self.emit(Opcode::Iconst3),
            4 => self.emit(Opcode::Iconst4),
            5 => self.emit(Opcode::Iconst5),
            v if i8::try_from(v).is_ok() => {
                self.code.write_op(Opcode::Bipush);
                self.code.write_u8(v as i8 as u8);
                self.cc.push(1);
            }
            v if i16::try_from(v).is_ok() => {
                self.emit_u16(Opcode::Sipush, v as i16 as u16);
                self.cc.push(1);
            }
            v => {
                let index = self.pool.integer(v);
                self.ldc(index);
            }
        }
    }

    /// Push a `long`.
    pub fn lconst(&mut self, value: i64) {
        match value {
            0 => self.emit(Opcode::Lconst0),
            1 => self.emit(Opcode::Lconst1),
            v => {
                let index = self.pool.long(v);
                self.emit_u16(Opcode::Ldc2W, index);
                self.cc.push(2);
            }
        }
    }

    /// Push a `float`.
    pub fn fconst(&mut self, value: f32) {
        if value.to_bits() == 0.0f32.to_bits() {
            self.emit(Opcode::Fconst0);
        } else if value == 1.0 {
            self.emit(Opcode::Fconst1);
        } else if value == 2.0 {
            self.emit(Opcode::Fconst2);
        } else {
            let index = self.pool.float(value);
            self.ldc(index);
        }
    }

    /// Push a `double`.
    pub fn dconst(&mut self, value: f64) {
        if value.to_bits() == 0.0f64.to_bits() {
            self.emit(Opcode::Dconst0);
        } else if value == 1.0 {
            self.emit(Opcode::Dconst1);
        } else {
            let index = self.pool.double(value);
            self.emit_u16(Opcode::Ldc2W, index);
            self.cc.push(2);
        }
    }

    /// Push a string literal.
    pub fn ldc_string(&mut self, value: &str) {
        let index = self.pool.string(value);
        self.ldc(index);
    }

    /// Push the zero value of a type: `0`, `0L`, `0.0f`, `0.0` or `null`.
    pub fn push_zero(&mut self, ty: &JvmType) {
        match ty {
            JvmType::Void => {}
            JvmType::Long => self.lconst(0),
            JvmType::Float => self.fconst(0.0),
            JvmType::Double => self.dconst(0.0),
            t if t.is_reference() => self.aconst_null(),
            _ => self.iconst(0),
        }
    }

    /// Push a single-slot constant by pool index.
    fn ldc(&mut self, index: u16) {
        match u8::try_from(index) {
            Ok(narrow) => {
                self.code.write_op(Opcode::Ldc);
                self.code.write_u8(narrow);
            }
            Err(_) => self.emit_u16(Opcode::LdcW, index),
        }
        self.cc.push(1);
    }

    // ==========================================================================
    // Locals
    // ==========================================================================

    /// Load a local of type `ty`.
    pub fn load(&mut self, ty: &JvmType, slot: u16) {
        let (short, long) = match ty {
            JvmType::Long => (Opcode::Lload0, Opcode::Lload),
            JvmType::Float => (Opcode::Fload0, Opcode::Fload),
            JvmType::Double => (Opcode::Dload0, Opcode::Dload),
            t if t.is_reference() => (Opcode::Aload0, Opcode::Aload),
            _ => (Opcode::Iload0, Opcode::Iload),
        };
        self.local_op(short, long, slot, ty.slots());
        self.cc.push(ty.slots());
    }

    /// Store the top of stack into a local of type `ty`.
    pub fn store(&mut self, ty: &JvmType, slot: u16) {
        let (short, long) = match ty {
            JvmType::Long => (Opcode::Lstore0, Opcode::Lstore),
            JvmType::Float => (Opcode::Fstore0, Opcode::Fstore),
            JvmType::Double => (Opcode::Dstore0, Opcode::Dstore),
            t if t.is_reference() => (Opcode::Astore0, Opcode::Astore),
            _ => (Opcode::Istore0, Opcode::Istore),
        };
        self.cc.pop(ty.slots());
        self.local_op(short, long, slot, ty.slots());
    }

    /// Load a reference local.
    pub fn aload(&mut self, slot: u16) {
        self.load(&JvmType::object(), slot);
    }

    /// Store a reference local.
    pub fn astore(&mut self, slot: u16) {
        self.store(&JvmType::object(), slot);
    }

    /// Increment an `int` local.
    pub fn iinc(&mut self, slot: u16, delta: i8) {
        let index = Self::narrow_slot(slot);
        self.cc.note_local(slot, 1);
        self.code.write_op(Opcode::Iinc);
        self.code.write_u8(index);
        self.code.write_u8(delta as u8);
    }

    fn local_op(&mut self, short: Opcode, long: Opcode, slot: u16, width: u16) {
        self.cc.note_local(slot, width);
        if slot <= 3 {
            let op = u8::from(short) + slot as u8;
            self.code.write_u8(op);
        } else {
            self.code.write_op(long);
            self.code.write_u8(Self::narrow_slot(slot));
        }
    }

    fn narrow_slot(slot: u16) -> u8 {
        match u8::try_from(slot) {
            Ok(index) => index,
            Err(_) => panic!("local slot {} needs wide addressing", slot),
        }
    }

    // ==========================================================================
    // Stack Operations
    // ==========================================================================

    /// Discard a value of type `ty`.
    pub fn pop_value(&mut self, ty: &JvmType) {
        match ty.slots() {
            0 => {}
            1 => self.emit(Opcode::Pop),
            _ => self.emit(Opcode::Pop2),
        }
    }

    /// Duplicate a value of type `ty`.
    pub fn dup_value(&mut self, ty: &JvmType) {
        match ty.slots() {
            0 => {}
            1 => self.emit(Opcode::Dup),
            _ => self.emit(Opcode::Dup2),
        }
    }

    /// Duplicate the top slot.
    pub fn dup(&mut self) {
        self.emit(Opcode::Dup);
    }

    /// Swap the top two single-slot values.
    pub fn swap(&mut self) {
        self.emit(Opcode::Swap);
    }

    // ==========================================================================
    // Fields
    // ==========================================================================

    /// Read an instance field: `obj -> value`.
    pub fn getfield(&mut self, owner: &str, name: &str, ty: &JvmType) {
        let index = self.pool.field_ref(owner, name, &ty.descriptor());
        self.emit_u16(Opcode::Getfield, index);
        self.cc.pop(1);
        self.cc.push(ty.slots());
    }

    /// Write an instance field: `obj, value -> `.
    pub fn putfield(&mut self, owner: &str, name: &str, ty: &JvmType) {
        let index = self.pool.field_ref(owner, name, &ty.descriptor());
        self.emit_u16(Opcode::Putfield, index);
        self.cc.pop(1 + ty.slots());
    }

    /// Read a static field.
    pub fn getstatic(&mut self, owner: &str, name: &str, ty: &JvmType) {
        let index = self.pool.field_ref(owner, name, &ty.descriptor());
        self.emit_u16(Opcode::Getstatic, index);
        self.cc.push(ty.slots());
    }

    /// Write a static field.
    pub fn putstatic(&mut self, owner: &str, name: &str, ty: &JvmType) {
        let index = self.pool.field_ref(owner, name, &ty.descriptor());
        self.emit_u16(Opcode::Putstatic, index);
        self.cc.pop(ty.slots());
    }

    // ==========================================================================
    // Invocations
    // ==========================================================================

    /// Call a virtual method.
    pub fn invokevirtual(&mut self, owner: &str, name: &str, desc: &MethodDescriptor) {
        let index = self.pool.method_ref(owner, name, desc);
        self.emit_u16(Opcode::Invokevirtual, index);
        self.invoke_effect(desc, true);
    }

    /// Call a constructor, private method or superclass method.
    pub fn invokespecial(&mut self, owner: &str, name: &str, desc: &MethodDescriptor) {
        let index = self.pool.method_ref(owner, name, desc);
        self.emit_u16(Opcode::Invokespecial, index);
        self.invoke_effect(desc, true);
    }

    /// Call a static method.
    pub fn invokestatic(&mut self, owner: &str, name: &str, desc: &MethodDescriptor) {
        let index = self.pool.method_ref(owner, name, desc);
        self.emit_u16(Opcode::Invokestatic, index);
        self.invoke_effect(desc, false);
    }

    /// Call an interface method.
    pub fn invokeinterface(&mut self, owner: &str, name: &str, desc: &MethodDescriptor) {
        let index = self.pool.interface_method_ref(owner, name, desc);
        self.emit_u16(Opcode::Invokeinterface, index);
        self.code.write_u8((desc.arg_slots() + 1) as u8);
        self.code.write_u8(0);
        self.invoke_effect(desc, true);
    }

    fn invoke_effect(&mut self, desc: &MethodDescriptor, has_receiver: bool) {
        self.cc.pop(desc.arg_slots() + u16::from(has_receiver));
        self.cc.push(desc.ret_slots());
    }

    // ==========================================================================
    // Objects and Arrays
    // ==========================================================================

    /// Allocate an uninitialized instance.
    pub fn new_object(&mut self, class: &str) {
        let index = self.pool.class(class);
        self.emit_u16(Opcode::New, index);
        self.cc.push(1);
    }

    /// Check the top reference against a class, array or interface type.
    ///
    /// # Panics
    ///
    /// Panics if `ty` is not a reference type.
    pub fn checkcast(&mut self, ty: &JvmType) {
        let Some(name) = ty.class_name() else {
            panic!("checkcast to non-reference type {}", ty);
        };
        let index = self.pool.class(&name);
        self.emit_u16(Opcode::Checkcast, index);
    }

    /// Test the top reference against a type: `obj -> int`.
    pub fn instanceof(&mut self, ty: &JvmType) {
        let Some(name) = ty.class_name() else {
            panic!("instanceof non-reference type {}", ty);
        };
        let index = self.pool.class(&name);
        self.emit_u16(Opcode::Instanceof, index);
    }

    /// Allocate a reference array: `count -> array`.
    pub fn anewarray(&mut self, element: &JvmType) {
        let Some(name) = element.class_name() else {
            panic!("anewarray of non-reference type {}", element);
        };
        let index = self.pool.class(&name);
        self.emit_u16(Opcode::Anewarray, index);
    }

    /// Load a reference array element: `array, index -> value`.
    pub fn aaload(&mut self) {
        self.emit(Opcode::Aaload);
    }

    /// Store a reference array element: `array, index, value -> `.
    pub fn aastore(&mut self) {
        self.emit(Opcode::Aastore);
    }

    /// Throw the top reference.
    pub fn athrow(&mut self) {
        self.emit(Opcode::Athrow);
    }

    // ==========================================================================
    // Control Flow
    // ==========================================================================

    /// Create a new branch target.
    pub fn new_label(&mut self) -> Label {
        self.label_depths.push(None);
        self.code.new_label()
    }

    /// Emit a conditional or unconditional branch to `label`.
    pub fn branch(&mut self, op: Opcode, label: Label) {
        assert!(
            op.is_branch() && op != Opcode::GotoW,
            "{} is not a short branch",
            op
        );
        let pop = op.fixed_effect().map_or(0, |e| e.pop);
        self.cc.pop(pop);
        self.code.emit_branch(op, label);
        let depth = self.cc.stack_depth();
        self.record_label_depth(label, depth);
        if op.is_terminal() {
            self.reachable = false;
        }
    }

    /// Unconditional jump.
    pub fn goto(&mut self, label: Label) {
        self.branch(Opcode::Goto, label);
    }

    /// Bind `label` to the current position.
    ///
    /// # Panics
    ///
    /// Panics if the fall-through depth disagrees with a branch to this label,
    /// or if the label follows dead code and nothing branches to it.
    pub fn place_label(&mut self, label: Label) {
        let id = label.id() as usize;
        let current = self.cc.stack_depth();
        match (self.reachable, self.label_depths[id]) {
            (true, Some(expected)) => assert!(
                expected == current,
                "unexpected stack count at label {}: branch depth {}, fall-through depth {}",
                id,
                expected,
                current
            ),
            (true, None) => self.label_depths[id] = Some(current),
            (false, Some(expected)) => self.cc.set_stack_depth(expected),
            (false, None) => panic!(
                "unexpected stack count at label {}: unreachable with no incoming branch",
                id
            ),
        }
        self.reachable = true;
        self.code.place_label(label);
    }

    fn record_label_depth(&mut self, label: Label, depth: u16) {
        let slot = &mut self.label_depths[label.id() as usize];
        match *slot {
            Some(expected) => assert!(
                expected == depth,
                "unexpected stack count branching to label {}: expected {}, found {}",
                label.id(),
                expected,
                depth
            ),
            None => *slot = Some(depth),
        }
    }

    /// Return a value of type `ty`, or nothing for `void`.
    pub fn return_value(&mut self, ty: &JvmType) {
        let op = match ty {
            JvmType::Void => Opcode::Return,
            JvmType::Long => Opcode::Lreturn,
            JvmType::Float => Opcode::Freturn,
            JvmType::Double => Opcode::Dreturn,
            t if t.is_reference() => Opcode::Areturn,
            _ => Opcode::Ireturn,
        };
        self.emit(op);
    }

    // ==========================================================================
    // Source Lines
    // ==========================================================================

    /// Attribute subsequent instructions to source line `line`.
    pub fn notify_source_line(&mut self, line: u32) {
        if let Some(line) = self.cc.notify_source_line(line) {
            self.code.mark_line(clamp_line(line));
        }
    }

    /// Emit the end-of-rule line marker (one past the last line noted).
    pub fn notify_source_end(&mut self) {
        if let Some(line) = self.cc.notify_source_end() {
            self.code.mark_line(clamp_line(line));
        }
    }

    /// Finish the method, resolving branches.
    pub fn finish(self) -> Result<CodeAttribute, ClassFileError> {
        self.code.finish(self.cc.stack_max(), self.cc.local_max())
    }
}

fn clamp_line(line: u32) -> u16 {
    u16::try_from(line).unwrap_or(u16::MAX)
}
