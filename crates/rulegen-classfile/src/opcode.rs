//! JVM operation codes.
//!
//! This module defines the subset of the JVM instruction set the generator
//! emits and the verifier understands. Each opcode is a single byte with
//! fixed-size operands following inline; `tableswitch`, `lookupswitch`,
//! `wide`, `jsr` and `ret` are not part of the subset.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Operand-stack effect of an instruction, in slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    /// Slots popped.
    pub pop: u16,
    /// Slots pushed.
    pub push: u16,
}

impl StackEffect {
    pub const fn new(pop: u16, push: u16) -> Self {
        Self { pop, push }
    }

    /// Net change in depth.
    pub fn net(self) -> i32 {
        self.push as i32 - self.pop as i32
    }
}

/// JVM operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Opcode {
    // =========================================================================
    // Constants
    // =========================================================================
    Nop = 0x00,
    AconstNull = 0x01,
    IconstM1 = 0x02,
    Iconst0 = 0x03,
    Iconst1 = 0x04,
    Iconst2 = 0x05,
    Iconst3 = 0x06,
    Iconst4 = 0x07,
    Iconst5 = 0x08,
    Lconst0 = 0x09,
    Lconst1 = 0x0a,
    Fconst0 = 0x0b,
    Fconst1 = 0x0c,
    Fconst2 = 0x0d,
    Dconst0 = 0x0e,
    Dconst1 = 0x0f,
    /// Operand: i8 value
    Bipush = 0x10,
    /// Operand: i16 value
    Sipush = 0x11,
    /// Operand: u8 constant index
    Ldc = 0x12,
    /// Operand: u16 constant index
    LdcW = 0x13,
    /// Operand: u16 constant index (long or double)
    Ldc2W = 0x14,

    // =========================================================================
    // Loads
    // =========================================================================
    /// Operand: u8 local index
    Iload = 0x15,
    Lload = 0x16,
    Fload = 0x17,
    Dload = 0x18,
    Aload = 0x19,
    Iload0 = 0x1a,
    Iload1 = 0x1b,
    Iload2 = 0x1c,
    Iload3 = 0x1d,
    Lload0 = 0x1e,
    Lload1 = 0x1f,
    Lload2 = 0x20,
    Lload3 = 0x21,
    Fload0 = 0x22,
    Fload1 = 0x23,
    Fload2 = 0x24,
    Fload3 = 0x25,
    Dload0 = 0x26,
    Dload1 = 0x27,
    Dload2 = 0x28,
    Dload3 = 0x29,
    Aload0 = 0x2a,
    Aload1 = 0x2b,
    Aload2 = 0x2c,
    Aload3 = 0x2d,
    Iaload = 0x2e,
    Laload = 0x2f,
    Faload = 0x30,
    Daload = 0x31,
    Aaload = 0x32,
    Baload = 0x33,
    Caload = 0x34,
    Saload = 0x35,

    // =========================================================================
    // Stores
    // =========================================================================
    /// Operand: u8 local index
    Istore = 0x36,
    Lstore = 0x37,
    Fstore = 0x38,
    Dstore = 0x39,
    Astore = 0x3a,
    Istore0 = 0x3b,
    Istore1 = 0x3c,
    Istore2 = 0x3d,
    Istore3 = 0x3e,
    Lstore0 = 0x3f,
    Lstore1 = 0x40,
    Lstore2 = 0x41,
    Lstore3 = 0x42,
    Fstore0 = 0x43,
    Fstore1 = 0x44,
    Fstore2 = 0x45,
    Fstore3 = 0x46,
    Dstore0 = 0x47,
    Dstore1 = 0x48,
    Dstore2 = 0x49,
    Dstore3 = 0x4a,
    Astore0 = 0x4b,
    Astore1 = 0x4c,
    Astore2 = 0x4d,
    Astore3 = 0x4e,
    Iastore = 0x4f,
    Lastore = 0x50,
    Fastore = 0x51,
    Dastore = 0x52,
    Aastore = 0x53,
    Bastore = 0x54,
    Castore = 0x55,
    Sastore = 0x56,

    // =========================================================================
    // Stack Operations
    // =========================================================================
    Pop = 0x57,
    Pop2 = 0x58,
    Dup = 0x59,
    DupX1 = 0x5a,
    DupX2 = 0x5b,
    Dup2 = 0x5c,
    Dup2X1 = 0x5d,
    Dup2X2 = 0x5e,
    Swap = 0x5f,

    // =========================================================================
    // Arithmetic
    // =========================================================================
    Iadd = 0x60,
    Ladd = 0x61,
    Fadd = 0x62,
    Dadd = 0x63,
    Isub = 0x64,
    Lsub = 0x65,
    Fsub = 0x66,
    Dsub = 0x67,
    Imul = 0x68,
    Lmul = 0x69,
    Fmul = 0x6a,
    Dmul = 0x6b,
    Idiv = 0x6c,
    Ldiv = 0x6d,
    Fdiv = 0x6e,
    Ddiv = 0x6f,
    Irem = 0x70,
    Lrem = 0x71,
    Frem = 0x72,
    Drem = 0x73,
    Ineg = 0x74,
    Lneg = 0x75,
    Fneg = 0x76,
    Dneg = 0x77,
    Ishl = 0x78,
    Lshl = 0x79,
    Ishr = 0x7a,
    Lshr = 0x7b,
    Iushr = 0x7c,
    Lushr = 0x7d,
    Iand = 0x7e,
    Land = 0x7f,
    Ior = 0x80,
    Lor = 0x81,
    Ixor = 0x82,
    Lxor = 0x83,
    /// Operands: u8 local index, i8 increment
    Iinc = 0x84,

    // =========================================================================
    // Conversions
    // =========================================================================
    I2l = 0x85,
    I2f = 0x86,
    I2d = 0x87,
    L2i = 0x88,
    L2f = 0x89,
    L2d = 0x8a,
    F2i = 0x8b,
    F2l = 0x8c,
    F2d = 0x8d,
    D2i = 0x8e,
    D2l = 0x8f,
    D2f = 0x90,
    I2b = 0x91,
    I2c = 0x92,
    I2s = 0x93,

    // =========================================================================
    // Comparisons
    // =========================================================================
    Lcmp = 0x94,
    Fcmpl = 0x95,
    Fcmpg = 0x96,
    Dcmpl = 0x97,
    Dcmpg = 0x98,

    // =========================================================================
    // Branches
    // =========================================================================
    /// Operand: i16 branch offset (all branches below, except `GotoW`)
    Ifeq = 0x99,
    Ifne = 0x9a,
    Iflt = 0x9b,
    Ifge = 0x9c,
    Ifgt = 0x9d,
    Ifle = 0x9e,
    IfIcmpeq = 0x9f,
    IfIcmpne = 0xa0,
    IfIcmplt = 0xa1,
    IfIcmpge = 0xa2,
    IfIcmpgt = 0xa3,
    IfIcmple = 0xa4,
    IfAcmpeq = 0xa5,
    IfAcmpne = 0xa6,
    Goto = 0xa7,

    // =========================================================================
    // Returns
    // =========================================================================
    Ireturn = 0xac,
    Lreturn = 0xad,
    Freturn = 0xae,
    Dreturn = 0xaf,
    Areturn = 0xb0,
    Return = 0xb1,

    // =========================================================================
    // Fields and Methods
    // =========================================================================
    /// Operand: u16 field reference
    Getstatic = 0xb2,
    Putstatic = 0xb3,
    Getfield = 0xb4,
    Putfield = 0xb5,
    /// Operand: u16 method reference
    Invokevirtual = 0xb6,
    Invokespecial = 0xb7,
    Invokestatic = 0xb8,
    /// Operands: u16 interface method reference, u8 count, u8 zero
    Invokeinterface = 0xb9,

    // =========================================================================
    // Objects
    // =========================================================================
    /// Operand: u16 class reference
    New = 0xbb,
    /// Operand: u8 array type code
    Newarray = 0xbc,
    /// Operand: u16 class reference
    Anewarray = 0xbd,
    Arraylength = 0xbe,
    Athrow = 0xbf,
    /// Operand: u16 class reference
    Checkcast = 0xc0,
    /// Operand: u16 class reference
    Instanceof = 0xc1,
    Monitorenter = 0xc2,
    Monitorexit = 0xc3,

    // =========================================================================
    // Extended Branches
    // =========================================================================
    Ifnull = 0xc6,
    Ifnonnull = 0xc7,
    /// Operand: i32 branch offset
    GotoW = 0xc8,
}

impl Opcode {
    /// Decode an opcode byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::try_from(value).ok()
    }

    /// Get the size of operands for this opcode in bytes.
    ///
    /// This does NOT include the opcode byte itself.
    pub fn operand_size(self) -> usize {
        use Opcode::*;
        match self {
            Bipush | Ldc | Newarray => 1,
            Iload | Lload | Fload | Dload | Aload => 1,
            Istore | Lstore | Fstore | Dstore | Astore => 1,
            Sipush | LdcW | Ldc2W | Iinc => 2,
            Getstatic | Putstatic | Getfield | Putfield => 2,
            Invokevirtual | Invokespecial | Invokestatic => 2,
            New | Anewarray | Checkcast | Instanceof => 2,
            Invokeinterface | GotoW => 4,
            op if op.is_branch() => 2,
            _ => 0,
        }
    }

    /// Total encoded length including the opcode byte.
    pub fn encoded_len(self) -> usize {
        1 + self.operand_size()
    }

    /// Check if this opcode carries a branch offset.
    pub fn is_branch(self) -> bool {
        let b = u8::from(self);
        (0x99..=0xa7).contains(&b) || matches!(self, Opcode::Ifnull | Opcode::Ifnonnull | Opcode::GotoW)
    }

    /// Check if control never falls through to the next instruction.
    pub fn is_terminal(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Goto | GotoW | Ireturn | Lreturn | Freturn | Dreturn | Areturn | Return | Athrow
        )
    }

    /// Check if this is one of the return instructions.
    pub fn is_return(self) -> bool {
        (0xac..=0xb1).contains(&u8::from(self))
    }

    /// Check if this instruction accesses a local variable slot.
    ///
    /// Returns the slot width and, for the `_n` forms, the implied index.
    pub fn local_access(self) -> Option<(u16, Option<u16>)> {
        use Opcode::*;
        let b = u8::from(self);
        match self {
            Iload | Fload | Aload | Istore | Fstore | Astore | Iinc => Some((1, None)),
            Lload | Dload | Lstore | Dstore => Some((2, None)),
            _ if (0x1a..=0x2d).contains(&b) => {
                let group = (b - 0x1a) / 4;
                let width = if group == 1 || group == 3 { 2 } else { 1 };
                Some((width, Some(((b - 0x1a) % 4) as u16)))
            }
            _ if (0x3b..=0x4e).contains(&b) => {
                let group = (b - 0x3b) / 4;
                let width = if group == 1 || group == 3 { 2 } else { 1 };
                Some((width, Some(((b - 0x3b) % 4) as u16)))
            }
            _ => None,
        }
    }

    /// Stack effect for instructions whose effect does not depend on a
    /// constant pool entry.
    ///
    /// Returns `None` for `ldc*`, field access and invocations.
    pub fn fixed_effect(self) -> Option<StackEffect> {
        use Opcode::*;
        let e = StackEffect::new;
        let effect = match self {
            Nop => e(0, 0),
            AconstNull | IconstM1 | Iconst0 | Iconst1 | Iconst2 | Iconst3 | Iconst4 | Iconst5 => {
                e(0, 1)
            }
            Lconst0 | Lconst1 | Dconst0 | Dconst1 => e(0, 2),
            Fconst0 | Fconst1 | Fconst2 | Bipush | Sipush => e(0, 1),
            Ldc | LdcW | Ldc2W => return None,

            Iload | Fload | Aload | Iload0 | Iload1 | Iload2 | Iload3 | Fload0 | Fload1
            | Fload2 | Fload3 | Aload0 | Aload1 | Aload2 | Aload3 => e(0, 1),
            Lload | Dload | Lload0 | Lload1 | Lload2 | Lload3 | Dload0 | Dload1 | Dload2
            | Dload3 => e(0, 2),
            Iaload | Faload | Aaload | Baload | Caload | Saload => e(2, 1),
            Laload | Daload => e(2, 2),

            Istore | Fstore | Astore | Istore0 | Istore1 | Istore2 | Istore3 | Fstore0
            | Fstore1 | Fstore2 | Fstore3 | Astore0 | Astore1 | Astore2 | Astore3 => e(1, 0),
            Lstore | Dstore | Lstore0 | Lstore1 | Lstore2 | Lstore3 | Dstore0 | Dstore1
            | Dstore2 | Dstore3 => e(2, 0),
            Iastore | Fastore | Aastore | Bastore | Castore | Sastore => e(3, 0),
            Lastore | Dastore => e(4, 0),

            Pop => e(1, 0),
            Pop2 => e(2, 0),
            Dup => e(1, 2),
            DupX1 => e(2, 3),
            DupX2 => e(3, 4),
            Dup2 => e(2, 4),
            Dup2X1 => e(3, 5),
            Dup2X2 => e(4, 6),
            Swap => e(2, 2),

            Iadd | Fadd | Isub | Fsub | Imul | Fmul | Idiv | Fdiv | Irem | Frem | Ishl | Ishr
            | Iushr | Iand | Ior | Ixor => e(2, 1),
            Ladd | Dadd | Lsub | Dsub | Lmul | Dmul | Ldiv | Ddiv | Lrem | Drem | Land | Lor
            | Lxor => e(4, 2),
            Lshl | Lshr | Lushr => e(3, 2),
            Ineg | Fneg => e(1, 1),
            Lneg | Dneg => e(2, 2),
            Iinc => e(0, 0),

            I2l | I2d | F2l | F2d => e(1, 2),
            I2f | F2i | I2b | I2c | I2s => e(1, 1),
            L2i | L2f | D2i | D2f => e(2, 1),
            L2d | D2l => e(2, 2),

            Lcmp | Dcmpl | Dcmpg => e(4, 1),
            Fcmpl | Fcmpg => e(2, 1),

            Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | Ifnull | Ifnonnull => e(1, 0),
            IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge | IfIcmpgt | IfIcmple | IfAcmpeq
            | IfAcmpne => e(2, 0),
            Goto | GotoW => e(0, 0),

            Ireturn | Freturn | Areturn => e(1, 0),
            Lreturn | Dreturn => e(2, 0),
            Return => e(0, 0),

            Getstatic | Putstatic | Getfield | Putfield => return None,
            Invokevirtual | Invokespecial | Invokestatic | Invokeinterface => return None,

            New => e(0, 1),
            Newarray | Anewarray | Arraylength | Checkcast | Instanceof => e(1, 1),
            Athrow | Monitorenter | Monitorexit => e(1, 0),
        };
        Some(effect)
    }

    /// Get the mnemonic of this opcode.
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "nop",
            AconstNull => "aconst_null",
            IconstM1 => "iconst_m1",
            Iconst0 => "iconst_0",
            Iconst1 => "iconst_1",
            Iconst2 => "iconst_2",
            Iconst3 => "iconst_3",
            Iconst4 => "iconst_4",
            Iconst5 => "iconst_5",
            Lconst0 => "lconst_0",
            Lconst1 => "lconst_1",
            Fconst0 => "fconst_0",
            Fconst1 => "fconst_1",
            Fconst2 => "fconst_2",
            Dconst0 => "dconst_0",
            Dconst1 => "dconst_1",
            Bipush => "bipush",
            Sipush => "sipush",
            Ldc => "ldc",
            LdcW => "ldc_w",
            Ldc2W => "ldc2_w",
            Iload => "iload",
            Lload => "lload",
            Fload => "fload",
            Dload => "dload",
            Aload => "aload",
            Iload0 => "iload_0",
            Iload1 => "iload_1",
            Iload2 => "iload_2",
            Iload3 => "iload_3",
            Lload0 => "lload_0",
            Lload1 => "lload_1",
            Lload2 => "lload_2",
            Lload3 => "lload_3",
            Fload0 => "fload_0",
            Fload1 => "fload_1",
            Fload2 => "fload_2",
            Fload3 => "fload_3",
            Dload0 => "dload_0",
            Dload1 => "dload_1",
            Dload2 => "dload_2",
            Dload3 => "dload_3",
            Aload0 => "aload_0",
            Aload1 => "aload_1",
            Aload2 => "aload_2",
            Aload3 => "aload_3",
            Iaload => "iaload",
            Laload => "laload",
            Faload => "faload",
            Daload => "daload",
            Aaload => "aaload",
            Baload => "baload",
            Caload => "caload",
            Saload => "saload",
            Istore => "istore",
            Lstore => "lstore",
            Fstore => "fstore",
            Dstore => "dstore",
            Astore => "astore",
            Istore0 => "istore_0",
            Istore1 => "istore_1",
            Istore2 => "istore_2",
            Istore3 => "istore_3",
            Lstore0 => "lstore_0",
            Lstore1 => "lstore_1",
            Lstore2 => "lstore_2",
            Lstore3 => "lstore_3",
            Fstore0 => "fstore_0",
            Fstore1 => "fstore_1",
            Fstore2 => "fstore_2",
            Fstore3 => "fstore_3",
            Dstore0 => "dstore_0",
            Dstore1 => "dstore_1",
            Dstore2 => "dstore_2",
            Dstore3 => "dstore_3",
            Astore0 => "astore_0",
            Astore1 => "astore_1",
            Astore2 => "astore_2",
            Astore3 => "astore_3",
            Iastore => "iastore",
            Lastore => "lastore",
            Fastore => "fastore",
            Dastore => "dastore",
            Aastore => "aastore",
            Bastore => "bastore",
            Castore => "castore",
            Sastore => "sastore",
            Pop => "pop",
            Pop2 => "pop2",
            Dup => "dup",
            DupX1 => "dup_x1",
            DupX2 => "dup_x2",
            Dup2 => "dup2",
            Dup2X1 => "dup2_x1",
            Dup2X2 => "dup2_x2",
            Swap => "swap",
            Iadd => "iadd",
            Ladd => "ladd",
            Fadd => "fadd",
            Dadd => "dadd",
            Isub => "isub",
            Lsub => "lsub",
            Fsub => "fsub",
            Dsub => "dsub",
            Imul => "imul",
            Lmul => "lmul",
            Fmul => "fmul",
            Dmul => "dmul",
            Idiv => "idiv",
            Ldiv => "ldiv",
            Fdiv => "fdiv",
            Ddiv => "ddiv",
            Irem => "irem",
            Lrem => "lrem",
            Frem => "frem",
            Drem => "drem",
            Ineg => "ineg",
            Lneg => "lneg",
            Fneg => "fneg",
            Dneg => "dneg",
            Ishl => "ishl",
            Lshl => "lshl",
            Ishr => "ishr",
            Lshr => "lshr",
            Iushr => "iushr",
            Lushr => "lushr",
            Iand => "iand",
            Land => "land",
            Ior => "ior",
            Lor => "lor",
            Ixor => "ixor",
            Lxor => "lxor",
            Iinc => "iinc",
            I2l => "i2l",
            I2f => "i2f",
            I2d => "i2d",
            L2i => "l2i",
            L2f => "l2f",
            L2d => "l2d",
            F2i => "f2i",
            F2l => "f2l",
            F2d => "f2d",
            D2i => "d2i",
            D2l => "d2l",
            D2f => "d2f",
            I2b => "i2b",
            I2c => "i2c",
            I2s => "i2s",
            Lcmp => "lcmp",
            Fcmpl => "fcmpl",
            Fcmpg => "fcmpg",
            Dcmpl => "dcmpl",
            Dcmpg => "dcmpg",
            Ifeq => "ifeq",
            Ifne => "ifne",
            Iflt => "iflt",
            Ifge => "ifge",
            Ifgt => "ifgt",
            Ifle => "ifle",
            IfIcmpeq => "if_icmpeq",
            IfIcmpne => "if_icmpne",
            IfIcmplt => "if_icmplt",
            IfIcmpge => "if_icmpge",
            IfIcmpgt => "if_icmpgt",
            IfIcmple => "if_icmple",
            IfAcmpeq => "if_acmpeq",
            IfAcmpne => "if_acmpne",
            Goto => "goto",
            Ireturn => "ireturn",
            Lreturn => "lreturn",
            Freturn => "freturn",
            Dreturn => "dreturn",
            Areturn => "areturn",
            Return => "return",
            Getstatic => "getstatic",
            Putstatic => "putstatic",
            Getfield => "getfield",
            Putfield => "putfield",
            Invokevirtual => "invokevirtual",
            Invokespecial => "invokespecial",
            Invokestatic => "invokestatic",
            Invokeinterface => "invokeinterface",
            New => "new",
            Newarray => "newarray",
            Anewarray => "anewarray",
            Arraylength => "arraylength",
            Athrow => "athrow",
            Checkcast => "checkcast",
            Instanceof => "instanceof",
            Monitorenter => "monitorenter",
            Monitorexit => "monitorexit",
            Ifnull => "ifnull",
            Ifnonnull => "ifnonnull",
            GotoW => "goto_w",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
