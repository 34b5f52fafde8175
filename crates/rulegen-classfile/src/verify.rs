//! Structural verification of class files.
//!
//! The verifier re-derives the operand-stack depth of every instruction by
//! walking all control-flow paths of each method. It checks the properties a
//! JVM's type-inferencing verifier would reject first for code of this shape:
//! stack underflow and overflow against the declared `max_stack`, local slots
//! against `max_locals`, agreement of depths where paths merge, branch targets
//! on instruction boundaries, constant kinds behind instruction operands,
//! return instructions against the method descriptor, and no path falling off
//! the end of the code.
//!
//! Stack depths are counted in slots; `long` and `double` take two.

use rulegen_core::{JvmType, MethodDescriptor, VerifyError};

use crate::code::CodeAttribute;
use crate::constant::{Constant, MemberKind};
use crate::reader::{ParsedClass, ParsedMethod};
use crate::writer::AccessFlags;
use crate::{ConstantPool, Opcode, StackEffect};

/// Per-method verification results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSummary {
    /// Name and descriptor.
    pub signature: String,
    /// Declared `max_stack`.
    pub declared_max_stack: u16,
    /// Deepest stack reached on any path.
    pub max_depth: u16,
    /// Declared `max_locals`.
    pub declared_max_locals: u16,
    /// Highest local slot touched plus one (including parameters).
    pub locals_used: u16,
}

/// The result of verifying a class.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// The parsed class.
    pub class: ParsedClass,
    /// One summary per method with code.
    pub methods: Vec<MethodSummary>,
}

impl VerifyReport {
    /// Summary for a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodSummary> {
        self.methods
            .iter()
            .find(|m| m.signature.split('(').next() == Some(name))
    }
}

/// Parse and verify a class file.
pub fn verify_class(bytes: &[u8]) -> Result<VerifyReport, VerifyError> {
    let class = ParsedClass::parse(bytes)?;
    let mut methods = Vec::with_capacity(class.methods.len());
    for method in &class.methods {
        if let Some(summary) = verify_method(&class.pool, method)? {
            methods.push(summary);
        }
    }
    Ok(VerifyReport { class, methods })
}

/// Verify one method. Returns `None` for abstract and native methods.
pub fn verify_method(
    pool: &ConstantPool,
    method: &ParsedMethod,
) -> Result<Option<MethodSummary>, VerifyError> {
    let signature = method.signature();
    let bodyless = method
        .access
        .intersects(AccessFlags::ABSTRACT | AccessFlags::NATIVE);
    let code = match (&method.code, bodyless) {
        (Some(code), _) => code,
        (None, true) => return Ok(None),
        (None, false) => return Err(VerifyError::MissingCode { method: signature }),
    };
    let descriptor = method.parsed_descriptor()?;

    let mut walker = Walker {
        pool,
        code,
        method: signature,
        descriptor,
        depths: vec![None; code.code.len()],
        max_depth: 0,
        locals_used: 0,
    };
    walker.check_parameters(method.is_static())?;
    let starts = walker.decode_boundaries()?;
    walker.check_lines(&starts)?;
    walker.walk(&starts)?;

    Ok(Some(MethodSummary {
        signature: walker.method,
        declared_max_stack: code.max_stack,
        max_depth: walker.max_depth,
        declared_max_locals: code.max_locals,
        locals_used: walker.locals_used,
    }))
}

struct Walker<'a> {
    pool: &'a ConstantPool,
    code: &'a CodeAttribute,
    method: String,
    descriptor: MethodDescriptor,
    /// Stack depth on entry to each instruction, once reached.
    depths: Vec<Option<u32>>,
    max_depth: u16,
    locals_used: u16,
}

impl Walker<'_> {
    fn bytes(&self) -> &[u8] {
        &self.code.code
    }

    fn u16_at(&self, pc: usize) -> u16 {
        u16::from_be_bytes([self.bytes()[pc], self.bytes()[pc + 1]])
    }

    fn check_parameters(&mut self, is_static: bool) -> Result<(), VerifyError> {
        let needed = self.descriptor.arg_slots() + u16::from(!is_static);
        self.locals_used = needed;
        if needed > self.code.max_locals {
            return Err(VerifyError::LocalOutOfRange {
                method: self.method.clone(),
                pc: 0,
                index: needed.saturating_sub(1),
                max: self.code.max_locals,
            });
        }
        Ok(())
    }

    /// Linear decode pass: marks instruction starts and rejects unknown opcodes.
    fn decode_boundaries(&self) -> Result<Vec<bool>, VerifyError> {
        let len = self.bytes().len();
        let mut starts = vec![false; len];
        let mut pc = 0;
        while pc < len {
            let byte = self.bytes()[pc];
            let op = Opcode::from_u8(byte).ok_or_else(|| VerifyError::UnsupportedOpcode {
                method: self.method.clone(),
                pc,
                opcode: byte,
            })?;
            if pc + op.encoded_len() > len {
                return Err(VerifyError::TruncatedInstruction {
                    method: self.method.clone(),
                    pc,
                });
            }
            starts[pc] = true;
            pc += op.encoded_len();
        }
        Ok(starts)
    }

    fn check_lines(&self, starts: &[bool]) -> Result<(), VerifyError> {
        for entry in &self.code.line_numbers {
            let pc = entry.start_pc as usize;
            if !starts.get(pc).copied().unwrap_or(false) {
                return Err(VerifyError::BadLineNumber {
                    method: self.method.clone(),
                    pc,
                });
            }
        }
        Ok(())
    }

    fn walk(&mut self, starts: &[bool]) -> Result<(), VerifyError> {
        if self.bytes().is_empty() {
            return Err(VerifyError::FallsOffEnd {
                method: self.method.clone(),
            });
        }

        let mut work = vec![(0usize, 0u32)];
        for handler in &self.code.exception_table {
            work.push((handler.handler_pc as usize, 1));
        }

        while let Some((pc, depth)) = work.pop() {
            if !starts.get(pc).copied().unwrap_or(false) {
                return Err(VerifyError::BadBranchTarget {
                    method: self.method.clone(),
                    pc,
                    target: pc as i64,
                });
            }
            match self.depths[pc] {
                Some(seen) if seen == depth => continue,
                Some(seen) => {
                    return Err(VerifyError::InconsistentDepth {
                        method: self.method.clone(),
                        pc,
                        first: seen,
                        second: depth,
                    });
                }
                None => self.depths[pc] = Some(depth),
            }

            // decode_boundaries guarantees the opcode is known.
            let Some(op) = Opcode::from_u8(self.bytes()[pc]) else {
                continue;
            };
            self.check_locals(op, pc)?;
            self.check_return(op, pc)?;

            let effect = self.effect(op, pc)?;
            if depth < effect.pop as u32 {
                return Err(VerifyError::StackUnderflow {
                    method: self.method.clone(),
                    pc,
                });
            }
            let after = depth - effect.pop as u32 + effect.push as u32;
            if after > self.code.max_stack as u32 {
                return Err(VerifyError::StackOverflow {
                    method: self.method.clone(),
                    pc,
                    depth: after,
                    max: self.code.max_stack,
                });
            }
            self.max_depth = self.max_depth.max(after as u16);

            if op.is_branch() {
                let target = self.branch_target(op, pc);
                if target < 0 || target as usize >= starts.len() || !starts[target as usize] {
                    return Err(VerifyError::BadBranchTarget {
                        method: self.method.clone(),
                        pc,
                        target,
                    });
                }
                work.push((target as usize, after));
            }

            if !op.is_terminal() {
                let next = pc + op.encoded_len();
                if next >= self.bytes().len() {
                    return Err(VerifyError::FallsOffEnd {
                        method: self.method.clone(),
                    });
                }
                work.push((next, after));
            }
        }
        Ok(())
    }

    fn branch_target(&self, op: Opcode, pc: usize) -> i64 {
        let offset = if op == Opcode::GotoW {
            let b = &self.bytes()[pc + 1..pc + 5];
            i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as i64
        } else {
            self.u16_at(pc + 1) as i16 as i64
        };
        pc as i64 + offset
    }

    fn check_locals(&mut self, op: Opcode, pc: usize) -> Result<(), VerifyError> {
        let Some((width, implied)) = op.local_access() else {
            return Ok(());
        };
        let index = implied.unwrap_or_else(|| self.bytes()[pc + 1] as u16);
        let end = index + width;
        if end > self.code.max_locals {
            return Err(VerifyError::LocalOutOfRange {
                method: self.method.clone(),
                pc,
                index,
                max: self.code.max_locals,
            });
        }
        self.locals_used = self.locals_used.max(end);
        Ok(())
    }

    fn check_return(&self, op: Opcode, pc: usize) -> Result<(), VerifyError> {
        if !op.is_return() {
            return Ok(());
        }
        let ret = &self.descriptor.ret;
        let ok = match op {
            Opcode::Return => ret.is_void(),
            Opcode::Ireturn => ret.is_int_category(),
            Opcode::Lreturn => *ret == JvmType::Long,
            Opcode::Freturn => *ret == JvmType::Float,
            Opcode::Dreturn => *ret == JvmType::Double,
            Opcode::Areturn => ret.is_reference(),
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(VerifyError::ReturnMismatch {
                method: self.method.clone(),
                pc,
            })
        }
    }

    fn bad_constant(&self, pc: usize, index: u16) -> VerifyError {
        VerifyError::BadConstant {
            method: self.method.clone(),
            pc,
            index,
        }
    }

    /// Stack effect, resolving constant pool operands where needed.
    fn effect(&self, op: Opcode, pc: usize) -> Result<StackEffect, VerifyError> {
        if let Some(effect) = op.fixed_effect() {
            if matches!(
                op,
                Opcode::New | Opcode::Anewarray | Opcode::Checkcast | Opcode::Instanceof
            ) {
                let index = self.u16_at(pc + 1);
                if !matches!(self.pool.get(index), Some(Constant::Class(_))) {
                    return Err(self.bad_constant(pc, index));
                }
            }
            return Ok(effect);
        }

        match op {
            Opcode::Ldc | Opcode::LdcW => {
                let index = if op == Opcode::Ldc {
                    self.bytes()[pc + 1] as u16
                } else {
                    self.u16_at(pc + 1)
                };
                match self.pool.get(index) {
                    Some(
                        Constant::Integer(_)
                        | Constant::Float(_)
                        | Constant::String(_)
                        | Constant::Class(_),
                    ) => Ok(StackEffect::new(0, 1)),
                    _ => Err(self.bad_constant(pc, index)),
                }
            }
            Opcode::Ldc2W => {
                let index = self.u16_at(pc + 1);
                match self.pool.get(index) {
                    Some(Constant::Long(_) | Constant::Double(_)) => Ok(StackEffect::new(0, 2)),
                    _ => Err(self.bad_constant(pc, index)),
                }
            }
            Opcode::Getstatic | Opcode::Putstatic | Opcode::Getfield | Opcode::Putfield => {
                let index = self.u16_at(pc + 1);
                let member = self
                    .pool
                    .member_at(index)
                    .map_err(|_| self.bad_constant(pc, index))?;
                if member.kind != MemberKind::Field {
                    return Err(self.bad_constant(pc, index));
                }
                let size = JvmType::from_descriptor(member.descriptor)
                    .filter(|t| !t.is_void())
                    .ok_or_else(|| self.bad_constant(pc, index))?
                    .slots();
                Ok(match op {
                    Opcode::Getstatic => StackEffect::new(0, size),
                    Opcode::Putstatic => StackEffect::new(size, 0),
                    Opcode::Getfield => StackEffect::new(1, size),
                    _ => StackEffect::new(1 + size, 0),
                })
            }
            Opcode::Invokevirtual
            | Opcode::Invokespecial
            | Opcode::Invokestatic
            | Opcode::Invokeinterface => {
                let index = self.u16_at(pc + 1);
                let member = self
                    .pool
                    .member_at(index)
                    .map_err(|_| self.bad_constant(pc, index))?;
                let kind_ok = match op {
                    Opcode::Invokeinterface => member.kind == MemberKind::InterfaceMethod,
                    Opcode::Invokevirtual => member.kind == MemberKind::Method,
                    _ => member.kind != MemberKind::Field,
                };
                if !kind_ok {
                    return Err(self.bad_constant(pc, index));
                }
                let desc = MethodDescriptor::parse(member.descriptor)
                    .ok_or_else(|| self.bad_constant(pc, index))?;
                let receiver = u16::from(op != Opcode::Invokestatic);
                if op == Opcode::Invokeinterface
                    && self.bytes()[pc + 3] as u16 != desc.arg_slots() + 1
                {
                    return Err(self.bad_constant(pc, index));
                }
                Ok(StackEffect::new(desc.arg_slots() + receiver, desc.ret_slots()))
            }
            // Every other opcode has a fixed effect.
            _ => Ok(StackEffect::new(0, 0)),
        }
    }
}
