//! Method descriptors.

use std::fmt;

use crate::JvmType;

/// A method descriptor: parameter types and return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order.
    pub params: Vec<JvmType>,
    /// Return type (`JvmType::Void` for none).
    pub ret: JvmType,
}

impl MethodDescriptor {
    /// Create a descriptor.
    pub fn new(params: Vec<JvmType>, ret: JvmType) -> Self {
        Self { params, ret }
    }

    /// `()V`
    pub fn void() -> Self {
        Self::new(Vec::new(), JvmType::Void)
    }

    /// Descriptor with no parameters and the given return type.
    pub fn returning(ret: JvmType) -> Self {
        Self::new(Vec::new(), ret)
    }

    /// Operand-stack slots consumed by the arguments (excluding any receiver).
    pub fn arg_slots(&self) -> u16 {
        self.params.iter().map(JvmType::slots).sum()
    }

    /// Operand-stack slots produced by the return value.
    pub fn ret_slots(&self) -> u16 {
        self.ret.slots()
    }

    /// Parse a descriptor such as `(Ljava/lang/Object;I)V`.
    pub fn parse(desc: &str) -> Option<Self> {
        let mut rest = desc.strip_prefix('(')?;
        let mut params = Vec::new();
        while !rest.starts_with(')') {
            let (ty, tail) = JvmType::parse_prefix(rest)?;
            if ty.is_void() {
                return None;
            }
            params.push(ty);
            rest = tail;
        }
        let ret = JvmType::from_descriptor(&rest[1..])?;
        Some(Self { params, ret })
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::from("(");
        for param in &self.params {
            param.write_descriptor(&mut out);
        }
        out.push(')');
        self.ret.write_descriptor(&mut out);
        f.write_str(&out)
    }
}
