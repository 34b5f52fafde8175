//! Class file parsing.
//!
//! The reader understands exactly what the writer produces plus unknown
//! attributes, which are skipped. It is used by the verifier and by tests
//! that inspect or execute generated classes.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};
use rulegen_core::{MethodDescriptor, ReadError};

use crate::code::{CodeAttribute, ExceptionHandler, LineNumber};
use crate::constant::{Constant, ConstantPool, decode_modified_utf8};
use crate::writer::{AccessFlags, ClassVersion, MAGIC};

/// A parsed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedField {
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: String,
}

/// A parsed method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMethod {
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: String,
    pub code: Option<CodeAttribute>,
    /// Internal names of declared exceptions.
    pub exceptions: Vec<String>,
}

impl ParsedMethod {
    /// `name` followed by its descriptor, as used in diagnostics.
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }

    /// Parse the descriptor.
    pub fn parsed_descriptor(&self) -> Result<MethodDescriptor, ReadError> {
        MethodDescriptor::parse(&self.descriptor)
            .ok_or_else(|| ReadError::BadDescriptor(self.descriptor.clone()))
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }
}

/// A fully parsed class file.
#[derive(Debug, Clone)]
pub struct ParsedClass {
    pub version: ClassVersion,
    pub pool: ConstantPool,
    pub access: AccessFlags,
    pub name: String,
    pub super_name: String,
    pub interfaces: Vec<String>,
    pub fields: Vec<ParsedField>,
    pub methods: Vec<ParsedMethod>,
    pub source_file: Option<String>,
    pub source_debug_extension: Option<String>,
}

impl ParsedClass {
    /// Parse a complete class file.
    pub fn parse(bytes: &[u8]) -> Result<Self, ReadError> {
        let mut reader = ClassReader {
            cursor: Cursor::new(bytes),
        };
        let class = reader.read_class()?;
        let rest = bytes.len() - reader.cursor.position() as usize;
        if rest != 0 {
            return Err(ReadError::TrailingBytes(rest));
        }
        Ok(class)
    }

    /// Find a method by name and descriptor.
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&ParsedMethod> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Find a field by name.
    pub fn field(&self, name: &str) -> Option<&ParsedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

struct ClassReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl ClassReader<'_> {
    fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.cursor.read_u8()?)
    }

    fn u16(&mut self) -> Result<u16, ReadError> {
        Ok(self.cursor.read_u16::<BigEndian>()?)
    }

    fn u32(&mut self) -> Result<u32, ReadError> {
        Ok(self.cursor.read_u32::<BigEndian>()?)
    }

    fn bytes(&mut self, len: usize) -> Result<Vec<u8>, ReadError> {
        let remaining = self.cursor.get_ref().len() - self.cursor.position() as usize;
        if len > remaining {
            return Err(ReadError::Truncated);
        }
        let mut buf = vec![0; len];
        self.cursor.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_class(&mut self) -> Result<ParsedClass, ReadError> {
        let magic = self.u32()?;
        if magic != MAGIC {
            return Err(ReadError::BadMagic(magic));
        }
        let minor = self.u16()?;
        let major = self.u16()?;
        let pool = self.read_pool()?;

        let access = AccessFlags::from_bits_retain(self.u16()?);
        let name = pool.class_at(self.u16()?)?.to_string();
        let super_name = pool.class_at(self.u16()?)?.to_string();

        let interface_count = self.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_at(self.u16()?)?.to_string());
        }

        let field_count = self.u16()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let access = AccessFlags::from_bits_retain(self.u16()?);
            let name = pool.utf8_at(self.u16()?)?.to_string();
            let descriptor = pool.utf8_at(self.u16()?)?.to_string();
            self.skip_attributes()?;
            fields.push(ParsedField {
                access,
                name,
                descriptor,
            });
        }

        let method_count = self.u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(self.read_method(&pool)?);
        }

        let mut source_file = None;
        let mut source_debug_extension = None;
        let attr_count = self.u16()?;
        for _ in 0..attr_count {
            let attr_name = pool.utf8_at(self.u16()?)?;
            let len = self.u32()? as usize;
            match attr_name {
                "SourceFile" => source_file = Some(pool.utf8_at(self.u16()?)?.to_string()),
                "SourceDebugExtension" => {
                    let raw = self.bytes(len)?;
                    source_debug_extension =
                        Some(decode_modified_utf8(&raw).ok_or(ReadError::BadUtf8(0))?);
                }
                _ => {
                    self.bytes(len)?;
                }
            }
        }

        Ok(ParsedClass {
            version: ClassVersion { major, minor },
            pool,
            access,
            name,
            super_name,
            interfaces,
            fields,
            methods,
            source_file,
            source_debug_extension,
        })
    }

    fn read_pool(&mut self) -> Result<ConstantPool, ReadError> {
        let count = self.u16()?;
        let mut pool = ConstantPool::new();
        let mut index = 1u16;
        while index < count {
            let tag = self.u8()?;
            let constant = match tag {
                1 => {
                    let len = self.u16()? as usize;
                    let raw = self.bytes(len)?;
                    Constant::Utf8(decode_modified_utf8(&raw).ok_or(ReadError::BadUtf8(index))?)
                }
                3 => Constant::Integer(self.cursor.read_i32::<BigEndian>()?),
                4 => Constant::Float(self.cursor.read_f32::<BigEndian>()?),
                5 => Constant::Long(self.cursor.read_i64::<BigEndian>()?),
                6 => Constant::Double(self.cursor.read_f64::<BigEndian>()?),
                7 => Constant::Class(self.u16()?),
                8 => Constant::String(self.u16()?),
                9 => Constant::FieldRef {
                    class: self.u16()?,
                    name_and_type: self.u16()?,
                },
                10 => Constant::MethodRef {
                    class: self.u16()?,
                    name_and_type: self.u16()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class: self.u16()?,
                    name_and_type: self.u16()?,
                },
                12 => Constant::NameAndType {
                    name: self.u16()?,
                    descriptor: self.u16()?,
                },
                _ => return Err(ReadError::UnknownConstantTag { tag, index }),
            };
            index = index.saturating_add(constant.width());
            pool.push_parsed(constant);
        }
        if index != count {
            // A wide entry straddled the declared end.
            return Err(ReadError::BadConstantIndex(count));
        }
        Ok(pool)
    }

    fn read_method(&mut self, pool: &ConstantPool) -> Result<ParsedMethod, ReadError> {
        let access = AccessFlags::from_bits_retain(self.u16()?);
        let name = pool.utf8_at(self.u16()?)?.to_string();
        let descriptor = pool.utf8_at(self.u16()?)?.to_string();
        let mut code = None;
        let mut exceptions = Vec::new();

        let attr_count = self.u16()?;
        for _ in 0..attr_count {
            let attr_name = pool.utf8_at(self.u16()?)?;
            let len = self.u32()? as usize;
            match attr_name {
                "Code" => code = Some(self.read_code(pool)?),
                "Exceptions" => {
                    let n = self.u16()?;
                    for _ in 0..n {
                        exceptions.push(pool.class_at(self.u16()?)?.to_string());
                    }
                }
                _ => {
                    self.bytes(len)?;
                }
            }
        }

        Ok(ParsedMethod {
            access,
            name,
            descriptor,
            code,
            exceptions,
        })
    }

    fn read_code(&mut self, pool: &ConstantPool) -> Result<CodeAttribute, ReadError> {
        let max_stack = self.u16()?;
        let max_locals = self.u16()?;
        let code_len = self.u32()? as usize;
        let code = self.bytes(code_len)?;

        let handler_count = self.u16()?;
        let mut exception_table = Vec::with_capacity(handler_count as usize);
        for _ in 0..handler_count {
            exception_table.push(ExceptionHandler {
                start_pc: self.u16()?,
                end_pc: self.u16()?,
                handler_pc: self.u16()?,
                catch_type: self.u16()?,
            });
        }

        let mut line_numbers = Vec::new();
        let attr_count = self.u16()?;
        for _ in 0..attr_count {
            let attr_name = pool.utf8_at(self.u16()?)?;
            let len = self.u32()? as usize;
            if attr_name == "LineNumberTable" {
                let n = self.u16()?;
                for _ in 0..n {
                    line_numbers.push(LineNumber {
                        start_pc: self.u16()?,
                        line: self.u16()?,
                    });
                }
            } else {
                self.bytes(len)?;
            }
        }

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            line_numbers,
        })
    }

    fn skip_attributes(&mut self) -> Result<(), ReadError> {
        let count = self.u16()?;
        for _ in 0..count {
            self.u16()?;
            let len = self.u32()? as usize;
            self.bytes(len)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassWriter, CodeBuffer, Opcode};
    use rulegen_core::JvmType;

    fn sample() -> Vec<u8> {
        let mut class = ClassWriter::new(
            ClassVersion::V1_5,
            AccessFlags::PUBLIC | AccessFlags::SUPER,
            "a/Gen",
            "a/Base",
            &["a/Iface"],
        );
        class.add_field(AccessFlags::PRIVATE, "count", &JvmType::Long);
        class.pool_mut().long(42);
        let mut buf = CodeBuffer::new();
        buf.mark_line(12);
        buf.write_op(Opcode::Return);
        class.add_method(
            AccessFlags::PUBLIC,
            "go",
            &MethodDescriptor::void(),
            Some(buf.finish(0, 1).unwrap()),
            &["a/Fault"],
        );
        class.set_source_file("x.btm");
        class.set_source_debug_extension("// compiled from: dir/x.btm\n");
        class.to_bytes().unwrap()
    }

    #[test]
    fn reads_back_written_class() {
        let class = ParsedClass::parse(&sample()).unwrap();
        assert_eq!(class.version, ClassVersion::V1_5);
        assert_eq!(class.name, "a/Gen");
        assert_eq!(class.super_name, "a/Base");
        assert_eq!(class.interfaces, vec!["a/Iface".to_string()]);
        assert_eq!(class.field("count").map(|f| f.descriptor.as_str()), Some("J"));

        let go = class.method("go", "()V").unwrap();
        assert_eq!(go.exceptions, vec!["a/Fault".to_string()]);
        let code = go.code.as_ref().unwrap();
        assert_eq!(code.code, vec![0xb1]);
        assert_eq!(code.line_numbers[0].line, 12);

        assert_eq!(class.source_file.as_deref(), Some("x.btm"));
        assert_eq!(
            class.source_debug_extension.as_deref(),
            Some("// compiled from: dir/x.btm\n")
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample();
        bytes[0] = 0;
        assert!(matches!(
            ParsedClass::parse(&bytes),
            Err(ReadError::BadMagic(_))
        ));
    }

    #[test]
    fn rejects_truncated() {
        let bytes = sample();
        assert_eq!(
            ParsedClass::parse(&bytes[..bytes.len() - 3]).unwrap_err(),
            ReadError::Truncated
        );
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = sample();
        bytes.push(0);
        assert_eq!(
            ParsedClass::parse(&bytes).unwrap_err(),
            ReadError::TrailingBytes(1)
        );
    }
}
