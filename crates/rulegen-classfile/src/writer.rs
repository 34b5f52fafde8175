//! Class file serialization.
//!
//! [`ClassWriter`] collects the header, fields, methods and class attributes
//! of one class and serializes them in the standard layout. Attribute names
//! are interned into the constant pool when the member is added, so
//! serialization itself never grows the pool.

use std::io::Write;

use bitflags::bitflags;
use byteorder::{BigEndian, WriteBytesExt};
use rulegen_core::{ClassFileError, JvmType, MethodDescriptor};

use crate::code::CodeAttribute;
use crate::constant::{Constant, ConstantPool, encode_modified_utf8};

/// Class file magic number.
pub const MAGIC: u32 = 0xCAFE_BABE;

bitflags! {
    /// Access and property flags for classes, fields and methods.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        /// Class flag; shares its bit with `ACC_SYNCHRONIZED` on methods.
        const SUPER = 0x0020;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
    }
}

/// Class file format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClassVersion {
    pub major: u16,
    pub minor: u16,
}

impl ClassVersion {
    /// Java 5. The last version that needs no `StackMapTable`.
    pub const V1_5: ClassVersion = ClassVersion { major: 49, minor: 0 };

    /// Check if methods of this version require stack map frames.
    pub fn requires_stack_maps(self) -> bool {
        self.major >= 51
    }
}

impl Default for ClassVersion {
    fn default() -> Self {
        Self::V1_5
    }
}

/// A field declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub access: AccessFlags,
    pub name: u16,
    pub descriptor: u16,
}

/// A method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub access: AccessFlags,
    pub name: u16,
    pub descriptor: u16,
    pub code: Option<CodeAttribute>,
    /// Class indices of declared checked exceptions.
    pub exceptions: Vec<u16>,
}

/// Interned attribute names.
#[derive(Debug, Clone, Copy, Default)]
struct AttributeNames {
    code: u16,
    line_numbers: u16,
    exceptions: u16,
    source_file: u16,
    source_debug: u16,
}

/// Builds one class file.
#[derive(Debug, Clone)]
pub struct ClassWriter {
    pool: ConstantPool,
    version: ClassVersion,
    access: AccessFlags,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    source_file: Option<u16>,
    source_debug_extension: Option<Vec<u8>>,
    names: AttributeNames,
}

impl ClassWriter {
    /// Start a class with the given header.
    pub fn new(
        version: ClassVersion,
        access: AccessFlags,
        name: &str,
        super_name: &str,
        interfaces: &[&str],
    ) -> Self {
        let mut pool = ConstantPool::new();
        let this_class = pool.class(name);
        let super_class = pool.class(super_name);
        let interfaces = interfaces.iter().map(|i| pool.class(i)).collect();
        Self {
            pool,
            version,
            access,
            this_class,
            super_class,
            interfaces,
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
            source_debug_extension: None,
            names: AttributeNames::default(),
        }
    }

    /// The class's constant pool.
    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    /// Mutable access to the constant pool, for method emission.
    pub fn pool_mut(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    /// Declare a field.
    pub fn add_field(&mut self, access: AccessFlags, name: &str, ty: &JvmType) {
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(&ty.descriptor());
        self.fields.push(FieldInfo {
            access,
            name,
            descriptor,
        });
    }

    /// Declare a method. Abstract and native methods pass `None` for `code`.
    pub fn add_method(
        &mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &MethodDescriptor,
        code: Option<CodeAttribute>,
        exceptions: &[&str],
    ) {
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(&descriptor.to_string());
        if let Some(code) = &code {
            self.names.code = self.pool.utf8("Code");
            if !code.line_numbers.is_empty() {
                self.names.line_numbers = self.pool.utf8("LineNumberTable");
            }
        }
        if !exceptions.is_empty() {
            self.names.exceptions = self.pool.utf8("Exceptions");
        }
        let exceptions = exceptions.iter().map(|e| self.pool.class(e)).collect();
        self.methods.push(MethodInfo {
            access,
            name,
            descriptor,
            code,
            exceptions,
        });
    }

    /// Set the `SourceFile` attribute.
    pub fn set_source_file(&mut self, file: &str) {
        self.names.source_file = self.pool.utf8("SourceFile");
        self.source_file = Some(self.pool.utf8(file));
    }

    /// Set the `SourceDebugExtension` attribute.
    pub fn set_source_debug_extension(&mut self, text: &str) {
        self.names.source_debug = self.pool.utf8("SourceDebugExtension");
        self.source_debug_extension = Some(encode_modified_utf8(text));
    }

    /// Number of declared methods.
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Serialize to a byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ClassFileError> {
        let mut out = Vec::with_capacity(1024);
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Serialize into `out`.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), ClassFileError> {
        self.pool.check()?;
        check_count("fields", self.fields.len())?;
        check_count("methods", self.methods.len())?;
        check_count("interfaces", self.interfaces.len())?;

        out.write_u32::<BigEndian>(MAGIC)?;
        out.write_u16::<BigEndian>(self.version.minor)?;
        out.write_u16::<BigEndian>(self.version.major)?;

        out.write_u16::<BigEndian>(self.pool.count())?;
        for (_, constant) in self.pool.iter() {
            write_constant(out, constant)?;
        }

        out.write_u16::<BigEndian>(self.access.bits())?;
        out.write_u16::<BigEndian>(self.this_class)?;
        out.write_u16::<BigEndian>(self.super_class)?;
        out.write_u16::<BigEndian>(self.interfaces.len() as u16)?;
        for interface in &self.interfaces {
            out.write_u16::<BigEndian>(*interface)?;
        }

        out.write_u16::<BigEndian>(self.fields.len() as u16)?;
        for field in &self.fields {
            out.write_u16::<BigEndian>(field.access.bits())?;
            out.write_u16::<BigEndian>(field.name)?;
            out.write_u16::<BigEndian>(field.descriptor)?;
            out.write_u16::<BigEndian>(0)?;
        }

        out.write_u16::<BigEndian>(self.methods.len() as u16)?;
        for method in &self.methods {
            self.write_method(out, method)?;
        }

        let class_attrs =
            self.source_file.is_some() as u16 + self.source_debug_extension.is_some() as u16;
        out.write_u16::<BigEndian>(class_attrs)?;
        if let Some(file) = self.source_file {
            out.write_u16::<BigEndian>(self.names.source_file)?;
            out.write_u32::<BigEndian>(2)?;
            out.write_u16::<BigEndian>(file)?;
        }
        if let Some(debug) = &self.source_debug_extension {
            out.write_u16::<BigEndian>(self.names.source_debug)?;
            out.write_u32::<BigEndian>(debug.len() as u32)?;
            out.write_all(debug)?;
        }
        Ok(())
    }

    fn write_method<W: Write>(&self, out: &mut W, method: &MethodInfo) -> Result<(), ClassFileError> {
        out.write_u16::<BigEndian>(method.access.bits())?;
        out.write_u16::<BigEndian>(method.name)?;
        out.write_u16::<BigEndian>(method.descriptor)?;

        let attrs = method.code.is_some() as u16 + !method.exceptions.is_empty() as u16;
        out.write_u16::<BigEndian>(attrs)?;

        if let Some(code) = &method.code {
            let has_lines = !code.line_numbers.is_empty();
            let lines_len = if has_lines {
                6 + 2 + 4 * code.line_numbers.len()
            } else {
                0
            };
            let len = 2 + 2 + 4 + code.code.len() + 2 + 8 * code.exception_table.len() + 2 + lines_len;

            out.write_u16::<BigEndian>(self.names.code)?;
            out.write_u32::<BigEndian>(len as u32)?;
            out.write_u16::<BigEndian>(code.max_stack)?;
            out.write_u16::<BigEndian>(code.max_locals)?;
            out.write_u32::<BigEndian>(code.code.len() as u32)?;
            out.write_all(&code.code)?;
            out.write_u16::<BigEndian>(code.exception_table.len() as u16)?;
            for handler in &code.exception_table {
                out.write_u16::<BigEndian>(handler.start_pc)?;
                out.write_u16::<BigEndian>(handler.end_pc)?;
                out.write_u16::<BigEndian>(handler.handler_pc)?;
                out.write_u16::<BigEndian>(handler.catch_type)?;
            }
            out.write_u16::<BigEndian>(has_lines as u16)?;
            if has_lines {
                out.write_u16::<BigEndian>(self.names.line_numbers)?;
                out.write_u32::<BigEndian>((2 + 4 * code.line_numbers.len()) as u32)?;
                out.write_u16::<BigEndian>(code.line_numbers.len() as u16)?;
                for entry in &code.line_numbers {
                    out.write_u16::<BigEndian>(entry.start_pc)?;
                    out.write_u16::<BigEndian>(entry.line)?;
                }
            }
        }

        if !method.exceptions.is_empty() {
            out.write_u16::<BigEndian>(self.names.exceptions)?;
            out.write_u32::<BigEndian>((2 + 2 * method.exceptions.len()) as u32)?;
            out.write_u16::<BigEndian>(method.exceptions.len() as u16)?;
            for exception in &method.exceptions {
                out.write_u16::<BigEndian>(*exception)?;
            }
        }
        Ok(())
    }
}

fn check_count(what: &'static str, count: usize) -> Result<(), ClassFileError> {
    if count > u16::MAX as usize {
        return Err(ClassFileError::TooMany { what, count });
    }
    Ok(())
}

fn write_constant<W: Write>(out: &mut W, constant: &Constant) -> std::io::Result<()> {
    out.write_u8(constant.tag())?;
    match constant {
        Constant::Utf8(text) => {
            let bytes = encode_modified_utf8(text);
            out.write_u16::<BigEndian>(bytes.len() as u16)?;
            out.write_all(&bytes)
        }
        Constant::Integer(v) => out.write_i32::<BigEndian>(*v),
        Constant::Float(v) => out.write_f32::<BigEndian>(*v),
        Constant::Long(v) => out.write_i64::<BigEndian>(*v),
        Constant::Double(v) => out.write_f64::<BigEndian>(*v),
        Constant::Class(idx) | Constant::String(idx) => out.write_u16::<BigEndian>(*idx),
        Constant::FieldRef { class, name_and_type }
        | Constant::MethodRef { class, name_and_type }
        | Constant::InterfaceMethodRef { class, name_and_type } => {
            out.write_u16::<BigEndian>(*class)?;
            out.write_u16::<BigEndian>(*name_and_type)
        }
        Constant::NameAndType { name, descriptor } => {
            out.write_u16::<BigEndian>(*name)?;
            out.write_u16::<BigEndian>(*descriptor)
        }
    }
}
