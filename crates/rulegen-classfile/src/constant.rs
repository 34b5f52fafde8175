//! Constant pool for generated classes.
//!
//! The constant pool stores every name, descriptor, literal and member
//! reference an instruction or attribute refers to. Index 0 is reserved and
//! `long`/`double` entries occupy two indices, as the class file format
//! requires.

use rulegen_core::{ClassFileError, MethodDescriptor, ReadError};
use rustc_hash::FxHashMap;

/// Values stored in the constant pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Modified UTF-8 text (names, descriptors, string literals).
    Utf8(String),
    /// 32-bit integer.
    Integer(i32),
    /// 32-bit float.
    Float(f32),
    /// 64-bit integer (two slots).
    Long(i64),
    /// 64-bit float (two slots).
    Double(f64),
    /// Class reference; points at a `Utf8` internal name.
    Class(u16),
    /// String literal; points at a `Utf8`.
    String(u16),
    /// Field reference.
    FieldRef { class: u16, name_and_type: u16 },
    /// Class method reference.
    MethodRef { class: u16, name_and_type: u16 },
    /// Interface method reference.
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    /// Member name and descriptor.
    NameAndType { name: u16, descriptor: u16 },
}

impl Constant {
    /// Tag byte in the class file encoding.
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::FieldRef { .. } => 9,
            Constant::MethodRef { .. } => 10,
            Constant::InterfaceMethodRef { .. } => 11,
            Constant::NameAndType { .. } => 12,
        }
    }

    /// Number of pool indices the entry occupies.
    pub fn width(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Key for constant deduplication (hashable version of Constant).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Utf8(String),
    Integer(i32),
    Float(u32), // Bit pattern for hashing
    Long(i64),
    Double(u64), // Bit pattern for hashing
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

/// The kind of a resolved member reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

/// A member reference resolved to its names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Field, method or interface method.
    pub kind: MemberKind,
    /// Internal name of the owner class.
    pub class: &'a str,
    /// Member name.
    pub name: &'a str,
    /// Field or method descriptor.
    pub descriptor: &'a str,
}

/// Class-level constant pool with deduplication.
///
/// Adding never fails eagerly. Limit violations are recorded and reported by
/// [`ConstantPool::check`] when the class is serialized, so emission code can
/// stay infallible.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    /// Entries by pool index. Index 0 and the upper half of wide entries are `None`.
    entries: Vec<Option<Constant>>,
    /// Deduplication index: maps constant to its pool index.
    index: FxHashMap<ConstantKey, u16>,
    /// First limit violation seen while adding.
    error: Option<ClassFileError>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Create a new empty constant pool.
    pub fn new() -> Self {
        Self {
            entries: vec![None],
            index: FxHashMap::default(),
            error: None,
        }
    }

    /// Add or get existing constant, returns its pool index.
    ///
    /// Returns 0 and records an overflow once the pool is full.
    pub fn add(&mut self, constant: Constant) -> u16 {
        let key = Self::to_key(&constant);

        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }

        let idx = self.entries.len();
        if idx + constant.width() as usize > u16::MAX as usize {
            self.fail(ClassFileError::ConstantPoolOverflow);
            return 0;
        }

        let wide = constant.width() == 2;
        self.entries.push(Some(constant));
        if wide {
            self.entries.push(None);
        }
        self.index.insert(key, idx as u16);
        idx as u16
    }

    /// Add a UTF-8 entry.
    pub fn utf8(&mut self, text: &str) -> u16 {
        let len = modified_utf8_len(text);
        if len > u16::MAX as usize {
            self.fail(ClassFileError::StringTooLong(len));
            return 0;
        }
        self.add(Constant::Utf8(text.to_string()))
    }

    /// Add a class reference by internal name (or array descriptor).
    pub fn class(&mut self, internal_name: &str) -> u16 {
        let name = self.utf8(internal_name);
        self.add(Constant::Class(name))
    }

    /// Add a string literal.
    pub fn string(&mut self, value: &str) -> u16 {
        let text = self.utf8(value);
        self.add(Constant::String(text))
    }

    /// Add an integer constant.
    pub fn integer(&mut self, value: i32) -> u16 {
        self.add(Constant::Integer(value))
    }

    /// Add a float constant.
    pub fn float(&mut self, value: f32) -> u16 {
        self.add(Constant::Float(value))
    }

    /// Add a long constant.
    pub fn long(&mut self, value: i64) -> u16 {
        self.add(Constant::Long(value))
    }

    /// Add a double constant.
    pub fn double(&mut self, value: f64) -> u16 {
        self.add(Constant::Double(value))
    }

    /// Add a name-and-type pair.
    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.add(Constant::NameAndType { name, descriptor })
    }

    /// Add a field reference.
    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.add(Constant::FieldRef { class, name_and_type })
    }

    /// Add a class method reference.
    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &MethodDescriptor) -> u16 {
        let class = self.class(class);
        let name_and_type = self.name_and_type(name, &descriptor.to_string());
        self.add(Constant::MethodRef { class, name_and_type })
    }

    /// Add an interface method reference.
    pub fn interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &MethodDescriptor,
    ) -> u16 {
        let class = self.class(class);
        let name_and_type = self.name_and_type(name, &descriptor.to_string());
        self.add(Constant::InterfaceMethodRef { class, name_and_type })
    }

    /// Get constant by index.
    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize).and_then(Option::as_ref)
    }

    /// Iterate over `(index, constant)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i as u16, c)))
    }

    /// The `constant_pool_count` value: one more than the highest index.
    pub fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    /// Number of entries (wide entries count once).
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }

    /// Report the first limit violation seen while adding.
    pub fn check(&self) -> Result<(), ClassFileError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    // ==========================================================================
    // Resolution (used by the reader and verifier)
    // ==========================================================================

    /// Append a parsed entry at the next index without deduplication.
    pub(crate) fn push_parsed(&mut self, constant: Constant) {
        let wide = constant.width() == 2;
        self.entries.push(Some(constant));
        if wide {
            self.entries.push(None);
        }
    }

    /// Resolve a `Utf8` entry.
    pub fn utf8_at(&self, index: u16) -> Result<&str, ReadError> {
        match self.get(index) {
            Some(Constant::Utf8(text)) => Ok(text),
            Some(_) => Err(ReadError::ConstantKind { index, expected: "Utf8" }),
            None => Err(ReadError::BadConstantIndex(index)),
        }
    }

    /// Resolve a `Class` entry to its internal name.
    pub fn class_at(&self, index: u16) -> Result<&str, ReadError> {
        match self.get(index) {
            Some(Constant::Class(name)) => self.utf8_at(*name),
            Some(_) => Err(ReadError::ConstantKind { index, expected: "Class" }),
            None => Err(ReadError::BadConstantIndex(index)),
        }
    }

    /// Resolve a `String` entry to its text.
    pub fn string_at(&self, index: u16) -> Result<&str, ReadError> {
        match self.get(index) {
            Some(Constant::String(text)) => self.utf8_at(*text),
            Some(_) => Err(ReadError::ConstantKind { index, expected: "String" }),
            None => Err(ReadError::BadConstantIndex(index)),
        }
    }

    /// Resolve a field, method or interface method reference.
    pub fn member_at(&self, index: u16) -> Result<MemberRef<'_>, ReadError> {
        let (kind, class, name_and_type) = match self.get(index) {
            Some(Constant::FieldRef { class, name_and_type }) => {
                (MemberKind::Field, *class, *name_and_type)
            }
            Some(Constant::MethodRef { class, name_and_type }) => {
                (MemberKind::Method, *class, *name_and_type)
            }
            Some(Constant::InterfaceMethodRef { class, name_and_type }) => {
                (MemberKind::InterfaceMethod, *class, *name_and_type)
            }
            Some(_) => {
                return Err(ReadError::ConstantKind {
                    index,
                    expected: "member reference",
                });
            }
            None => return Err(ReadError::BadConstantIndex(index)),
        };
        let (name, descriptor) = match self.get(name_and_type) {
            Some(Constant::NameAndType { name, descriptor }) => (*name, *descriptor),
            Some(_) => {
                return Err(ReadError::ConstantKind {
                    index: name_and_type,
                    expected: "NameAndType",
                });
            }
            None => return Err(ReadError::BadConstantIndex(name_and_type)),
        };
        Ok(MemberRef {
            kind,
            class: self.class_at(class)?,
            name: self.utf8_at(name)?,
            descriptor: self.utf8_at(descriptor)?,
        })
    }

    fn fail(&mut self, err: ClassFileError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Convert a Constant to its hashable key representation.
    fn to_key(constant: &Constant) -> ConstantKey {
        match constant {
            Constant::Utf8(s) => ConstantKey::Utf8(s.clone()),
            Constant::Integer(v) => ConstantKey::Integer(*v),
            Constant::Float(v) => ConstantKey::Float(v.to_bits()),
            Constant::Long(v) => ConstantKey::Long(*v),
            Constant::Double(v) => ConstantKey::Double(v.to_bits()),
            Constant::Class(n) => ConstantKey::Class(*n),
            Constant::String(n) => ConstantKey::String(*n),
            Constant::FieldRef { class, name_and_type } => {
                ConstantKey::FieldRef(*class, *name_and_type)
            }
            Constant::MethodRef { class, name_and_type } => {
                ConstantKey::MethodRef(*class, *name_and_type)
            }
            Constant::InterfaceMethodRef { class, name_and_type } => {
                ConstantKey::InterfaceMethodRef(*class, *name_and_type)
            }
            Constant::NameAndType { name, descriptor } => {
                ConstantKey::NameAndType(*name, *descriptor)
            }
        }
    }
}

// ============================================================================
// Modified UTF-8
// ============================================================================

/// Encoded length of `text` in modified UTF-8.
pub fn modified_utf8_len(text: &str) -> usize {
    text.chars()
        .map(|c| match c as u32 {
            0 => 2,
            1..=0x7f => 1,
            0x80..=0x7ff => 2,
            0x800..=0xffff => 3,
            _ => 6,
        })
        .sum()
}

/// Encode `text` as modified UTF-8.
///
/// NUL becomes `C0 80`; supplementary characters become surrogate pairs.
pub fn encode_modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut units = [0u16; 2];
    for c in text.chars() {
        match c as u32 {
            1..=0x7f => out.push(c as u8),
            0x10000.. => {
                for unit in c.encode_utf16(&mut units).iter() {
                    push_three_byte(&mut out, *unit);
                }
            }
            0 | 0x80..=0x7ff => {
                let v = c as u32;
                out.push(0xc0 | (v >> 6) as u8);
                out.push(0x80 | (v & 0x3f) as u8);
            }
            v => push_three_byte(&mut out, v as u16),
        }
    }
    out
}

fn push_three_byte(out: &mut Vec<u8>, unit: u16) {
    out.push(0xe0 | (unit >> 12) as u8);
    out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
    out.push(0x80 | (unit & 0x3f) as u8);
}

/// Decode modified UTF-8. Returns `None` for malformed input.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            if b == 0 {
                return None;
            }
            units.push(b as u16);
            i += 1;
        } else if b & 0xe0 == 0xc0 {
            let b2 = *bytes.get(i + 1)?;
            if b2 & 0xc0 != 0x80 {
                return None;
            }
            units.push((((b & 0x1f) as u16) << 6) | (b2 & 0x3f) as u16);
            i += 2;
        } else if b & 0xf0 == 0xe0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            if b2 & 0xc0 != 0x80 || b3 & 0xc0 != 0x80 {
                return None;
            }
            units.push(
                (((b & 0x0f) as u16) << 12) | (((b2 & 0x3f) as u16) << 6) | (b3 & 0x3f) as u16,
            );
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}
