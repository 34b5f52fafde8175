//! JVM value types as seen by rule bindings.
//!
//! A [`JvmType`] is the declared type of a binding, a field or a method
//! parameter. It knows how to encode itself as a field descriptor, how many
//! operand-stack slots it occupies and which wrapper class boxes it.

use std::fmt;

/// Internal name of `java.lang.Object`.
pub const OBJECT_CLASS: &str = "java/lang/Object";
/// Internal name of `java.lang.String`.
pub const STRING_CLASS: &str = "java/lang/String";
/// Internal name of `java.lang.Number`.
pub const NUMBER_CLASS: &str = "java/lang/Number";

/// A JVM type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JvmType {
    /// `void` (method return only).
    Void,
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `char`
    Char,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// A class or interface, by internal name (`java/lang/String`).
    Object(String),
    /// An array of the element type.
    Array(Box<JvmType>),
}

impl JvmType {
    /// `java.lang.Object`, the generic representation of every binding value.
    pub fn object() -> Self {
        JvmType::Object(OBJECT_CLASS.to_string())
    }

    /// `java.lang.String`.
    pub fn string() -> Self {
        JvmType::Object(STRING_CLASS.to_string())
    }

    /// A class type from either an internal (`a/b/C`) or binary (`a.b.C`) name.
    pub fn class(name: &str) -> Self {
        JvmType::Object(name.replace('.', "/"))
    }

    /// An array whose elements have this type.
    pub fn array_of(self) -> Self {
        JvmType::Array(Box::new(self))
    }

    /// Check if this is the generic `java.lang.Object` type.
    pub fn is_generic_object(&self) -> bool {
        matches!(self, JvmType::Object(name) if name == OBJECT_CLASS)
    }

    /// Check if this is `java.lang.String`.
    pub fn is_string(&self) -> bool {
        matches!(self, JvmType::Object(name) if name == STRING_CLASS)
    }

    /// Check if this is `void`.
    pub fn is_void(&self) -> bool {
        matches!(self, JvmType::Void)
    }

    /// Check if this is one of the eight primitive types.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, JvmType::Void | JvmType::Object(_) | JvmType::Array(_))
    }

    /// Check if this is a class, interface or array type.
    pub fn is_reference(&self) -> bool {
        matches!(self, JvmType::Object(_) | JvmType::Array(_))
    }

    /// Check if this primitive is boxed by a `java.lang.Number` subclass.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            JvmType::Byte
                | JvmType::Short
                | JvmType::Int
                | JvmType::Long
                | JvmType::Float
                | JvmType::Double
        )
    }

    /// Check if values of this type live on the operand stack as an `int`.
    pub fn is_int_category(&self) -> bool {
        matches!(
            self,
            JvmType::Boolean | JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Int
        )
    }

    /// Storage width in bytes.
    ///
    /// References count as four bytes, matching a 32-bit stack slot.
    pub fn byte_width(&self) -> u8 {
        match self {
            JvmType::Void => 0,
            JvmType::Boolean | JvmType::Byte => 1,
            JvmType::Char | JvmType::Short => 2,
            JvmType::Int | JvmType::Float => 4,
            JvmType::Long | JvmType::Double => 8,
            JvmType::Object(_) | JvmType::Array(_) => 4,
        }
    }

    /// Number of operand-stack (or local variable) slots a value occupies.
    pub fn slots(&self) -> u16 {
        match self {
            JvmType::Void => 0,
            JvmType::Long | JvmType::Double => 2,
            _ => 1,
        }
    }

    /// Field descriptor encoding (`I`, `Ljava/lang/String;`, `[J`).
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    pub(crate) fn write_descriptor(&self, out: &mut String) {
        match self {
            JvmType::Void => out.push('V'),
            JvmType::Boolean => out.push('Z'),
            JvmType::Byte => out.push('B'),
            JvmType::Char => out.push('C'),
            JvmType::Short => out.push('S'),
            JvmType::Int => out.push('I'),
            JvmType::Long => out.push('J'),
            JvmType::Float => out.push('F'),
            JvmType::Double => out.push('D'),
            JvmType::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            JvmType::Array(elem) => {
                out.push('[');
                elem.write_descriptor(out);
            }
        }
    }

    /// Name used as a `CONSTANT_Class` operand.
    ///
    /// Classes use their internal name, arrays their descriptor. Returns `None`
    /// for primitives and `void`.
    pub fn class_name(&self) -> Option<String> {
        match self {
            JvmType::Object(name) => Some(name.clone()),
            JvmType::Array(_) => Some(self.descriptor()),
            _ => None,
        }
    }

    /// Wrapper class used to box a primitive.
    pub fn box_class(&self) -> Option<&'static str> {
        match self {
            JvmType::Boolean => Some("java/lang/Boolean"),
            JvmType::Byte => Some("java/lang/Byte"),
            JvmType::Char => Some("java/lang/Character"),
            JvmType::Short => Some("java/lang/Short"),
            JvmType::Int => Some("java/lang/Integer"),
            JvmType::Long => Some("java/lang/Long"),
            JvmType::Float => Some("java/lang/Float"),
            JvmType::Double => Some("java/lang/Double"),
            _ => None,
        }
    }

    /// Name of the unboxing accessor (`intValue`, `booleanValue`, ...).
    pub fn unbox_method(&self) -> Option<&'static str> {
        match self {
            JvmType::Boolean => Some("booleanValue"),
            JvmType::Byte => Some("byteValue"),
            JvmType::Char => Some("charValue"),
            JvmType::Short => Some("shortValue"),
            JvmType::Int => Some("intValue"),
            JvmType::Long => Some("longValue"),
            JvmType::Float => Some("floatValue"),
            JvmType::Double => Some("doubleValue"),
            _ => None,
        }
    }

    /// Element class name for access checks: the class itself, or the
    /// innermost element class of an array.
    pub fn element_class(&self) -> Option<&str> {
        match self {
            JvmType::Object(name) => Some(name),
            JvmType::Array(elem) => elem.element_class(),
            _ => None,
        }
    }

    /// Parse a complete field descriptor.
    pub fn from_descriptor(desc: &str) -> Option<Self> {
        match Self::parse_prefix(desc) {
            Some((ty, "")) => Some(ty),
            _ => None,
        }
    }

    /// Parse one type from the start of a descriptor, returning the rest.
    pub fn parse_prefix(desc: &str) -> Option<(Self, &str)> {
        let mut chars = desc.chars();
        let ty = match chars.next()? {
            'V' => JvmType::Void,
            'Z' => JvmType::Boolean,
            'B' => JvmType::Byte,
            'C' => JvmType::Char,
            'S' => JvmType::Short,
            'I' => JvmType::Int,
            'J' => JvmType::Long,
            'F' => JvmType::Float,
            'D' => JvmType::Double,
            'L' => {
                let end = desc.find(';')?;
                if end == 1 {
                    return None;
                }
                return Some((JvmType::Object(desc[1..end].to_string()), &desc[end + 1..]));
            }
            '[' => {
                let (elem, rest) = Self::parse_prefix(&desc[1..])?;
                if elem.is_void() {
                    return None;
                }
                return Some((JvmType::Array(Box::new(elem)), rest));
            }
            _ => return None,
        };
        Some((ty, chars.as_str()))
    }
}

impl fmt::Display for JvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JvmType::Void => write!(f, "void"),
            JvmType::Boolean => write!(f, "boolean"),
            JvmType::Byte => write!(f, "byte"),
            JvmType::Char => write!(f, "char"),
            JvmType::Short => write!(f, "short"),
            JvmType::Int => write!(f, "int"),
            JvmType::Long => write!(f, "long"),
            JvmType::Float => write!(f, "float"),
            JvmType::Double => write!(f, "double"),
            JvmType::Object(name) => write!(f, "{}", name.replace('/', ".")),
            JvmType::Array(elem) => write!(f, "{}[]", elem),
        }
    }
}
