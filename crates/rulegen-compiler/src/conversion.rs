//! Type conversions between binding types.
//!
//! Generated code moves values between the generic representation
//! (`java.lang.Object`, as found in the trigger's argument array) and each
//! binding's declared type. A conversion is first planned as a list of
//! [`ConversionStep`]s and then emitted through the [`MethodEmitter`].
//!
//! Rules:
//!
//! - primitive to primitive: JVM widening/narrowing instructions; any type to
//!   `boolean` tests for non-zero
//! - primitive to `String`: `String.valueOf`
//! - primitive to other references: box with `valueOf`, then `checkcast`
//!   unless the box already satisfies the target
//! - reference to primitive: null-safe unbox (`null` yields zero) through
//!   `Number.xxxValue()`, `Boolean.booleanValue()` or `Character.charValue()`
//! - reference to reference: `checkcast` unless the target is `Object`

use rulegen_classfile::Opcode;
use rulegen_core::{JvmType, MethodDescriptor, NUMBER_CLASS};

use crate::MethodEmitter;

/// One emitted step of a conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionStep {
    /// A primitive conversion instruction (`i2l`, `d2f`, `i2b`, ...).
    Primitive(Opcode),
    /// Replace an `int`, `long`, `float` or `double` with `1` if non-zero, else `0`.
    Truthy(JvmType),
    /// Box a primitive with its wrapper's `valueOf`.
    Box(JvmType),
    /// Unbox a reference to a primitive, yielding zero for `null`.
    Unbox {
        /// The primitive produced.
        target: JvmType,
        /// Whether a `checkcast` to the unboxing class is needed first.
        cast: bool,
    },
    /// Convert a primitive to its string form.
    Stringify(JvmType),
    /// Check a reference against a type.
    CheckCast(JvmType),
    /// Discard a value.
    Discard(JvmType),
    /// Produce the zero value of a type from nothing.
    Zero(JvmType),
}

/// Stack category of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Int,
    Long,
    Float,
    Double,
}

fn category(ty: &JvmType) -> Category {
    match ty {
        JvmType::Long => Category::Long,
        JvmType::Float => Category::Float,
        JvmType::Double => Category::Double,
        _ => Category::Int,
    }
}

/// Plan the conversion of a value of type `from` to type `to`.
pub fn plan_conversion(from: &JvmType, to: &JvmType) -> Vec<ConversionStep> {
    if from == to {
        return Vec::new();
    }
    if to.is_void() {
        return vec![ConversionStep::Discard(from.clone())];
    }
    if from.is_void() {
        return vec![ConversionStep::Zero(to.clone())];
    }

    match (from.is_primitive(), to.is_primitive()) {
        (true, true) => primitive_steps(from, to),
        (true, false) => box_steps(from, to),
        (false, true) => vec![ConversionStep::Unbox {
            target: to.clone(),
            cast: !already_unboxable(from, to),
        }],
        (false, false) => {
            if to.is_generic_object() {
                Vec::new()
            } else {
                vec![ConversionStep::CheckCast(to.clone())]
            }
        }
    }
}

fn primitive_steps(from: &JvmType, to: &JvmType) -> Vec<ConversionStep> {
    if *to == JvmType::Boolean {
        return vec![ConversionStep::Truthy(from.clone())];
    }

    let mut steps = Vec::new();
    let widen = match (category(from), category(to)) {
        (Category::Int, Category::Long) => Some(Opcode::I2l),
        (Category::Int, Category::Float) => Some(Opcode::I2f),
        (Category::Int, Category::Double) => Some(Opcode::I2d),
        (Category::Long, Category::Int) => Some(Opcode::L2i),
        (Category::Long, Category::Float) => Some(Opcode::L2f),
        (Category::Long, Category::Double) => Some(Opcode::L2d),
        (Category::Float, Category::Int) => Some(Opcode::F2i),
        (Category::Float, Category::Long) => Some(Opcode::F2l),
        (Category::Float, Category::Double) => Some(Opcode::F2d),
        (Category::Double, Category::Int) => Some(Opcode::D2i),
        (Category::Double, Category::Long) => Some(Opcode::D2l),
        (Category::Double, Category::Float) => Some(Opcode::D2f),
        _ => None,
    };
    steps.extend(widen.map(ConversionStep::Primitive));

    // Truncate into the sub-int types unless the source already fits.
    let narrow = match to {
        JvmType::Byte if !matches!(from, JvmType::Byte | JvmType::Boolean) => Some(Opcode::I2b),
        JvmType::Short
            if !matches!(from, JvmType::Byte | JvmType::Short | JvmType::Boolean) =>
        {
            Some(Opcode::I2s)
        }
        JvmType::Char if !matches!(from, JvmType::Char | JvmType::Boolean) => Some(Opcode::I2c),
        _ => None,
    };
    steps.extend(narrow.map(ConversionStep::Primitive));
    steps
}

fn box_steps(from: &JvmType, to: &JvmType) -> Vec<ConversionStep> {
    if to.is_string() {
        return vec![ConversionStep::Stringify(from.clone())];
    }
    let mut steps = vec![ConversionStep::Box(from.clone())];
    let satisfied = to.is_generic_object()
        || from.box_class().map(JvmType::class).as_ref() == Some(to)
        || (from.is_numeric() && matches!(to, JvmType::Object(n) if n == NUMBER_CLASS));
    if !satisfied {
        steps.push(ConversionStep::CheckCast(to.clone()));
    }
    steps
}

/// Class whose accessor unboxes to `ty`.
fn unbox_owner(ty: &JvmType) -> &'static str {
    match ty {
        JvmType::Boolean => "java/lang/Boolean",
        JvmType::Char => "java/lang/Character",
        _ => NUMBER_CLASS,
    }
}

/// Whether a reference of type `from` can call the unboxing accessor for
/// `to` without a cast.
fn already_unboxable(from: &JvmType, to: &JvmType) -> bool {
    let JvmType::Object(name) = from else {
        return false;
    };
    let owner = unbox_owner(to);
    if name == owner {
        return true;
    }
    owner == NUMBER_CLASS
        && matches!(
            name.as_str(),
            "java/lang/Byte"
                | "java/lang/Short"
                | "java/lang/Integer"
                | "java/lang/Long"
                | "java/lang/Float"
                | "java/lang/Double"
        )
}

/// Descriptor of `String.valueOf` for a primitive.
fn string_value_of(ty: &JvmType) -> MethodDescriptor {
    let param = match ty {
        JvmType::Byte | JvmType::Short => JvmType::Int,
        other => other.clone(),
    };
    MethodDescriptor::new(vec![param], JvmType::string())
}

impl MethodEmitter<'_> {
    /// Convert the value on top of the stack from `from` to `to`.
    pub fn convert(&mut self, from: &JvmType, to: &JvmType) {
        for step in plan_conversion(from, to) {
            self.emit_conversion_step(&step);
        }
    }

    /// Convert a value of type `ty` to `java.lang.Object`.
    pub fn to_generic(&mut self, ty: &JvmType) {
        self.convert(ty, &JvmType::object());
    }

    /// Convert a `java.lang.Object` to type `ty`.
    pub fn from_generic(&mut self, ty: &JvmType) {
        self.convert(&JvmType::object(), ty);
    }

    fn emit_conversion_step(&mut self, step: &ConversionStep) {
        match step {
            ConversionStep::Primitive(op) => self.emit(*op),
            ConversionStep::Truthy(from) => self.emit_truthy(from),
            ConversionStep::Box(from) => {
                // box_class is Some for every primitive
                let Some(wrapper) = from.box_class() else {
                    return;
                };
                let desc = MethodDescriptor::new(vec![from.clone()], JvmType::class(wrapper));
                self.invokestatic(wrapper, "valueOf", &desc);
            }
            ConversionStep::Unbox { target, cast } => self.emit_unbox(target, *cast),
            ConversionStep::Stringify(from) => {
                let desc = string_value_of(from);
                self.invokestatic("java/lang/String", "valueOf", &desc);
            }
            ConversionStep::CheckCast(to) => self.checkcast(to),
            ConversionStep::Discard(ty) => self.pop_value(ty),
            ConversionStep::Zero(ty) => self.push_zero(ty),
        }
    }

    /// `value == null ? zero : ((Owner) value).xxxValue()`
    fn emit_unbox(&mut self, target: &JvmType, cast: bool) {
        let owner = unbox_owner(target);
        // unbox_method is Some for every primitive
        let Some(accessor) = target.unbox_method() else {
            return;
        };
        let present = self.new_label();
        let done = self.new_label();

        self.dup();
        self.branch(Opcode::Ifnonnull, present);
        self.pop_value(&JvmType::object());
        self.push_zero(target);
        self.goto(done);

        self.place_label(present);
        if cast {
            self.checkcast(&JvmType::class(owner));
        }
        self.invokevirtual(owner, accessor, &MethodDescriptor::returning(target.clone()));
        self.place_label(done);
    }

    /// `value != 0 ? 1 : 0`
    fn emit_truthy(&mut self, from: &JvmType) {
        match category(from) {
            Category::Int => {}
            Category::Long => {
                self.lconst(0);
                self.emit(Opcode::Lcmp);
            }
            Category::Float => {
                self.fconst(0.0);
                self.emit(Opcode::Fcmpl);
            }
            Category::Double => {
                self.dconst(0.0);
                self.emit(Opcode::Dcmpl);
            }
        }
        let zero = self.new_label();
        let done = self.new_label();
        self.branch(Opcode::Ifeq, zero);
        self.iconst(1);
        self.goto(done);
        self.place_label(zero);
        self.iconst(0);
        self.place_label(done);
    }
}
