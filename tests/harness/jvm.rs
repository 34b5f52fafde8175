//! A small bytecode interpreter for generated adapters.
//!
//! Only the instructions and library methods the generator emits are
//! supported. Classes defined with [`Jvm::define`] run as bytecode; every
//! other method is resolved against a handful of native stand-ins for the
//! JDK and the rule engine.

use std::rc::Rc;

use rulegen::classfile::{Constant, ConstantPool, Opcode, ParsedClass, ParsedMethod};
use rulegen::compiler::RuntimeClasses;
use rulegen::core::{JvmType, MethodDescriptor, ReadError};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Index of an object on the heap.
pub type Ref = usize;

/// Upper bound on instructions per invocation.
const STEP_LIMIT: usize = 100_000;

/// A JVM value. `long` and `double` occupy two slots; the second is `Top`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Top,
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(Ref),
}

impl Value {
    pub fn is_wide(self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn int(self) -> i32 {
        match self {
            Value::Int(v) => v,
            other => panic!("expected int, found {:?}", other),
        }
    }

    pub fn long(self) -> i64 {
        match self {
            Value::Long(v) => v,
            other => panic!("expected long, found {:?}", other),
        }
    }

    pub fn float(self) -> f32 {
        match self {
            Value::Float(v) => v,
            other => panic!("expected float, found {:?}", other),
        }
    }

    pub fn double(self) -> f64 {
        match self {
            Value::Double(v) => v,
            other => panic!("expected double, found {:?}", other),
        }
    }

    /// Default value of a field of type `ty`.
    pub fn zero_of(ty: &JvmType) -> Value {
        match ty {
            JvmType::Long => Value::Long(0),
            JvmType::Float => Value::Float(0.0),
            JvmType::Double => Value::Double(0.0),
            JvmType::Object(_) | JvmType::Array(_) => Value::Null,
            _ => Value::Int(0),
        }
    }
}

/// Abnormal completion of an invocation.
#[derive(Debug, Error)]
pub enum Trap {
    #[error("null pointer: {0}")]
    NullPointer(String),

    #[error("class cast: {found} cannot be cast to {target}")]
    ClassCast { found: String, target: String },

    #[error("no such method {owner}.{name}{desc}")]
    NoSuchMethod {
        owner: String,
        name: String,
        desc: String,
    },

    #[error("array index {0} out of bounds")]
    ArrayIndex(i32),

    #[error("exception thrown: object {0}")]
    Thrown(Ref),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("bad class file: {0}")]
    Read(#[from] ReadError),
}

/// Evaluates one logic node of a rule for the interpreted strategy.
///
/// Receives the adapter instance.
pub type Evaluator = Rc<dyn Fn(&mut Jvm, Ref) -> Result<Value, Trap>>;

/// A heap object.
pub enum Object {
    Instance {
        class: String,
        fields: FxHashMap<String, Value>,
    },
    Str(String),
    Boxed {
        class: String,
        value: Value,
    },
    Array(Vec<Value>),
    Builder(String),
    PrintStream,
    Rule {
        name: String,
        logic: [Evaluator; 3],
    },
    Node {
        rule: Ref,
        index: usize,
    },
}

/// The interpreter.
pub struct Jvm {
    heap: Vec<Object>,
    classes: FxHashMap<String, Rc<ParsedClass>>,
    runtime: RuntimeClasses,
    system_out: Option<Ref>,
    /// Value returned by the trace gate.
    pub verbose: bool,
    /// Lines printed through `System.out`.
    pub stdout: Vec<String>,
    /// Calls of interest: superclass constructors, trace gate checks and
    /// accessibility forwarding.
    pub log: Vec<String>,
    /// Values behind `getAccessibleField`, by field index.
    pub accessible: FxHashMap<i32, Value>,
}

impl Default for Jvm {
    fn default() -> Self {
        Self::new()
    }
}

impl Jvm {
    pub fn new() -> Self {
        Self {
            heap: Vec::new(),
            classes: FxHashMap::default(),
            runtime: RuntimeClasses::default(),
            system_out: None,
            verbose: false,
            stdout: Vec::new(),
            log: Vec::new(),
            accessible: FxHashMap::default(),
        }
    }

    // ========================================================================
    // Classes and objects
    // ========================================================================

    /// Define a class from its bytes and return its internal name.
    pub fn define(&mut self, bytes: &[u8]) -> Result<String, Trap> {
        let class = ParsedClass::parse(bytes)?;
        let name = class.name.clone();
        self.classes.insert(name.clone(), Rc::new(class));
        Ok(name)
    }

    pub fn alloc(&mut self, object: Object) -> Ref {
        self.heap.push(object);
        self.heap.len() - 1
    }

    pub fn object(&self, r: Ref) -> &Object {
        &self.heap[r]
    }

    pub fn new_string(&mut self, text: &str) -> Value {
        Value::Ref(self.alloc(Object::Str(text.to_string())))
    }

    pub fn boxed(&mut self, class: &str, value: Value) -> Value {
        Value::Ref(self.alloc(Object::Boxed {
            class: class.to_string(),
            value,
        }))
    }

    pub fn new_instance(&mut self, class: &str) -> Value {
        Value::Ref(self.alloc(Object::Instance {
            class: class.to_string(),
            fields: FxHashMap::default(),
        }))
    }

    pub fn new_array(&mut self, values: Vec<Value>) -> Ref {
        self.alloc(Object::Array(values))
    }

    pub fn array(&self, r: Ref) -> &[Value] {
        match &self.heap[r] {
            Object::Array(values) => values,
            _ => panic!("object {} is not an array", r),
        }
    }

    /// Text of a string value, `None` for null.
    pub fn string(&self, value: Value) -> Option<String> {
        match value {
            Value::Ref(r) => match &self.heap[r] {
                Object::Str(s) => Some(s.clone()),
                _ => panic!("object {} is not a string", r),
            },
            Value::Null => None,
            other => panic!("expected string, found {:?}", other),
        }
    }

    /// Class and primitive value of a boxed value, `None` for null.
    pub fn unboxed(&self, value: Value) -> Option<(&str, Value)> {
        match value {
            Value::Ref(r) => match &self.heap[r] {
                Object::Boxed { class, value } => Some((class, *value)),
                _ => panic!("object {} is not a boxed value", r),
            },
            Value::Null => None,
            other => panic!("expected boxed value, found {:?}", other),
        }
    }

    /// The rule object the engine passes to adapter constructors.
    pub fn new_rule(&mut self, name: &str, logic: [Evaluator; 3]) -> Ref {
        self.alloc(Object::Rule {
            name: name.to_string(),
            logic,
        })
    }

    pub fn rename_rule(&mut self, rule: Ref, new_name: &str) {
        if let Object::Rule { name, .. } = &mut self.heap[rule] {
            *name = new_name.to_string();
        }
    }

    /// Read a field directly, bypassing the adapter's methods.
    pub fn field(&self, object: Ref, name: &str) -> Option<Value> {
        match &self.heap[object] {
            Object::Instance { fields, .. } => fields.get(name).copied(),
            _ => None,
        }
    }

    // ========================================================================
    // Adapter entry points
    // ========================================================================

    /// `new Adapter(rule)`
    pub fn instantiate(&mut self, class: &str, rule: Ref) -> Result<Ref, Trap> {
        let adapter = self.alloc(Object::Instance {
            class: class.to_string(),
            fields: FxHashMap::default(),
        });
        let desc = self.runtime.rule_constructor_descriptor().to_string();
        self.invoke(class, "<init>", &desc, Some(Value::Ref(adapter)), vec![Value::Ref(rule)])?;
        Ok(adapter)
    }

    /// `adapter.execute(recipient, args)`
    pub fn execute(&mut self, adapter: Ref, recipient: Value, args: Ref) -> Result<(), Trap> {
        self.call(
            adapter,
            "execute",
            "(Ljava/lang/Object;[Ljava/lang/Object;)V",
            vec![recipient, Value::Ref(args)],
        )?;
        Ok(())
    }

    /// `adapter.setBinding(name, value)`
    pub fn set_binding(&mut self, adapter: Ref, name: &str, value: Value) -> Result<(), Trap> {
        let name = self.new_string(name);
        self.call(
            adapter,
            "setBinding",
            "(Ljava/lang/String;Ljava/lang/Object;)V",
            vec![name, value],
        )?;
        Ok(())
    }

    /// `adapter.getBinding(name)`
    pub fn get_binding(&mut self, adapter: Ref, name: &str) -> Result<Value, Trap> {
        let name = self.new_string(name);
        let result = self.call(
            adapter,
            "getBinding",
            "(Ljava/lang/String;)Ljava/lang/Object;",
            vec![name],
        )?;
        Ok(result.unwrap_or(Value::Null))
    }

    /// `adapter.getName()`
    pub fn get_name(&mut self, adapter: Ref) -> Result<Option<String>, Trap> {
        let result = self.call(adapter, "getName", "()Ljava/lang/String;", Vec::new())?;
        Ok(self.string(result.unwrap_or(Value::Null)))
    }

    /// Invoke an instance method on `target`, resolved by its class.
    pub fn call(
        &mut self,
        target: Ref,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Trap> {
        let class = self.class_of(target);
        self.invoke(&class, name, desc, Some(Value::Ref(target)), args)
    }

    fn class_of(&self, r: Ref) -> String {
        match &self.heap[r] {
            Object::Instance { class, .. } | Object::Boxed { class, .. } => class.clone(),
            Object::Str(_) => "java/lang/String".to_string(),
            Object::Array(_) => "[Ljava/lang/Object;".to_string(),
            Object::Builder(_) => "java/lang/StringBuilder".to_string(),
            Object::PrintStream => "java/io/PrintStream".to_string(),
            Object::Rule { .. } => self.runtime.rule.clone(),
            Object::Node { index, .. } => self.node_class(*index).to_string(),
        }
    }

    fn node_class(&self, index: usize) -> &str {
        match index {
            0 => &self.runtime.event,
            1 => &self.runtime.condition,
            _ => &self.runtime.action,
        }
    }

    /// Check `object instanceof target`.
    pub fn is_instance(&self, object: Ref, target: &str) -> bool {
        if target == "java/lang/Object" {
            return true;
        }
        match &self.heap[object] {
            Object::Instance { class, .. } => {
                class == target
                    || self.classes.get(class).is_some_and(|c| {
                        c.super_name == target || c.interfaces.iter().any(|i| i == target)
                    })
            }
            Object::Str(_) => matches!(
                target,
                "java/lang/String" | "java/lang/CharSequence" | "java/lang/Comparable"
            ),
            Object::Boxed { class, .. } => {
                class == target
                    || target == "java/lang/Comparable"
                    || (target == "java/lang/Number"
                        && !matches!(class.as_str(), "java/lang/Boolean" | "java/lang/Character"))
            }
            Object::Array(_) => target.starts_with('['),
            Object::Builder(_) => target == "java/lang/StringBuilder",
            Object::PrintStream => target == "java/io/PrintStream",
            Object::Rule { .. } => target == self.runtime.rule,
            Object::Node { index, .. } => target == self.node_class(*index),
        }
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Invoke `owner.name desc`. Defined classes run as bytecode, everything
    /// else natively.
    pub fn invoke(
        &mut self,
        owner: &str,
        name: &str,
        desc: &str,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Trap> {
        if let Some(class) = self.classes.get(owner).cloned() {
            if let Some(method) = class.method(name, desc) {
                return self.run(&class, method, receiver, args);
            }
        }
        self.native(owner, name, desc, receiver, args)
    }

    fn run(
        &mut self,
        class: &Rc<ParsedClass>,
        method: &ParsedMethod,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Trap> {
        let code = method
            .code
            .as_ref()
            .ok_or_else(|| Trap::Unsupported(format!("{} has no code", method.signature())))?;
        let mut locals = vec![Value::Top; usize::from(code.max_locals)];
        let mut slot = 0;
        for value in receiver.into_iter().chain(args) {
            locals[slot] = value;
            slot += if value.is_wide() { 2 } else { 1 };
        }
        let mut stack = Stack {
            slots: Vec::new(),
            max: usize::from(code.max_stack),
        };
        let pool = &class.pool;
        let bytes = &code.code;
        let mut pc = 0usize;

        for _ in 0..STEP_LIMIT {
            let op = Opcode::from_u8(bytes[pc])
                .ok_or_else(|| Trap::Unsupported(format!("opcode {:#04x}", bytes[pc])))?;
            let u8_operand = || bytes[pc + 1];
            let u16_operand = || u16::from_be_bytes([bytes[pc + 1], bytes[pc + 2]]);
            let mut next = pc + op.encoded_len();
            let raw = u8::from(op);

            use Opcode::*;
            match op {
                Nop => {}
                AconstNull => stack.push(Value::Null),
                IconstM1 | Iconst0 | Iconst1 | Iconst2 | Iconst3 | Iconst4 | Iconst5 => {
                    stack.push(Value::Int(i32::from(raw) - 3))
                }
                Lconst0 | Lconst1 => stack.push(Value::Long(i64::from(raw) - 9)),
                Fconst0 | Fconst1 | Fconst2 => stack.push(Value::Float(f32::from(raw - 11))),
                Dconst0 | Dconst1 => stack.push(Value::Double(f64::from(raw - 14))),
                Bipush => stack.push(Value::Int(i32::from(u8_operand() as i8))),
                Sipush => stack.push(Value::Int(i32::from(u16_operand() as i16))),
                Ldc => {
                    let value = self.constant(pool, u16::from(u8_operand()))?;
                    stack.push(value);
                }
                LdcW | Ldc2W => {
                    let value = self.constant(pool, u16_operand())?;
                    stack.push(value);
                }
                Iinc => {
                    let index = usize::from(u8_operand());
                    let delta = i32::from(bytes[pc + 2] as i8);
                    locals[index] = Value::Int(locals[index].int().wrapping_add(delta));
                }
                _ if op.local_access().is_some() => {
                    let implied = op.local_access().and_then(|(_, implied)| implied);
                    let index = implied.map_or_else(|| usize::from(u8_operand()), usize::from);
                    if (0x15..=0x2d).contains(&raw) {
                        stack.push(locals[index]);
                    } else {
                        let value = stack.pop();
                        locals[index] = value;
                        if value.is_wide() {
                            locals[index + 1] = Value::Top;
                        }
                    }
                }
                Pop => {
                    stack.pop_raw();
                }
                Pop2 => {
                    stack.pop_raw();
                    stack.pop_raw();
                }
                Dup => {
                    let top = stack.peek_raw(0);
                    stack.push_raw(top);
                }
                Dup2 => {
                    let a = stack.peek_raw(1);
                    let b = stack.peek_raw(0);
                    stack.push_raw(a);
                    stack.push_raw(b);
                }
                Swap => {
                    let b = stack.pop_raw();
                    let a = stack.pop_raw();
                    stack.push_raw(b);
                    stack.push_raw(a);
                }
                Iadd | Isub | Imul => {
                    let b = stack.pop().int();
                    let a = stack.pop().int();
                    stack.push(Value::Int(match op {
                        Iadd => a.wrapping_add(b),
                        Isub => a.wrapping_sub(b),
                        _ => a.wrapping_mul(b),
                    }));
                }
                Ladd | Lsub | Lmul => {
                    let b = stack.pop().long();
                    let a = stack.pop().long();
                    stack.push(Value::Long(match op {
                        Ladd => a.wrapping_add(b),
                        Lsub => a.wrapping_sub(b),
                        _ => a.wrapping_mul(b),
                    }));
                }
                Fadd | Fsub | Fmul => {
                    let b = stack.pop().float();
                    let a = stack.pop().float();
                    stack.push(Value::Float(match op {
                        Fadd => a + b,
                        Fsub => a - b,
                        _ => a * b,
                    }));
                }
                Dadd | Dsub | Dmul => {
                    let b = stack.pop().double();
                    let a = stack.pop().double();
                    stack.push(Value::Double(match op {
                        Dadd => a + b,
                        Dsub => a - b,
                        _ => a * b,
                    }));
                }
                Ineg => {
                    let a = stack.pop().int();
                    stack.push(Value::Int(a.wrapping_neg()));
                }
                I2l => {
                    let v = stack.pop().int();
                    stack.push(Value::Long(i64::from(v)));
                }
                I2f => {
                    let v = stack.pop().int();
                    stack.push(Value::Float(v as f32));
                }
                I2d => {
                    let v = stack.pop().int();
                    stack.push(Value::Double(f64::from(v)));
                }
                L2i => {
                    let v = stack.pop().long();
                    stack.push(Value::Int(v as i32));
                }
                L2f => {
                    let v = stack.pop().long();
                    stack.push(Value::Float(v as f32));
                }
                L2d => {
                    let v = stack.pop().long();
                    stack.push(Value::Double(v as f64));
                }
                F2i => {
                    let v = stack.pop().float();
                    stack.push(Value::Int(v as i32));
                }
                F2l => {
                    let v = stack.pop().float();
                    stack.push(Value::Long(v as i64));
                }
                F2d => {
                    let v = stack.pop().float();
                    stack.push(Value::Double(f64::from(v)));
                }
                D2i => {
                    let v = stack.pop().double();
                    stack.push(Value::Int(v as i32));
                }
                D2l => {
                    let v = stack.pop().double();
                    stack.push(Value::Long(v as i64));
                }
                D2f => {
                    let v = stack.pop().double();
                    stack.push(Value::Float(v as f32));
                }
                I2b => {
                    let v = stack.pop().int();
                    stack.push(Value::Int(i32::from(v as i8)));
                }
                I2c => {
                    let v = stack.pop().int();
                    stack.push(Value::Int(i32::from(v as u16)));
                }
                I2s => {
                    let v = stack.pop().int();
                    stack.push(Value::Int(i32::from(v as i16)));
                }
                Lcmp => {
                    let b = stack.pop().long();
                    let a = stack.pop().long();
                    stack.push(Value::Int(a.cmp(&b) as i32));
                }
                Fcmpl | Fcmpg => {
                    let b = stack.pop().float();
                    let a = stack.pop().float();
                    let nan = if op == Fcmpl { -1 } else { 1 };
                    stack.push(Value::Int(a.partial_cmp(&b).map_or(nan, |o| o as i32)));
                }
                Dcmpl | Dcmpg => {
                    let b = stack.pop().double();
                    let a = stack.pop().double();
                    let nan = if op == Dcmpl { -1 } else { 1 };
                    stack.push(Value::Int(a.partial_cmp(&b).map_or(nan, |o| o as i32)));
                }
                Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | IfIcmpeq | IfIcmpne | IfIcmplt
                | IfIcmpge | IfIcmpgt | IfIcmple | IfAcmpeq | IfAcmpne | Goto | Ifnull
                | Ifnonnull => {
                    let taken = match op {
                        Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle => {
                            let v = stack.pop().int();
                            match op {
                                Ifeq => v == 0,
                                Ifne => v != 0,
                                Iflt => v < 0,
                                Ifge => v >= 0,
                                Ifgt => v > 0,
                                _ => v <= 0,
                            }
                        }
                        IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge | IfIcmpgt | IfIcmple => {
                            let b = stack.pop().int();
                            let a = stack.pop().int();
                            match op {
                                IfIcmpeq => a == b,
                                IfIcmpne => a != b,
                                IfIcmplt => a < b,
                                IfIcmpge => a >= b,
                                IfIcmpgt => a > b,
                                _ => a <= b,
                            }
                        }
                        IfAcmpeq | IfAcmpne => {
                            let b = stack.pop();
                            let a = stack.pop();
                            (a == b) == (op == IfAcmpeq)
                        }
                        Ifnull => stack.pop() == Value::Null,
                        Ifnonnull => stack.pop() != Value::Null,
                        _ => true,
                    };
                    if taken {
                        let offset = isize::from(u16_operand() as i16);
                        next = pc.wrapping_add_signed(offset);
                    }
                }
                Ireturn | Lreturn | Freturn | Dreturn | Areturn => return Ok(Some(stack.pop())),
                Return => return Ok(None),
                Getstatic => {
                    let member = pool.member_at(u16_operand())?;
                    if member.class != "java/lang/System" || member.name != "out" {
                        return Err(Trap::Unsupported(format!(
                            "static field {}.{}",
                            member.class, member.name
                        )));
                    }
                    let out = self.system_out();
                    stack.push(Value::Ref(out));
                }
                Getfield => {
                    let member = pool.member_at(u16_operand())?;
                    let ty = field_type(member.descriptor)?;
                    let target = self.deref(stack.pop(), member.name)?;
                    let value = self.field(target, member.name).unwrap_or(Value::zero_of(&ty));
                    stack.push(value);
                }
                Putfield => {
                    let member = pool.member_at(u16_operand())?;
                    let value = stack.pop();
                    let target = self.deref(stack.pop(), member.name)?;
                    match &mut self.heap[target] {
                        Object::Instance { fields, .. } => {
                            fields.insert(member.name.to_string(), value);
                        }
                        _ => return Err(Trap::Unsupported(format!("putfield {}", member.name))),
                    }
                }
                Invokevirtual | Invokespecial | Invokestatic | Invokeinterface => {
                    let member = pool.member_at(u16_operand())?;
                    let desc = MethodDescriptor::parse(member.descriptor)
                        .ok_or_else(|| ReadError::BadDescriptor(member.descriptor.to_string()))?;
                    let mut args: Vec<Value> = desc.params.iter().map(|_| stack.pop()).collect();
                    args.reverse();
                    let receiver = (op != Invokestatic).then(|| stack.pop());
                    let owner = match (op, receiver) {
                        (Invokevirtual | Invokeinterface, Some(Value::Ref(r))) => {
                            let class = self.class_of(r);
                            if self.classes.get(&class).is_some_and(|c| {
                                c.method(member.name, member.descriptor).is_some()
                            }) {
                                class
                            } else {
                                member.class.to_string()
                            }
                        }
                        (_, Some(Value::Null)) if member.name != "<init>" => {
                            return Err(Trap::NullPointer(format!(
                                "{}.{}",
                                member.class, member.name
                            )));
                        }
                        _ => member.class.to_string(),
                    };
                    if let Some(result) =
                        self.invoke(&owner, member.name, member.descriptor, receiver, args)?
                    {
                        stack.push(result);
                    }
                }
                New => {
                    let class = pool.class_at(u16_operand())?;
                    let object = if class == "java/lang/StringBuilder" {
                        Object::Builder(String::new())
                    } else {
                        Object::Instance {
                            class: class.to_string(),
                            fields: FxHashMap::default(),
                        }
                    };
                    let r = self.alloc(object);
                    stack.push(Value::Ref(r));
                }
                Checkcast => {
                    let target = pool.class_at(u16_operand())?;
                    if let Value::Ref(r) = stack.peek_raw(0) {
                        if !self.is_instance(r, target) {
                            return Err(Trap::ClassCast {
                                found: self.class_of(r),
                                target: target.to_string(),
                            });
                        }
                    }
                }
                Instanceof => {
                    let target = pool.class_at(u16_operand())?;
                    let result = match stack.pop() {
                        Value::Ref(r) => self.is_instance(r, target),
                        _ => false,
                    };
                    stack.push(Value::Int(i32::from(result)));
                }
                Anewarray => {
                    let count = stack.pop().int();
                    let len = usize::try_from(count).map_err(|_| Trap::ArrayIndex(count))?;
                    let r = self.new_array(vec![Value::Null; len]);
                    stack.push(Value::Ref(r));
                }
                Arraylength => {
                    let r = self.deref(stack.pop(), "arraylength")?;
                    let len = self.array(r).len();
                    stack.push(Value::Int(len as i32));
                }
                Aaload => {
                    let index = stack.pop().int();
                    let r = self.deref(stack.pop(), "aaload")?;
                    let value = usize::try_from(index)
                        .ok()
                        .and_then(|i| self.array(r).get(i).copied())
                        .ok_or(Trap::ArrayIndex(index))?;
                    stack.push(value);
                }
                Aastore => {
                    let value = stack.pop();
                    let index = stack.pop().int();
                    let r = self.deref(stack.pop(), "aastore")?;
                    let Object::Array(values) = &mut self.heap[r] else {
                        return Err(Trap::Unsupported("aastore on non-array".to_string()));
                    };
                    let element = usize::try_from(index)
                        .ok()
                        .and_then(|i| values.get_mut(i))
                        .ok_or(Trap::ArrayIndex(index))?;
                    *element = value;
                }
                Athrow => {
                    let r = self.deref(stack.pop(), "athrow")?;
                    return Err(Trap::Thrown(r));
                }
                other => return Err(Trap::Unsupported(other.mnemonic().to_string())),
            }
            pc = next;
        }
        Err(Trap::Unsupported(format!(
            "{} exceeded {} steps",
            method.signature(),
            STEP_LIMIT
        )))
    }

    fn constant(&mut self, pool: &ConstantPool, index: u16) -> Result<Value, Trap> {
        Ok(match pool.get(index) {
            Some(Constant::Integer(v)) => Value::Int(*v),
            Some(Constant::Float(v)) => Value::Float(*v),
            Some(Constant::Long(v)) => Value::Long(*v),
            Some(Constant::Double(v)) => Value::Double(*v),
            Some(Constant::String(_)) => {
                let text = pool.string_at(index)?.to_string();
                self.new_string(&text)
            }
            _ => return Err(Trap::Unsupported(format!("ldc of constant {}", index))),
        })
    }

    fn deref(&self, value: Value, what: &str) -> Result<Ref, Trap> {
        match value {
            Value::Ref(r) => Ok(r),
            _ => Err(Trap::NullPointer(what.to_string())),
        }
    }

    fn system_out(&mut self) -> Ref {
        match self.system_out {
            Some(out) => out,
            None => {
                let out = self.alloc(Object::PrintStream);
                self.system_out = Some(out);
                out
            }
        }
    }

    // ========================================================================
    // Native methods
    // ========================================================================

    fn native(
        &mut self,
        owner: &str,
        name: &str,
        desc: &str,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Trap> {
        let on_rule = owner == self.runtime.rule;
        let on_gate = owner == self.runtime.trace_gate && name == self.runtime.trace_gate_method;

        let result = match (owner, name) {
            ("java/lang/StringBuilder", "<init>") => None,
            (_, "<init>") => {
                self.log.push(format!("{}.<init>{}", owner, desc));
                None
            }
            _ if on_gate => {
                self.log.push("isVerbose".to_string());
                Some(Value::Int(i32::from(self.verbose)))
            }
            ("java/lang/String", "equals") => {
                let this = self.string(receiver.unwrap_or(Value::Null));
                let equal = match args[0] {
                    Value::Ref(r) => matches!(&self.heap[r], Object::Str(s) if Some(s) == this.as_ref()),
                    _ => false,
                };
                Some(Value::Int(i32::from(equal)))
            }
            ("java/lang/String", "valueOf") => {
                let text = java_string(desc, args[0]);
                Some(self.new_string(&text))
            }
            ("java/lang/StringBuilder", "append") => {
                let text = self.string(args[0]).unwrap_or_else(|| "null".to_string());
                let r = self.deref(receiver.unwrap_or(Value::Null), "append")?;
                if let Object::Builder(buf) = &mut self.heap[r] {
                    buf.push_str(&text);
                }
                receiver
            }
            ("java/lang/StringBuilder", "toString") => {
                let r = self.deref(receiver.unwrap_or(Value::Null), "toString")?;
                let text = match &self.heap[r] {
                    Object::Builder(buf) => buf.clone(),
                    _ => String::new(),
                };
                Some(self.new_string(&text))
            }
            ("java/io/PrintStream", "println") => {
                let text = self.string(args[0]).unwrap_or_else(|| "null".to_string());
                self.stdout.push(text);
                None
            }
            (_, "valueOf") if is_wrapper(owner) => {
                let value = args[0];
                Some(self.boxed(owner, value))
            }
            (
                "java/lang/Number" | "java/lang/Boolean" | "java/lang/Character",
                "intValue" | "longValue" | "floatValue" | "doubleValue" | "byteValue"
                | "shortValue" | "booleanValue" | "charValue",
            ) => {
                let r = self.deref(receiver.unwrap_or(Value::Null), name)?;
                let Object::Boxed { value, .. } = &self.heap[r] else {
                    return Err(Trap::Unsupported(format!("{} on a non-box", name)));
                };
                Some(unbox(*value, name))
            }
            (_, "getName") if on_rule => {
                let r = self.deref(receiver.unwrap_or(Value::Null), "getName")?;
                let text = match &self.heap[r] {
                    Object::Rule { name, .. } => name.clone(),
                    _ => String::new(),
                };
                Some(self.new_string(&text))
            }
            (_, "getEvent" | "getCondition" | "getAction") if on_rule => {
                let rule = self.deref(receiver.unwrap_or(Value::Null), name)?;
                let index = match name {
                    "getEvent" => 0,
                    "getCondition" => 1,
                    _ => 2,
                };
                Some(Value::Ref(self.alloc(Object::Node { rule, index })))
            }
            (_, "interpret") => {
                let node = self.deref(receiver.unwrap_or(Value::Null), "interpret")?;
                let Object::Node { rule, index } = self.heap[node] else {
                    return Err(Trap::Unsupported("interpret on a non-node".to_string()));
                };
                let Object::Rule { logic, .. } = &self.heap[rule] else {
                    return Err(Trap::Unsupported("node without rule".to_string()));
                };
                let evaluator = Rc::clone(&logic[index]);
                let adapter = self.deref(args[0], "interpret")?;
                Some(evaluator(self, adapter)?)
            }
            (_, "getAccessibleField") if on_rule => {
                let index = args[1].int();
                self.log.push(format!("getAccessibleField {}", index));
                Some(self.accessible.get(&index).copied().unwrap_or(Value::Null))
            }
            (_, "setAccessibleField") if on_rule => {
                let index = args[2].int();
                self.log.push(format!("setAccessibleField {}", index));
                self.accessible.insert(index, args[1]);
                None
            }
            (_, "invokeAccessibleMethod") if on_rule => {
                let index = args[2].int();
                let count = match args[1] {
                    Value::Ref(r) => self.array(r).len(),
                    _ => 0,
                };
                self.log.push(format!("invokeAccessibleMethod {} with {}", index, count));
                Some(self.new_string(&format!("invoked {}", index)))
            }
            _ => {
                return Err(Trap::NoSuchMethod {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    desc: desc.to_string(),
                });
            }
        };
        Ok(result)
    }
}

/// An operand stack that enforces the method's `max_stack`.
struct Stack {
    slots: Vec<Value>,
    max: usize,
}

impl Stack {
    fn push(&mut self, value: Value) {
        self.push_raw(value);
        if value.is_wide() {
            self.push_raw(Value::Top);
        }
    }

    fn push_raw(&mut self, value: Value) {
        self.slots.push(value);
        assert!(
            self.slots.len() <= self.max,
            "operand stack exceeds max_stack {}",
            self.max
        );
    }

    fn pop(&mut self) -> Value {
        match self.pop_raw() {
            Value::Top => self.pop_raw(),
            value => value,
        }
    }

    fn pop_raw(&mut self) -> Value {
        self.slots.pop().expect("operand stack underflow")
    }

    fn peek_raw(&self, depth: usize) -> Value {
        self.slots[self.slots.len() - 1 - depth]
    }
}

fn field_type(descriptor: &str) -> Result<JvmType, Trap> {
    JvmType::from_descriptor(descriptor)
        .ok_or_else(|| Trap::Read(ReadError::BadDescriptor(descriptor.to_string())))
}

fn is_wrapper(class: &str) -> bool {
    matches!(
        class,
        "java/lang/Boolean"
            | "java/lang/Byte"
            | "java/lang/Character"
            | "java/lang/Short"
            | "java/lang/Integer"
            | "java/lang/Long"
            | "java/lang/Float"
            | "java/lang/Double"
    )
}

fn unbox(value: Value, accessor: &str) -> Value {
    let (whole, real) = match value {
        Value::Int(v) => (i64::from(v), f64::from(v)),
        Value::Long(v) => (v, v as f64),
        Value::Float(v) => (v as i64, f64::from(v)),
        Value::Double(v) => (v as i64, v),
        other => panic!("cannot unbox {:?}", other),
    };
    match accessor {
        "longValue" => Value::Long(whole),
        "floatValue" => Value::Float(real as f32),
        "doubleValue" => Value::Double(real),
        "byteValue" => Value::Int(i32::from(whole as i8)),
        "shortValue" => Value::Int(i32::from(whole as i16)),
        _ => Value::Int(whole as i32),
    }
}

/// `String.valueOf` for the primitive named by `desc`.
fn java_string(desc: &str, value: Value) -> String {
    match (desc.as_bytes().get(1), value) {
        (Some(b'Z'), Value::Int(v)) => (v != 0).to_string(),
        (Some(b'C'), Value::Int(v)) => char::from_u32(v as u32).unwrap_or('?').to_string(),
        (_, Value::Int(v)) => v.to_string(),
        (_, Value::Long(v)) => v.to_string(),
        (_, Value::Float(v)) => java_real(f64::from(v)),
        (_, Value::Double(v)) => java_real(v),
        (_, other) => format!("{:?}", other),
    }
}

fn java_real(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e7 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}
