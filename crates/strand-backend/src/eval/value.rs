//! Runtime values of the evaluator
//!
//! Values follow the target's model: every int, float and double is one
//! number type, longs stay 64-bit, and references are shared handles
//! compared by identity.

use crate::ir::ValueType;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug)]
pub struct Object {
    pub class: String,
    pub fields: FxHashMap<String, Value>,
}

#[derive(Debug)]
pub struct Array {
    pub element_type: ValueType,
    pub data: Vec<Value>,
}

pub type ObjectRef = Rc<RefCell<Object>>;
pub type ArrayRef = Rc<RefCell<Array>>;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Number(f64),
    Long(i64),
    Bool(bool),
    Str(Rc<str>),
    Object(ObjectRef),
    Array(ArrayRef),
    Class(ValueType),
}

impl Value {
    pub fn int(value: i32) -> Self {
        Value::Number(f64::from(value))
    }

    pub fn new_object(class: impl Into<String>) -> Self {
        Value::Object(Rc::new(RefCell::new(Object {
            class: class.into(),
            fields: FxHashMap::default(),
        })))
    }

    pub fn new_array(element_type: ValueType, data: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(Array { element_type, data })))
    }

    /// Zero value of a field or array element of type `ty`
    pub fn default_of(ty: &ValueType) -> Self {
        match ty {
            ValueType::Long => Value::Long(0),
            ValueType::Object(_) | ValueType::Array(_) => Value::Null,
            _ => Value::Number(0.0),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Runtime class of an object value
    pub fn class_name(&self) -> Option<String> {
        match self {
            Value::Object(object) => Some(object.borrow().class.clone()),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Long(v) => *v != 0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Array(_) | Value::Class(_) => true,
        }
    }

    /// Numeric view; booleans count as 0 and 1
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null => Some(0.0),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::Long(_) => "long",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Class(_) => "class",
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => a == b,
            _ => false,
        }
    }

    /// `==`; numbers and booleans compare numerically
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(_) | Value::Bool(_), Value::Number(_) | Value::Bool(_)) => {
                self.as_number() == other.as_number()
            }
            _ => self.strict_equals(other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Object(object) => write!(f, "<{}>", object.borrow().class),
            Value::Array(array) => write!(f, "<{}[{}]>", array.borrow().element_type, array.borrow().data.len()),
            Value::Class(ty) => write!(f, "class {}", ty),
        }
    }
}

/// ToInt32
pub fn to_int32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    let wrapped = value.trunc().rem_euclid(4_294_967_296.0);
    if wrapped >= 2_147_483_648.0 {
        (wrapped - 4_294_967_296.0) as i32
    } else {
        wrapped as i32
    }
}

/// ToUint32
pub fn to_uint32(value: f64) -> u32 {
    to_int32(value) as u32
}
