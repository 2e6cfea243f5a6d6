//! Three-address instructions of the input IR
//!
//! Operands are always variables; constants are materialized by
//! [`InstructionKind::Constant`]. Every instruction may carry a source location.

use super::types::{FieldRef, MethodRef, TextLocation, ValueType, Var};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric operand type of arithmetic instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericType {
    Int,
    Long,
    Float,
    Double,
}

/// Arithmetic and bitwise operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Compare,
    And,
    Or,
    Xor,
    ShiftLeft,
    ShiftRight,
    ShiftRightUnsigned,
}

/// Sub-int integer types reachable through narrowing/widening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegerSubtype {
    Byte,
    Short,
    Char,
}

/// Direction of an integer subtype cast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastDirection {
    /// int -> subtype (narrowing)
    FromInteger,
    /// subtype -> int (widening, no-op)
    ToInteger,
}

/// Dispatch mode of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    Static,
    Virtual,
    Special,
}

/// Constant values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(ValueType),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => write!(f, "null"),
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Long(v) => write!(f, "{}L", v),
            Constant::Float(v) => write!(f, "{}F", v),
            Constant::Double(v) => write!(f, "{}D", v),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::Class(ty) => write!(f, "class {}", ty),
        }
    }
}

/// Method invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoke {
    #[serde(default)]
    pub receiver: Option<Var>,
    pub method: MethodRef,
    #[serde(default)]
    pub instance: Option<Var>,
    #[serde(default)]
    pub arguments: Vec<Var>,
    pub kind: InvocationKind,
    /// Upstream classification; `false` call sites never make the caller suspend
    #[serde(default = "default_may_suspend")]
    pub may_suspend: bool,
}

fn default_may_suspend() -> bool {
    true
}

/// Instruction payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InstructionKind {
    Nop,
    Constant {
        receiver: Var,
        value: Constant,
    },
    Assign {
        receiver: Var,
        assignee: Var,
    },
    Binary {
        receiver: Var,
        operation: BinaryOperation,
        operand_type: NumericType,
        first: Var,
        second: Var,
    },
    Negate {
        receiver: Var,
        operand_type: NumericType,
        operand: Var,
    },
    CastNumber {
        receiver: Var,
        from: NumericType,
        to: NumericType,
        value: Var,
    },
    CastInteger {
        receiver: Var,
        target: IntegerSubtype,
        direction: CastDirection,
        value: Var,
    },
    Cast {
        receiver: Var,
        target_type: ValueType,
        value: Var,
    },
    GetField {
        receiver: Var,
        #[serde(default)]
        instance: Option<Var>,
        field: FieldRef,
    },
    PutField {
        #[serde(default)]
        instance: Option<Var>,
        field: FieldRef,
        value: Var,
    },
    GetElement {
        receiver: Var,
        array: Var,
        index: Var,
    },
    PutElement {
        array: Var,
        index: Var,
        value: Var,
    },
    ArrayLength {
        receiver: Var,
        array: Var,
    },
    ConstructArray {
        receiver: Var,
        element_type: ValueType,
        size: Var,
    },
    Construct {
        receiver: Var,
        class: String,
    },
    Invoke(Invoke),
    IsInstance {
        receiver: Var,
        value: Var,
        class: ValueType,
    },
    InitClass {
        class: String,
    },
    NullCheck {
        receiver: Var,
        value: Var,
    },
    MonitorEnter {
        object: Var,
    },
    MonitorExit {
        object: Var,
    },
}

impl InstructionKind {
    /// Variable written by this instruction, if any
    pub fn receiver(&self) -> Option<Var> {
        match self {
            InstructionKind::Constant { receiver, .. }
            | InstructionKind::Assign { receiver, .. }
            | InstructionKind::Binary { receiver, .. }
            | InstructionKind::Negate { receiver, .. }
            | InstructionKind::CastNumber { receiver, .. }
            | InstructionKind::CastInteger { receiver, .. }
            | InstructionKind::Cast { receiver, .. }
            | InstructionKind::GetField { receiver, .. }
            | InstructionKind::GetElement { receiver, .. }
            | InstructionKind::ArrayLength { receiver, .. }
            | InstructionKind::ConstructArray { receiver, .. }
            | InstructionKind::Construct { receiver, .. }
            | InstructionKind::IsInstance { receiver, .. }
            | InstructionKind::NullCheck { receiver, .. } => Some(*receiver),
            InstructionKind::Invoke(invoke) => invoke.receiver,
            InstructionKind::Nop
            | InstructionKind::PutField { .. }
            | InstructionKind::PutElement { .. }
            | InstructionKind::InitClass { .. }
            | InstructionKind::MonitorEnter { .. }
            | InstructionKind::MonitorExit { .. } => None,
        }
    }

    /// Variables read by this instruction
    pub fn uses(&self) -> Vec<Var> {
        match self {
            InstructionKind::Nop
            | InstructionKind::Constant { .. }
            | InstructionKind::Construct { .. }
            | InstructionKind::InitClass { .. } => vec![],
            InstructionKind::Assign { assignee, .. } => vec![*assignee],
            InstructionKind::Binary { first, second, .. } => vec![*first, *second],
            InstructionKind::Negate { operand, .. } => vec![*operand],
            InstructionKind::CastNumber { value, .. }
            | InstructionKind::CastInteger { value, .. }
            | InstructionKind::Cast { value, .. }
            | InstructionKind::IsInstance { value, .. }
            | InstructionKind::NullCheck { value, .. } => vec![*value],
            InstructionKind::GetField { instance, .. } => instance.iter().copied().collect(),
            InstructionKind::PutField {
                instance, value, ..
            } => instance.iter().copied().chain(Some(*value)).collect(),
            InstructionKind::GetElement { array, index, .. } => vec![*array, *index],
            InstructionKind::PutElement {
                array,
                index,
                value,
            } => vec![*array, *index, *value],
            InstructionKind::ArrayLength { array, .. } => vec![*array],
            InstructionKind::ConstructArray { size, .. } => vec![*size],
            InstructionKind::Invoke(invoke) => invoke
                .instance
                .iter()
                .chain(invoke.arguments.iter())
                .copied()
                .collect(),
            InstructionKind::MonitorEnter { object } | InstructionKind::MonitorExit { object } => {
                vec![*object]
            }
        }
    }
}

/// An instruction with its optional source location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(flatten)]
    pub kind: InstructionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<TextLocation>,
}

impl Instruction {
    pub fn new(kind: InstructionKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    pub fn at(mut self, location: TextLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl From<InstructionKind> for Instruction {
    fn from(kind: InstructionKind) -> Self {
        Instruction::new(kind)
    }
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstructionKind::Nop => write!(f, "nop"),
            InstructionKind::Constant { receiver, value } => write!(f, "{} = {}", receiver, value),
            InstructionKind::Assign { receiver, assignee } => {
                write!(f, "{} = {}", receiver, assignee)
            }
            InstructionKind::Binary {
                receiver,
                operation,
                operand_type,
                first,
                second,
            } => write!(
                f,
                "{} = {:?}.{:?} {}, {}",
                receiver, operand_type, operation, first, second
            ),
            InstructionKind::Negate {
                receiver, operand, ..
            } => write!(f, "{} = -{}", receiver, operand),
            InstructionKind::CastNumber {
                receiver,
                from,
                to,
                value,
            } => write!(f, "{} = cast {:?}->{:?} {}", receiver, from, to, value),
            InstructionKind::CastInteger {
                receiver,
                target,
                direction,
                value,
            } => write!(f, "{} = cast {:?} {:?} {}", receiver, direction, target, value),
            InstructionKind::Cast {
                receiver,
                target_type,
                value,
            } => write!(f, "{} = cast {} {}", receiver, target_type, value),
            InstructionKind::GetField {
                receiver,
                instance,
                field,
            } => match instance {
                Some(instance) => write!(f, "{} = {}.{}", receiver, instance, field.name),
                None => write!(f, "{} = {}", receiver, field),
            },
            InstructionKind::PutField {
                instance,
                field,
                value,
            } => match instance {
                Some(instance) => write!(f, "{}.{} = {}", instance, field.name, value),
                None => write!(f, "{} = {}", field, value),
            },
            InstructionKind::GetElement {
                receiver,
                array,
                index,
            } => write!(f, "{} = {}[{}]", receiver, array, index),
            InstructionKind::PutElement {
                array,
                index,
                value,
            } => write!(f, "{}[{}] = {}", array, index, value),
            InstructionKind::ArrayLength { receiver, array } => {
                write!(f, "{} = length {}", receiver, array)
            }
            InstructionKind::ConstructArray {
                receiver,
                element_type,
                size,
            } => write!(f, "{} = new {}[{}]", receiver, element_type, size),
            InstructionKind::Construct { receiver, class } => {
                write!(f, "{} = new {}", receiver, class)
            }
            InstructionKind::Invoke(invoke) => {
                if let Some(receiver) = invoke.receiver {
                    write!(f, "{} = ", receiver)?;
                }
                write!(f, "invoke {:?} {}", invoke.kind, invoke.method)?;
                if let Some(instance) = invoke.instance {
                    write!(f, " on {}", instance)?;
                }
                let args: Vec<String> = invoke.arguments.iter().map(|a| a.to_string()).collect();
                write!(f, " ({})", args.join(", "))
            }
            InstructionKind::IsInstance {
                receiver,
                value,
                class,
            } => write!(f, "{} = {} instanceof {}", receiver, value, class),
            InstructionKind::InitClass { class } => write!(f, "initclass {}", class),
            InstructionKind::NullCheck { receiver, value } => {
                write!(f, "{} = nullcheck {}", receiver, value)
            }
            InstructionKind::MonitorEnter { object } => write!(f, "monitorenter {}", object),
            InstructionKind::MonitorExit { object } => write!(f, "monitorexit {}", object),
        }
    }
}
