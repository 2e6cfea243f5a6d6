//! Input IR consumed by the backend
//!
//! Methods arrive as control-flow graphs of three-address instructions.
//!
//! # Structure
//!
//! - `Unit` - Classes compiled into one output text
//! - `Method` - Basic blocks plus modifiers, annotations and variable slots
//! - `BasicBlock` - Instructions with a single terminator
//! - `Instruction` - Three-address instructions over `Var` slots

pub mod block;
pub mod instr;
pub mod method;
pub mod pretty;
pub mod types;

pub use block::{
    BasicBlock, BasicBlockId, BinaryBranchCondition, BranchCondition, ExceptionHandler, Terminator,
};
pub use instr::{
    BinaryOperation, CastDirection, Constant, Instruction, InstructionKind, IntegerSubtype,
    InvocationKind, Invoke, NumericType,
};
pub use method::{Annotations, ClassDef, FieldDef, Method, Modifiers, Unit};
pub use pretty::PrettyPrint;
pub use types::{FieldRef, MethodRef, ParseRefError, TextLocation, ValueType, Var};
