//! Basic Blocks and Control Flow
//!
//! Basic blocks are sequences of instructions with a single entry point
//! and a single exit point (the terminator).

use super::instr::Instruction;
use super::types::{Var, TextLocation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Basic block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BasicBlockId(pub u32);

impl BasicBlockId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BasicBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Handler protecting a block
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExceptionHandler {
    /// Caught class; `None` catches everything
    #[serde(default)]
    pub exception_type: Option<String>,
    pub handler: BasicBlockId,
    /// Variable receiving the caught exception
    #[serde(default)]
    pub exception_var: Option<Var>,
}

/// A basic block: sequence of instructions with single entry and exit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BasicBlockId,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
    /// Location of the terminator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminator_location: Option<TextLocation>,
    /// Protecting handlers, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<ExceptionHandler>,
}

impl BasicBlock {
    /// Create a new empty basic block
    pub fn new(id: BasicBlockId) -> Self {
        Self {
            id,
            instructions: Vec::new(),
            terminator: Terminator::Unreachable,
            terminator_location: None,
            handlers: Vec::new(),
        }
    }

    /// Add an instruction to this block
    pub fn add_instr(&mut self, instr: impl Into<Instruction>) {
        self.instructions.push(instr.into());
    }

    /// Set the terminator for this block
    pub fn set_terminator(&mut self, term: Terminator) {
        self.terminator = term;
    }

    /// Normal successors followed by exception handler targets
    pub fn successors(&self) -> Vec<BasicBlockId> {
        let mut succs = self.terminator.successors();
        succs.extend(self.handlers.iter().map(|h| h.handler));
        succs
    }

    /// Check if this block is terminated (not unreachable)
    pub fn is_terminated(&self) -> bool {
        !matches!(self.terminator, Terminator::Unreachable)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Comparison of a single operand against zero or null
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchCondition {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Null,
    NotNull,
}

impl BranchCondition {
    pub fn inverse(self) -> Self {
        match self {
            BranchCondition::Equal => BranchCondition::NotEqual,
            BranchCondition::NotEqual => BranchCondition::Equal,
            BranchCondition::Less => BranchCondition::GreaterOrEqual,
            BranchCondition::LessOrEqual => BranchCondition::Greater,
            BranchCondition::Greater => BranchCondition::LessOrEqual,
            BranchCondition::GreaterOrEqual => BranchCondition::Less,
            BranchCondition::Null => BranchCondition::NotNull,
            BranchCondition::NotNull => BranchCondition::Null,
        }
    }
}

/// Comparison of two operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryBranchCondition {
    Equal,
    NotEqual,
    ReferenceEqual,
    ReferenceNotEqual,
}

impl BinaryBranchCondition {
    pub fn inverse(self) -> Self {
        match self {
            BinaryBranchCondition::Equal => BinaryBranchCondition::NotEqual,
            BinaryBranchCondition::NotEqual => BinaryBranchCondition::Equal,
            BinaryBranchCondition::ReferenceEqual => BinaryBranchCondition::ReferenceNotEqual,
            BinaryBranchCondition::ReferenceNotEqual => BinaryBranchCondition::ReferenceEqual,
        }
    }
}

/// Control flow terminator (ends a basic block)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Terminator {
    /// Unconditional jump to target block
    Jump { target: BasicBlockId },

    /// Compare one operand with zero (or null) and branch
    Branch {
        condition: BranchCondition,
        operand: Var,
        consequent: BasicBlockId,
        alternative: BasicBlockId,
    },

    /// Compare two operands and branch
    BinaryBranch {
        condition: BinaryBranchCondition,
        first: Var,
        second: Var,
        consequent: BasicBlockId,
        alternative: BasicBlockId,
    },

    /// Table switch on an int value
    Switch {
        value: Var,
        cases: Vec<(i32, BasicBlockId)>,
        default: BasicBlockId,
    },

    /// Return from the method with optional value
    Return { value: Option<Var> },

    /// Throw an exception
    Throw { exception: Var },

    /// Unreachable (placeholder before terminator is set)
    Unreachable,
}

impl Terminator {
    pub fn jump(target: BasicBlockId) -> Self {
        Terminator::Jump { target }
    }

    pub fn ret(value: Option<Var>) -> Self {
        Terminator::Return { value }
    }

    /// Get all successor blocks
    pub fn successors(&self) -> Vec<BasicBlockId> {
        match self {
            Terminator::Jump { target } => vec![*target],
            Terminator::Branch {
                consequent,
                alternative,
                ..
            }
            | Terminator::BinaryBranch {
                consequent,
                alternative,
                ..
            } => vec![*consequent, *alternative],
            Terminator::Switch { cases, default, .. } => {
                let mut succs: Vec<_> = cases.iter().map(|(_, block)| *block).collect();
                succs.push(*default);
                succs
            }
            Terminator::Return { .. } | Terminator::Throw { .. } | Terminator::Unreachable => {
                vec![]
            }
        }
    }

    /// Variables read by this terminator
    pub fn uses(&self) -> Vec<Var> {
        match self {
            Terminator::Branch { operand, .. } => vec![*operand],
            Terminator::BinaryBranch { first, second, .. } => vec![*first, *second],
            Terminator::Switch { value, .. } => vec![*value],
            Terminator::Return { value } => value.iter().copied().collect(),
            Terminator::Throw { exception } => vec![*exception],
            Terminator::Jump { .. } | Terminator::Unreachable => vec![],
        }
    }

    /// Redirect every edge to `from` towards `to`
    pub fn retarget(&mut self, from: BasicBlockId, to: BasicBlockId) {
        let fix = |id: &mut BasicBlockId| {
            if *id == from {
                *id = to;
            }
        };
        match self {
            Terminator::Jump { target } => fix(target),
            Terminator::Branch {
                consequent,
                alternative,
                ..
            }
            | Terminator::BinaryBranch {
                consequent,
                alternative,
                ..
            } => {
                fix(consequent);
                fix(alternative);
            }
            Terminator::Switch { cases, default, .. } => {
                for (_, target) in cases.iter_mut() {
                    fix(target);
                }
                fix(default);
            }
            Terminator::Return { .. } | Terminator::Throw { .. } | Terminator::Unreachable => {}
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Jump { target } => write!(f, "jump {}", target),
            Terminator::Branch {
                condition,
                operand,
                consequent,
                alternative,
            } => write!(
                f,
                "branch {:?} {} ? {} : {}",
                condition, operand, consequent, alternative
            ),
            Terminator::BinaryBranch {
                condition,
                first,
                second,
                consequent,
                alternative,
            } => write!(
                f,
                "branch {:?} {}, {} ? {} : {}",
                condition, first, second, consequent, alternative
            ),
            Terminator::Return { value: None } => write!(f, "return"),
            Terminator::Return { value: Some(var) } => write!(f, "return {}", var),
            Terminator::Switch {
                value,
                cases,
                default,
            } => {
                write!(f, "switch {} [", value)?;
                for (i, (val, block)) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} => {}", val, block)?;
                }
                write!(f, ", _ => {}]", default)
            }
            Terminator::Throw { exception } => write!(f, "throw {}", exception),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_successors_include_default_last() {
        let term = Terminator::Switch {
            value: Var(1),
            cases: vec![(0, BasicBlockId(2)), (1, BasicBlockId(3))],
            default: BasicBlockId(4),
        };
        assert_eq!(
            term.successors(),
            vec![BasicBlockId(2), BasicBlockId(3), BasicBlockId(4)]
        );
    }

    #[test]
    fn test_successors_include_handlers() {
        let mut block = BasicBlock::new(BasicBlockId(0));
        block.set_terminator(Terminator::jump(BasicBlockId(1)));
        block.handlers.push(ExceptionHandler {
            exception_type: None,
            handler: BasicBlockId(5),
            exception_var: None,
        });
        assert_eq!(block.successors(), vec![BasicBlockId(1), BasicBlockId(5)]);
    }

    #[test]
    fn test_retarget() {
        let mut term = Terminator::Branch {
            condition: BranchCondition::Equal,
            operand: Var(1),
            consequent: BasicBlockId(3),
            alternative: BasicBlockId(3),
        };
        term.retarget(BasicBlockId(3), BasicBlockId(7));
        assert_eq!(term.successors(), vec![BasicBlockId(7), BasicBlockId(7)]);
    }

    #[test]
    fn test_inverse_is_involution() {
        for cond in [
            BranchCondition::Equal,
            BranchCondition::Less,
            BranchCondition::GreaterOrEqual,
            BranchCondition::Null,
        ] {
            assert_eq!(cond.inverse().inverse(), cond);
        }
    }
}
