//! Structured statement trees
//!
//! Translation produces one [`MethodBody`] per method (or per async part).
//! `Block`, `Loop` and `Switch` statements carry a [`ConstructId`], a handle
//! into the body's [`ConstructArena`]; break/continue statements and the
//! renderer's label bookkeeping refer to constructs only through it.

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Expr, ExprKind, Helper, Invocation, UnaryOp};
pub use stmt::{walk_exprs, walk_statements, Statement, SwitchClause};

use crate::ir::Var;
use std::fmt;

/// Handle of a breakable construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstructId(pub u32);

impl ConstructId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ConstructId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructKind {
    Block,
    Loop,
    Switch,
}

/// Owns the identities of every construct of one method
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstructArena {
    kinds: Vec<ConstructKind>,
}

impl ConstructArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: ConstructKind) -> ConstructId {
        let id = ConstructId(self.kinds.len() as u32);
        self.kinds.push(kind);
        id
    }

    pub fn kind(&self, id: ConstructId) -> Option<ConstructKind> {
        self.kinds.get(id.index()).copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// A translated statement sequence and the state it allocates from
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    pub statements: Vec<Statement>,
    pub constructs: ConstructArena,
    /// Variable slots in use; temporaries are allocated past the end
    pub variable_count: u32,
}

impl MethodBody {
    pub fn new(variable_count: u32) -> Self {
        Self {
            statements: Vec::new(),
            constructs: ConstructArena::new(),
            variable_count,
        }
    }

    pub fn alloc_temp(&mut self) -> Var {
        let var = Var(self.variable_count);
        self.variable_count += 1;
        var
    }
}

/// Highest variable slot read or written by `statements`
pub fn highest_variable(statements: &[Statement]) -> Option<Var> {
    let mut highest: Option<Var> = None;
    let mut note = |var: Var| {
        if highest.map_or(true, |h| var > h) {
            highest = Some(var);
        }
    };
    walk_statements(statements, &mut |stmt| {
        if let Statement::TryCatch {
            exception_var: Some(var),
            ..
        } = stmt
        {
            note(*var);
        }
    });
    walk_exprs(statements, &mut |expr| {
        if let ExprKind::Variable(var) = expr.kind {
            note(var);
        }
    });
    highest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_allocates_sequential_ids() {
        let mut arena = ConstructArena::new();
        let a = arena.alloc(ConstructKind::Block);
        let b = arena.alloc(ConstructKind::Loop);
        assert_eq!((a, b), (ConstructId(0), ConstructId(1)));
        assert_eq!(arena.kind(b), Some(ConstructKind::Loop));
        assert_eq!(arena.kind(ConstructId(9)), None);
    }

    #[test]
    fn test_highest_variable_looks_inside_nested_bodies() {
        let inner = Statement::assign(Expr::var(Var(7)), Expr::int(1));
        let stmts = vec![
            Statement::assign(Expr::var(Var(2)), Expr::int(0)),
            Statement::Conditional {
                condition: Expr::var(Var(3)),
                consequent: vec![inner],
                alternative: vec![],
            },
        ];
        assert_eq!(highest_variable(&stmts), Some(Var(7)));
        assert_eq!(highest_variable(&[]), None);
    }
}
