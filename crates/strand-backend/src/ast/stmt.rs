//! Structured statements

use super::expr::Expr;
use super::ConstructId;
use crate::ir::{TextLocation, Var};

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchClause {
    pub values: Vec<i32>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Sequential(Vec<Statement>),
    Conditional {
        condition: Expr,
        consequent: Vec<Statement>,
        alternative: Vec<Statement>,
    },
    Switch {
        id: ConstructId,
        value: Expr,
        clauses: Vec<SwitchClause>,
        default: Vec<Statement>,
    },
    /// `while (condition)`; `None` loops forever
    Loop {
        id: ConstructId,
        condition: Option<Expr>,
        body: Vec<Statement>,
    },
    Block {
        id: ConstructId,
        body: Vec<Statement>,
    },
    Break {
        target: ConstructId,
    },
    Continue {
        target: ConstructId,
    },
    /// `left = right`, or a bare expression statement when `left` is `None`.
    /// `suspends` marks an invocation that may suspend the enclosing method.
    Assignment {
        left: Option<Expr>,
        right: Expr,
        suspends: bool,
        location: Option<TextLocation>,
    },
    Return {
        value: Option<Expr>,
        location: Option<TextLocation>,
    },
    Throw {
        exception: Expr,
        location: Option<TextLocation>,
    },
    InitClass {
        class: String,
        suspends: bool,
        location: Option<TextLocation>,
    },
    MonitorEnter {
        object: Expr,
        location: Option<TextLocation>,
    },
    MonitorExit {
        object: Expr,
        location: Option<TextLocation>,
    },
    /// Transfer to another part of a resumable method
    GotoPart(usize),
    /// One handler of a protected region; nested handlers are tried inner first
    TryCatch {
        protected: Vec<Statement>,
        exception_type: Option<String>,
        exception_var: Option<Var>,
        handler: Vec<Statement>,
    },
}

impl Statement {
    pub fn assign(left: Expr, right: Expr) -> Self {
        Statement::Assignment {
            left: Some(left),
            right,
            suspends: false,
            location: None,
        }
    }

    pub fn expression(expr: Expr) -> Self {
        Statement::Assignment {
            left: None,
            right: expr,
            suspends: false,
            location: None,
        }
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Statement::Return {
            value,
            location: None,
        }
    }

    /// Nested statement lists in order
    pub fn bodies(&self) -> Vec<&Vec<Statement>> {
        match self {
            Statement::Sequential(body)
            | Statement::Loop { body, .. }
            | Statement::Block { body, .. } => vec![body],
            Statement::Conditional {
                consequent,
                alternative,
                ..
            } => vec![consequent, alternative],
            Statement::Switch {
                clauses, default, ..
            } => clauses
                .iter()
                .map(|c| &c.body)
                .chain(std::iter::once(default))
                .collect(),
            Statement::TryCatch {
                protected, handler, ..
            } => vec![protected, handler],
            Statement::Break { .. }
            | Statement::Continue { .. }
            | Statement::Assignment { .. }
            | Statement::Return { .. }
            | Statement::Throw { .. }
            | Statement::InitClass { .. }
            | Statement::MonitorEnter { .. }
            | Statement::MonitorExit { .. }
            | Statement::GotoPart(_) => vec![],
        }
    }

    /// Expressions owned directly by this statement
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            Statement::Conditional { condition, .. } => vec![condition],
            Statement::Switch { value, .. } => vec![value],
            Statement::Loop { condition, .. } => condition.iter().collect(),
            Statement::Assignment { left, right, .. } => left.iter().chain(Some(right)).collect(),
            Statement::Return { value, .. } => value.iter().collect(),
            Statement::Throw { exception, .. } => vec![exception],
            Statement::MonitorEnter { object, .. } | Statement::MonitorExit { object, .. } => {
                vec![object]
            }
            Statement::Sequential(_)
            | Statement::Block { .. }
            | Statement::Break { .. }
            | Statement::Continue { .. }
            | Statement::InitClass { .. }
            | Statement::GotoPart(_)
            | Statement::TryCatch { .. } => vec![],
        }
    }

    /// Pre-order traversal of this statement and everything nested in it
    pub fn walk(&self, f: &mut impl FnMut(&Statement)) {
        f(self);
        for body in self.bodies() {
            for stmt in body {
                stmt.walk(f);
            }
        }
    }

    /// Can control continue to the statement after this one?
    pub fn completes_normally(&self) -> bool {
        !matches!(
            self,
            Statement::Break { .. }
                | Statement::Continue { .. }
                | Statement::Return { .. }
                | Statement::Throw { .. }
        )
    }
}

/// Apply `f` to every expression reachable from `statements`
pub fn walk_exprs(statements: &[Statement], f: &mut impl FnMut(&Expr)) {
    for stmt in statements {
        stmt.walk(&mut |s| {
            for expr in s.expressions() {
                expr.walk(&mut *f);
            }
        });
    }
}

/// Apply `f` to every statement in `statements`, nested ones included
pub fn walk_statements(statements: &[Statement], f: &mut impl FnMut(&Statement)) {
    for stmt in statements {
        stmt.walk(f);
    }
}
