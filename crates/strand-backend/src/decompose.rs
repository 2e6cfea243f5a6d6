//! Side-effect decomposition
//!
//! After this pass an effect carrier (`Invocation` or `New`) only appears as
//! the whole right-hand side of an assignment, a return value or a
//! statement-level expression. Suspension points therefore always sit on a
//! statement boundary.
//!
//! Nested carriers are hoisted into fresh temporaries in evaluation order.
//! Siblings evaluated before a hoisted carrier are spilled first when the
//! carrier could change what they read (field, element and array reads).
//! Conditional expressions and short-circuit operators with effectful arms
//! become `if` statements assigning a temporary. Given a suspend set, a
//! hoisted call that suspends keeps its suspend check on the temporary's
//! assignment.

use crate::analysis::SuspendSet;
use crate::ast::{BinaryOp, Expr, ExprKind, MethodBody, Statement, SwitchClause};
use crate::ir::Var;

/// Normalize `body` in place; returns the number of temporaries introduced
pub fn decompose(body: &mut MethodBody) -> u32 {
    decompose_with(body, None)
}

/// [`decompose`], marking hoisted calls found in `suspend_set`
pub fn decompose_with(body: &mut MethodBody, suspend_set: Option<&SuspendSet>) -> u32 {
    let before = body.variable_count;
    let mut decomposer = Decomposer {
        next_var: body.variable_count,
        suspend_set,
    };
    let statements = std::mem::take(&mut body.statements);
    body.statements = decomposer.statements(statements);
    body.variable_count = decomposer.next_var;
    let introduced = body.variable_count - before;
    if introduced > 0 {
        tracing::trace!(temporaries = introduced, "decomposed nested effects");
    }
    introduced
}

struct Decomposer<'a> {
    next_var: u32,
    suspend_set: Option<&'a SuspendSet>,
}

impl Decomposer<'_> {
    fn temp(&mut self) -> Var {
        let var = Var(self.next_var);
        self.next_var += 1;
        var
    }

    fn statements(&mut self, statements: Vec<Statement>) -> Vec<Statement> {
        let mut out = Vec::with_capacity(statements.len());
        for stmt in statements {
            self.statement(stmt, &mut out);
        }
        out
    }

    fn statement(&mut self, stmt: Statement, out: &mut Vec<Statement>) {
        match stmt {
            Statement::Assignment {
                left,
                right,
                suspends,
                location,
            } => {
                let left = left.map(|target| self.target(target, right.has_effects(), out));
                let right = self.expr(right, out, true);
                out.push(Statement::Assignment {
                    left,
                    right,
                    suspends,
                    location,
                });
            }
            Statement::Return { value, location } => {
                let value = value.map(|v| self.expr(v, out, true));
                out.push(Statement::Return { value, location });
            }
            Statement::Throw {
                exception,
                location,
            } => {
                let exception = self.expr(exception, out, false);
                out.push(Statement::Throw {
                    exception,
                    location,
                });
            }
            Statement::MonitorEnter { object, location } => {
                let object = self.expr(object, out, false);
                out.push(Statement::MonitorEnter { object, location });
            }
            Statement::MonitorExit { object, location } => {
                let object = self.expr(object, out, false);
                out.push(Statement::MonitorExit { object, location });
            }
            Statement::Conditional {
                condition,
                consequent,
                alternative,
            } => {
                let condition = self.expr(condition, out, false);
                out.push(Statement::Conditional {
                    condition,
                    consequent: self.statements(consequent),
                    alternative: self.statements(alternative),
                });
            }
            Statement::Switch {
                id,
                value,
                clauses,
                default,
            } => {
                let value = self.expr(value, out, false);
                let clauses = clauses
                    .into_iter()
                    .map(|clause| SwitchClause {
                        values: clause.values,
                        body: self.statements(clause.body),
                    })
                    .collect();
                out.push(Statement::Switch {
                    id,
                    value,
                    clauses,
                    default: self.statements(default),
                });
            }
            Statement::Loop {
                id,
                condition: Some(condition),
                body,
            } if condition.has_effects() => {
                // while (c) body  =>  while (true) { prefix; if (!c) break; body }
                let mut head = Vec::new();
                let condition = self.expr(condition, &mut head, false);
                head.push(Statement::Conditional {
                    condition: condition.negate(),
                    consequent: vec![Statement::Break { target: id }],
                    alternative: vec![],
                });
                head.extend(self.statements(body));
                out.push(Statement::Loop {
                    id,
                    condition: None,
                    body: head,
                });
            }
            Statement::Loop {
                id,
                condition,
                body,
            } => out.push(Statement::Loop {
                id,
                condition,
                body: self.statements(body),
            }),
            Statement::Block { id, body } => out.push(Statement::Block {
                id,
                body: self.statements(body),
            }),
            Statement::Sequential(body) => out.push(Statement::Sequential(self.statements(body))),
            Statement::TryCatch {
                protected,
                exception_type,
                exception_var,
                handler,
            } => out.push(Statement::TryCatch {
                protected: self.statements(protected),
                exception_type,
                exception_var,
                handler: self.statements(handler),
            }),
            stmt @ (Statement::Break { .. }
            | Statement::Continue { .. }
            | Statement::InitClass { .. }
            | Statement::GotoPart(_)) => out.push(stmt),
        }
    }

    /// Left-hand side of an assignment. Its operands are evaluated before the
    /// right-hand side, so they are spilled when the right side has effects.
    fn target(&mut self, target: Expr, right_has_effects: bool, out: &mut Vec<Statement>) -> Expr {
        let location = target.location.clone();
        let kind = match target.kind {
            ExprKind::Subscript { array, index } => {
                let mut operands = self.sequence(vec![*array, *index], out);
                if right_has_effects {
                    operands = operands.into_iter().map(|e| self.spill(e, out)).collect();
                }
                let index = operands.pop();
                let array = operands.pop();
                match (array, index) {
                    (Some(array), Some(index)) => ExprKind::Subscript {
                        array: Box::new(array),
                        index: Box::new(index),
                    },
                    _ => unreachable!("subscript has two operands"),
                }
            }
            ExprKind::Qualification {
                target: Some(object),
                field,
            } => {
                let mut object = self.expr(*object, out, false);
                if right_has_effects {
                    object = self.spill(object, out);
                }
                ExprKind::Qualification {
                    target: Some(Box::new(object)),
                    field,
                }
            }
            kind => kind,
        };
        Expr { kind, location }
    }

    /// Move a non-trivial value into a fresh temporary
    fn spill(&mut self, expr: Expr, out: &mut Vec<Statement>) -> Expr {
        if expr.is_trivial() {
            return expr;
        }
        let location = expr.location.clone();
        let temp = self.temp();
        out.push(self.assign_at(temp, expr));
        Expr::var(temp).at(location)
    }

    /// Decompose sibling operands left to right
    fn sequence(&mut self, operands: Vec<Expr>, out: &mut Vec<Statement>) -> Vec<Expr> {
        let mut done: Vec<Expr> = Vec::with_capacity(operands.len());
        for operand in operands {
            let mut prefix = Vec::new();
            let operand = self.expr(operand, &mut prefix, false);
            if !prefix.is_empty() {
                // Earlier operands must observe the state before the hoisted effect
                done = done
                    .into_iter()
                    .map(|e| if reads_only_locals(&e) { e } else { self.spill(e, out) })
                    .collect();
                out.extend(prefix);
            }
            done.push(operand);
        }
        done
    }

    /// Decompose one expression. With `top` set, the root itself may stay an
    /// effect carrier; everything below it becomes effect free.
    fn expr(&mut self, expr: Expr, out: &mut Vec<Statement>, top: bool) -> Expr {
        if !expr.has_effects() {
            return expr;
        }
        let location = expr.location.clone();
        let kind = match expr.kind {
            ExprKind::Invocation(mut invocation) => {
                let mut operands: Vec<Expr> = Vec::new();
                let has_instance = invocation.instance.is_some();
                if let Some(instance) = invocation.instance.take() {
                    operands.push(*instance);
                }
                operands.append(&mut invocation.arguments);
                let mut operands = self.sequence(operands, out);
                if has_instance && !operands.is_empty() {
                    invocation.instance = Some(Box::new(operands.remove(0)));
                }
                invocation.arguments = operands;
                ExprKind::Invocation(invocation)
            }
            kind @ ExprKind::New { .. } => kind,
            ExprKind::Conditional {
                condition,
                consequent,
                alternative,
            } if consequent.has_effects() || alternative.has_effects() => {
                let condition = self.expr(*condition, out, false);
                let temp = self.temp();
                let mut then_branch = Vec::new();
                let value = self.expr(*consequent, &mut then_branch, true);
                then_branch.push(self.assign_at(temp, value));
                let mut else_branch = Vec::new();
                let value = self.expr(*alternative, &mut else_branch, true);
                else_branch.push(self.assign_at(temp, value));
                out.push(Statement::Conditional {
                    condition,
                    consequent: then_branch,
                    alternative: else_branch,
                });
                return Expr::var(temp).at(location);
            }
            ExprKind::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
            } if right.has_effects() => {
                // a && b  =>  t = a; if (t) { t = b; }
                let temp = self.temp();
                let left = self.expr(*left, out, false);
                out.push(self.assign_at(temp, left));
                let mut rest = Vec::new();
                let right = self.expr(*right, &mut rest, false);
                rest.push(self.assign_at(temp, right));
                let guard = if op == BinaryOp::And {
                    Expr::var(temp)
                } else {
                    Expr::var(temp).negate()
                };
                out.push(Statement::Conditional {
                    condition: guard,
                    consequent: rest,
                    alternative: vec![],
                });
                return Expr::var(temp).at(location);
            }
            ExprKind::Conditional {
                condition,
                consequent,
                alternative,
            } => ExprKind::Conditional {
                condition: Box::new(self.expr(*condition, out, false)),
                consequent,
                alternative,
            },
            ExprKind::Binary { op, left, right } => {
                let (left, right) = self.pair(*left, *right, out);
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            ExprKind::Subscript { array, index } => {
                let (array, index) = self.pair(*array, *index, out);
                ExprKind::Subscript {
                    array: Box::new(array),
                    index: Box::new(index),
                }
            }
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op,
                operand: Box::new(self.expr(*operand, out, false)),
            },
            ExprKind::Qualification { target, field } => ExprKind::Qualification {
                target: target.map(|t| Box::new(self.expr(*t, out, false))),
                field,
            },
            ExprKind::NewArray { element_type, size } => ExprKind::NewArray {
                element_type,
                size: Box::new(self.expr(*size, out, false)),
            },
            ExprKind::InstanceOf { value, class } => ExprKind::InstanceOf {
                value: Box::new(self.expr(*value, out, false)),
                class,
            },
            ExprKind::Helper { helper, arguments } => ExprKind::Helper {
                helper,
                arguments: self.sequence(arguments, out),
            },
            kind @ (ExprKind::Constant(_) | ExprKind::Variable(_)) => kind,
        };
        let expr = Expr { kind, location };
        let carrier = matches!(expr.kind, ExprKind::Invocation(_) | ExprKind::New { .. });
        if carrier && !top {
            let location = expr.location.clone();
            let temp = self.temp();
            out.push(self.assign_at(temp, expr));
            return Expr::var(temp).at(location);
        }
        expr
    }

    fn assign_at(&self, var: Var, value: Expr) -> Statement {
        let suspends = match (&value.kind, self.suspend_set) {
            (ExprKind::Invocation(invocation), Some(set)) => set.expression_suspends(invocation),
            _ => false,
        };
        let location = value.location.clone();
        Statement::Assignment {
            left: Some(Expr::var(var)),
            right: value,
            suspends,
            location,
        }
    }

    fn pair(&mut self, first: Expr, second: Expr, out: &mut Vec<Statement>) -> (Expr, Expr) {
        let mut operands = self.sequence(vec![first, second], out).into_iter();
        match (operands.next(), operands.next()) {
            (Some(a), Some(b)) => (a, b),
            _ => unreachable!("sequence preserves operand count"),
        }
    }
}

/// Locals cannot be written by a callee, so reads of them need no spilling
fn reads_only_locals(expr: &Expr) -> bool {
    let mut local = true;
    expr.walk(&mut |e| {
        if matches!(
            e.kind,
            ExprKind::Subscript { .. }
                | ExprKind::Qualification { .. }
                | ExprKind::Unary {
                    op: crate::ast::UnaryOp::Length,
                    ..
                }
        ) {
            local = false;
        }
    });
    local
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ConstructKind, Invocation};
    use crate::ir::{FieldRef, InvocationKind, MethodRef};
    use pretty_assertions::assert_eq;

    fn call(name: &str, arguments: Vec<Expr>) -> Expr {
        Expr::invoke(Invocation {
            method: MethodRef::new("A", name, "()I"),
            kind: InvocationKind::Static,
            instance: None,
            arguments,
            may_suspend: true,
        })
    }

    fn field() -> Expr {
        ExprKind::Qualification {
            target: None,
            field: FieldRef::new("A", "count"),
        }
        .into()
    }

    fn assigned(stmt: &Statement) -> (Option<&Expr>, &Expr) {
        match stmt {
            Statement::Assignment { left, right, .. } => (left.as_ref(), right),
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_top_level_call_untouched() {
        let mut body = MethodBody::new(3);
        body.statements
            .push(Statement::assign(Expr::var(Var(1)), call("f", vec![Expr::var(Var(2))])));
        let original = body.statements.clone();
        assert_eq!(decompose(&mut body), 0);
        assert_eq!(body.statements, original);
    }

    #[test]
    fn test_nested_call_hoisted() {
        // v1 = f(g()) + 1
        let mut body = MethodBody::new(2);
        body.statements.push(Statement::assign(
            Expr::var(Var(1)),
            Expr::binary(BinaryOp::Add, call("f", vec![call("g", vec![])]), Expr::int(1)),
        ));
        assert_eq!(decompose(&mut body), 2);
        assert_eq!(body.statements.len(), 3);

        let (left, right) = assigned(&body.statements[0]);
        assert_eq!(left, Some(&Expr::var(Var(2))));
        assert_eq!(right, &call("g", vec![]));
        let (left, right) = assigned(&body.statements[1]);
        assert_eq!(left, Some(&Expr::var(Var(3))));
        assert_eq!(right, &call("f", vec![Expr::var(Var(2))]));
        let (_, right) = assigned(&body.statements[2]);
        assert_eq!(right, &Expr::binary(BinaryOp::Add, Expr::var(Var(3)), Expr::int(1)));
        assert_eq!(body.variable_count, 4);
    }

    #[test]
    fn test_hoisted_suspending_call_keeps_check() {
        // v1 = f(g()) where only g suspends
        let mut set = SuspendSet::new();
        set.insert(MethodRef::new("A", "g", "()I"));
        let mut body = MethodBody::new(2);
        body.statements.push(Statement::assign(
            Expr::var(Var(1)),
            call("f", vec![call("g", vec![])]),
        ));
        decompose_with(&mut body, Some(&set));

        let flags: Vec<bool> = body
            .statements
            .iter()
            .map(|s| matches!(s, Statement::Assignment { suspends: true, .. }))
            .collect();
        assert_eq!(flags, vec![true, false]);
        let (left, right) = assigned(&body.statements[0]);
        assert_eq!(left, Some(&Expr::var(Var(2))));
        assert_eq!(right, &call("g", vec![]));
    }

    #[test]
    fn test_earlier_field_read_spilled_before_call() {
        // v1 = A.count + f()
        let mut body = MethodBody::new(2);
        body.statements.push(Statement::assign(
            Expr::var(Var(1)),
            Expr::binary(BinaryOp::Add, field(), call("f", vec![])),
        ));
        decompose(&mut body);

        let (left, right) = assigned(&body.statements[0]);
        assert_eq!(left, Some(&Expr::var(Var(3))));
        assert_eq!(right, &field());
        let (left, right) = assigned(&body.statements[1]);
        assert_eq!(left, Some(&Expr::var(Var(2))));
        assert_eq!(right, &call("f", vec![]));
        let (_, right) = assigned(&body.statements[2]);
        assert_eq!(right, &Expr::binary(BinaryOp::Add, Expr::var(Var(3)), Expr::var(Var(2))));
    }

    #[test]
    fn test_effectful_conditional_arms_become_statement() {
        // return v1 ? f() : 0
        let mut body = MethodBody::new(2);
        body.statements.push(Statement::ret(Some(
            ExprKind::Conditional {
                condition: Box::new(Expr::var(Var(1))),
                consequent: Box::new(call("f", vec![])),
                alternative: Box::new(Expr::int(0)),
            }
            .into(),
        )));
        decompose(&mut body);

        assert_eq!(body.statements.len(), 2);
        match &body.statements[0] {
            Statement::Conditional {
                condition,
                consequent,
                alternative,
            } => {
                assert_eq!(condition, &Expr::var(Var(1)));
                assert_eq!(consequent, &vec![Statement::assign(Expr::var(Var(2)), call("f", vec![]))]);
                assert_eq!(alternative, &vec![Statement::assign(Expr::var(Var(2)), Expr::int(0))]);
            }
            other => panic!("expected conditional, got {other:?}"),
        }
        assert_eq!(body.statements[1], Statement::ret(Some(Expr::var(Var(2)))));
    }

    #[test]
    fn test_short_circuit_keeps_right_operand_lazy() {
        // v1 = v1 && f()
        let mut body = MethodBody::new(2);
        body.statements.push(Statement::assign(
            Expr::var(Var(1)),
            Expr::binary(BinaryOp::And, Expr::var(Var(1)), call("f", vec![])),
        ));
        decompose(&mut body);

        assert_eq!(body.statements[0], Statement::assign(Expr::var(Var(2)), Expr::var(Var(1))));
        match &body.statements[1] {
            Statement::Conditional {
                condition,
                consequent,
                ..
            } => {
                assert_eq!(condition, &Expr::var(Var(2)));
                assert_eq!(consequent.len(), 2);
            }
            other => panic!("expected conditional, got {other:?}"),
        }
    }

    #[test]
    fn test_effectful_loop_condition_moves_into_body() {
        let mut body = MethodBody::new(2);
        let id = body.constructs.alloc(ConstructKind::Loop);
        body.statements.push(Statement::Loop {
            id,
            condition: Some(Expr::binary(BinaryOp::Less, call("f", vec![]), Expr::int(10))),
            body: vec![Statement::assign(Expr::var(Var(1)), Expr::int(0))],
        });
        decompose(&mut body);

        match &body.statements[0] {
            Statement::Loop {
                condition: None,
                body: inner,
                ..
            } => {
                assert_eq!(inner.len(), 3);
                assert_eq!(inner[0], Statement::assign(Expr::var(Var(2)), call("f", vec![])));
                assert!(matches!(
                    &inner[1],
                    Statement::Conditional { consequent, .. }
                        if consequent == &vec![Statement::Break { target: id }]
                ));
            }
            other => panic!("expected rewritten loop, got {other:?}"),
        }
    }
}
