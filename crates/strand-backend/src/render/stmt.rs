//! Statement printing

use super::precedence::Precedence;
use super::Renderer;
use crate::ast::{ConstructId, Expr, Statement, SwitchClause};
use crate::ir::{TextLocation, Var};

impl Renderer<'_> {
    /// Render a statement list; only its last statement inherits `end`
    pub(super) fn statements(&mut self, statements: &[Statement]) {
        let outer = self.end;
        let last = statements.len().saturating_sub(1);
        for (i, statement) in statements.iter().enumerate() {
            self.end = outer && i == last;
            self.statement(statement);
        }
        self.end = outer;
    }

    /// Render a body that never ends a part, such as a loop body
    fn inner_statements(&mut self, statements: &[Statement]) {
        let outer = self.end;
        self.end = false;
        self.statements(statements);
        self.end = outer;
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Sequential(body) => self.statements(body),
            Statement::Conditional {
                condition,
                consequent,
                alternative,
            } => self.conditional(condition, consequent, alternative),
            Statement::Switch {
                id,
                value,
                clauses,
                default,
            } => self.switch(*id, value, clauses, default),
            Statement::Loop {
                id,
                condition,
                body,
            } => {
                self.label_prefix(*id);
                self.writer.append("while").ws().append("(");
                match condition {
                    Some(condition) => self.expr(condition, Precedence::min()),
                    None => {
                        self.writer.append("true");
                    }
                }
                self.writer.append(")").ws().append("{").soft_newline().indent();
                self.breakable.push(*id, true);
                self.inner_statements(body);
                self.breakable.pop();
                self.writer.outdent().append("}").soft_newline();
            }
            Statement::Block { id, body } => {
                if self.labels.needs_label(*id) {
                    self.label_prefix(*id);
                    self.writer.append("{").soft_newline().indent();
                    self.statements(body);
                    self.writer.outdent().append("}").soft_newline();
                } else {
                    self.statements(body);
                }
            }
            Statement::Break { target } => {
                if self.breakable.bare_break_reaches(*target) {
                    self.writer.append("break;").soft_newline();
                } else {
                    let label = self.labels.name(*target);
                    self.writer.append("break ").append(&label).append(";").soft_newline();
                }
            }
            Statement::Continue { target } => {
                if self.breakable.bare_continue_reaches(*target) {
                    self.writer.append("continue;").soft_newline();
                } else {
                    let label = self.labels.name(*target);
                    self.writer.append("continue ").append(&label).append(";").soft_newline();
                }
            }
            Statement::Assignment {
                left,
                right,
                suspends,
                location,
            } => self.assignment(left.as_ref(), right, *suspends, location),
            Statement::Return { value, location } => {
                self.located(location, |r| {
                    match value {
                        Some(value) => {
                            r.writer.append("return ");
                            r.expr(value, Precedence::min());
                        }
                        None => {
                            r.writer.append("return");
                        }
                    }
                    r.writer.append(";").soft_newline();
                });
            }
            Statement::Throw {
                exception,
                location,
            } => {
                let function = self.config.runtime.throw.clone();
                self.located(location, |r| {
                    r.writer.append(&function).append("(");
                    r.expr(exception, Precedence::Assignment);
                    r.writer.append(");").soft_newline();
                });
            }
            Statement::InitClass {
                class,
                suspends,
                location,
            } => {
                let function = self.names.class_init(class);
                self.located(location, |r| {
                    r.writer.append(&function).append("();").soft_newline();
                    if *suspends && r.in_async {
                        r.suspend_check();
                    }
                });
            }
            Statement::MonitorEnter { object, location } => {
                let in_async = self.in_async;
                self.located(location, |r| {
                    r.monitor_enter(object, in_async);
                });
            }
            Statement::MonitorExit { object, location } => {
                let function = if self.in_async {
                    self.config.runtime.monitor_exit.clone()
                } else {
                    self.config.runtime.monitor_exit_sync.clone()
                };
                self.located(location, |r| {
                    r.writer.append(&function).append("(");
                    r.expr(object, Precedence::Assignment);
                    r.writer.append(");").soft_newline();
                });
            }
            Statement::GotoPart(part) => self.goto_part(*part),
            Statement::TryCatch { .. } => self.try_catch(statement),
        }
    }

    fn located(&mut self, location: &Option<TextLocation>, body: impl FnOnce(&mut Self)) {
        if location.is_some() {
            self.push_location(location.clone());
        }
        body(self);
        if location.is_some() {
            self.pop_location();
        }
    }

    fn label_prefix(&mut self, id: ConstructId) {
        if self.labels.needs_label(id) {
            let label = self.labels.name(id);
            self.writer.append(&label).append(":").ws();
        }
    }

    fn conditional(&mut self, condition: &Expr, consequent: &[Statement], alternative: &[Statement]) {
        if consequent.is_empty() && !alternative.is_empty() {
            let negated = condition.clone().negate();
            self.conditional(&negated, alternative, consequent);
            return;
        }

        self.writer.append("if").ws().append("(");
        self.expr(condition, Precedence::min());
        self.writer.append(")").ws().append("{").soft_newline().indent();
        self.statements(consequent);
        self.writer.outdent().append("}");

        let mut alternative = alternative;
        loop {
            match alternative {
                [] => break,
                [Statement::Conditional {
                    condition,
                    consequent,
                    alternative: rest,
                }] if !consequent.is_empty() => {
                    self.writer.ws().append("else if").ws().append("(");
                    self.expr(condition, Precedence::min());
                    self.writer.append(")").ws().append("{").soft_newline().indent();
                    self.statements(consequent);
                    self.writer.outdent().append("}");
                    alternative = rest.as_slice();
                }
                _ => {
                    self.writer.ws().append("else").ws().append("{").soft_newline().indent();
                    self.statements(alternative);
                    self.writer.outdent().append("}");
                    break;
                }
            }
        }
        self.writer.soft_newline();
    }

    fn switch(&mut self, id: ConstructId, value: &Expr, clauses: &[SwitchClause], default: &[Statement]) {
        self.label_prefix(id);
        self.writer.append("switch").ws().append("(");
        self.expr(value, Precedence::min());
        self.writer.append(")").ws().append("{").soft_newline().indent();
        self.breakable.push(id, false);
        for clause in clauses {
            for value in &clause.values {
                self.writer.append("case ").append(&value.to_string()).append(":").soft_newline();
            }
            self.writer.indent();
            self.inner_statements(&clause.body);
            self.writer.outdent();
        }
        if !default.is_empty() {
            self.writer.append("default:").soft_newline().indent();
            self.inner_statements(default);
            self.writer.outdent();
        }
        self.breakable.pop();
        self.writer.outdent().append("}").soft_newline();
    }

    fn assignment(&mut self, left: Option<&Expr>, right: &Expr, suspends: bool, location: &Option<TextLocation>) {
        self.located(location, |r| {
            if suspends && r.in_async {
                let temp = r.dispatch.temp;
                if left.is_some() {
                    r.writer.append(temp).ws().append("=").ws();
                }
                r.expr(right, Precedence::Assignment);
                r.writer.append(";").soft_newline();
                r.suspend_check();
                if let Some(left) = left {
                    r.expr(left, Precedence::min());
                    r.writer.ws().append("=").ws().append(temp).append(";").soft_newline();
                }
                return;
            }

            if let Some(left) = left {
                r.expr(left, Precedence::min());
                r.writer.ws().append("=").ws();
            }
            r.expr(right, Precedence::Assignment);
            r.writer.append(";").soft_newline();
        });
    }

    /// `if ($rt_suspending()) { break $main; }`
    pub(super) fn suspend_check(&mut self) {
        let suspending = self.config.runtime.suspending.clone();
        let main = self.dispatch.main;
        self.writer
            .append("if")
            .ws()
            .append("(")
            .append(&suspending)
            .append("())")
            .ws()
            .append("{")
            .soft_newline()
            .indent()
            .append("break ")
            .append(main)
            .append(";")
            .soft_newline()
            .outdent()
            .append("}")
            .soft_newline();
    }

    pub(super) fn monitor_enter(&mut self, object: &Expr, in_async: bool) {
        let function = if in_async {
            self.config.runtime.monitor_enter.clone()
        } else {
            self.config.runtime.monitor_enter_sync.clone()
        };
        self.writer.append(&function).append("(");
        self.expr(object, Precedence::Assignment);
        self.writer.append(");").soft_newline();
        if in_async {
            self.suspend_check();
        }
    }

    fn goto_part(&mut self, part: usize) {
        let pointer = self.dispatch.pointer;
        if part != self.current_part {
            self.writer
                .append(pointer)
                .ws()
                .append("=")
                .ws()
                .append(&part.to_string())
                .append(";")
                .soft_newline();
        }
        if !(self.end && part == self.current_part + 1) {
            let main = self.dispatch.main;
            self.writer.append("continue ").append(main).append(";").soft_newline();
        }
    }

    /// Render a try statement, merging directly nested handlers into one
    /// catch clause. Inner handlers are tested first.
    fn try_catch(&mut self, statement: &Statement) {
        let mut sequence: Vec<(&Option<String>, &Option<Var>, &[Statement])> = Vec::new();
        let mut current = statement;
        let protected = loop {
            match current {
                Statement::TryCatch {
                    protected,
                    exception_type,
                    exception_var,
                    handler,
                } => {
                    sequence.push((exception_type, exception_var, handler.as_slice()));
                    match protected.as_slice() {
                        [nested @ Statement::TryCatch { .. }] => current = nested,
                        _ => break protected,
                    }
                }
                _ => return,
            }
        };

        let caught = self.dispatch.caught;
        let wrapped = self.dispatch.wrapped;
        let wrap = self.config.runtime.wrap_exception.clone();

        self.writer.append("try").ws().append("{").soft_newline().indent();
        self.statements(protected);
        self.writer
            .outdent()
            .append("}")
            .ws()
            .append("catch")
            .ws()
            .append("(")
            .append(caught)
            .append(")")
            .ws()
            .append("{")
            .soft_newline()
            .indent();
        self.writer
            .append(wrapped)
            .ws()
            .append("=")
            .ws()
            .append(&wrap)
            .append("(")
            .append(caught)
            .append(");")
            .soft_newline();

        let mut first = true;
        let mut catch_all = false;
        for (exception_type, exception_var, handler) in sequence.into_iter().rev() {
            match exception_type {
                Some(class) => {
                    let class = self.names.class(class);
                    if !first {
                        self.writer.ws().append("else ");
                    }
                    self.writer
                        .append("if")
                        .ws()
                        .append("(")
                        .append(wrapped)
                        .append(" instanceof ")
                        .append(&class)
                        .append(")")
                        .ws()
                        .append("{")
                        .soft_newline()
                        .indent();
                    self.handler(*exception_var, handler);
                    self.writer.outdent().append("}");
                }
                None => {
                    if first {
                        self.handler(*exception_var, handler);
                    } else {
                        self.writer.ws().append("else").ws().append("{").soft_newline().indent();
                        self.handler(*exception_var, handler);
                        self.writer.outdent().append("}").soft_newline();
                    }
                    catch_all = true;
                    break;
                }
            }
            first = false;
        }
        if !catch_all {
            self.writer
                .ws()
                .append("else")
                .ws()
                .append("{")
                .soft_newline()
                .indent()
                .append("throw ")
                .append(wrapped)
                .append(";")
                .soft_newline()
                .outdent()
                .append("}")
                .soft_newline();
        }
        self.writer.outdent().append("}").soft_newline();
    }

    fn handler(&mut self, exception_var: Option<Var>, handler: &[Statement]) {
        if let Some(var) = exception_var {
            let name = self.vars.get(var);
            let wrapped = self.dispatch.wrapped;
            self.writer
                .append(&name)
                .ws()
                .append("=")
                .ws()
                .append(wrapped)
                .append(";")
                .soft_newline();
        }
        self.statements(handler);
    }
}
