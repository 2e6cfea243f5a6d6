//! Method shells: ordinary bodies, resumable dispatch loops, class
//! initializer wrappers and prototype delegates.

use super::labels::{BreakableStack, LabelTable};
use super::precedence::Precedence;
use super::Renderer;
use crate::ast::{walk_statements, Expr, MethodBody, Statement};
use crate::ir::{ClassDef, Method, MethodRef, Var};
use crate::pipeline::CompiledBody;
use crate::statemachine::{method_monitor, AsyncMethod};

impl Renderer<'_> {
    pub(super) fn render_method(&mut self, method: &Method) {
        let compiled = self.compiled;
        let Some(body) = compiled.bodies.get(&method.reference) else {
            return;
        };
        let _span = tracing::trace_span!("render_method", method = %method.reference).entered();

        match body {
            CompiledBody::Regular(body) => self.regular(method, body),
            CompiledBody::Async(body) => self.resumable(method, body),
        }
        if method.is_virtual() {
            self.prototype_delegate(method);
        }
    }

    fn reset_method_state(&mut self, method: &Method, variable_count: u32) {
        self.vars = self.names.variables(method, variable_count);
        self.labels = LabelTable::new(self.config.minify);
        self.breakable = BreakableStack::default();
        self.current_part = 0;
        self.end = false;
    }

    fn parameters(&self, method: &Method) -> Vec<String> {
        let receiver = (!method.is_static()).then(|| self.vars.get(Var(0)));
        receiver
            .into_iter()
            .chain((1..method.first_local()).map(|slot| self.vars.get(Var(slot))))
            .collect()
    }

    fn function_header(&mut self, name: &str, parameters: &[String]) {
        self.writer.append("function ").append(name).append("(");
        for (i, parameter) in parameters.iter().enumerate() {
            if i > 0 {
                self.writer.append(",").ws();
            }
            self.writer.append(parameter);
        }
        self.writer.append(")").ws().append("{").soft_newline().indent();
    }

    fn declare(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        self.writer.append("var ");
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.writer.append(",").ws();
            }
            self.writer.append(name);
        }
        self.writer.append(";").soft_newline();
    }

    /// Local slots plus the wrapped-exception slot when any catch is emitted
    fn locals(&self, method: &Method, variable_count: u32, protected: bool) -> Vec<String> {
        let mut names: Vec<String> = (method.first_local()..variable_count)
            .map(|slot| self.vars.get(Var(slot)))
            .collect();
        if protected {
            names.push(self.dispatch.wrapped.to_string());
        }
        names
    }

    fn regular(&mut self, method: &Method, body: &MethodBody) {
        self.reset_method_state(method, body.variable_count);
        self.in_async = false;
        self.labels.scan(&body.statements);

        let name = self.names.function(&method.reference);
        let parameters = self.parameters(method);
        self.function_header(&name, &parameters);
        let locals = self.locals(method, body.variable_count, has_try_catch(&body.statements));
        self.declare(&locals);

        let statements = match body.statements.split_last() {
            Some((Statement::Return { value: None, .. }, rest)) => rest,
            _ => body.statements.as_slice(),
        };

        if method.modifiers.synchronized {
            let monitor = method_monitor(method);
            let enter = self.config.runtime.monitor_enter_sync.clone();
            let exit = self.config.runtime.monitor_exit_sync.clone();
            self.writer.append(&enter).append("(");
            self.expr(&monitor, Precedence::Assignment);
            self.writer.append(");").soft_newline();
            self.writer.append("try").ws().append("{").soft_newline().indent();
            self.statements(statements);
            self.writer
                .outdent()
                .append("}")
                .ws()
                .append("finally")
                .ws()
                .append("{")
                .soft_newline()
                .indent()
                .append(&exit)
                .append("(");
            self.expr(&monitor, Precedence::Assignment);
            self.writer.append(");").soft_newline().outdent().append("}").soft_newline();
        } else {
            self.statements(statements);
        }

        self.writer.outdent().append("}").newline();
    }

    fn resumable(&mut self, method: &Method, body: &AsyncMethod) {
        self.reset_method_state(method, body.variable_count);
        self.in_async = true;
        for part in &body.parts {
            self.labels.scan(&part.statements);
        }

        let name = self.names.function(&method.reference);
        let parameters = self.parameters(method);
        self.function_header(&name, &parameters);

        let mut locals = self.locals(method, body.variable_count, body.has_protected_regions());
        locals.push(self.dispatch.pointer.to_string());
        locals.push(self.dispatch.temp.to_string());
        self.declare(&locals);

        let live: Vec<String> = body.live.iter().map(|v| self.vars.get(*v)).collect();
        self.resume_prologue(&live);

        if let Some(monitor) = &body.monitor {
            self.writer.append("try").ws().append("{").soft_newline().indent();
            self.dispatch_loop(body, Some(monitor));
            let suspending = self.config.runtime.suspending.clone();
            let exit = self.config.runtime.monitor_exit.clone();
            self.writer
                .outdent()
                .append("}")
                .ws()
                .append("finally")
                .ws()
                .append("{")
                .soft_newline()
                .indent()
                .append("if")
                .ws()
                .append("(!")
                .append(&suspending)
                .append("())")
                .ws()
                .append("{")
                .soft_newline()
                .indent()
                .append(&exit)
                .append("(");
            self.expr(monitor, Precedence::Assignment);
            self.writer
                .append(");")
                .soft_newline()
                .outdent()
                .append("}")
                .soft_newline()
                .outdent()
                .append("}")
                .soft_newline();
        } else {
            self.dispatch_loop(body, None);
        }

        self.save_epilogue(&live);
        self.writer.outdent().append("}").newline();
        self.in_async = false;
    }

    /// Restore the pointer and the live slots in reverse push order
    fn resume_prologue(&mut self, live: &[String]) {
        let pointer = self.dispatch.pointer;
        let thread = self.dispatch.thread;
        let resuming = self.config.runtime.resuming.clone();
        let native_thread = self.config.runtime.native_thread.clone();

        self.writer.append(pointer).ws().append("=").ws().append("0;").soft_newline();
        self.writer
            .append("if")
            .ws()
            .append("(")
            .append(&resuming)
            .append("())")
            .ws()
            .append("{")
            .soft_newline()
            .indent();
        self.writer
            .append("var ")
            .append(thread)
            .ws()
            .append("=")
            .ws()
            .append(&native_thread)
            .append("();")
            .soft_newline();
        self.writer
            .append(pointer)
            .ws()
            .append("=")
            .ws()
            .append(thread)
            .append(".pop();")
            .soft_newline();
        for name in live.iter().rev() {
            self.writer
                .append(name)
                .ws()
                .append("=")
                .ws()
                .append(thread)
                .append(".pop();")
                .soft_newline();
        }
        self.writer.outdent().append("}").soft_newline();
    }

    fn save_epilogue(&mut self, live: &[String]) {
        let native_thread = self.config.runtime.native_thread.clone();
        self.writer.append(&native_thread).append("().push(");
        for name in live {
            self.writer.append(name).append(",").ws();
        }
        let pointer = self.dispatch.pointer;
        self.writer.append(pointer).append(");").soft_newline();
    }

    fn dispatch_loop(&mut self, body: &AsyncMethod, monitor: Option<&Expr>) {
        self.dispatch_open();
        for part in &body.parts {
            self.writer.append("case ").append(&part.index.to_string()).append(":").soft_newline().indent();
            if part.index == 0 {
                if let Some(monitor) = monitor {
                    self.monitor_enter(monitor, true);
                }
            }
            self.current_part = part.index;
            self.end = true;
            self.statements(&part.statements);
            self.end = false;
            self.writer.outdent();
        }
        self.dispatch_close();
    }

    /// `$main: while (true) { switch ($ptr) {`
    fn dispatch_open(&mut self) {
        let main = self.dispatch.main;
        let pointer = self.dispatch.pointer;
        self.writer
            .append(main)
            .append(":")
            .ws()
            .append("while")
            .ws()
            .append("(true)")
            .ws()
            .append("{")
            .ws()
            .append("switch")
            .ws()
            .append("(")
            .append(pointer)
            .append(")")
            .ws()
            .append("{")
            .soft_newline();
    }

    fn dispatch_close(&mut self) {
        let invalid = self.config.runtime.invalid_pointer.clone();
        self.writer
            .append("default:")
            .soft_newline()
            .indent()
            .append(&invalid)
            .append("();")
            .soft_newline()
            .outdent()
            .append("}}")
            .soft_newline();
    }

    fn prototype_delegate(&mut self, method: &Method) {
        let class = self.names.class(&method.reference.class);
        let member = self.names.member(&method.reference);
        let function = self.names.function(&method.reference);
        let parameters: Vec<String> = (1..method.first_local()).map(|slot| format!("p{}", slot)).collect();

        self.writer
            .append(&class)
            .append(".prototype.")
            .append(&member)
            .ws()
            .append("=")
            .ws()
            .append("function(")
            .append(&parameters.join(","))
            .append(")")
            .ws()
            .append("{")
            .ws()
            .append("return ")
            .append(&function)
            .append("(this");
        for parameter in &parameters {
            self.writer.append(",").ws().append(parameter);
        }
        self.writer.append(");").ws().append("};").newline();
    }

    /// The `Cls_$clinit` wrapper: erases itself, then runs the initializer
    /// body. A resumable initializer keeps a called flag and its own
    /// two-state dispatch loop instead.
    pub(super) fn render_class_init(&mut self, class: &ClassDef) {
        let wrapper = self.names.class_init(&class.name);
        let clinit = MethodRef::class_initializer(class.name.clone());
        let compiled = self.compiled;
        let body = class
            .methods
            .iter()
            .find(|m| m.reference.is_class_initializer() && m.has_body())
            .and_then(|m| compiled.bodies.get(&m.reference));

        let Some(body) = body else {
            self.writer.append("function ").append(&wrapper).append("()").ws().append("{}").newline();
            return;
        };
        let function = self.names.function(&clinit);

        if !matches!(body, CompiledBody::Async(_)) {
            self.function_header(&wrapper, &[]);
            self.erase_class_init(&wrapper);
            self.writer.append(&function).append("();").soft_newline();
            self.writer.outdent().append("}").newline();
            return;
        }

        let called = format!("{}_$clinitCalled", self.names.class(&class.name));
        let pointer = self.dispatch.pointer;
        let resuming = self.config.runtime.resuming.clone();
        let native_thread = self.config.runtime.native_thread.clone();

        self.writer
            .append("var ")
            .append(&called)
            .ws()
            .append("=")
            .ws()
            .append("false;")
            .soft_newline();
        self.function_header(&wrapper, &[]);
        self.writer
            .append("var ")
            .append(pointer)
            .ws()
            .append("=")
            .ws()
            .append("0;")
            .soft_newline();
        self.writer
            .append("if")
            .ws()
            .append("(")
            .append(&resuming)
            .append("())")
            .ws()
            .append("{")
            .soft_newline()
            .indent()
            .append(pointer)
            .ws()
            .append("=")
            .ws()
            .append(&native_thread)
            .append("().pop();")
            .soft_newline()
            .outdent()
            .append("}")
            .ws()
            .append("else if")
            .ws()
            .append("(")
            .append(&called)
            .append(")")
            .ws()
            .append("{")
            .soft_newline()
            .indent()
            .append("return;")
            .soft_newline()
            .outdent()
            .append("}")
            .soft_newline();

        self.dispatch_open();
        self.writer.append("case 0:").soft_newline().indent();
        self.writer
            .append(&called)
            .ws()
            .append("=")
            .ws()
            .append("true;")
            .soft_newline();
        self.writer
            .append(pointer)
            .ws()
            .append("=")
            .ws()
            .append("1;")
            .soft_newline();
        self.writer.outdent().append("case 1:").soft_newline().indent();
        self.writer.append(&function).append("();").soft_newline();
        self.suspend_check();
        self.erase_class_init(&wrapper);
        self.writer.append("return;").soft_newline().outdent();
        self.dispatch_close();
        self.writer
            .append(&native_thread)
            .append("().push(")
            .append(pointer)
            .append(");")
            .soft_newline();
        self.writer.outdent().append("}").newline();
    }

    fn erase_class_init(&mut self, wrapper: &str) {
        self.writer
            .append(wrapper)
            .ws()
            .append("=")
            .ws()
            .append("function()")
            .ws()
            .append("{};")
            .soft_newline();
    }
}

fn has_try_catch(statements: &[Statement]) -> bool {
    let mut found = false;
    walk_statements(statements, &mut |s| {
        found |= matches!(s, Statement::TryCatch { .. });
    });
    found
}

