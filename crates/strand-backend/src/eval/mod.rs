//! Reference evaluator
//!
//! Interprets compiled method trees against a [`FakeRuntime`], following
//! the same plan the renderer prints: resumable methods restore their
//! pointer and live slots when resuming, dispatch over parts, and save
//! live slots then the pointer when a suspending statement reports
//! suspension. Used to check lowered methods without a target engine.

mod runtime;
mod value;

pub use runtime::{FakeRuntime, MonitorEvent, ScriptedIntrinsic, StackEvent, ThreadContext};
pub use value::{to_int32, to_uint32, Array, ArrayRef, Object, ObjectRef, Value};

use crate::ast::{BinaryOp, ConstructId, Expr, ExprKind, Helper, MethodBody, Statement, UnaryOp};
use crate::ir::{Constant, FieldRef, InvocationKind, Method, MethodRef, ValueType, Var};
use crate::pipeline::{CompiledBody, CompiledUnit};
use crate::statemachine::AsyncMethod;
use rustc_hash::FxHashMap;
use thiserror::Error;

const MAX_DEPTH: usize = 256;
const MAX_RESUMES: u32 = 1024;
const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Invalid resumption pointer {pointer} in {method}")]
    InvalidResumptionPointer { method: String, pointer: i64 },

    #[error("Unknown method {0}")]
    UnknownMethod(String),

    #[error("{method} suspended at a statement that cannot suspend")]
    UnexpectedSuspension { method: String },

    #[error("Uncaught exception {0}")]
    UncaughtException(String),

    #[error("Expected {expected} in {method}, found {found}")]
    TypeMismatch {
        method: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("Thread context popped while empty")]
    EmptyThreadStack,

    #[error("Malformed tree in {method}: {message}")]
    Malformed { method: String, message: String },

    #[error("Step limit of {0} exceeded")]
    StepLimitExceeded(u64),

    #[error("Resumed more than {0} times without completing")]
    ResumeLimitExceeded(u32),

    #[error("Call depth exceeded {0}")]
    StackOverflow(usize),
}

pub type EvalResult<T> = Result<T, EvalError>;

/// How one invocation ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Returned(Value),
    Suspended,
}

/// Result of driving an invocation through every suspension
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub value: Value,
    pub suspensions: u32,
}

/// Non-local exits of expression evaluation
enum Abrupt {
    Throw(Value),
    Fail(EvalError),
}

impl From<EvalError> for Abrupt {
    fn from(err: EvalError) -> Self {
        Abrupt::Fail(err)
    }
}

type Exec<T> = Result<T, Abrupt>;

enum Flow {
    Normal,
    Break(ConstructId),
    Continue(ConstructId),
    Return(Value),
    Goto(usize),
    Suspend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassState {
    Running,
    Done,
}

enum Place {
    Var(Var),
    Field(ObjectRef, String),
    Static(FieldRef),
    Element(ArrayRef, usize),
}

struct Frame<'m> {
    method: &'m MethodRef,
    locals: Vec<Value>,
    in_async: bool,
}

impl<'m> Frame<'m> {
    fn new(method: &'m Method, variable_count: u32, args: Vec<Value>, in_async: bool) -> Self {
        let mut locals = vec![Value::Null; variable_count.max(method.first_local()) as usize];
        let first = if method.is_static() { 1 } else { 0 };
        for (slot, arg) in (first..).zip(args) {
            if let Some(local) = locals.get_mut(slot) {
                *local = arg;
            }
        }
        Self {
            method: &method.reference,
            locals,
            in_async,
        }
    }

    fn get(&self, var: Var) -> EvalResult<Value> {
        self.locals.get(var.index()).cloned().ok_or_else(|| self.malformed(format!("{} is out of range", var)))
    }

    fn set(&mut self, var: Var, value: Value) {
        if var.index() >= self.locals.len() {
            self.locals.resize(var.index() + 1, Value::Null);
        }
        self.locals[var.index()] = value;
    }

    fn malformed(&self, message: impl Into<String>) -> EvalError {
        EvalError::Malformed {
            method: self.method.to_string(),
            message: message.into(),
        }
    }

    fn mismatch(&self, expected: &'static str, found: &Value) -> EvalError {
        EvalError::TypeMismatch {
            method: self.method.to_string(),
            expected,
            found: found.kind(),
        }
    }
}

pub struct Evaluator<'a> {
    compiled: &'a CompiledUnit,
    runtime: FakeRuntime,
    statics: FxHashMap<FieldRef, Value>,
    classes: FxHashMap<String, ClassState>,
    depth: usize,
    steps: u64,
    step_limit: u64,
}

impl<'a> Evaluator<'a> {
    pub fn new(compiled: &'a CompiledUnit) -> Self {
        Self::with_runtime(compiled, FakeRuntime::new())
    }

    pub fn with_runtime(compiled: &'a CompiledUnit, runtime: FakeRuntime) -> Self {
        Self {
            compiled,
            runtime,
            statics: FxHashMap::default(),
            classes: FxHashMap::default(),
            depth: 0,
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn runtime(&self) -> &FakeRuntime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut FakeRuntime {
        &mut self.runtime
    }

    pub fn static_field(&self, field: &FieldRef) -> Option<&Value> {
        self.statics.get(field)
    }

    /// Invoke once; the receiver of an instance method is the first argument
    pub fn invoke(&mut self, method: &MethodRef, args: Vec<Value>) -> EvalResult<Outcome> {
        match self.call(method, args) {
            Ok(outcome) => Ok(outcome),
            Err(Abrupt::Throw(exception)) => Err(EvalError::UncaughtException(exception.to_string())),
            Err(Abrupt::Fail(err)) => Err(err),
        }
    }

    /// Invoke, re-invoking after every suspension as the scheduler would
    pub fn run(&mut self, method: &MethodRef, args: Vec<Value>) -> EvalResult<RunSummary> {
        let mut suspensions = 0;
        loop {
            match self.invoke(method, args.clone())? {
                Outcome::Returned(value) => return Ok(RunSummary { value, suspensions }),
                Outcome::Suspended => {
                    suspensions += 1;
                    if suspensions > MAX_RESUMES {
                        return Err(EvalError::ResumeLimitExceeded(MAX_RESUMES));
                    }
                    tracing::trace!(method = %method, suspensions, "resuming");
                    self.runtime.begin_resume();
                }
            }
        }
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(EvalError::StepLimitExceeded(self.step_limit));
        }
        Ok(())
    }

    fn call(&mut self, reference: &MethodRef, args: Vec<Value>) -> Exec<Outcome> {
        let compiled = self.compiled;
        if let Some(method) = compiled.unit.method(reference).filter(|m| m.has_body()) {
            let body = compiled
                .body(reference)
                .ok_or_else(|| EvalError::UnknownMethod(reference.to_string()))?;
            if self.depth >= MAX_DEPTH {
                return Err(EvalError::StackOverflow(MAX_DEPTH).into());
            }
            self.depth += 1;
            let result = match body {
                CompiledBody::Regular(body) => self.run_regular(method, body, args),
                CompiledBody::Async(body) => self.run_async(method, body, args),
            };
            self.depth -= 1;
            return result;
        }

        match self.runtime.call_intrinsic(reference) {
            Some(_) if self.runtime.suspending() => Ok(Outcome::Suspended),
            Some(value) => Ok(Outcome::Returned(value)),
            None => Err(EvalError::UnknownMethod(reference.to_string()).into()),
        }
    }

    fn call_virtual(&mut self, declared: &MethodRef, receiver: Value, mut args: Vec<Value>) -> Exec<Outcome> {
        let target = receiver
            .class_name()
            .and_then(|class| self.resolve_virtual(&class, declared))
            .unwrap_or_else(|| declared.clone());
        args.insert(0, receiver);
        self.call(&target, args)
    }

    /// Nearest implementation of `declared` from `class` upwards
    fn resolve_virtual(&self, class: &str, declared: &MethodRef) -> Option<MethodRef> {
        let unit = &self.compiled.unit;
        let mut current = Some(class.to_string());
        for _ in 0..=unit.classes.len() {
            let def = unit.class(current.as_deref()?)?;
            if let Some(method) = def
                .methods
                .iter()
                .find(|m| m.reference.same_signature(declared) && m.has_body())
            {
                return Some(method.reference.clone());
            }
            current = def.parent.clone();
        }
        None
    }

    fn run_regular(&mut self, method: &'a Method, body: &'a MethodBody, args: Vec<Value>) -> Exec<Outcome> {
        let mut frame = Frame::new(method, body.variable_count, args, false);
        if method.modifiers.synchronized {
            self.runtime.monitor_enter_sync();
        }
        let result = self.exec_all(&mut frame, &body.statements);
        if method.modifiers.synchronized {
            self.runtime.monitor_exit();
        }
        match result? {
            Flow::Return(value) => Ok(Outcome::Returned(value)),
            Flow::Normal => Ok(Outcome::Returned(Value::Null)),
            Flow::Suspend => Err(EvalError::UnexpectedSuspension {
                method: method.reference.to_string(),
            }
            .into()),
            Flow::Goto(part) => Err(frame.malformed(format!("jump to part {} outside a resumable method", part)).into()),
            Flow::Break(id) | Flow::Continue(id) => {
                Err(frame.malformed(format!("jump to construct {} escapes the body", id.0)).into())
            }
        }
    }

    fn run_async(&mut self, method: &'a Method, body: &'a AsyncMethod, args: Vec<Value>) -> Exec<Outcome> {
        let mut frame = Frame::new(method, body.variable_count, args, true);
        let mut pointer: i64 = 0;
        if self.runtime.resuming() {
            let thread = self.runtime.thread_mut();
            let saved = thread.pop()?;
            pointer = match saved {
                Value::Number(n) => n as i64,
                other => return Err(frame.mismatch("number", &other).into()),
            };
            for var in body.live.iter().rev() {
                let value = self.runtime.thread_mut().pop()?;
                frame.set(*var, value);
            }
        }

        let result = self.dispatch(&mut frame, body, &mut pointer);
        if body.is_synchronized() && !self.runtime.suspending() {
            self.runtime.monitor_exit();
        }

        match result? {
            Outcome::Suspended => {
                for var in &body.live {
                    let value = frame.get(*var)?;
                    self.runtime.thread_mut().push(value);
                }
                self.runtime.thread_mut().push(Value::Number(pointer as f64));
                Ok(Outcome::Suspended)
            }
            returned => Ok(returned),
        }
    }

    /// The `$main` loop: one iteration per entered part
    fn dispatch(&mut self, frame: &mut Frame<'a>, body: &'a AsyncMethod, pointer: &mut i64) -> Exec<Outcome> {
        loop {
            self.tick()?;
            let part = usize::try_from(*pointer)
                .ok()
                .and_then(|index| body.parts.get(index))
                .ok_or_else(|| EvalError::InvalidResumptionPointer {
                    method: body.reference.to_string(),
                    pointer: *pointer,
                })?;

            if part.index == 0 && body.is_synchronized() {
                self.runtime.monitor_enter();
                if self.runtime.suspending() {
                    return Ok(Outcome::Suspended);
                }
            }

            match self.exec_all(frame, &part.statements)? {
                Flow::Goto(next) => *pointer = next as i64,
                // falls into the next case
                Flow::Normal => *pointer += 1,
                Flow::Return(value) => return Ok(Outcome::Returned(value)),
                Flow::Suspend => return Ok(Outcome::Suspended),
                Flow::Break(id) | Flow::Continue(id) => {
                    return Err(frame
                        .malformed(format!("jump to construct {} escapes part {}", id.0, part.index))
                        .into())
                }
            }
        }
    }

    fn exec_all(&mut self, frame: &mut Frame<'a>, statements: &'a [Statement]) -> Exec<Flow> {
        for statement in statements {
            match self.exec(frame, statement)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    /// Suspension reported by the statement just executed
    fn suspension_check(&self, frame: &Frame<'_>, flagged: bool) -> Exec<Flow> {
        if !self.runtime.suspending() {
            return Ok(Flow::Normal);
        }
        if flagged && frame.in_async {
            Ok(Flow::Suspend)
        } else {
            Err(EvalError::UnexpectedSuspension {
                method: frame.method.to_string(),
            }
            .into())
        }
    }

    fn exec(&mut self, frame: &mut Frame<'a>, statement: &'a Statement) -> Exec<Flow> {
        self.tick()?;
        match statement {
            Statement::Sequential(body) => self.exec_all(frame, body),
            Statement::Conditional {
                condition,
                consequent,
                alternative,
            } => {
                if self.eval(frame, condition)?.truthy() {
                    self.exec_all(frame, consequent)
                } else {
                    self.exec_all(frame, alternative)
                }
            }
            Statement::Switch {
                id,
                value,
                clauses,
                default,
            } => {
                let value = self.eval(frame, value)?;
                let key = to_int32(value.as_number().ok_or_else(|| frame.mismatch("number", &value))?);
                let start = clauses.iter().position(|c| c.values.contains(&key));
                let bodies = match start {
                    Some(start) => clauses[start..].iter().map(|c| c.body.as_slice()).collect::<Vec<_>>(),
                    None => Vec::new(),
                };
                for body in bodies.into_iter().chain(std::iter::once(default.as_slice())) {
                    match self.exec_all(frame, body)? {
                        Flow::Normal => {}
                        Flow::Break(target) if target == *id => return Ok(Flow::Normal),
                        other => return Ok(other),
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::Loop {
                id,
                condition,
                body,
            } => loop {
                if let Some(condition) = condition {
                    if !self.eval(frame, condition)?.truthy() {
                        return Ok(Flow::Normal);
                    }
                }
                match self.exec_all(frame, body)? {
                    Flow::Normal => {}
                    Flow::Continue(target) if target == *id => {}
                    Flow::Break(target) if target == *id => return Ok(Flow::Normal),
                    other => return Ok(other),
                }
                self.tick()?;
            },
            Statement::Block { id, body } => match self.exec_all(frame, body)? {
                Flow::Break(target) if target == *id => Ok(Flow::Normal),
                other => Ok(other),
            },
            Statement::Break { target } => Ok(Flow::Break(*target)),
            Statement::Continue { target } => Ok(Flow::Continue(*target)),
            Statement::Assignment {
                left, right, suspends, ..
            } => {
                let place = match left {
                    Some(left) => Some(self.place(frame, left)?),
                    None => None,
                };
                let value = self.eval(frame, right)?;
                match self.suspension_check(frame, *suspends)? {
                    Flow::Normal => {}
                    suspended => return Ok(suspended),
                }
                if let Some(place) = place {
                    self.store(frame, place, value)?;
                }
                Ok(Flow::Normal)
            }
            Statement::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.eval(frame, value)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Statement::Throw { exception, .. } => {
                let exception = self.eval(frame, exception)?;
                Err(Abrupt::Throw(exception))
            }
            Statement::InitClass { class, suspends, .. } => {
                self.init_class(class)?;
                self.suspension_check(frame, *suspends)
            }
            Statement::MonitorEnter { object, .. } => {
                self.eval(frame, object)?;
                if frame.in_async {
                    self.runtime.monitor_enter();
                    self.suspension_check(frame, true)
                } else {
                    self.runtime.monitor_enter_sync();
                    Ok(Flow::Normal)
                }
            }
            Statement::MonitorExit { object, .. } => {
                self.eval(frame, object)?;
                self.runtime.monitor_exit();
                Ok(Flow::Normal)
            }
            Statement::GotoPart(part) => {
                if frame.in_async {
                    Ok(Flow::Goto(*part))
                } else {
                    Err(frame.malformed(format!("jump to part {} outside a resumable method", part)).into())
                }
            }
            Statement::TryCatch {
                protected,
                exception_type,
                exception_var,
                handler,
            } => match self.exec_all(frame, protected) {
                Err(Abrupt::Throw(exception)) if self.catches(exception_type.as_deref(), &exception) => {
                    if let Some(var) = exception_var {
                        frame.set(*var, exception);
                    }
                    self.exec_all(frame, handler)
                }
                other => other,
            },
        }
    }

    fn catches(&self, exception_type: Option<&str>, exception: &Value) -> bool {
        match (exception_type, exception.class_name()) {
            (None, _) => true,
            (Some(target), Some(class)) => self.compiled.unit.is_subtype(&class, target),
            (Some(_), None) => false,
        }
    }

    /// Class initialization through the `$clinit` wrapper protocol
    fn init_class(&mut self, class: &str) -> Exec<()> {
        let state = self.classes.get(class).copied();
        if state == Some(ClassState::Done) {
            return Ok(());
        }
        let compiled = self.compiled;
        let clinit = MethodRef::class_initializer(class);
        let body = match compiled.body(&clinit) {
            Some(body) => body,
            None => {
                self.classes.insert(class.to_string(), ClassState::Done);
                return Ok(());
            }
        };

        if !body.is_async() {
            self.classes.insert(class.to_string(), ClassState::Done);
            self.call(&clinit, Vec::new())?;
            return Ok(());
        }

        if self.runtime.resuming() {
            self.runtime.thread_mut().pop()?;
        } else if state == Some(ClassState::Running) {
            return Ok(());
        }
        self.classes.insert(class.to_string(), ClassState::Running);
        self.call(&clinit, Vec::new())?;
        if self.runtime.suspending() {
            self.runtime.thread_mut().push(Value::int(1));
            return Ok(());
        }
        self.classes.insert(class.to_string(), ClassState::Done);
        Ok(())
    }

    fn place(&mut self, frame: &mut Frame<'a>, target: &'a Expr) -> Exec<Place> {
        match &target.kind {
            ExprKind::Variable(var) => Ok(Place::Var(*var)),
            ExprKind::Qualification { target: None, field } => Ok(Place::Static(field.clone())),
            ExprKind::Qualification {
                target: Some(instance),
                field,
            } => match self.eval(frame, instance)? {
                Value::Object(object) => Ok(Place::Field(object, field.name.clone())),
                Value::Null => Err(self.throw_new("java.lang.NullPointerException")),
                other => Err(frame.mismatch("object", &other).into()),
            },
            ExprKind::Subscript { array, index } => {
                let array = self.eval(frame, array)?;
                let index = self.eval(frame, index)?;
                let array = match array {
                    Value::Array(array) => array,
                    Value::Null => return Err(self.throw_new("java.lang.NullPointerException")),
                    other => return Err(frame.mismatch("array", &other).into()),
                };
                let index = self.index(frame, &array, &index)?;
                Ok(Place::Element(array, index))
            }
            _ => Err(frame.malformed("assignment to a non-place expression").into()),
        }
    }

    fn store(&mut self, frame: &mut Frame<'a>, place: Place, value: Value) -> Exec<()> {
        match place {
            Place::Var(var) => frame.set(var, value),
            Place::Field(object, name) => {
                object.borrow_mut().fields.insert(name, value);
            }
            Place::Static(field) => {
                self.statics.insert(field, value);
            }
            Place::Element(array, index) => {
                array.borrow_mut().data[index] = value;
            }
        }
        Ok(())
    }

    fn index(&self, frame: &Frame<'_>, array: &ArrayRef, index: &Value) -> Exec<usize> {
        let raw = index.as_number().ok_or_else(|| frame.mismatch("number", index))?;
        let length = array.borrow().data.len();
        let index = to_int32(raw) as i64;
        usize::try_from(index)
            .ok()
            .filter(|i| *i < length)
            .ok_or_else(|| EvalError::IndexOutOfBounds { index, length }.into())
    }

    /// A fresh exception object of `class`, ready to throw
    fn throw_new(&self, class: &str) -> Abrupt {
        Abrupt::Throw(self.instantiate(class))
    }

    fn instantiate(&self, class: &str) -> Value {
        let unit = &self.compiled.unit;
        let value = Value::new_object(class);
        if let Value::Object(object) = &value {
            let mut object = object.borrow_mut();
            let mut current = Some(class.to_string());
            for _ in 0..=unit.classes.len() {
                let Some(def) = current.as_deref().and_then(|c| unit.class(c)) else {
                    break;
                };
                for field in def.fields.iter().filter(|f| !f.is_static) {
                    object
                        .fields
                        .entry(field.name.clone())
                        .or_insert_with(|| Value::default_of(&field.ty));
                }
                current = def.parent.clone();
            }
        }
        value
    }

    fn static_value(&self, field: &FieldRef) -> Value {
        if let Some(value) = self.statics.get(field) {
            return value.clone();
        }
        self.compiled
            .unit
            .class(&field.class)
            .and_then(|c| c.fields.iter().find(|f| f.name == field.name))
            .map(|f| Value::default_of(&f.ty))
            .unwrap_or(Value::Null)
    }

    fn eval(&mut self, frame: &mut Frame<'a>, expr: &'a Expr) -> Exec<Value> {
        match &expr.kind {
            ExprKind::Constant(constant) => Ok(match constant {
                Constant::Null => Value::Null,
                Constant::Int(v) => Value::int(*v),
                Constant::Long(v) => Value::Long(*v),
                Constant::Float(v) => Value::Number(f64::from(*v)),
                Constant::Double(v) => Value::Number(*v),
                Constant::String(s) => Value::Str(s.as_str().into()),
                Constant::Class(ty) => Value::Class(ty.clone()),
            }),
            ExprKind::Variable(var) => Ok(frame.get(*var)?),
            ExprKind::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let left = self.eval(frame, left)?;
                if left.truthy() {
                    self.eval(frame, right)
                } else {
                    Ok(left)
                }
            }
            ExprKind::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let left = self.eval(frame, left)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    self.eval(frame, right)
                }
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(frame, left)?;
                let right = self.eval(frame, right)?;
                Ok(binary(frame, *op, &left, &right)?)
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(frame, operand)?;
                match op {
                    UnaryOp::Negate => match value {
                        Value::Long(v) => Ok(Value::Long(v.wrapping_neg())),
                        other => Ok(Value::Number(-number(frame, &other)?)),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOp::BitNot => Ok(Value::int(!to_int32(number(frame, &value)?))),
                    UnaryOp::Length => match value {
                        Value::Array(array) => Ok(Value::Number(array.borrow().data.len() as f64)),
                        Value::Null => Err(self.throw_new("java.lang.NullPointerException")),
                        other => Err(frame.mismatch("array", &other).into()),
                    },
                    UnaryOp::NullCheck => {
                        if value.is_null() {
                            Err(self.throw_new("java.lang.NullPointerException"))
                        } else {
                            Ok(value)
                        }
                    }
                }
            }
            ExprKind::Conditional {
                condition,
                consequent,
                alternative,
            } => {
                if self.eval(frame, condition)?.truthy() {
                    self.eval(frame, consequent)
                } else {
                    self.eval(frame, alternative)
                }
            }
            ExprKind::Subscript { .. } => match self.place(frame, expr)? {
                Place::Element(array, index) => Ok(array.borrow().data[index].clone()),
                _ => Err(frame.malformed("subscript did not resolve to an element").into()),
            },
            ExprKind::Invocation(invocation) => {
                let instance = match &invocation.instance {
                    Some(instance) => Some(self.eval(frame, instance)?),
                    None => None,
                };
                let mut args = Vec::with_capacity(invocation.arguments.len() + 1);
                for argument in &invocation.arguments {
                    args.push(self.eval(frame, argument)?);
                }
                let outcome = match (invocation.kind, instance) {
                    (InvocationKind::Virtual, Some(Value::Null)) => {
                        return Err(self.throw_new("java.lang.NullPointerException"))
                    }
                    (InvocationKind::Virtual, Some(receiver)) => {
                        self.call_virtual(&invocation.method, receiver, args)?
                    }
                    (InvocationKind::Virtual, None) => {
                        return Err(frame.malformed("virtual invocation without a receiver").into())
                    }
                    (InvocationKind::Special, Some(receiver)) => {
                        args.insert(0, receiver);
                        self.call(&invocation.method, args)?
                    }
                    (InvocationKind::Special, None) | (InvocationKind::Static, _) => {
                        self.call(&invocation.method, args)?
                    }
                };
                Ok(match outcome {
                    Outcome::Returned(value) => value,
                    Outcome::Suspended => Value::Null,
                })
            }
            ExprKind::Qualification { target: None, field } => Ok(self.static_value(field)),
            ExprKind::Qualification { .. } => match self.place(frame, expr)? {
                Place::Field(object, name) => Ok(object.borrow().fields.get(&name).cloned().unwrap_or(Value::Null)),
                _ => Err(frame.malformed("field access did not resolve to a field").into()),
            },
            ExprKind::New { class } => Ok(self.instantiate(class)),
            ExprKind::NewArray { element_type, size } => {
                let size = self.eval(frame, size)?;
                let size = to_int32(number(frame, &size)?);
                if size < 0 {
                    return Err(self.throw_new("java.lang.NegativeArraySizeException"));
                }
                let data = vec![Value::default_of(element_type); size as usize];
                Ok(Value::new_array(element_type.clone(), data))
            }
            ExprKind::InstanceOf { value, class } => {
                let value = self.eval(frame, value)?;
                Ok(Value::Bool(self.is_instance(&value, class)))
            }
            ExprKind::Helper { helper, arguments } => {
                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.eval(frame, argument)?);
                }
                self.helper(frame, *helper, &args)
            }
        }
    }

    fn is_instance(&self, value: &Value, ty: &ValueType) -> bool {
        match (value, ty) {
            (Value::Object(object), ValueType::Object(target)) => {
                self.compiled.unit.is_subtype(&object.borrow().class, target)
            }
            (Value::Array(_), ValueType::Object(target)) => target == "java.lang.Object",
            (Value::Array(array), ValueType::Array(_)) => &ValueType::array_of(array.borrow().element_type.clone()) == ty,
            _ => false,
        }
    }

    fn helper(&self, frame: &Frame<'_>, helper: Helper, args: &[Value]) -> Exec<Value> {
        let arg = |i: usize| args.get(i).ok_or_else(|| frame.malformed(format!("{} expects more arguments", helper.name())));
        let long = |i: usize| -> EvalResult<i64> {
            let value = arg(i)?;
            value.as_long().ok_or_else(|| frame.mismatch("long", value))
        };
        let num = |i: usize| -> EvalResult<f64> { number(frame, arg(i)?) };

        let value = match helper {
            Helper::IntMultiply => Value::int(to_int32(num(0)?).wrapping_mul(to_int32(num(1)?))),
            Helper::Compare => {
                let (a, b) = (num(0)?, num(1)?);
                Value::int(if a > b {
                    1
                } else if a < b {
                    -1
                } else if a == b {
                    0
                } else {
                    1
                })
            }
            Helper::LongAdd => Value::Long(long(0)?.wrapping_add(long(1)?)),
            Helper::LongSubtract => Value::Long(long(0)?.wrapping_sub(long(1)?)),
            Helper::LongMultiply => Value::Long(long(0)?.wrapping_mul(long(1)?)),
            Helper::LongDivide | Helper::LongRemainder => {
                let (a, b) = (long(0)?, long(1)?);
                if b == 0 {
                    return Err(self.throw_new("java.lang.ArithmeticException"));
                }
                Value::Long(if helper == Helper::LongDivide {
                    a.wrapping_div(b)
                } else {
                    a.wrapping_rem(b)
                })
            }
            Helper::LongAnd => Value::Long(long(0)? & long(1)?),
            Helper::LongOr => Value::Long(long(0)? | long(1)?),
            Helper::LongXor => Value::Long(long(0)? ^ long(1)?),
            Helper::LongShiftLeft => Value::Long(long(0)?.wrapping_shl(shift_amount(num(1)?))),
            Helper::LongShiftRight => Value::Long(long(0)?.wrapping_shr(shift_amount(num(1)?))),
            Helper::LongShiftRightUnsigned => {
                Value::Long(((long(0)? as u64) >> shift_amount(num(1)?)) as i64)
            }
            Helper::LongCompare => Value::int(match long(0)?.cmp(&long(1)?) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            }),
            Helper::LongNegate => Value::Long(long(0)?.wrapping_neg()),
            Helper::LongFromInt => Value::Long(i64::from(to_int32(num(0)?))),
            Helper::LongFromNumber => Value::Long(num(0)? as i64),
            Helper::LongToNumber => Value::Number(long(0)? as f64),
            Helper::LongToInt => Value::int(long(0)? as i32),
        };
        Ok(value)
    }
}

fn shift_amount(value: f64) -> u32 {
    to_uint32(value) & 63
}

fn number(frame: &Frame<'_>, value: &Value) -> EvalResult<f64> {
    value.as_number().ok_or_else(|| frame.mismatch("number", value))
}

fn binary(frame: &Frame<'_>, op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let value = match op {
        BinaryOp::Equal => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEqual => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEqual => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEqual => Value::Bool(!left.strict_equals(right)),
        _ => {
            let (a, b) = (number(frame, left)?, number(frame, right)?);
            match op {
                BinaryOp::Add => Value::Number(a + b),
                BinaryOp::Subtract => Value::Number(a - b),
                BinaryOp::Multiply => Value::Number(a * b),
                BinaryOp::Divide => Value::Number(a / b),
                BinaryOp::Modulo => Value::Number(a % b),
                BinaryOp::BitAnd => Value::int(to_int32(a) & to_int32(b)),
                BinaryOp::BitOr => Value::int(to_int32(a) | to_int32(b)),
                BinaryOp::BitXor => Value::int(to_int32(a) ^ to_int32(b)),
                BinaryOp::ShiftLeft => Value::int(to_int32(a).wrapping_shl(to_uint32(b) & 31)),
                BinaryOp::ShiftRight => Value::int(to_int32(a).wrapping_shr(to_uint32(b) & 31)),
                BinaryOp::ShiftRightUnsigned => Value::Number(f64::from(to_uint32(a) >> (to_uint32(b) & 31))),
                BinaryOp::Less => Value::Bool(a < b),
                BinaryOp::LessOrEqual => Value::Bool(a <= b),
                BinaryOp::Greater => Value::Bool(a > b),
                BinaryOp::GreaterOrEqual => Value::Bool(a >= b),
                BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::StrictEqual
                | BinaryOp::StrictNotEqual
                | BinaryOp::And
                | BinaryOp::Or => return Err(frame.malformed(format!("operator {} evaluated eagerly", op.symbol()))),
            }
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::ir::{
        BasicBlock, BasicBlockId, BinaryOperation, BranchCondition, ClassDef, ExceptionHandler,
        InstructionKind, Invoke, NumericType, Terminator, Unit,
    };
    use crate::pipeline::Backend;

    fn block(id: u32, terminator: Terminator) -> BasicBlock {
        let mut b = BasicBlock::new(BasicBlockId(id));
        b.terminator = terminator;
        b
    }

    fn static_method(name: &str, descriptor: &str, variables: u32, blocks: Vec<BasicBlock>) -> Method {
        let mut method = Method::new(MethodRef::new("T", name, descriptor), variables);
        method.modifiers.is_static = true;
        method.blocks = blocks;
        method
    }

    fn compile(methods: Vec<Method>, config: BackendConfig) -> CompiledUnit {
        let mut class = ClassDef::new("T");
        class.methods = methods;
        let mut unit = Unit::new();
        unit.classes.push(class);
        Backend::new(config).compile(unit).unwrap()
    }

    fn int_add(receiver: u32, first: u32, second: u32) -> InstructionKind {
        InstructionKind::Binary {
            receiver: Var(receiver),
            operation: BinaryOperation::Add,
            operand_type: NumericType::Int,
            first: Var(first),
            second: Var(second),
        }
    }

    fn constant(receiver: u32, value: i32) -> InstructionKind {
        InstructionKind::Constant {
            receiver: Var(receiver),
            value: Constant::Int(value),
        }
    }

    /// Sum of `0..n`; v1 = n, v2 = i, v3 = sum, v4 = 1, v5 = compare(i, n)
    fn sum_to() -> Method {
        let mut b0 = block(0, Terminator::jump(BasicBlockId(1)));
        b0.add_instr(constant(2, 0));
        b0.add_instr(constant(3, 0));
        b0.add_instr(constant(4, 1));
        let mut b1 = block(
            1,
            Terminator::Branch {
                condition: BranchCondition::GreaterOrEqual,
                operand: Var(5),
                consequent: BasicBlockId(3),
                alternative: BasicBlockId(2),
            },
        );
        b1.add_instr(InstructionKind::Binary {
            receiver: Var(5),
            operation: BinaryOperation::Compare,
            operand_type: NumericType::Int,
            first: Var(2),
            second: Var(1),
        });
        let mut b2 = block(2, Terminator::jump(BasicBlockId(1)));
        b2.add_instr(int_add(3, 3, 2));
        b2.add_instr(int_add(2, 2, 4));
        let b3 = block(3, Terminator::ret(Some(Var(3))));
        static_method("sum", "(I)I", 6, vec![b0, b1, b2, b3])
    }

    #[test]
    fn test_loop_runs_to_completion() {
        let compiled = compile(vec![sum_to()], BackendConfig::default());
        let mut evaluator = Evaluator::new(&compiled);
        let summary = evaluator
            .run(&MethodRef::new("T", "sum", "(I)I"), vec![Value::int(5)])
            .unwrap();
        assert_eq!(summary.value, Value::int(10));
        assert_eq!(summary.suspensions, 0);
    }

    #[test]
    fn test_thrown_exception_reaches_handler() {
        let mut b0 = block(0, Terminator::Throw { exception: Var(1) });
        b0.add_instr(InstructionKind::Construct {
            receiver: Var(1),
            class: "java.lang.IllegalStateException".into(),
        });
        b0.handlers.push(ExceptionHandler {
            exception_type: Some("java.lang.IllegalStateException".into()),
            handler: BasicBlockId(1),
            exception_var: Some(Var(2)),
        });
        let mut b1 = block(1, Terminator::ret(Some(Var(3))));
        b1.add_instr(constant(3, 7));
        let method = static_method("guarded", "()I", 4, vec![b0, b1]);

        let compiled = compile(vec![method], BackendConfig::default());
        let mut evaluator = Evaluator::new(&compiled);
        let summary = evaluator.run(&MethodRef::new("T", "guarded", "()I"), vec![]).unwrap();
        assert_eq!(summary.value, Value::int(7));
    }

    #[test]
    fn test_out_of_range_pointer_is_fatal() {
        let blocking = MethodRef::new("rt.T", "block", "()I");
        let mut b0 = block(0, Terminator::ret(Some(Var(1))));
        b0.add_instr(InstructionKind::Invoke(Invoke {
            receiver: Some(Var(1)),
            method: blocking.clone(),
            instance: None,
            arguments: vec![],
            kind: InvocationKind::Static,
            may_suspend: true,
        }));
        let method = static_method("wait", "()I", 2, vec![b0]);
        let reference = method.reference.clone();

        let config = BackendConfig {
            intrinsics: vec![blocking],
            ..BackendConfig::default()
        };
        let compiled = compile(vec![method], config);
        let live = compiled.body(&reference).and_then(|b| b.as_async()).unwrap().live.len();

        let mut stack = vec![Value::Null; live];
        stack.push(Value::int(9));
        let mut evaluator = Evaluator::new(&compiled);
        evaluator.runtime_mut().resume_from(stack);
        let err = evaluator.invoke(&reference, vec![]).unwrap_err();
        assert!(matches!(err, EvalError::InvalidResumptionPointer { pointer: 9, .. }));
    }
}
