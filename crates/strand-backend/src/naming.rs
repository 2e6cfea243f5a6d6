//! Naming context
//!
//! Names are decided in two phases. A [`NameFrequencyEstimator`] walks every
//! declaration and every compiled tree of the unit counting symbol uses; it
//! is then frozen into a read-only [`NameTable`] the renderer consults.
//! Readable tables derive names from the symbols themselves; minified tables
//! hand the shortest identifiers to the most frequent symbols.
//!
//! There are two namespaces: globals (class constructors, method functions,
//! static fields, class initializers) and object members (virtual methods and
//! instance fields). Minified globals start with an upper-case letter and
//! minified variables with a lower-case one, so neither can shadow the other.

use crate::ast::{ExprKind, Statement};
use crate::ir::{Constant, FieldRef, InvocationKind, Method, MethodRef, Unit, ValueType, Var};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Class(String),
    /// Body function of a method
    Function(MethodRef),
    ClassInit(String),
    StaticField(FieldRef),
    /// Prototype member shared by every override of a signature
    Member { name: String, descriptor: String },
    Field(FieldRef),
}

impl Symbol {
    fn is_member(&self) -> bool {
        matches!(self, Symbol::Member { .. } | Symbol::Field(_))
    }

    fn readable(&self) -> String {
        match self {
            Symbol::Class(class) => readable_class(class),
            Symbol::Function(method) => {
                format!("{}_{}", readable_class(&method.class), readable_method(&method.name))
            }
            Symbol::ClassInit(class) => format!("{}_$clinit", readable_class(class)),
            Symbol::StaticField(field) => {
                format!("{}_{}", readable_class(&field.class), sanitize(&field.name))
            }
            Symbol::Member { name, .. } => format!("${}", sanitize(name)),
            Symbol::Field(field) => format!("$f_{}", sanitize(&field.name)),
        }
    }
}

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const REST: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Identifiers a generated short name must never take
const RESERVED: &[&str] = &[
    "do", "if", "in", "for", "let", "new", "try", "var", "case", "else", "enum", "eval", "null",
    "this", "true", "void", "with", "break", "catch", "class", "const", "false", "super", "throw",
    "while", "yield", "delete", "export", "import", "public", "return", "static", "switch",
    "typeof", "default", "extends", "finally", "package", "private", "continue", "debugger",
    "function", "arguments", "interface", "protected", "implements", "instanceof", "undefined",
    "NaN", "Math", "Array", "Error", "JSON", "Date", "Object", "String", "Number", "Symbol",
    "Boolean", "Infinity", "Int32Array",
];

/// Short identifier number `index`, first character from `first`
pub fn index_to_id(mut index: usize, first: &[u8]) -> String {
    let mut id = String::new();
    id.push(first[index % first.len()] as char);
    index /= first.len();
    while index > 0 {
        index -= 1;
        id.push(REST[index % REST.len()] as char);
        index /= REST.len();
    }
    id
}

/// Successive short identifiers, skipping reserved words
struct IdSequence {
    next: usize,
    first: &'static [u8],
}

impl IdSequence {
    fn new(first: &'static [u8]) -> Self {
        Self { next: 0, first }
    }

    fn next_id(&mut self) -> String {
        loop {
            let id = index_to_id(self.next, self.first);
            self.next += 1;
            if !RESERVED.contains(&id.as_str()) {
                return id;
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct NameFrequencyEstimator {
    counts: FxHashMap<Symbol, u64>,
}

impl NameFrequencyEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&mut self, symbol: Symbol) {
        *self.counts.entry(symbol).or_insert(0) += 1;
    }

    /// Count every declaration of the unit once
    pub fn add_unit(&mut self, unit: &Unit) {
        for class in &unit.classes {
            self.note(Symbol::Class(class.name.clone()));
            for field in &class.fields {
                let reference = FieldRef::new(class.name.clone(), field.name.clone());
                if field.is_static {
                    self.note(Symbol::StaticField(reference));
                } else {
                    self.note(Symbol::Field(reference));
                }
            }
            if class.has_class_initializer() {
                self.note(Symbol::ClassInit(class.name.clone()));
            }
            for method in &class.methods {
                self.note(Symbol::Function(method.reference.clone()));
                if method.is_virtual() {
                    self.note(member(&method.reference));
                }
            }
        }
    }

    /// Count every symbol referenced by `statements`
    pub fn add_statements(&mut self, statements: &[Statement]) {
        for stmt in statements {
            stmt.walk(&mut |s| {
                match s {
                    Statement::InitClass { class, .. } => self.note(Symbol::ClassInit(class.clone())),
                    Statement::TryCatch {
                        exception_type: Some(class),
                        ..
                    } => self.note(Symbol::Class(class.clone())),
                    _ => {}
                }
                for expr in s.expressions() {
                    expr.walk(&mut |e| self.add_expr(&e.kind));
                }
            });
        }
    }

    fn add_expr(&mut self, kind: &ExprKind) {
        match kind {
            ExprKind::Invocation(invocation) => match invocation.kind {
                InvocationKind::Virtual => self.note(member(&invocation.method)),
                InvocationKind::Static | InvocationKind::Special => {
                    self.note(Symbol::Function(invocation.method.clone()))
                }
            },
            ExprKind::Qualification {
                target: Some(_),
                field,
            } => self.note(Symbol::Field(field.clone())),
            ExprKind::Qualification {
                target: None,
                field,
            } => self.note(Symbol::StaticField(field.clone())),
            ExprKind::New { class } => self.note(Symbol::Class(class.clone())),
            ExprKind::InstanceOf { class, .. } | ExprKind::Constant(Constant::Class(class)) => {
                self.note_type(class)
            }
            ExprKind::NewArray { element_type, .. } => self.note_type(element_type),
            _ => {}
        }
    }

    fn note_type(&mut self, ty: &ValueType) {
        match ty {
            ValueType::Object(class) => self.note(Symbol::Class(class.clone())),
            ValueType::Array(element) => self.note_type(element),
            _ => {}
        }
    }

    /// End accumulation and assign every name
    pub fn freeze(self, minify: bool) -> NameTable {
        let mut symbols: Vec<(Symbol, u64)> = self.counts.into_iter().collect();
        let mut names = FxHashMap::default();

        if minify {
            symbols.sort_by(|(a, ca), (b, cb)| (Reverse(*ca), a).cmp(&(Reverse(*cb), b)));
            let mut globals = IdSequence::new(UPPER);
            let mut members = IdSequence::new(LOWER);
            for (symbol, _) in symbols {
                let id = if symbol.is_member() {
                    members.next_id()
                } else {
                    globals.next_id()
                };
                names.insert(symbol, id);
            }
        } else {
            symbols.sort();
            let mut used: FxHashSet<String> = FxHashSet::default();
            for (symbol, _) in symbols {
                let base = symbol.readable();
                let mut name = base.clone();
                let mut suffix = 1;
                while !used.insert(name.clone()) {
                    name = format!("{}${}", base, suffix);
                    suffix += 1;
                }
                names.insert(symbol, name);
            }
        }

        tracing::debug!(symbols = names.len(), minify, "froze name table");
        NameTable { names, minify }
    }
}


fn member(method: &MethodRef) -> Symbol {
    Symbol::Member {
        name: method.name.clone(),
        descriptor: method.descriptor.clone(),
    }
}

/// Names of the dispatch machinery of resumable methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchNames {
    pub pointer: &'static str,
    pub thread: &'static str,
    pub temp: &'static str,
    pub main: &'static str,
    pub caught: &'static str,
    pub wrapped: &'static str,
}

impl DispatchNames {
    pub fn new(minify: bool) -> Self {
        if minify {
            DispatchNames {
                pointer: "$p",
                thread: "$T",
                temp: "$z",
                main: "$m",
                caught: "$e",
                wrapped: "$je",
            }
        } else {
            DispatchNames {
                pointer: "$ptr",
                thread: "$thread",
                temp: "$tmp",
                main: "$main",
                caught: "$$e",
                wrapped: "$$je",
            }
        }
    }

    /// True if `name` is taken by the dispatch machinery
    pub fn contains(&self, name: &str) -> bool {
        [
            self.pointer,
            self.thread,
            self.temp,
            self.main,
            self.caught,
            self.wrapped,
        ]
        .contains(&name)
    }
}

/// Read-only mapping from symbols to generated names
#[derive(Debug, Clone)]
pub struct NameTable {
    names: FxHashMap<Symbol, String>,
    minify: bool,
}

impl NameTable {
    pub fn is_minified(&self) -> bool {
        self.minify
    }

    pub fn get(&self, symbol: &Symbol) -> String {
        match self.names.get(symbol) {
            Some(name) => name.clone(),
            None => symbol.readable(),
        }
    }

    pub fn class(&self, class: &str) -> String {
        self.get(&Symbol::Class(class.to_string()))
    }

    pub fn function(&self, method: &MethodRef) -> String {
        self.get(&Symbol::Function(method.clone()))
    }

    pub fn member(&self, method: &MethodRef) -> String {
        self.get(&member(method))
    }

    pub fn class_init(&self, class: &str) -> String {
        self.get(&Symbol::ClassInit(class.to_string()))
    }

    pub fn field(&self, field: &FieldRef) -> String {
        self.get(&Symbol::Field(field.clone()))
    }

    pub fn static_field(&self, field: &FieldRef) -> String {
        self.get(&Symbol::StaticField(field.clone()))
    }

    pub fn dispatch(&self) -> DispatchNames {
        DispatchNames::new(self.minify)
    }

    /// Variable names of one method with `count` slots
    pub fn variables(&self, method: &Method, count: u32) -> VariableNames {
        let mut names = Vec::with_capacity(count as usize);
        if self.minify {
            let mut ids = IdSequence::new(LOWER);
            for slot in 0..count {
                names.push(if slot == 0 { "$t".to_string() } else { ids.next_id() });
            }
        } else {
            let mut seen: FxHashMap<&str, u32> = FxHashMap::default();
            for slot in 0..count {
                if let Some(name) = method.variable_name(Var(slot)) {
                    *seen.entry(name).or_insert(0) += 1;
                }
            }
            let dispatch = self.dispatch();
            let mut used: FxHashSet<String> = FxHashSet::default();
            for slot in 0..count {
                let base = match method.variable_name(Var(slot)) {
                    _ if slot == 0 => "$this".to_string(),
                    Some(name) if seen.get(name) == Some(&1) => format!("${}", sanitize(name)),
                    Some(name) => format!("${}${}", sanitize(name), slot),
                    None => format!("var${}", slot),
                };
                let mut name = base.clone();
                let mut suffix = 1;
                while dispatch.contains(&name) || !used.insert(name.clone()) {
                    name = format!("{}_{}", base, suffix);
                    suffix += 1;
                }
                names.push(name);
            }
        }
        VariableNames { names }
    }
}

/// Per-method variable names, indexed by slot
#[derive(Debug, Clone, Default)]
pub struct VariableNames {
    names: Vec<String>,
}

impl VariableNames {
    pub fn get(&self, var: Var) -> String {
        match self.names.get(var.index()) {
            Some(name) => name.clone(),
            None => format!("var${}", var.0),
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect()
}

/// `java.util.Foo` becomes `ju_Foo`
fn readable_class(class: &str) -> String {
    match class.rsplit_once('.') {
        Some((package, simple)) => {
            let prefix: String = package.split('.').filter_map(|p| p.chars().next()).collect();
            format!("{}_{}", sanitize(&prefix), sanitize(simple))
        }
        None => sanitize(class),
    }
}

fn readable_method(name: &str) -> String {
    match name {
        "<init>" => "_init_".to_string(),
        "<clinit>" => "_clinit_".to_string(),
        other => sanitize(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ClassDef;

    #[test]
    fn test_index_to_id_sequence() {
        assert_eq!(index_to_id(0, LOWER), "a");
        assert_eq!(index_to_id(25, LOWER), "z");
        assert_eq!(index_to_id(26, LOWER), "aa");
        assert_eq!(index_to_id(27, LOWER), "ba");
        assert_eq!(index_to_id(0, UPPER), "A");
    }

    #[test]
    fn test_readable_names_and_overloads() {
        let mut estimator = NameFrequencyEstimator::new();
        estimator.note(Symbol::Class("java.util.ArrayList".into()));
        estimator.note(Symbol::Function(MethodRef::new("A", "f", "()V")));
        estimator.note(Symbol::Function(MethodRef::new("A", "f", "(I)V")));
        estimator.note(Symbol::Function(MethodRef::new("A", "<init>", "()V")));
        let table = estimator.freeze(false);

        assert_eq!(table.class("java.util.ArrayList"), "ju_ArrayList");
        assert_eq!(table.function(&MethodRef::new("A", "f", "()V")), "A_f");
        assert_eq!(table.function(&MethodRef::new("A", "f", "(I)V")), "A_f$1");
        assert_eq!(table.function(&MethodRef::new("A", "<init>", "()V")), "A__init_");
    }

    #[test]
    fn test_minified_names_follow_frequency() {
        let mut estimator = NameFrequencyEstimator::new();
        let rare = MethodRef::new("A", "rare", "()V");
        let hot = MethodRef::new("A", "hot", "()V");
        estimator.note(Symbol::Function(rare.clone()));
        for _ in 0..5 {
            estimator.note(Symbol::Function(hot.clone()));
        }
        estimator.note(Symbol::Member {
            name: "run".into(),
            descriptor: "()V".into(),
        });
        let table = estimator.freeze(true);

        assert_eq!(table.function(&hot), "A");
        assert_eq!(table.function(&rare), "B");
        assert_eq!(table.member(&MethodRef::new("X", "run", "()V")), "a");
    }

    #[test]
    fn test_unit_declarations_counted() {
        let mut unit = Unit::new();
        let mut class = ClassDef::new("pkg.Shape");
        class
            .methods
            .push(Method::new(MethodRef::new("pkg.Shape", "area", "()D"), 1));
        unit.classes.push(class);

        let mut estimator = NameFrequencyEstimator::new();
        estimator.add_unit(&unit);
        let table = estimator.freeze(false);
        assert_eq!(table.class("pkg.Shape"), "p_Shape");
        assert_eq!(table.member(&MethodRef::new("pkg.Other", "area", "()D")), "$area");
    }

    #[test]
    fn test_variable_names() {
        let mut method = Method::new(MethodRef::new("A", "f", "(I)V"), 4);
        method.variable_names = vec![None, Some("n".into()), Some("i".into()), Some("i".into())];
        let table = NameFrequencyEstimator::new().freeze(false);
        let vars = table.variables(&method, 5);
        assert_eq!(vars.get(Var(0)), "$this");
        assert_eq!(vars.get(Var(1)), "$n");
        assert_eq!(vars.get(Var(2)), "$i$2");
        assert_eq!(vars.get(Var(4)), "var$4");

        let minified = NameFrequencyEstimator::new().freeze(true);
        let vars = minified.variables(&method, 3);
        assert_eq!(vars.get(Var(1)), "a");
        assert_eq!(vars.get(Var(2)), "b");
    }

    #[test]
    fn test_field_names_in_both_modes() {
        let counter = FieldRef::new("demo.Counter", "ticks");
        let total = FieldRef::new("demo.Counter", "total");
        let mut estimator = NameFrequencyEstimator::new();
        estimator.note(Symbol::StaticField(total.clone()));
        estimator.note(Symbol::Field(counter.clone()));
        estimator.note(Symbol::Field(counter.clone()));
        let readable = estimator.freeze(false);
        assert_eq!(readable.static_field(&total), "d_Counter_total");
        assert_eq!(readable.field(&counter), "$f_ticks");

        let mut estimator = NameFrequencyEstimator::new();
        estimator.note(Symbol::StaticField(total.clone()));
        estimator.note(Symbol::Field(counter.clone()));
        let minified = estimator.freeze(true);
        assert_eq!(minified.static_field(&total), "A");
        assert_eq!(minified.field(&counter), "a");
    }

    #[test]
    fn test_variable_names_avoid_dispatch_names() {
        let mut method = Method::new(MethodRef::new("A", "f", "()V"), 6);
        method.variable_names = vec![
            None,
            Some("ptr".into()),
            Some("tmp".into()),
            Some("thread".into()),
            Some("$e".into()),
            Some("ptr_1".into()),
        ];
        let table = NameFrequencyEstimator::new().freeze(false);
        let dispatch = table.dispatch();
        let vars = table.variables(&method, 6);
        let names: Vec<String> = (1..6).map(|slot| vars.get(Var(slot))).collect();
        for name in &names {
            assert!(!dispatch.contains(name), "{} clashes with dispatch", name);
        }
        assert_eq!(names, vec!["$ptr_1", "$tmp_1", "$thread_1", "$$e_1", "$ptr_1_1"]);
    }
}
