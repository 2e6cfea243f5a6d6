//! Renderer
//!
//! Deterministic printer from compiled method trees to target text. One
//! [`Renderer`] renders a whole unit:
//!
//! - class constructor functions and prototype chains, parents first
//! - one body function per method, plus prototype delegates for virtual ones
//! - class-initializer wrappers
//! - the pooled string table, last
//!
//! Statement and expression printing live in [`stmt`] and [`expr`]; method
//! shells (ordinary, synchronized and resumable) in [`method`].

mod expr;
pub mod labels;
pub mod location;
mod method;
pub mod precedence;
mod stmt;
pub mod strings;
pub mod writer;

pub use location::DebugEntry;

use crate::config::BackendConfig;
use crate::ir::{ClassDef, TextLocation, Unit, ValueType};
use crate::naming::{DispatchNames, NameTable, VariableNames};
use crate::pipeline::CompiledUnit;
use labels::{BreakableStack, LabelTable};
use location::LocationStack;
use serde::Serialize;
use strings::StringPool;
use writer::SourceWriter;

/// Output of one unit
#[derive(Debug, Clone, Serialize)]
pub struct RenderedUnit {
    pub code: String,
    pub string_pool: Vec<String>,
    pub debug: Vec<DebugEntry>,
}

pub struct Renderer<'a> {
    config: &'a BackendConfig,
    compiled: &'a CompiledUnit,
    names: &'a NameTable,
    dispatch: DispatchNames,
    writer: SourceWriter,
    strings: StringPool,
    locations: LocationStack,

    // State of the method being rendered
    vars: VariableNames,
    labels: LabelTable,
    breakable: BreakableStack,
    in_async: bool,
    current_part: usize,
    /// The statement being rendered is the last one of its part
    end: bool,
}

impl<'a> Renderer<'a> {
    pub fn new(config: &'a BackendConfig, compiled: &'a CompiledUnit, names: &'a NameTable) -> Self {
        Self {
            config,
            compiled,
            names,
            dispatch: names.dispatch(),
            writer: SourceWriter::new(config.indent, config.minify),
            strings: StringPool::new(),
            locations: LocationStack::new(config.debug_locations),
            vars: VariableNames::default(),
            labels: LabelTable::new(config.minify),
            breakable: BreakableStack::default(),
            in_async: false,
            current_part: 0,
            end: false,
        }
    }

    pub fn render(mut self) -> RenderedUnit {
        let compiled = self.compiled;
        let unit = &compiled.unit;
        let _span = tracing::debug_span!("render", classes = unit.classes.len()).entered();

        let classes = parents_first(unit);
        for class in &classes {
            self.render_class(class);
        }
        for class in &classes {
            for method in &class.methods {
                if method.has_body() {
                    self.render_method(method);
                }
            }
            self.render_class_init(class);
        }

        if self.config.pool_strings && !self.strings.is_empty() {
            self.render_string_pool();
        }

        let code = self.writer.finish();
        tracing::debug!(
            bytes = code.len(),
            strings = self.strings.entries().len(),
            "rendered unit"
        );
        RenderedUnit {
            code,
            string_pool: self.strings.into_entries(),
            debug: self.locations.into_entries(),
        }
    }

    fn push_location(&mut self, location: Option<TextLocation>) {
        let position = self.writer.position();
        self.locations.push(location, position);
    }

    fn pop_location(&mut self) {
        let position = self.writer.position();
        self.locations.pop(position);
    }

    fn render_class(&mut self, class: &ClassDef) {
        let name = self.names.class(&class.name);
        let parent = class
            .parent
            .as_deref()
            .filter(|p| self.compiled.unit.class(p).is_some())
            .map(|p| self.names.class(p));

        self.writer.append("function ").append(&name).append("()").ws().append("{");
        self.writer.soft_newline().indent();
        if let Some(parent) = &parent {
            self.writer.append(parent).append(".call(this);").soft_newline();
        }
        for field in class.fields.iter().filter(|f| !f.is_static) {
            let member = self
                .names
                .field(&crate::ir::FieldRef::new(class.name.clone(), field.name.clone()));
            self.writer
                .append("this.")
                .append(&member)
                .ws()
                .append("=")
                .ws()
                .append(default_value(&field.ty))
                .append(";")
                .soft_newline();
        }
        self.writer.outdent().append("}").newline();

        if let Some(parent) = &parent {
            self.writer
                .append(&name)
                .append(".prototype")
                .ws()
                .append("=")
                .ws()
                .append("Object.create(")
                .append(parent)
                .append(".prototype);")
                .soft_newline();
            self.writer
                .append(&name)
                .append(".prototype.constructor")
                .ws()
                .append("=")
                .ws()
                .append(&name)
                .append(";")
                .soft_newline();
        }
        for field in class.fields.iter().filter(|f| f.is_static) {
            let global = self
                .names
                .static_field(&crate::ir::FieldRef::new(class.name.clone(), field.name.clone()));
            self.writer
                .append("var ")
                .append(&global)
                .ws()
                .append("=")
                .ws()
                .append(default_value(&field.ty))
                .append(";")
                .soft_newline();
        }
    }

    fn render_string_pool(&mut self) {
        let function = self.config.runtime.string_pool.clone();
        self.writer.append(&function).append("([");
        let entries: Vec<String> = self.strings.entries().iter().map(|s| strings::quote(s)).collect();
        for (i, entry) in entries.iter().enumerate() {
            if i > 0 {
                self.writer.append(",").ws();
            }
            self.writer.append(entry);
        }
        self.writer.append("]);").newline();
    }
}

/// Classes ordered so every in-unit parent precedes its children
fn parents_first(unit: &Unit) -> Vec<&ClassDef> {
    let depth = |class: &ClassDef| {
        let mut depth = 0;
        let mut current = class.parent.as_deref();
        while let Some(parent) = current.and_then(|p| unit.class(p)) {
            depth += 1;
            if depth > unit.classes.len() {
                break;
            }
            current = parent.parent.as_deref();
        }
        depth
    };
    let mut classes: Vec<&ClassDef> = unit.classes.iter().collect();
    classes.sort_by_key(|c| depth(c));
    classes
}

fn default_value(ty: &ValueType) -> &'static str {
    match ty {
        ValueType::Long => "Long_ZERO",
        ValueType::Object(_) | ValueType::Array(_) => "null",
        _ => "0",
    }
}
