//! Label bookkeeping
//!
//! A `break` or `continue` needs a label unless its target is the innermost
//! construct the bare statement would reach: the innermost loop or switch for
//! `break`, the innermost loop for `continue`. Blocks are never reached by a
//! bare `break`. Only constructs with labelled references get a label.

use crate::ast::{ConstructId, Statement};
use crate::naming::{index_to_id, DispatchNames};
use rustc_hash::FxHashMap;

/// Innermost-first stack of constructs a bare jump can reach
#[derive(Debug, Default, Clone)]
pub struct BreakableStack {
    entries: Vec<(ConstructId, bool)>,
}

impl BreakableStack {
    pub fn push(&mut self, id: ConstructId, is_loop: bool) {
        self.entries.push((id, is_loop));
    }

    pub fn pop(&mut self) {
        self.entries.pop();
    }

    pub fn bare_break_reaches(&self, target: ConstructId) -> bool {
        self.entries.last().map(|(id, _)| *id) == Some(target)
    }

    pub fn bare_continue_reaches(&self, target: ConstructId) -> bool {
        self.entries
            .iter()
            .rev()
            .find(|(_, is_loop)| *is_loop)
            .map(|(id, _)| *id)
            == Some(target)
    }
}

/// Labelled-reference counts per construct, plus assigned label names
#[derive(Debug, Default)]
pub struct LabelTable {
    references: FxHashMap<ConstructId, u32>,
    names: FxHashMap<ConstructId, String>,
    issued: usize,
    minify: bool,
}

impl LabelTable {
    pub fn new(minify: bool) -> Self {
        Self {
            minify,
            ..Self::default()
        }
    }

    /// Count the labelled references in `statements`
    pub fn scan(&mut self, statements: &[Statement]) {
        let mut stack = BreakableStack::default();
        self.visit(statements, &mut stack);
    }

    fn visit(&mut self, statements: &[Statement], stack: &mut BreakableStack) {
        for stmt in statements {
            match stmt {
                Statement::Loop { id, body, .. } => {
                    stack.push(*id, true);
                    self.visit(body, stack);
                    stack.pop();
                }
                Statement::Switch {
                    id,
                    clauses,
                    default,
                    ..
                } => {
                    stack.push(*id, false);
                    for clause in clauses {
                        self.visit(&clause.body, stack);
                    }
                    self.visit(default, stack);
                    stack.pop();
                }
                Statement::Break { target } => {
                    if !stack.bare_break_reaches(*target) {
                        *self.references.entry(*target).or_insert(0) += 1;
                    }
                }
                Statement::Continue { target } => {
                    if !stack.bare_continue_reaches(*target) {
                        *self.references.entry(*target).or_insert(0) += 1;
                    }
                }
                other => {
                    for body in other.bodies() {
                        self.visit(body, stack);
                    }
                }
            }
        }
    }

    pub fn references(&self, id: ConstructId) -> u32 {
        self.references.get(&id).copied().unwrap_or(0)
    }

    pub fn needs_label(&self, id: ConstructId) -> bool {
        self.references(id) > 0
    }

    /// Label of `id`, assigned in order of first use
    pub fn name(&mut self, id: ConstructId) -> String {
        if let Some(name) = self.names.get(&id) {
            return name.clone();
        }
        let dispatch = DispatchNames::new(self.minify);
        let name = loop {
            let candidate = if self.minify {
                format!("${}", index_to_id(self.issued, b"abcdefghijklmnopqrstuvwxyz"))
            } else {
                format!("$lbl{}", self.issued)
            };
            self.issued += 1;
            if !dispatch.contains(&candidate) {
                break candidate;
            }
        };
        self.names.insert(id, name.clone());
        name
    }
}
