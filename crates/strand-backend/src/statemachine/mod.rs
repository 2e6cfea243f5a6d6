//! Async State-Machine Compiler
//!
//! A resumable method is compiled into ordered parts, each translated from
//! its own sub-graph of the fragmented method (see [`split`]). The renderer
//! and the evaluator turn an [`AsyncMethod`] into the dispatch loop:
//!
//! ```text
//! var locals..., $ptr, $tmp;
//! $ptr = 0;
//! if (resuming()) { $ptr = pop(); vN = pop(); ... v1 = pop(); }
//! $main: while (true) { switch ($ptr) {
//!     case 0: ...
//!     case N-1: ...
//!     default: invalidPointer();
//! }}
//! push(v1, ..., vN, $ptr);
//! ```
//!
//! A suspending statement renders as `$tmp = call(); if (suspending())
//! break $main; lhs = $tmp;`. On suspension `$ptr` still holds the current
//! part, whose first statement is the suspending one, so resumption repeats
//! exactly that statement.

pub mod split;

use crate::analysis::SuspendSet;
use crate::ast::{highest_variable, ConstructArena, Expr, MethodBody, Statement};
use crate::decompose::decompose_with;
use crate::error::{BackendError, BackendResult};
use crate::ir::{BasicBlockId, Constant, Method, MethodRef, ValueType, Var};
use crate::structure::GraphIndexer;
use crate::translate::Translator;
use rustc_hash::{FxHashMap, FxHashSet};

/// One addressable slice of a resumable method
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncPart {
    pub index: usize,
    pub entry: BasicBlockId,
    pub statements: Vec<Statement>,
    /// Handler entries of the protected regions with code in this part
    pub regions: Vec<BasicBlockId>,
}

/// A method compiled into a dispatch loop over parts
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncMethod {
    pub reference: MethodRef,
    pub parts: Vec<AsyncPart>,
    /// Constructs of every part; ids are unique across parts
    pub constructs: ConstructArena,
    pub variable_count: u32,
    /// Slots saved on suspension and restored on resumption, ascending
    pub live: Vec<Var>,
    /// Monitor of a synchronized method
    pub monitor: Option<Expr>,
}

impl AsyncMethod {
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn is_synchronized(&self) -> bool {
        self.monitor.is_some()
    }

    pub fn has_protected_regions(&self) -> bool {
        self.parts.iter().any(|p| !p.regions.is_empty())
    }
}

/// Monitor object of a synchronized method: the receiver, or the class
pub fn method_monitor(method: &Method) -> Expr {
    if method.is_static() {
        Expr::constant(Constant::Class(ValueType::object(
            method.reference.class.clone(),
        )))
    } else {
        Expr::var(Var(0))
    }
}

pub struct AsyncCompiler<'a> {
    method: &'a Method,
    set: &'a SuspendSet,
    indexer: &'a dyn GraphIndexer,
}

impl<'a> AsyncCompiler<'a> {
    pub fn new(method: &'a Method, set: &'a SuspendSet, indexer: &'a dyn GraphIndexer) -> Self {
        Self {
            method,
            set,
            indexer,
        }
    }

    pub fn compile(self) -> BackendResult<AsyncMethod> {
        let method = self.method;
        let _span = tracing::debug_span!("async_method", method = %method.reference).entered();
        if !method.has_body() {
            return Err(BackendError::malformed(
                &method.reference,
                "resumable method has no body",
            ));
        }

        let fragments = split::fragment(&method.blocks, self.set);
        let entries = split::discover_parts(&fragments, method.entry());
        let numbers = split::part_numbers(&entries);
        let detached: FxHashSet<BasicBlockId> = entries.iter().copied().collect();

        let mut shared = MethodBody::new(method.variable_count);
        let mut parts = Vec::with_capacity(entries.len());
        for (index, &entry) in entries.iter().enumerate() {
            let view = split::part_view(&fragments, entry, &detached);
            let map = self
                .indexer
                .index(&view)
                .map_err(|e| BackendError::from_index(&method.reference, e))?;

            let mut targets: FxHashMap<BasicBlockId, usize> = numbers.clone();
            targets.remove(&entry);

            let mut body = Translator::new(method, &fragments.blocks, &map)
                .with_part_targets(&targets)
                .with_suspend_set(self.set)
                .with_body(shared)
                .translate()?;
            decompose_with(&mut body, Some(self.set));

            let mut regions: Vec<BasicBlockId> = Vec::new();
            for node in map.order() {
                if let Some(block) = fragments.blocks.get(node.index()) {
                    for handler in &block.handlers {
                        if !regions.contains(&handler.handler) {
                            regions.push(handler.handler);
                        }
                    }
                }
            }

            tracing::trace!(part = index, entry = %entry, nodes = map.len(), "translated part");
            parts.push(AsyncPart {
                index,
                entry,
                statements: std::mem::take(&mut body.statements),
                regions,
            });
            shared = body;
        }

        let live = live_set(method, &parts);
        tracing::debug!(parts = parts.len(), live = live.len(), "compiled resumable method");

        Ok(AsyncMethod {
            reference: method.reference.clone(),
            parts,
            constructs: shared.constructs,
            variable_count: shared.variable_count,
            live,
            monitor: method.modifiers.synchronized.then(|| method_monitor(method)),
        })
    }
}

/// Every local from the first post-parameter slot through the highest slot
/// any part uses, preceded by the parameters the method writes.
fn live_set(method: &Method, parts: &[AsyncPart]) -> Vec<Var> {
    let mut live = method.written_parameters();
    live.sort();
    let highest = parts
        .iter()
        .filter_map(|p| highest_variable(&p.statements))
        .max();
    if let Some(highest) = highest {
        live.extend((method.first_local()..=highest.0).map(Var));
    }
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprKind;
    use crate::ir::{
        BasicBlock, BinaryOperation, BranchCondition, ExceptionHandler, InstructionKind,
        InvocationKind, Invoke, NumericType, Terminator,
    };
    use crate::structure::LoopNestIndexer;

    fn blocking() -> MethodRef {
        MethodRef::new("rt.T", "block", "()I")
    }

    fn call_into(receiver: u32) -> InstructionKind {
        InstructionKind::Invoke(Invoke {
            receiver: Some(Var(receiver)),
            method: blocking(),
            instance: None,
            arguments: vec![],
            kind: InvocationKind::Static,
            may_suspend: true,
        })
    }

    fn compile(method: &Method) -> AsyncMethod {
        let mut set = SuspendSet::new();
        set.insert(blocking());
        set.insert(method.reference.clone());
        AsyncCompiler::new(method, &set, &LoopNestIndexer)
            .compile()
            .unwrap()
    }

    /// `x = block(); return x + 1;`
    fn worked_example() -> Method {
        let mut method = Method::new(MethodRef::new("T", "m", "()I"), 4);
        method.modifiers.is_static = true;
        let mut b0 = BasicBlock::new(BasicBlockId(0));
        b0.add_instr(call_into(1));
        b0.add_instr(InstructionKind::Constant {
            receiver: Var(2),
            value: Constant::Int(1),
        });
        b0.add_instr(InstructionKind::Binary {
            receiver: Var(3),
            operation: BinaryOperation::Add,
            operand_type: NumericType::Int,
            first: Var(1),
            second: Var(2),
        });
        b0.set_terminator(Terminator::ret(Some(Var(3))));
        method.blocks = vec![b0];
        method
    }

    #[test]
    fn test_worked_example_splits_after_call() {
        let compiled = compile(&worked_example());
        assert_eq!(compiled.part_count(), 2);

        let part0 = &compiled.parts[0].statements;
        assert_eq!(part0.len(), 2);
        assert!(matches!(
            &part0[0],
            Statement::Assignment { suspends: true, right, .. }
                if matches!(right.kind, ExprKind::Invocation(_))
        ));
        assert_eq!(part0[1], Statement::GotoPart(1));

        let part1 = &compiled.parts[1].statements;
        assert!(matches!(part1.last(), Some(Statement::Return { .. })));
        assert_eq!(compiled.live, vec![Var(1), Var(2), Var(3)]);
        assert!(!compiled.is_synchronized());
    }

    #[test]
    fn test_loop_with_call_is_cut_into_parts() {
        // 0: v1 = 0 -> 1; 1: if v1 == 0 goto 3 else 2; 2: v2 = block(); v1 = v2 -> 1; 3: return v1
        let mut method = Method::new(MethodRef::new("T", "loop", "()I"), 3);
        method.modifiers.is_static = true;
        let mut b0 = BasicBlock::new(BasicBlockId(0));
        b0.add_instr(InstructionKind::Constant {
            receiver: Var(1),
            value: Constant::Int(0),
        });
        b0.set_terminator(Terminator::jump(BasicBlockId(1)));
        let mut b1 = BasicBlock::new(BasicBlockId(1));
        b1.set_terminator(Terminator::Branch {
            condition: BranchCondition::Equal,
            operand: Var(1),
            consequent: BasicBlockId(3),
            alternative: BasicBlockId(2),
        });
        let mut b2 = BasicBlock::new(BasicBlockId(2));
        b2.add_instr(call_into(2));
        b2.add_instr(InstructionKind::Assign {
            receiver: Var(1),
            assignee: Var(2),
        });
        b2.set_terminator(Terminator::jump(BasicBlockId(1)));
        let mut b3 = BasicBlock::new(BasicBlockId(3));
        b3.set_terminator(Terminator::ret(Some(Var(1))));
        method.blocks = vec![b0, b1, b2, b3];

        let compiled = compile(&method);
        assert_eq!(compiled.part_count(), 3);
        assert_eq!(compiled.parts[1].entry, BasicBlockId(2));
        assert_eq!(compiled.parts[1].statements.len(), 2);
        assert_eq!(compiled.parts[1].statements[1], Statement::GotoPart(2));

        let mut jumps_back = false;
        for stmt in &compiled.parts[2].statements {
            stmt.walk(&mut |s| jumps_back |= *s == Statement::GotoPart(1));
        }
        assert!(jumps_back, "{:?}", compiled.parts[2].statements);
    }

    #[test]
    fn test_synchronized_instance_method_monitors_receiver() {
        let mut method = worked_example();
        method.modifiers.is_static = false;
        method.modifiers.synchronized = true;
        let compiled = compile(&method);
        assert_eq!(compiled.monitor, Some(Expr::var(Var(0))));
    }

    #[test]
    fn test_protected_call_records_region() {
        let mut method = worked_example();
        method.blocks[0].handlers.push(ExceptionHandler {
            exception_type: None,
            handler: BasicBlockId(1),
            exception_var: Some(Var(2)),
        });
        let mut handler = BasicBlock::new(BasicBlockId(1));
        handler.set_terminator(Terminator::ret(Some(Var(2))));
        method.blocks.push(handler);

        let compiled = compile(&method);
        assert!(compiled.has_protected_regions());
        assert_eq!(compiled.parts[0].regions, vec![BasicBlockId(1)]);
    }

    #[test]
    fn test_written_parameter_is_saved() {
        // static m(I)I: v1 = block(); v2 = v1; return v2
        let mut method = Method::new(MethodRef::new("T", "p", "(I)I"), 3);
        method.modifiers.is_static = true;
        let mut b0 = BasicBlock::new(BasicBlockId(0));
        b0.add_instr(call_into(1));
        b0.add_instr(InstructionKind::Assign {
            receiver: Var(2),
            assignee: Var(1),
        });
        b0.set_terminator(Terminator::ret(Some(Var(2))));
        method.blocks = vec![b0];

        let compiled = compile(&method);
        assert_eq!(compiled.live, vec![Var(1), Var(2)]);
    }
}
