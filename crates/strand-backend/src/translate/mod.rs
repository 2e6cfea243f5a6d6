//! Instruction Translator
//!
//! Walks the nodes of a graph in block-map order and builds the structured
//! statement tree. Regions of the block map become `Block`/`Loop`
//! statements; every outgoing edge becomes a fallthrough, a `Break`, a
//! `Continue`, or a `GotoPart` when the target belongs to another async part.
//!
//! Protected regions are rebuilt with bookmarks: a bookmark opens where a node
//! gains a handler and is closed, wrapping everything emitted since, where a
//! node loses it. A bookmark outliving its construct wraps the construct's
//! tail and re-opens in the parent after it.

pub mod lower;

use crate::analysis::SuspendSet;
use crate::ast::{ConstructId, ConstructKind, Expr, MethodBody, Statement, SwitchClause};
use crate::error::{BackendError, BackendResult};
use crate::ir::{BasicBlock, BasicBlockId, ExceptionHandler, Method, Terminator};
use crate::structure::{BlockMap, RegionId, RegionKind};
use lower::{binary_branch_condition, branch_condition, lower_instruction};
use rustc_hash::FxHashMap;

/// Translate a whole method with the given block map
pub fn translate_method(method: &Method, map: &BlockMap) -> BackendResult<MethodBody> {
    Translator::new(method, &method.blocks, map).translate()
}

struct OpenConstruct {
    region: Option<RegionId>,
    id: Option<ConstructId>,
    body: Vec<Statement>,
}

struct Bookmark {
    handler: ExceptionHandler,
    depth: usize,
    offset: usize,
}

pub struct Translator<'a> {
    method: &'a Method,
    blocks: &'a [BasicBlock],
    map: &'a BlockMap,
    part_targets: Option<&'a FxHashMap<BasicBlockId, usize>>,
    suspend_set: Option<&'a SuspendSet>,
    body: MethodBody,
    stack: Vec<OpenConstruct>,
    bookmarks: Vec<Bookmark>,
}

impl<'a> Translator<'a> {
    pub fn new(method: &'a Method, blocks: &'a [BasicBlock], map: &'a BlockMap) -> Self {
        Self {
            method,
            blocks,
            map,
            part_targets: None,
            suspend_set: None,
            body: MethodBody::new(method.variable_count),
            stack: vec![OpenConstruct {
                region: None,
                id: None,
                body: Vec::new(),
            }],
            bookmarks: Vec::new(),
        }
    }

    /// Jumps to these nodes transfer to the given part
    pub fn with_part_targets(mut self, targets: &'a FxHashMap<BasicBlockId, usize>) -> Self {
        self.part_targets = Some(targets);
        self
    }

    /// Continue allocating constructs and temporaries from `body`; its
    /// statements are replaced by the translation
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = body;
        self
    }

    /// Mark suspending invocations and class initializations
    pub fn with_suspend_set(mut self, set: &'a SuspendSet) -> Self {
        self.suspend_set = Some(set);
        self
    }

    pub fn translate(mut self) -> BackendResult<MethodBody> {
        let (map, blocks) = (self.map, self.blocks);
        for pos in 0..map.len() {
            while self.stack.len() > 1 && self.top_region_end() == Some(pos) {
                self.close_top()?;
            }
            for &region in map.regions_starting_at(pos) {
                self.open(region);
            }

            let node = map
                .node_at(pos)
                .ok_or_else(|| BackendError::internal("block map position out of range"))?;
            let block = blocks.get(node.index()).ok_or_else(|| {
                BackendError::malformed(&self.method.reference, format!("no block {}", node))
            })?;
            if block.id != node {
                return Err(BackendError::malformed(
                    &self.method.reference,
                    format!("block at index {} is labelled {}", node.index(), block.id),
                ));
            }
            self.sync_bookmarks(&block.handlers)?;
            self.translate_block(pos, block)?;
        }

        while self.stack.len() > 1 {
            self.close_top()?;
        }
        while let Some(bookmark) = self.bookmarks.pop() {
            self.wrap(0, bookmark.offset, &bookmark.handler)?;
        }

        let mut body = self.body;
        if let Some(root) = self.stack.pop() {
            body.statements = root.body;
        }
        Ok(body)
    }

    // ========================================================================
    // Construct stack
    // ========================================================================

    fn top_region_end(&self) -> Option<usize> {
        let region = self.stack.last()?.region?;
        Some(self.map.region(region).end)
    }

    fn open(&mut self, region: RegionId) {
        let kind = match self.map.region(region).kind {
            RegionKind::Block => ConstructKind::Block,
            RegionKind::Loop => ConstructKind::Loop,
        };
        let id = self.body.constructs.alloc(kind);
        self.stack.push(OpenConstruct {
            region: Some(region),
            id: Some(id),
            body: Vec::new(),
        });
    }

    fn close_top(&mut self) -> BackendResult<()> {
        let depth = self.stack.len() - 1;
        for i in (0..self.bookmarks.len()).rev() {
            if self.bookmarks[i].depth == depth {
                let (offset, handler) = (self.bookmarks[i].offset, self.bookmarks[i].handler.clone());
                self.wrap(depth, offset, &handler)?;
            }
        }

        let open = self
            .stack
            .pop()
            .ok_or_else(|| BackendError::internal("construct stack underflow"))?;
        let (Some(region), Some(id)) = (open.region, open.id) else {
            return Err(BackendError::internal("closing the root construct"));
        };
        let stmt = match self.map.region(region).kind {
            RegionKind::Block => Statement::Block {
                id,
                body: open.body,
            },
            RegionKind::Loop => Statement::Loop {
                id,
                condition: None,
                body: open.body,
            },
        };
        let parent = self
            .stack
            .last_mut()
            .ok_or_else(|| BackendError::internal("construct stack underflow"))?;
        parent.body.push(stmt);
        let offset = parent.body.len();
        for bookmark in &mut self.bookmarks {
            if bookmark.depth == depth {
                bookmark.depth = depth - 1;
                bookmark.offset = offset;
            }
        }
        Ok(())
    }

    fn emit(&mut self, stmt: Statement) {
        if let Some(top) = self.stack.last_mut() {
            top.body.push(stmt);
        }
    }

    // ========================================================================
    // Protected regions
    // ========================================================================

    fn sync_bookmarks(&mut self, handlers: &[ExceptionHandler]) -> BackendResult<()> {
        let common = self
            .bookmarks
            .iter()
            .zip(handlers)
            .take_while(|(bookmark, handler)| &bookmark.handler == *handler)
            .count();

        while self.bookmarks.len() > common {
            let Some(bookmark) = self.bookmarks.pop() else {
                break;
            };
            for depth in (bookmark.depth + 1..self.stack.len()).rev() {
                self.wrap(depth, 0, &bookmark.handler)?;
            }
            self.wrap(bookmark.depth, bookmark.offset, &bookmark.handler)?;
        }

        let depth = self.stack.len() - 1;
        let offset = self.stack[depth].body.len();
        for handler in &handlers[common..] {
            self.bookmarks.push(Bookmark {
                handler: handler.clone(),
                depth,
                offset,
            });
        }
        Ok(())
    }

    /// Wrap `stack[depth].body[offset..]` into a try/catch for `handler`
    fn wrap(&mut self, depth: usize, offset: usize, handler: &ExceptionHandler) -> BackendResult<()> {
        if offset >= self.stack[depth].body.len() {
            return Ok(());
        }
        let jump = self.jump(depth, None, handler.handler, handler.handler)?;
        let protected: Vec<Statement> = self.stack[depth].body.drain(offset..).collect();
        self.stack[depth].body.push(Statement::TryCatch {
            protected,
            exception_type: handler.exception_type.clone(),
            exception_var: handler.exception_var,
            handler: jump,
        });
        Ok(())
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Statements transferring control from `depth` to `target`.
    ///
    /// With a source position, a jump to the natural successor is empty.
    fn jump(
        &self,
        depth: usize,
        position: Option<usize>,
        target: BasicBlockId,
        from: BasicBlockId,
    ) -> BackendResult<Vec<Statement>> {
        if let Some(&part) = self.part_targets.and_then(|targets| targets.get(&target)) {
            return Ok(vec![Statement::GotoPart(part)]);
        }
        if self.map.position(target).is_none() {
            return Err(BackendError::MissingBlockMapEntry {
                method: self.method.reference.to_string(),
                block: target,
            });
        }
        if let Some(pos) = position {
            if self.map.natural_successor(pos) == Some(target) {
                return Ok(vec![]);
            }
        }
        for open in self.stack[1..=depth].iter().rev() {
            let (Some(region), Some(id)) = (open.region, open.id) else {
                continue;
            };
            if self.map.region(region).kind == RegionKind::Loop && self.map.head(region) == target {
                return Ok(vec![Statement::Continue { target: id }]);
            }
            if self.map.exit_target(region) == Some(target) {
                return Ok(vec![Statement::Break { target: id }]);
            }
        }
        Err(BackendError::UnresolvedJump {
            method: self.method.reference.to_string(),
            from,
            to: target,
        })
    }

    fn translate_block(&mut self, pos: usize, block: &BasicBlock) -> BackendResult<()> {
        for instr in &block.instructions {
            let stmt = lower_instruction(instr, self.suspend_set).map_err(|e| {
                BackendError::malformed(&self.method.reference, format!("{}: {}", block.id, e.0))
            })?;
            if let Some(stmt) = stmt {
                self.emit(stmt);
            }
        }

        let depth = self.stack.len() - 1;
        let location = block.terminator_location.clone();
        match &block.terminator {
            Terminator::Jump { target } => {
                for stmt in self.jump(depth, Some(pos), *target, block.id)? {
                    self.emit(stmt);
                }
            }
            Terminator::Branch {
                condition,
                operand,
                consequent,
                alternative,
            } => {
                let then_jump = self.jump(depth, Some(pos), *consequent, block.id)?;
                let else_jump = self.jump(depth, Some(pos), *alternative, block.id)?;
                let stmt = match (then_jump.is_empty(), else_jump.is_empty()) {
                    (true, true) => None,
                    (true, false) => Some((branch_condition(condition.inverse(), *operand), else_jump, vec![])),
                    (false, _) => Some((branch_condition(*condition, *operand), then_jump, else_jump)),
                };
                if let Some((cond, consequent, alternative)) = stmt {
                    self.emit(Statement::Conditional {
                        condition: cond.at(location),
                        consequent,
                        alternative,
                    });
                }
            }
            Terminator::BinaryBranch {
                condition,
                first,
                second,
                consequent,
                alternative,
            } => {
                let then_jump = self.jump(depth, Some(pos), *consequent, block.id)?;
                let else_jump = self.jump(depth, Some(pos), *alternative, block.id)?;
                let stmt = match (then_jump.is_empty(), else_jump.is_empty()) {
                    (true, true) => None,
                    (true, false) => Some((
                        binary_branch_condition(condition.inverse(), *first, *second),
                        else_jump,
                        vec![],
                    )),
                    (false, _) => Some((
                        binary_branch_condition(*condition, *first, *second),
                        then_jump,
                        else_jump,
                    )),
                };
                if let Some((cond, consequent, alternative)) = stmt {
                    self.emit(Statement::Conditional {
                        condition: cond.at(location),
                        consequent,
                        alternative,
                    });
                }
            }
            Terminator::Switch {
                value,
                cases,
                default,
            } => {
                let id = self.body.constructs.alloc(ConstructKind::Switch);
                let mut groups: Vec<(BasicBlockId, Vec<i32>)> = Vec::new();
                for &(case, target) in cases {
                    if target == *default {
                        continue;
                    }
                    match groups.iter_mut().find(|(t, _)| *t == target) {
                        Some((_, values)) => values.push(case),
                        None => groups.push((target, vec![case])),
                    }
                }
                let mut clauses = Vec::with_capacity(groups.len());
                for (target, values) in groups {
                    let body = self.switch_jump(depth, pos, target, block.id, id)?;
                    clauses.push(SwitchClause { values, body });
                }
                let default = self.switch_jump(depth, pos, *default, block.id, id)?;
                self.emit(Statement::Switch {
                    id,
                    value: Expr::var(*value).at(location),
                    clauses,
                    default,
                });
            }
            Terminator::Return { value } => self.emit(Statement::Return {
                value: value.map(Expr::var),
                location,
            }),
            Terminator::Throw { exception } => self.emit(Statement::Throw {
                exception: Expr::var(*exception),
                location,
            }),
            Terminator::Unreachable => {}
        }
        Ok(())
    }

    /// Clause body: the jump, or a break out of the switch for fallthrough
    fn switch_jump(
        &self,
        depth: usize,
        pos: usize,
        target: BasicBlockId,
        from: BasicBlockId,
        switch: ConstructId,
    ) -> BackendResult<Vec<Statement>> {
        let jump = self.jump(depth, Some(pos), target, from)?;
        if jump.is_empty() {
            Ok(vec![Statement::Break { target: switch }])
        } else {
            Ok(jump)
        }
    }
}
