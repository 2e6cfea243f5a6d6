//! Backend driver
//!
//! Compiles a whole unit in a fixed order:
//!
//! 1. every method with a body is indexed (unless it ships a block map),
//!    translated and decomposed without suspension knowledge
//! 2. the suspension analysis runs over those trees to a fixpoint
//! 3. methods in the suspend set are recompiled part by part
//! 4. names are estimated over the final trees and frozen
//! 5. the renderer prints the unit
//!
//! Any error aborts the unit; there is no partial output.

use crate::analysis::{analyze_bodies, SuspendSet};
use crate::ast::{walk_statements, MethodBody, Statement};
use crate::config::BackendConfig;
use crate::decompose::decompose;
use crate::error::{BackendError, BackendResult};
use crate::ir::{Method, MethodRef, Unit};
use crate::naming::{NameFrequencyEstimator, NameTable};
use crate::render::{RenderedUnit, Renderer};
use crate::statemachine::{AsyncCompiler, AsyncMethod};
use crate::structure::{BlockMap, GraphIndexer, GraphView, LoopNestIndexer};
use crate::translate::translate_method;
use rustc_hash::{FxHashMap, FxHashSet};

/// Final tree of one method
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledBody {
    Regular(MethodBody),
    Async(AsyncMethod),
}

impl CompiledBody {
    pub fn is_async(&self) -> bool {
        matches!(self, CompiledBody::Async(_))
    }

    pub fn as_async(&self) -> Option<&AsyncMethod> {
        match self {
            CompiledBody::Async(body) => Some(body),
            CompiledBody::Regular(_) => None,
        }
    }
}

/// A unit with every body compiled, ready for naming and rendering
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub unit: Unit,
    pub bodies: FxHashMap<MethodRef, CompiledBody>,
    pub suspend_set: SuspendSet,
}

impl CompiledUnit {
    pub fn body(&self, method: &MethodRef) -> Option<&CompiledBody> {
        self.bodies.get(method)
    }

    /// Count frequencies over declarations and every compiled tree
    pub fn name_table(&self, minify: bool) -> NameTable {
        let mut estimator = NameFrequencyEstimator::new();
        estimator.add_unit(&self.unit);
        for method in self.unit.methods() {
            match self.bodies.get(&method.reference) {
                Some(CompiledBody::Regular(body)) => estimator.add_statements(&body.statements),
                Some(CompiledBody::Async(body)) => {
                    for part in &body.parts {
                        estimator.add_statements(&part.statements);
                    }
                }
                None => {}
            }
        }
        estimator.freeze(minify)
    }
}

pub struct Backend {
    config: BackendConfig,
    indexer: Box<dyn GraphIndexer>,
}

impl Backend {
    pub fn new(config: BackendConfig) -> Self {
        Self::with_indexer(config, Box::new(LoopNestIndexer))
    }

    /// Use a custom indexer for graphs without a precomputed block map
    pub fn with_indexer(config: BackendConfig, indexer: Box<dyn GraphIndexer>) -> Self {
        Self { config, indexer }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Run every pass up to, not including, rendering
    pub fn compile(&self, unit: Unit) -> BackendResult<CompiledUnit> {
        self.config.validate()?;
        let _span = tracing::info_span!("compile_unit", classes = unit.classes.len()).entered();

        let mut bodies: FxHashMap<MethodRef, MethodBody> = FxHashMap::default();
        for method in unit.methods().filter(|m| m.has_body()) {
            let body = self.compile_regular(method)?;
            bodies.insert(method.reference.clone(), body);
        }

        let suspend_set = analyze_bodies(&unit, &self.config, &bodies)?;
        tracing::debug!(suspending = suspend_set.len(), "suspension analysis finished");

        let mut compiled: FxHashMap<MethodRef, CompiledBody> = FxHashMap::default();
        for method in unit.methods().filter(|m| m.has_body()) {
            let reference = &method.reference;
            let body = if suspend_set.contains(reference) {
                let resumable = AsyncCompiler::new(method, &suspend_set, self.indexer.as_ref()).compile()?;
                tracing::debug!(
                    method = %reference,
                    parts = resumable.part_count(),
                    live = resumable.live.len(),
                    protected = resumable.has_protected_regions(),
                    "compiled resumable method"
                );
                CompiledBody::Async(resumable)
            } else {
                let body = bodies
                    .remove(reference)
                    .ok_or_else(|| BackendError::UnknownMethod(reference.clone()))?;
                CompiledBody::Regular(body)
            };
            compiled.insert(reference.clone(), body);
        }

        Ok(CompiledUnit {
            unit,
            bodies: compiled,
            suspend_set,
        })
    }

    pub fn render(&self, compiled: &CompiledUnit) -> RenderedUnit {
        let names = compiled.name_table(self.config.minify);
        Renderer::new(&self.config, compiled, &names).render()
    }

    /// Compile and render in one step
    pub fn compile_unit(&self, unit: Unit) -> BackendResult<RenderedUnit> {
        let compiled = self.compile(unit)?;
        Ok(self.render(&compiled))
    }

    fn compile_regular(&self, method: &Method) -> BackendResult<MethodBody> {
        let _span = tracing::debug_span!("method", method = %method.reference).entered();
        check_variables(method)?;
        let mut body = match &method.block_map {
            Some(map) => translate_method(method, map)?,
            None => {
                let map = self.index(method)?;
                translate_method(method, &map)?
            }
        };
        decompose(&mut body);
        check_constructs(method, &body)?;
        Ok(body)
    }

    fn index(&self, method: &Method) -> BackendResult<BlockMap> {
        let detached = FxHashSet::default();
        let view = GraphView::new(&method.blocks, method.entry(), &detached);
        self.indexer
            .index(&view)
            .map_err(|e| BackendError::from_index(&method.reference, e))
    }
}

/// Every slot read or written must lie below the method's variable count
fn check_variables(method: &Method) -> BackendResult<()> {
    for block in &method.blocks {
        let instructions = block
            .instructions
            .iter()
            .flat_map(|instr| instr.kind.receiver().into_iter().chain(instr.kind.uses()));
        let handlers = block.handlers.iter().filter_map(|h| h.exception_var);
        let unknown = instructions
            .chain(block.terminator.uses())
            .chain(handlers)
            .find(|var| var.0 >= method.variable_count);
        if let Some(var) = unknown {
            return Err(BackendError::UnknownVariable {
                method: method.reference.to_string(),
                block: block.id,
                var,
            });
        }
    }
    Ok(())
}

/// Every jump must name a construct allocated for this body
fn check_constructs(method: &Method, body: &MethodBody) -> BackendResult<()> {
    let mut dangling = None;
    walk_statements(&body.statements, &mut |s| {
        if let Statement::Break { target } | Statement::Continue { target } = s {
            if body.constructs.kind(*target).is_none() {
                dangling = Some(*target);
            }
        }
    });
    match dangling {
        Some(target) => Err(BackendError::internal(format!(
            "{} jumps to unallocated construct {}",
            method.reference, target.0
        ))),
        None => Ok(()),
    }
}
