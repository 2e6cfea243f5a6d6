//! Strand Backend - structured code generation for a cooperative runtime
//!
//! Lowers control-flow-graph methods into structured target source:
//!
//! - [`structure`]: block maps and the reference graph indexer
//! - [`translate`]: block map driven CFG to statement-tree translation
//! - [`decompose`]: hoisting of nested effects to statement boundaries
//! - [`analysis`]: suspending-call fixpoint over the unit's call graph
//! - [`statemachine`]: resumable lowering of suspending methods into parts
//! - [`naming`] and [`render`]: frozen name tables and the text printer
//! - [`eval`]: a reference evaluator over compiled trees
//!
//! [`pipeline::Backend`] runs the passes in order over a whole unit.

#![warn(rust_2018_idioms)]

pub mod analysis;
pub mod ast;
pub mod config;
pub mod decompose;
pub mod error;
pub mod eval;
pub mod ir;
pub mod naming;
pub mod pipeline;
pub mod render;
pub mod statemachine;
pub mod structure;
pub mod translate;

pub use analysis::SuspendSet;
pub use config::{BackendConfig, ConfigError, RuntimeNames};
pub use error::{BackendError, BackendResult};
pub use ir::{ClassDef, Method, MethodRef, Unit};
pub use pipeline::{Backend, CompiledBody, CompiledUnit};
pub use render::RenderedUnit;
