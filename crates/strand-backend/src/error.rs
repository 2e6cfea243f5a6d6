//! Backend errors
//!
//! Every variant is fatal: a unit either compiles completely or not at all.

use crate::config::ConfigError;
use crate::ir::{BasicBlockId, MethodRef, Var};
use crate::structure::IndexError;
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Block {block} of {method} has no entry in the block map")]
    MissingBlockMapEntry { method: String, block: BasicBlockId },

    #[error("Jump from {from} to {to} in {method} matches no enclosing construct")]
    UnresolvedJump {
        method: String,
        from: BasicBlockId,
        to: BasicBlockId,
    },

    #[error("Invalid block map for {method}: {message}")]
    InvalidBlockMap { method: String, message: String },

    #[error("Control flow of {method} is irreducible at {block}")]
    IrreducibleGraph { method: String, block: BasicBlockId },

    #[error("Malformed IR in {method}: {message}")]
    MalformedIr { method: String, message: String },

    #[error("Block {block} of {method} uses unknown variable {var}")]
    UnknownVariable {
        method: String,
        block: BasicBlockId,
        var: Var,
    },

    #[error("Unknown method {0}")]
    UnknownMethod(MethodRef),

    #[error("{}", format_sync_claims(.0))]
    SyncClaimViolated(Vec<MethodRef>),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Internal backend error: {message}")]
    Internal { message: String },
}

impl BackendError {
    pub fn malformed(method: impl ToString, message: impl Into<String>) -> Self {
        BackendError::MalformedIr {
            method: method.to_string(),
            message: message.into(),
        }
    }

    /// Attribute a graph-indexing failure to `method`
    pub fn from_index(method: &MethodRef, err: IndexError) -> Self {
        match err {
            IndexError::Irreducible(block) => BackendError::IrreducibleGraph {
                method: method.to_string(),
                block,
            },
            IndexError::DanglingEdge { from, to } => {
                BackendError::malformed(method, format!("edge {} -> {} leaves the graph", from, to))
            }
            IndexError::Invalid(message) => BackendError::InvalidBlockMap {
                method: method.to_string(),
                message,
            },
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        BackendError::Internal {
            message: message.into(),
        }
    }
}

fn format_sync_claims(methods: &[MethodRef]) -> String {
    methods
        .iter()
        .map(|m| {
            format!(
                "Method {} is claimed to be synchronous, but it has invocations of asynchronous methods",
                m
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
