//! Structural index of control-flow graphs
//!
//! The translator consumes a [`BlockMap`]. Methods may bring their own; the
//! [`LoopNestIndexer`] computes one for methods and async parts that do not.

pub mod block_map;
pub mod indexer;

pub use block_map::{BlockMap, NodeRole, Region, RegionId, RegionKind};
pub use indexer::{GraphIndexer, GraphView, IndexError, LoopNestIndexer};
