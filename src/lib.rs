#[macro_use]
extern crate log;

pub mod constants;
mod export;
pub mod graph;
mod heapdump;
pub mod label;
pub mod progress;
mod sanity;
pub mod tree;

pub use crate::export::export_csv;
pub use crate::graph::{GraphError, HeapDumpGraph, ObjectId, SnapshotGraph};
pub use crate::heapdump::{HeapDump, HeapObject, Klass, NormalEdge, RootEdge};
pub use crate::progress::{LogProgress, NullProgress, ProgressListener};
pub use crate::sanity::{reachable_objects, verify_tree};
pub use crate::tree::{
    BuildStats, Children, Navigator, Node, TreeError, WeightPropagation, WeightedTree,
};
