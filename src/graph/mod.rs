use std::fmt;
use thiserror::Error;

/// Dense index of an object within a snapshot, `0..object_count()`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Default)]
#[repr(transparent)]
pub struct ObjectId(u32);

impl ObjectId {
    pub const fn new(raw: u32) -> Self {
        ObjectId(raw)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }

    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("object {0} is not part of the snapshot")]
    UnknownObject(ObjectId),
    #[error("object {id} has unknown class 0x{klass:x}")]
    UnknownClass { id: ObjectId, klass: u64 },
    #[error("snapshot has {0} objects, more than can be indexed")]
    TooManyObjects(usize),
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

/// Read-only view of a heap snapshot's object graph.
///
/// This is everything the weighted tree needs from a snapshot: sizes,
/// outbound references and GC roots for the build pass, and names for
/// labelling. Implementations must return each outbound reference at most
/// once per object; children are reconstructed from these lists.
pub trait SnapshotGraph {
    fn object_count(&self) -> usize;
    /// Shallow size of the object in bytes
    fn heap_size(&self, id: ObjectId) -> Result<u64, GraphError>;
    fn outbound_references(&self, id: ObjectId) -> Result<&[ObjectId], GraphError>;
    fn gc_roots(&self) -> Result<&[ObjectId], GraphError>;
    fn is_gc_root(&self, id: ObjectId) -> Result<bool, GraphError>;
    /// Human readable identity of a single object, e.g. `java.lang.String @ 0x7f00`
    fn technical_name(&self, id: ObjectId) -> Result<String, GraphError>;
    fn class_name(&self, id: ObjectId) -> Result<String, GraphError>;
}

mod heapdump_graph;
pub use heapdump_graph::HeapDumpGraph;

#[cfg(test)]
mod vec_graph;
#[cfg(test)]
pub(crate) use vec_graph::VecGraph;
