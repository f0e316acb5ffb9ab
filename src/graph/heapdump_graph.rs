use super::{GraphError, ObjectId, SnapshotGraph};
use crate::HeapDump;
use fixedbitset::FixedBitSet;
use std::collections::HashMap;

/// [`SnapshotGraph`] over a decoded [`HeapDump`].
///
/// Ids are assigned in the order objects appear in the dump. Outbound
/// references are kept in compressed sparse-row form so that the whole
/// graph costs a handful of flat arrays.
pub struct HeapDumpGraph {
    addresses: Vec<u64>,
    sizes: Vec<u64>,
    klasses: Vec<u64>,
    edge_offsets: Vec<usize>,
    edge_targets: Vec<ObjectId>,
    roots: Vec<ObjectId>,
    root_set: FixedBitSet,
    klass_names: HashMap<u64, String>,
    dangling_edges: u64,
}

impl HeapDumpGraph {
    pub fn new(heapdump: &HeapDump) -> Result<Self, GraphError> {
        let n = heapdump.objects.len();
        if n > u32::MAX as usize {
            return Err(GraphError::TooManyObjects(n));
        }
        let mut ids: HashMap<u64, ObjectId> = HashMap::with_capacity(n);
        let mut addresses = Vec::with_capacity(n);
        let mut sizes = Vec::with_capacity(n);
        let mut klasses = Vec::with_capacity(n);
        for (i, o) in heapdump.objects.iter().enumerate() {
            let id = ObjectId::new(i as u32);
            if ids.insert(o.start, id).is_some() {
                return Err(GraphError::Corrupt(format!(
                    "two objects start at 0x{:x}",
                    o.start
                )));
            }
            addresses.push(o.start);
            sizes.push(o.size);
            klasses.push(o.klass);
        }

        let mut dangling_edges = 0;
        let mut edge_offsets = Vec::with_capacity(n + 1);
        let mut edge_targets = vec![];
        // per-object duplicate filter, cleared after each object
        let mut seen = FixedBitSet::with_capacity(n);
        edge_offsets.push(0);
        for o in &heapdump.objects {
            let first = edge_targets.len();
            for e in &o.edges {
                if e.objref == 0 {
                    continue;
                }
                let Some(&child) = ids.get(&e.objref) else {
                    dangling_edges += 1;
                    continue;
                };
                if !seen.put(child.index()) {
                    edge_targets.push(child);
                }
            }
            for child in &edge_targets[first..] {
                seen.set(child.index(), false);
            }
            edge_offsets.push(edge_targets.len());
        }

        let mut roots = vec![];
        let mut root_set = FixedBitSet::with_capacity(n);
        for root in &heapdump.roots {
            if root.objref == 0 {
                continue;
            }
            let Some(&id) = ids.get(&root.objref) else {
                dangling_edges += 1;
                continue;
            };
            if !root_set.put(id.index()) {
                roots.push(id);
            }
        }
        if dangling_edges != 0 {
            warn!(
                "{} references point outside the heapdump and were dropped",
                dangling_edges
            );
        }
        debug!(
            "Indexed {} objects, {} edges, {} distinct roots",
            n,
            edge_targets.len(),
            roots.len()
        );

        let klass_names = heapdump
            .klasses
            .iter()
            .map(|k| (k.id, k.name.clone()))
            .collect();

        Ok(HeapDumpGraph {
            addresses,
            sizes,
            klasses,
            edge_offsets,
            edge_targets,
            roots,
            root_set,
            klass_names,
            dangling_edges,
        })
    }

    fn check(&self, id: ObjectId) -> Result<usize, GraphError> {
        let i = id.index();
        if i < self.sizes.len() {
            Ok(i)
        } else {
            Err(GraphError::UnknownObject(id))
        }
    }

    pub fn address(&self, id: ObjectId) -> Result<u64, GraphError> {
        Ok(self.addresses[self.check(id)?])
    }

    pub fn edge_count(&self) -> usize {
        self.edge_targets.len()
    }

    /// References to addresses missing from the dump
    pub fn dangling_edges(&self) -> u64 {
        self.dangling_edges
    }
}

impl SnapshotGraph for HeapDumpGraph {
    fn object_count(&self) -> usize {
        self.sizes.len()
    }

    fn heap_size(&self, id: ObjectId) -> Result<u64, GraphError> {
        Ok(self.sizes[self.check(id)?])
    }

    fn outbound_references(&self, id: ObjectId) -> Result<&[ObjectId], GraphError> {
        let i = self.check(id)?;
        Ok(&self.edge_targets[self.edge_offsets[i]..self.edge_offsets[i + 1]])
    }

    fn gc_roots(&self) -> Result<&[ObjectId], GraphError> {
        Ok(&self.roots)
    }

    fn is_gc_root(&self, id: ObjectId) -> Result<bool, GraphError> {
        Ok(self.root_set.contains(self.check(id)?))
    }

    fn technical_name(&self, id: ObjectId) -> Result<String, GraphError> {
        let class = self.class_name(id)?;
        Ok(format!("{} @ 0x{:x}", class, self.address(id)?))
    }

    fn class_name(&self, id: ObjectId) -> Result<String, GraphError> {
        let klass = self.klasses[self.check(id)?];
        self.klass_names
            .get(&klass)
            .cloned()
            .ok_or(GraphError::UnknownClass { id, klass })
    }
}
