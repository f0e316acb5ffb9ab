use super::{GraphError, ObjectId, SnapshotGraph};

/// Small in-memory snapshot for unit tests.
pub(crate) struct VecGraph {
    sizes: Vec<u64>,
    refs: Vec<Vec<ObjectId>>,
    roots: Vec<ObjectId>,
    failing: Option<ObjectId>,
}

impl VecGraph {
    pub(crate) fn new(sizes: &[u64], roots: &[u32]) -> Self {
        VecGraph {
            sizes: sizes.to_vec(),
            refs: vec![vec![]; sizes.len()],
            roots: roots.iter().map(|r| ObjectId::new(*r)).collect(),
            failing: None,
        }
    }

    pub(crate) fn edge(mut self, from: u32, to: &[u32]) -> Self {
        self.refs[from as usize] = to.iter().map(|t| ObjectId::new(*t)).collect();
        self
    }

    /// Every lookup about `id` fails from now on
    pub(crate) fn failing(mut self, id: u32) -> Self {
        self.failing = Some(ObjectId::new(id));
        self
    }

    pub(crate) fn chain(len: u32, size: u64) -> Self {
        let mut graph = VecGraph::new(&vec![size; len as usize], &[0]);
        for i in 1..len {
            graph = graph.edge(i - 1, &[i]);
        }
        graph
    }

    fn check(&self, id: ObjectId) -> Result<usize, GraphError> {
        if Some(id) == self.failing || id.index() >= self.sizes.len() {
            Err(GraphError::UnknownObject(id))
        } else {
            Ok(id.index())
        }
    }
}

impl SnapshotGraph for VecGraph {
    fn object_count(&self) -> usize {
        self.sizes.len()
    }

    fn heap_size(&self, id: ObjectId) -> Result<u64, GraphError> {
        Ok(self.sizes[self.check(id)?])
    }

    fn outbound_references(&self, id: ObjectId) -> Result<&[ObjectId], GraphError> {
        Ok(&self.refs[self.check(id)?])
    }

    fn gc_roots(&self) -> Result<&[ObjectId], GraphError> {
        Ok(&self.roots)
    }

    fn is_gc_root(&self, id: ObjectId) -> Result<bool, GraphError> {
        Ok(self.roots.contains(&id))
    }

    fn technical_name(&self, id: ObjectId) -> Result<String, GraphError> {
        Ok(format!("{} @ 0x{:x}", self.class_name(id)?, 0x1000 + 0x10 * id.raw()))
    }

    fn class_name(&self, id: ObjectId) -> Result<String, GraphError> {
        self.check(id)?;
        Ok(format!("Obj{}", id.raw()))
    }
}
