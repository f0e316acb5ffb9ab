use super::{Node, Parent, TreeError, WeightedTree};
use crate::graph::{GraphError, ObjectId, SnapshotGraph};
use crate::label::{format_bytes, object_label, LABEL_PLACEHOLDER};

/// Read-only browsing context over an initialized [`WeightedTree`].
///
/// Holds a one-slot cache so that the usual "can this node be expanded?"
/// followed by "give me its children" pair only scans the snapshot once.
/// The cache belongs to the navigator, so several threads can browse the
/// same tree, each with a navigator of its own.
pub struct Navigator<'t, 'g, G: SnapshotGraph + ?Sized> {
    tree: &'t WeightedTree<'g, G>,
    prepared: Option<(Node, Children<'t>)>,
}

impl<'t, 'g, G: SnapshotGraph + ?Sized> Navigator<'t, 'g, G> {
    pub(super) fn new(tree: &'t WeightedTree<'g, G>) -> Self {
        Navigator {
            tree,
            prepared: None,
        }
    }

    pub fn tree(&self) -> &'t WeightedTree<'g, G> {
        self.tree
    }

    pub fn root(&self) -> Node {
        Node::Root
    }

    /// `None` for the root and for objects no GC root reaches.
    pub fn parent(&self, node: Node) -> Option<Node> {
        let id = node.id()?;
        match self.tree.parent.get(id.index())? {
            Parent::Unreached => None,
            Parent::GcRoot => Some(Node::Root),
            Parent::Object(p) => Some(Node::Object(*p)),
        }
    }

    pub fn has_children(&mut self, node: Node) -> Result<bool, TreeError> {
        self.prepared = None;
        let mut children = self.scan_children(node)?;
        let found = children.seek();
        self.prepared = Some((node, children));
        Ok(found)
    }

    /// Children of `node` in the snapshot's reference order.
    ///
    /// Served from the iterator prepared by [`Navigator::has_children`] when
    /// it was called for the same node right before.
    pub fn children(&mut self, node: Node) -> Result<Children<'t>, TreeError> {
        match self.prepared.take() {
            Some((prepared, children)) if prepared == node => Ok(children),
            _ => Ok(self.scan_children(node)?),
        }
    }

    /// Retained weight in bytes. The virtual root has no size of its own
    /// and reports 0; see [`WeightedTree::total_weight`].
    pub fn weight(&self, node: Node) -> u64 {
        match node {
            Node::Root => 0,
            Node::Object(id) => self.tree.weight.get(id.index()).copied().unwrap_or(0),
        }
    }

    /// `"<technical name> (<size>/<retained>)"`, or a placeholder when the
    /// snapshot cannot describe the object.
    pub fn label(&self, node: Node) -> String {
        match node {
            Node::Root => format!("GC roots ({})", format_bytes(self.tree.total_weight)),
            Node::Object(id) => object_label(self.tree.graph, id, self.weight(node))
                .unwrap_or_else(|e| {
                    debug!("No label for {}: {}", id, e);
                    LABEL_PLACEHOLDER.to_string()
                }),
        }
    }

    pub fn class_name(&self, node: Node) -> Option<String> {
        self.tree.graph.class_name(node.id()?).ok()
    }

    fn scan_children(&self, node: Node) -> Result<Children<'t>, GraphError> {
        let tree: &'t WeightedTree<'g, G> = self.tree;
        let graph: &'g G = tree.graph;
        Ok(match node {
            Node::Root => Children {
                candidates: graph.gc_roots()?,
                parents: &tree.parent,
                expected: None,
                pos: 0,
            },
            Node::Object(id) => Children {
                candidates: graph.outbound_references(id)?,
                parents: &tree.parent,
                expected: Some(Parent::Object(id)),
                pos: 0,
            },
        })
    }
}

/// Lazy, single pass iterator over the tree children of one node.
///
/// Walks the parent's outbound references and keeps those the build pass
/// attached to this parent. Children of the root are the GC roots as is.
pub struct Children<'t> {
    candidates: &'t [ObjectId],
    parents: &'t [Parent],
    expected: Option<Parent>,
    pos: usize,
}

impl Children<'_> {
    /// Moves to the next accepted candidate without consuming it.
    fn seek(&mut self) -> bool {
        if let Some(expected) = self.expected {
            while let Some(c) = self.candidates.get(self.pos) {
                if self.parents.get(c.index()) == Some(&expected) {
                    break;
                }
                self.pos += 1;
            }
        }
        self.pos < self.candidates.len()
    }
}

impl Iterator for Children<'_> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        if !self.seek() {
            return None;
        }
        let c = self.candidates[self.pos];
        self.pos += 1;
        Some(Node::Object(c))
    }
}
