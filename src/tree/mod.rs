use crate::constants::*;
use crate::graph::{GraphError, ObjectId, SnapshotGraph};
use crate::progress::ProgressListener;
use clap::ValueEnum;
use fixedbitset::FixedBitSet;
use int_stack::IntStack;
use std::time::Instant;
use thiserror::Error;

mod navigator;
pub use navigator::{Children, Navigator};

const TASK_NAME: &str = "Converting object graph to weighted tree";

/// A node of the weighted tree.
///
/// `Root` is a virtual node that does not exist in the snapshot; its
/// children are the GC roots. Nodes are plain values and compare by id.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Node {
    Root,
    Object(ObjectId),
}

impl Node {
    pub fn id(&self) -> Option<ObjectId> {
        match self {
            Node::Root => None,
            Node::Object(id) => Some(*id),
        }
    }
}

/// Tree parent of an object, as recorded by the build pass.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub(crate) enum Parent {
    /// Not reachable from any GC root, so not part of the tree
    #[default]
    Unreached,
    /// A GC root, parented by the virtual root
    GcRoot,
    Object(ObjectId),
}

/// How retained weights flow up to ancestors during the build pass.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum, Debug, Default)]
#[clap(rename_all = "verbatim")]
pub enum WeightPropagation {
    /// Add each object's size to every ancestor when the object is visited.
    /// Cost grows with the sum of all depths.
    #[default]
    WalkUp,
    /// Add each subtree's weight to its parent once the subtree is finished,
    /// using exit markers on the traversal stack. Linear cost.
    PostOrder,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("weighted tree is already initialized")]
    AlreadyInitialized,
    #[error("conversion to weighted tree was cancelled")]
    Cancelled,
    #[error("weighted tree is not initialized or its construction failed")]
    Unusable,
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildStats {
    /// GC roots that started a traversal
    pub gc_roots: u64,
    pub visited_objects: u64,
    /// Stack entries popped for objects that were already visited
    pub stale_entries: u64,
    /// Weight additions made to ancestors
    pub propagation_steps: u64,
    pub peak_stack: usize,
    pub stack_capacity: usize,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum State {
    Uninitialized,
    Ready,
    Failed,
}

enum TraversalStack {
    WalkUp(IntStack<u32>),
    PostOrder(IntStack<u64>),
}

impl TraversalStack {
    fn capacity(&self) -> usize {
        match self {
            TraversalStack::WalkUp(s) => s.capacity(),
            TraversalStack::PostOrder(s) => s.capacity(),
        }
    }
}

/// Sizes come from the snapshot, so a corrupt one can overflow a sum.
pub(crate) fn add_weight(weight: u64, size: u64) -> Result<u64, GraphError> {
    weight.checked_add(size).ok_or_else(|| {
        GraphError::Corrupt(format!("retained weight {} + {} overflows", weight, size))
    })
}

/// Marks a post-order stack entry as the end of the object's subtree
const EXIT_MARKER: u64 = 1 << 32;

/// A spanning forest of a snapshot's object graph with retained weights.
///
/// The forest is only stored as a parent per object; children are
/// reconstructed on demand from the snapshot's outbound references (see
/// [`Navigator`]). The tree is one of many that could be formed from the
/// graph: a shared object is attributed to whichever parent reaches it
/// first, so containment cannot be concluded from it.
///
/// Created empty by [`WeightedTree::new`], it must be initialized exactly
/// once. A failed initialization leaves the tree unusable.
pub struct WeightedTree<'g, G: SnapshotGraph + ?Sized> {
    graph: &'g G,
    weight: Vec<u64>,
    parent: Vec<Parent>,
    total_weight: u64,
    state: State,
    propagation: WeightPropagation,
    stack_capacity: usize,
}

impl<'g, G: SnapshotGraph + ?Sized> WeightedTree<'g, G> {
    pub fn new(graph: &'g G) -> Self {
        let n = graph.object_count();
        WeightedTree {
            graph,
            weight: vec![0; n],
            parent: vec![Parent::Unreached; n],
            total_weight: 0,
            state: State::Uninitialized,
            propagation: WeightPropagation::default(),
            stack_capacity: DEFAULT_STACK_CAPACITY,
        }
    }

    /// Creates and initializes a tree in one go.
    pub fn build<P>(graph: &'g G, progress: &mut P) -> Result<Self, TreeError>
    where
        P: ProgressListener + ?Sized,
    {
        let mut tree = Self::new(graph);
        tree.initialize(progress)?;
        Ok(tree)
    }

    pub fn with_propagation(mut self, propagation: WeightPropagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn with_stack_capacity(mut self, capacity: usize) -> Self {
        self.stack_capacity = capacity.max(1);
        self
    }

    pub fn graph(&self) -> &'g G {
        self.graph
    }

    pub fn object_count(&self) -> usize {
        self.parent.len()
    }

    pub fn is_ready(&self) -> bool {
        self.state == State::Ready
    }

    /// Sum of the retained weights of all GC roots
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn navigator(&self) -> Result<Navigator<'_, 'g, G>, TreeError> {
        match self.state {
            State::Ready => Ok(Navigator::new(self)),
            _ => Err(TreeError::Unusable),
        }
    }

    pub(crate) fn parents(&self) -> &[Parent] {
        &self.parent
    }

    pub(crate) fn weights(&self) -> &[u64] {
        &self.weight
    }

    /// Converts the object graph into the weighted tree.
    ///
    /// GC roots are walked in reverse order, each one starting an iterative
    /// depth-first traversal. Objects that are GC roots themselves are never
    /// adopted by another object. Progress is reported, and cancellation
    /// checked, once every 16 GC roots.
    pub fn initialize<P>(&mut self, progress: &mut P) -> Result<BuildStats, TreeError>
    where
        P: ProgressListener + ?Sized,
    {
        match self.state {
            State::Ready => return Err(TreeError::AlreadyInitialized),
            State::Failed => return Err(TreeError::Unusable),
            State::Uninitialized => {}
        }
        let start = Instant::now();
        match self.traverse_gc_roots(progress) {
            Ok(stats) => {
                self.state = State::Ready;
                progress.done();
                info!(
                    "Built weighted tree of {} objects from {} GC roots in {:.3} ms, {} bytes retained",
                    stats.visited_objects,
                    stats.gc_roots,
                    start.elapsed().as_micros() as f64 / 1000f64,
                    self.total_weight
                );
                debug!("{:?}", stats);
                Ok(stats)
            }
            Err(e) => {
                warn!("Discarding weighted tree: {}", e);
                self.state = State::Failed;
                self.weight = vec![];
                self.parent = vec![];
                self.total_weight = 0;
                Err(e)
            }
        }
    }

    fn check(&self, id: ObjectId) -> Result<usize, GraphError> {
        let i = id.index();
        if i < self.parent.len() {
            Ok(i)
        } else {
            Err(GraphError::UnknownObject(id))
        }
    }

    fn traverse_gc_roots<P>(&mut self, progress: &mut P) -> Result<BuildStats, TreeError>
    where
        P: ProgressListener + ?Sized,
    {
        let graph = self.graph;
        let roots = graph.gc_roots()?;
        progress.begin_task(TASK_NAME, roots.len() >> LOG_ROOTS_PER_PROGRESS_UNIT);
        let mut visited = FixedBitSet::with_capacity(self.parent.len());
        let mut stack = match self.propagation {
            WeightPropagation::WalkUp => {
                TraversalStack::WalkUp(IntStack::with_capacity(self.stack_capacity))
            }
            WeightPropagation::PostOrder => {
                TraversalStack::PostOrder(IntStack::with_capacity(self.stack_capacity))
            }
        };
        let mut stats = BuildStats::default();
        for (i, &root) in roots.iter().enumerate().rev() {
            let r = self.check(root)?;
            if !visited.contains(r) {
                match &mut stack {
                    TraversalStack::WalkUp(s) => {
                        self.traverse_walk_up(root, &mut visited, s, &mut stats)?
                    }
                    TraversalStack::PostOrder(s) => {
                        self.traverse_post_order(root, &mut visited, s, &mut stats)?
                    }
                }
                stats.gc_roots += 1;
                self.total_weight = add_weight(self.total_weight, self.weight[r])?;
            }
            if i & (ROOTS_PER_PROGRESS_UNIT - 1) == 0 {
                progress.worked(1);
                if progress.is_cancelled() {
                    return Err(TreeError::Cancelled);
                }
            }
        }
        stats.stack_capacity = stack.capacity();
        Ok(stats)
    }

    fn traverse_walk_up(
        &mut self,
        root: ObjectId,
        visited: &mut FixedBitSet,
        stack: &mut IntStack<u32>,
        stats: &mut BuildStats,
    ) -> Result<(), TreeError> {
        assert!(
            stack.is_empty(),
            "traversal stack not empty when starting GC root {}",
            root
        );
        stack.push(root.raw());
        self.parent[root.index()] = Parent::GcRoot;
        while let Some(raw) = stack.pop() {
            let node = ObjectId::new(raw);
            if visited.put(node.index()) {
                stats.stale_entries += 1;
                continue;
            }
            stats.visited_objects += 1;
            let w = self.graph.heap_size(node)?;
            self.weight[node.index()] = w;
            let mut runner = self.parent[node.index()];
            while let Parent::Object(p) = runner {
                self.weight[p.index()] = add_weight(self.weight[p.index()], w)?;
                stats.propagation_steps += 1;
                runner = self.parent[p.index()];
            }
            self.adopt_children(node, visited, |c| stack.push(c.raw()))?;
            stats.peak_stack = stats.peak_stack.max(stack.len());
        }
        Ok(())
    }

    fn traverse_post_order(
        &mut self,
        root: ObjectId,
        visited: &mut FixedBitSet,
        stack: &mut IntStack<u64>,
        stats: &mut BuildStats,
    ) -> Result<(), TreeError> {
        assert!(
            stack.is_empty(),
            "traversal stack not empty when starting GC root {}",
            root
        );
        stack.push(root.raw() as u64);
        self.parent[root.index()] = Parent::GcRoot;
        while let Some(entry) = stack.pop() {
            let node = ObjectId::new(entry as u32);
            if entry & EXIT_MARKER != 0 {
                if let Parent::Object(p) = self.parent[node.index()] {
                    self.weight[p.index()] =
                        add_weight(self.weight[p.index()], self.weight[node.index()])?;
                    stats.propagation_steps += 1;
                }
                continue;
            }
            if visited.put(node.index()) {
                stats.stale_entries += 1;
                continue;
            }
            stats.visited_objects += 1;
            self.weight[node.index()] = self.graph.heap_size(node)?;
            // below the children, so it pops once the whole subtree is done
            stack.push(entry | EXIT_MARKER);
            self.adopt_children(node, visited, |c| stack.push(c.raw() as u64))?;
            stats.peak_stack = stats.peak_stack.max(stack.len());
        }
        Ok(())
    }

    /// Claims the unvisited, non-root children of `node`, last reference
    /// first so they pop in reference order.
    ///
    /// A child may be claimed again by a later object before it is visited;
    /// the most recent claim is the one on top of the stack, so it wins.
    fn adopt_children<F>(
        &mut self,
        node: ObjectId,
        visited: &FixedBitSet,
        mut push: F,
    ) -> Result<(), TreeError>
    where
        F: FnMut(ObjectId),
    {
        let graph = self.graph;
        for &c in graph.outbound_references(node)?.iter().rev() {
            let i = self.check(c)?;
            if !visited.contains(i) && !graph.is_gc_root(c)? {
                self.parent[i] = Parent::Object(node);
                push(c);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VecGraph;
    use crate::progress::NullProgress;

    fn id(raw: u32) -> ObjectId {
        ObjectId::new(raw)
    }

    /// Cancels once `cancel_after` units of work were reported
    struct CancelAfter {
        cancel_after: usize,
        total_units: usize,
        worked: usize,
        done: bool,
    }

    impl CancelAfter {
        fn new(cancel_after: usize) -> Self {
            CancelAfter {
                cancel_after,
                total_units: 0,
                worked: 0,
                done: false,
            }
        }
    }

    impl ProgressListener for CancelAfter {
        fn begin_task(&mut self, _name: &str, total_units: usize) {
            self.total_units = total_units;
        }

        fn worked(&mut self, units: usize) {
            self.worked += units;
        }

        fn is_cancelled(&self) -> bool {
            self.worked >= self.cancel_after
        }

        fn done(&mut self) {
            self.done = true;
        }
    }

    fn build(graph: &VecGraph, propagation: WeightPropagation) -> WeightedTree<'_, VecGraph> {
        let mut tree = WeightedTree::new(graph).with_propagation(propagation);
        tree.initialize(&mut NullProgress).unwrap();
        tree
    }

    const BOTH: [WeightPropagation; 2] = [WeightPropagation::WalkUp, WeightPropagation::PostOrder];

    #[test]
    fn test_linear_chain() {
        let graph = VecGraph::new(&[10, 20, 30], &[0]).edge(0, &[1]).edge(1, &[2]);
        for propagation in BOTH {
            let tree = build(&graph, propagation);
            assert_eq!(tree.weights(), &[60, 50, 30]);
            assert_eq!(
                tree.parents(),
                &[Parent::GcRoot, Parent::Object(id(0)), Parent::Object(id(1))]
            );
            assert_eq!(tree.total_weight(), 60);
        }
    }

    #[test]
    fn test_shared_child_goes_to_last_root() {
        // roots are walked in reverse, so root 1 claims object 2
        let graph = VecGraph::new(&[5, 5, 5], &[0, 1]).edge(0, &[2]).edge(1, &[2]);
        for propagation in BOTH {
            let tree = build(&graph, propagation);
            assert_eq!(tree.parents()[2], Parent::Object(id(1)));
            assert_eq!(tree.weights(), &[5, 10, 5]);
            assert_eq!(tree.total_weight(), 15);
        }
    }

    #[test]
    fn test_cross_edge_to_gc_root() {
        // 2 -> 3 -> 0 where 0 is a root with a child of its own
        let graph = VecGraph::new(&[1, 2, 4, 8], &[0, 2])
            .edge(0, &[1])
            .edge(2, &[3])
            .edge(3, &[0]);
        for propagation in BOTH {
            let tree = build(&graph, propagation);
            assert_eq!(tree.parents()[0], Parent::GcRoot);
            assert_eq!(tree.parents()[3], Parent::Object(id(2)));
            assert_eq!(tree.weights()[3], 8);
            assert_eq!(tree.weights()[2], 12);
            assert_eq!(tree.weights()[0], 3);
        }
    }

    #[test]
    fn test_cycles_and_self_references() {
        let graph = VecGraph::new(&[1, 2, 3, 4], &[0])
            .edge(0, &[1, 0])
            .edge(1, &[2])
            .edge(2, &[0, 1, 3])
            .edge(3, &[3, 1]);
        for propagation in BOTH {
            let tree = build(&graph, propagation);
            assert_eq!(tree.weights(), &[10, 9, 7, 4]);
            assert_eq!(tree.parents()[3], Parent::Object(id(2)));
        }
    }

    #[test]
    fn test_latest_claim_wins() {
        // 0 claims 1 and 2; 1 is visited first and claims 2 again
        let graph = VecGraph::new(&[1, 10, 100], &[0])
            .edge(0, &[1, 2])
            .edge(1, &[2]);
        for propagation in BOTH {
            let tree = build(&graph, propagation);
            assert_eq!(tree.parents()[2], Parent::Object(id(1)));
            assert_eq!(tree.weights(), &[111, 110, 100]);
        }
    }

    #[test]
    fn test_unreachable_objects_stay_out() {
        let graph = VecGraph::new(&[1, 2, 3], &[0]).edge(2, &[0]);
        let tree = build(&graph, WeightPropagation::WalkUp);
        assert_eq!(tree.parents()[1], Parent::Unreached);
        assert_eq!(tree.parents()[2], Parent::Unreached);
        assert_eq!(tree.weights(), &[1, 0, 0]);
    }

    #[test]
    fn test_zero_sized_first_root_still_initialized() {
        let graph = VecGraph::new(&[0, 7], &[0, 1]);
        let mut tree = WeightedTree::new(&graph);
        tree.initialize(&mut NullProgress).unwrap();
        assert_eq!(tree.weights(), &[0, 7]);
        assert_eq!(
            tree.initialize(&mut NullProgress),
            Err(TreeError::AlreadyInitialized)
        );
        // the first result is still intact
        assert!(tree.is_ready());
        assert_eq!(tree.weights(), &[0, 7]);
    }

    #[test]
    fn test_empty_snapshot() {
        let graph = VecGraph::new(&[], &[]);
        let tree = WeightedTree::build(&graph, &mut NullProgress).unwrap();
        assert_eq!(tree.object_count(), 0);
        assert_eq!(tree.total_weight(), 0);
    }

    #[test]
    fn test_duplicate_roots_traversed_once() {
        let graph = VecGraph::new(&[3, 4], &[0, 0, 1]).edge(1, &[0]);
        let mut tree = WeightedTree::new(&graph);
        let stats = tree.initialize(&mut NullProgress).unwrap();
        assert_eq!(stats.gc_roots, 2);
        assert_eq!(tree.total_weight(), 7);
    }

    #[test]
    fn test_strategies_agree() {
        // a small lattice with lots of sharing
        let n = 64u32;
        let sizes: Vec<u64> = (0..n as u64).map(|i| i * 3 + 1).collect();
        let mut graph = VecGraph::new(&sizes, &[0, 17, 40]);
        for i in 0..n {
            let to: Vec<u32> = [i * 2 + 1, i * 3 + 2, i + 5, i / 2]
                .into_iter()
                .filter(|t| *t < n && *t != i)
                .collect();
            graph = graph.edge(i, &to);
        }
        let walk_up = build(&graph, WeightPropagation::WalkUp);
        let post_order = build(&graph, WeightPropagation::PostOrder);
        assert_eq!(walk_up.parents(), post_order.parents());
        assert_eq!(walk_up.weights(), post_order.weights());
        assert_eq!(walk_up.total_weight(), sizes.iter().sum::<u64>());
    }

    #[test]
    fn test_deep_chain_cost() {
        let n = 2000u64;
        let graph = VecGraph::chain(n as u32, 1);
        let mut walk_up = WeightedTree::new(&graph).with_stack_capacity(1);
        let stats = walk_up.initialize(&mut NullProgress).unwrap();
        // every object adds its size to each of its ancestors
        assert_eq!(stats.propagation_steps, n * (n - 1) / 2);
        assert_eq!(stats.visited_objects, n);
        assert_eq!(walk_up.weights()[0], n);

        let mut post_order = WeightedTree::new(&graph)
            .with_propagation(WeightPropagation::PostOrder)
            .with_stack_capacity(1);
        let stats = post_order.initialize(&mut NullProgress).unwrap();
        assert_eq!(stats.propagation_steps, n - 1);
        assert_eq!(post_order.weights(), walk_up.weights());
        // no recursion: the exit markers are what piles up on the stack
        assert_eq!(stats.peak_stack, n as usize);
    }

    #[test]
    fn test_progress_every_sixteen_roots() {
        let graph = VecGraph::new(&[1; 40], &(0..40).collect::<Vec<u32>>());
        let mut progress = CancelAfter::new(usize::MAX);
        let mut tree = WeightedTree::new(&graph);
        tree.initialize(&mut progress).unwrap();
        assert_eq!(progress.total_units, 2);
        // indices 32, 16 and 0
        assert_eq!(progress.worked, 3);
        assert!(progress.done);
    }

    #[test]
    fn test_cancellation_discards_tree() {
        let graph = VecGraph::new(&[1; 40], &(0..40).collect::<Vec<u32>>());
        let mut progress = CancelAfter::new(1);
        let mut tree = WeightedTree::new(&graph);
        assert_eq!(tree.initialize(&mut progress), Err(TreeError::Cancelled));
        // stopped at the first check, after roots 39..=32
        assert_eq!(progress.worked, 1);
        assert!(!progress.done);
        assert!(!tree.is_ready());
        assert!(tree.weights().is_empty());
        assert_eq!(tree.navigator().err(), Some(TreeError::Unusable));
        assert_eq!(
            tree.initialize(&mut NullProgress),
            Err(TreeError::Unusable)
        );
    }

    #[test]
    fn test_cancellation_with_few_roots() {
        // fewer roots than one progress unit still reach the final check
        let graph = VecGraph::new(&[1, 1, 1], &[0, 1, 2]);
        let mut progress = CancelAfter::new(0);
        assert!(matches!(
            WeightedTree::build(&graph, &mut progress),
            Err(TreeError::Cancelled)
        ));
    }

    #[test]
    fn test_provider_failure_aborts() {
        let graph = VecGraph::new(&[1, 2, 3], &[0])
            .edge(0, &[1])
            .edge(1, &[2])
            .failing(2);
        let mut tree = WeightedTree::new(&graph);
        assert_eq!(
            tree.initialize(&mut NullProgress),
            Err(TreeError::Graph(GraphError::UnknownObject(id(2))))
        );
        assert!(tree.navigator().is_err());
    }

    #[test]
    fn test_reference_outside_snapshot_aborts() {
        let graph = VecGraph::new(&[1], &[0]).edge(0, &[5]);
        assert!(matches!(
            WeightedTree::build(&graph, &mut NullProgress),
            Err(TreeError::Graph(GraphError::UnknownObject(_)))
        ));
    }

    #[test]
    fn test_weight_overflow_aborts() {
        let half = u64::MAX / 2 + 1;
        let graph = VecGraph::new(&[half, half], &[0]).edge(0, &[1]);
        for propagation in BOTH {
            let mut tree = WeightedTree::new(&graph).with_propagation(propagation);
            assert!(matches!(
                tree.initialize(&mut NullProgress),
                Err(TreeError::Graph(GraphError::Corrupt(_)))
            ));
            assert!(!tree.is_ready());
            assert_eq!(
                tree.initialize(&mut NullProgress),
                Err(TreeError::Unusable)
            );
        }
    }

    #[test]
    fn test_total_weight_overflow_aborts() {
        let half = u64::MAX / 2 + 1;
        let graph = VecGraph::new(&[half, half], &[0, 1]);
        assert!(matches!(
            WeightedTree::build(&graph, &mut NullProgress),
            Err(TreeError::Graph(GraphError::Corrupt(_)))
        ));
    }

    #[test]
    fn test_navigator_requires_initialization() {
        let graph = VecGraph::new(&[1], &[0]);
        let tree = WeightedTree::new(&graph);
        assert_eq!(tree.navigator().err(), Some(TreeError::Unusable));
    }
}
