use crate::graph::{GraphError, ObjectId, SnapshotGraph};
use crate::tree::{add_weight, Parent, TreeError, WeightedTree};
use fixedbitset::FixedBitSet;

/// Number of objects reachable from the GC roots, found by a plain mark
/// that shares nothing with the tree builder.
pub fn reachable_objects<G: SnapshotGraph + ?Sized>(graph: &G) -> Result<usize, GraphError> {
    let mut reachable_objects = FixedBitSet::with_capacity(graph.object_count());
    let mut mark_stack = graph.gc_roots()?.to_vec();
    while let Some(o) = mark_stack.pop() {
        if reachable_objects.put(o.index()) {
            continue;
        }
        for child in graph.outbound_references(o)? {
            if !reachable_objects.contains(child.index()) {
                mark_stack.push(*child);
            }
        }
    }
    Ok(reachable_objects.count_ones(..))
}

/// Checks the structural invariants of an initialized tree and returns the
/// number of violations, each of which is logged.
///
/// - following parents from any reached object ends at the virtual root
///   within `n` steps;
/// - GC roots hang off the virtual root and nothing else does;
/// - every weight is the object's size plus the weights of its children.
pub fn verify_tree<G: SnapshotGraph + ?Sized>(
    tree: &WeightedTree<'_, G>,
) -> Result<usize, TreeError> {
    if !tree.is_ready() {
        return Err(TreeError::Unusable);
    }
    let graph = tree.graph();
    let parents = tree.parents();
    let weights = tree.weights();
    let n = parents.len();
    let mut violations = 0;

    let mut confirmed = FixedBitSet::with_capacity(n);
    let mut path = vec![];
    for x in 0..n {
        if parents[x] == Parent::Unreached || confirmed.contains(x) {
            continue;
        }
        path.clear();
        let mut cur = x;
        let mut ok = true;
        while !confirmed.contains(cur) {
            path.push(cur);
            match parents[cur] {
                Parent::GcRoot => break,
                Parent::Object(p) if parents[p.index()] == Parent::Unreached => {
                    error!("Object #{} has unreached parent {}", cur, p);
                    ok = false;
                    break;
                }
                Parent::Object(p) => cur = p.index(),
                Parent::Unreached => unreachable!(),
            }
            if path.len() > n {
                error!("Parent chain from object #{} does not terminate", x);
                ok = false;
                break;
            }
        }
        if ok {
            for &p in &path {
                confirmed.insert(p);
            }
        } else {
            violations += 1;
        }
    }

    let mut child_weights = vec![0u64; n];
    for (x, parent) in parents.iter().enumerate() {
        if let Parent::Object(p) = parent {
            child_weights[p.index()] = add_weight(child_weights[p.index()], weights[x])?;
        }
    }
    for (x, parent) in parents.iter().enumerate() {
        let id = ObjectId::new(x as u32);
        let is_root = graph.is_gc_root(id)?;
        match parent {
            Parent::Unreached => {
                if weights[x] != 0 {
                    error!("Unreached object {} has weight {}", id, weights[x]);
                    violations += 1;
                }
                continue;
            }
            Parent::GcRoot if !is_root => {
                error!("Object {} hangs off the root but is no GC root", id);
                violations += 1;
            }
            Parent::Object(p) if is_root => {
                error!("GC root {} was adopted by {}", id, p);
                violations += 1;
            }
            _ => {}
        }
        let expected = add_weight(graph.heap_size(id)?, child_weights[x])?;
        if weights[x] != expected {
            error!(
                "Object {} weighs {} but its subtree adds up to {}",
                id, weights[x], expected
            );
            violations += 1;
        }
    }
    Ok(violations)
}
