use crate::graph::{HeapDumpGraph, ObjectId, SnapshotGraph};
use crate::tree::{Parent, TreeError, WeightedTree};
use anyhow::Result;
use std::io::Write;

/// Writes one CSV line per object in the tree. GC roots have `root` as
/// their parent; unreached objects are left out.
pub fn export_csv<W: Write>(tree: &WeightedTree<'_, HeapDumpGraph>, mut output: W) -> Result<u64> {
    if !tree.is_ready() {
        return Err(TreeError::Unusable.into());
    }
    let graph = tree.graph();
    let mut lines = 0;
    writeln!(output, "id,address,parent,size,weight")?;
    for (i, (parent, weight)) in tree.parents().iter().zip(tree.weights()).enumerate() {
        let id = ObjectId::new(i as u32);
        let parent = match parent {
            Parent::Unreached => continue,
            Parent::GcRoot => "root".to_string(),
            Parent::Object(p) => p.raw().to_string(),
        };
        writeln!(
            output,
            "{},0x{:x},{},{},{}",
            id.raw(),
            graph.address(id)?,
            parent,
            graph.heap_size(id)?,
            weight
        )?;
        lines += 1;
    }
    output.flush()?;
    Ok(lines)
}
