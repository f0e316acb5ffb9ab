use crate::constants::*;
use crate::graph::{GraphError, ObjectId, SnapshotGraph};

/// Shown instead of a label the snapshot cannot provide
pub const LABEL_PLACEHOLDER: &str = "???";

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

const UNITS: [(u64, &str); 3] = [
    (BYTES_IN_KBYTE, "KB"),
    (BYTES_IN_MBYTE, "MB"),
    (BYTES_IN_GBYTE, "GB"),
];

fn tenths(bytes: u64, unit: u64) -> u64 {
    (bytes as f64 * 10f64 / unit as f64).round() as u64
}

/// Formats a byte count in the largest unit it fills, e.g. `1,023 B`,
/// `1.5 KB` or `3.2 GB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < BYTES_IN_KBYTE {
        return format!("{} B", group_thousands(bytes));
    }
    let mut i = UNITS.iter().rposition(|(unit, _)| bytes >= *unit).unwrap_or(0);
    let mut t = tenths(bytes, UNITS[i].0);
    // rounding up can fill the next unit
    if t >= 10 * 1024 && i + 1 < UNITS.len() {
        i += 1;
        t = tenths(bytes, UNITS[i].0);
    }
    format!("{}.{} {}", group_thousands(t / 10), t % 10, UNITS[i].1)
}

pub(crate) fn object_label<G: SnapshotGraph + ?Sized>(
    graph: &G,
    id: ObjectId,
    retained: u64,
) -> Result<String, GraphError> {
    let size = graph.heap_size(id)?;
    Ok(format!(
        "{} ({}/{})",
        graph.technical_name(id)?,
        format_bytes(size),
        format_bytes(retained)
    ))
}
