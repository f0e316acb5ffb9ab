#[macro_use]
extern crate log;

mod cli;

use std::cmp::Reverse;
use std::fs::File;
use std::io::BufWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, ensure, Result};
use clap::Parser;

use heap_treemap::label::format_bytes;
use heap_treemap::*;

use crate::cli::*;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

fn heaviest_children(
    nav: &mut Navigator<'_, '_, HeapDumpGraph>,
    node: Node,
    limit: usize,
) -> Result<Vec<Node>> {
    let mut children: Vec<Node> = nav.children(node)?.collect();
    children.sort_by_key(|c| Reverse(nav.weight(*c)));
    children.truncate(limit);
    Ok(children)
}

fn summary(
    tree: &WeightedTree<'_, HeapDumpGraph>,
    stats: &BuildStats,
    heap_size: u64,
    elapsed: Duration,
    args: SummaryArgs,
) -> Result<()> {
    println!("============================ Tabulate Statistics ============================");
    println!("objects\treached\tgc_roots\tstale\tpropagation\tpeak_stack\theap\tweight\ttime");
    println!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        tree.object_count(),
        stats.visited_objects,
        stats.gc_roots,
        stats.stale_entries,
        stats.propagation_steps,
        stats.peak_stack,
        heap_size,
        tree.total_weight(),
        elapsed.as_micros()
    );
    println!("-------------------------- End Tabulate Statistics --------------------------");
    let mut nav = tree.navigator()?;
    for root in heaviest_children(&mut nav, Node::Root, args.top)? {
        println!("{:>12}  {}", format_bytes(nav.weight(root)), nav.label(root));
    }
    Ok(())
}

fn print_tree(
    nav: &mut Navigator<'_, '_, HeapDumpGraph>,
    node: Node,
    depth: usize,
    args: &TreeArgs,
) -> Result<()> {
    println!("{}{}", "  ".repeat(depth), nav.label(node));
    if depth == args.depth || !nav.has_children(node)? {
        return Ok(());
    }
    for child in heaviest_children(nav, node, args.limit)? {
        print_tree(nav, child, depth + 1, args)?;
    }
    Ok(())
}

fn reified_main(path: &str, args: &Args, cancelled: &Arc<AtomicBool>) -> Result<()> {
    let start = Instant::now();
    let heapdump = HeapDump::from_path(path)?;
    let graph = HeapDumpGraph::new(&heapdump)?;
    info!(
        "Finish indexing the heapdump, {} objects and {} edges in {} ms",
        graph.object_count(),
        graph.edge_count(),
        start.elapsed().as_micros() as f64 / 1000f64
    );
    let heap_size = heapdump.total_object_size();
    drop(heapdump);

    let mut progress = LogProgress::new(cancelled.clone());
    let mut tree = WeightedTree::new(&graph)
        .with_propagation(args.propagation)
        .with_stack_capacity(args.stack_capacity);
    let start = Instant::now();
    let stats = match tree.initialize(&mut progress) {
        Ok(stats) => stats,
        Err(TreeError::Cancelled) => bail!("Cancelled while building the tree of {}", path),
        Err(e) => return Err(e.into()),
    };
    let elapsed = start.elapsed();

    if cfg!(debug_assertions) {
        let reachable = reachable_objects(&graph)?;
        info!("Sanity trace reporting {} reachable objects", reachable);
        assert_eq!(reachable as u64, stats.visited_objects);
        assert_eq!(verify_tree(&tree)?, 0, "weighted tree violates its invariants");
    }

    match &args.command {
        None => summary(&tree, &stats, heap_size, elapsed, SummaryArgs::default()),
        Some(Commands::Summary(a)) => summary(&tree, &stats, heap_size, elapsed, *a),
        Some(Commands::Tree(a)) => {
            let mut nav = tree.navigator()?;
            print_tree(&mut nav, Node::Root, 0, a)
        }
        Some(Commands::Export(a)) => {
            let output = BufWriter::new(File::create(&a.output)?);
            let lines = export_csv(&tree, output)?;
            info!("Exported {} objects to {}", lines, a.output);
            Ok(())
        }
    }
}

fn get_git_info() -> String {
    match (built_info::GIT_COMMIT_HASH, built_info::GIT_DIRTY) {
        (Some(hash), Some(dirty)) => format!(
            "{}{}",
            hash.split_at(7).0,
            if dirty { "-dirty" } else { "" }
        ),
        (Some(hash), None) => format!("{}{}", hash.split_at(7).0, "-?"),
        _ => "unknown-git-version".to_string(),
    }
}

pub fn main() -> Result<()> {
    env_logger::init();
    println!("heap_treemap {}", get_git_info());
    let args = Args::parse();
    if let Some(Commands::Export(_)) = args.command {
        ensure!(
            args.paths.len() == 1,
            "Can only export one heap dump at a time"
        );
    }
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!("Cannot install the Ctrl-C handler: {}", e);
    }
    for path in &args.paths {
        reified_main(path, &args, &cancelled)?;
    }
    Ok(())
}
