use clap::{Parser, Subcommand};
use heap_treemap::constants::DEFAULT_STACK_CAPACITY;
use heap_treemap::WeightPropagation;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(required = true)]
    pub paths: Vec<String>,

    #[arg(short, long, value_enum, default_value_t = WeightPropagation::WalkUp)]
    pub propagation: WeightPropagation,

    #[arg(short, long, default_value_t = DEFAULT_STACK_CAPACITY)]
    pub stack_capacity: usize,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Parser, Debug, Clone, Copy)]
pub struct SummaryArgs {
    /// Number of heaviest GC roots to list
    #[arg(short, long, default_value_t = 10)]
    pub top: usize,
}

impl Default for SummaryArgs {
    fn default() -> Self {
        SummaryArgs { top: 10 }
    }
}

#[derive(Parser, Debug, Clone, Copy)]
pub struct TreeArgs {
    #[arg(short, long, default_value_t = 3)]
    pub depth: usize,
    /// Children shown per node, heaviest first
    #[arg(short, long, default_value_t = 5)]
    pub limit: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct ExportArgs {
    #[arg(short, long)]
    pub output: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Summary(SummaryArgs),
    Tree(TreeArgs),
    Export(ExportArgs),
}
