use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative progress reporting and cancellation for long passes.
pub trait ProgressListener {
    fn begin_task(&mut self, name: &str, total_units: usize);
    fn worked(&mut self, units: usize);
    fn is_cancelled(&self) -> bool;
    fn done(&mut self) {}
}

/// Ignores progress and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressListener for NullProgress {
    fn begin_task(&mut self, _name: &str, _total_units: usize) {}

    fn worked(&mut self, _units: usize) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Logs progress in 10% steps and cancels once the shared flag is raised.
pub struct LogProgress {
    task: String,
    total: usize,
    completed: usize,
    last_decile: usize,
    cancelled: Arc<AtomicBool>,
}

impl LogProgress {
    pub fn new(cancelled: Arc<AtomicBool>) -> Self {
        LogProgress {
            task: String::new(),
            total: 0,
            completed: 0,
            last_decile: 0,
            cancelled,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }
}

impl ProgressListener for LogProgress {
    fn begin_task(&mut self, name: &str, total_units: usize) {
        info!("{} ({} units)", name, total_units);
        self.task = name.to_string();
        self.total = total_units;
        self.completed = 0;
        self.last_decile = 0;
    }

    fn worked(&mut self, units: usize) {
        self.completed += units;
        if self.total == 0 {
            return;
        }
        let decile = (self.completed.min(self.total) * 10) / self.total;
        if decile > self.last_decile {
            self.last_decile = decile;
            info!("{}: {}%", self.task, decile * 10);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn done(&mut self) {
        debug!("{}: finished after {} units", self.task, self.completed);
    }
}
