pub const LOG_BYTES_IN_KBYTE: u8 = 10;
pub const BYTES_IN_KBYTE: u64 = 1 << LOG_BYTES_IN_KBYTE;

pub const LOG_BYTES_IN_MBYTE: u8 = 20;
pub const BYTES_IN_MBYTE: u64 = 1 << LOG_BYTES_IN_MBYTE;

pub const LOG_BYTES_IN_GBYTE: u8 = 30;
pub const BYTES_IN_GBYTE: u64 = 1 << LOG_BYTES_IN_GBYTE;

/// Initial traversal stack size, enough for most heaps without growing
pub const DEFAULT_STACK_CAPACITY: usize = 400;

/// GC roots between two progress reports / cancellation checks, as a shift
pub const LOG_ROOTS_PER_PROGRESS_UNIT: u8 = 4;
pub const ROOTS_PER_PROGRESS_UNIT: usize = 1 << LOG_ROOTS_PER_PROGRESS_UNIT;
