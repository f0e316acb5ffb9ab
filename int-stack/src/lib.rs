mod stack;

pub use stack::IntStack;
