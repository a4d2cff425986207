//! Queue broker adapters.

pub mod memory;

pub use memory::InMemoryQueue;
