// # Watch Registry Implementations
//
// This module provides implementations of the WatchRegistry trait for
// different persistence strategies.

pub mod file;
pub mod memory;
pub(crate) mod table;

pub use file::{FileWatchRegistry, FileWatchRegistryFactory};
pub use memory::{MemoryWatchRegistry, MemoryWatchRegistryFactory};
