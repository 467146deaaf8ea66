//! Infrastructure layer: directory client backends.

mod in_memory;

pub use in_memory::InMemoryDirectory;
