//! Semantic cache infrastructure: index and persistence implementations

mod file_persistence;
mod flat_index;
mod in_memory;

pub use file_persistence::FileSnapshotStore;
pub use flat_index::FlatInnerProductIndex;
pub use in_memory::InMemorySnapshotStore;
