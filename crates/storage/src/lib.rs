//! Persistence backends for codeloop sessions, plans and project state.
//!
//! - [`FileStore`]: pretty-printed JSON under `<project>/.codeloop/`
//! - [`InMemoryStore`]: same semantics without touching disk
//! - [`NoopStore`]: stores nothing, used when the project directory is read-only

pub mod file_store;
pub mod in_memory;
pub mod noop;
mod records;

pub use file_store::{FileStore, STORAGE_DIR};
pub use in_memory::InMemoryStore;
pub use noop::NoopStore;
