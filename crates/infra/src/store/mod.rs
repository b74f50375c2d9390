//! Storage boundary for workshop rows.
//!
//! Reads return owned copies. Every write goes through [`WorkshopStore::commit`],
//! which applies a whole [`ChangeSet`] or nothing.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryWorkshopStore;
pub use r#trait::{
    ChangeSet, OrderWrite, ProductWrite, StoreError, UserWrite, WorkshopSnapshot, WorkshopStore,
};
