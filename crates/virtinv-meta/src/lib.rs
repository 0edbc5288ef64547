pub mod fixtures;
pub mod memory;
pub mod resource;
mod rows;
pub mod types;

pub use fixtures::Fixtures;
pub use memory::MemoryInventory;
pub use resource::{from_writable, StoredResource, WriteError, WriteTarget};
pub use types::{
    ChangeAction, ChangeEvent, ChangeStream, InventoryStore, Listing, Merge, Page, StoreError,
    StoreResult,
};
