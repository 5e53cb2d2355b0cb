mod schema;
pub mod store;

pub use store::{CatalogStore, Reconciliation, StoreError, StoredRecord};
