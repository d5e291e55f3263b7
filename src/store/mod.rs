pub mod airtable;
pub mod sync;

pub use airtable::{AirtableStore, RemoteRecord};
pub use sync::sync_category;
