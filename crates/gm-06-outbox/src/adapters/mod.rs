//! Store and sink adapters.

pub mod file;
pub mod http;
pub mod memory;

pub use file::FileOutboxStore;
pub use http::{HttpDeliverySink, MarketplaceConfig};
pub use memory::InMemoryOutboxStore;
