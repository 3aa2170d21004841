//! In-memory response cache: entries, key derivation and the shared store.

pub mod entry;
pub mod key;
pub mod policy;
pub mod store;

pub use entry::CacheEntry;
pub use key::CacheKey;
pub use policy::CachePolicy;
pub use store::MemoryCacheStore;
