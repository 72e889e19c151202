pub mod local;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

pub use local::LocalFileStorage;
pub use memory::MemoryStorage;

/// A string slot store addressed by fixed key names.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<()>;
}
