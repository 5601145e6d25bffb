/// Port for the durable flat key/value space the store maps onto.
///
/// Calls are synchronous: every save is a write-through that has completed
/// when the call returns. Implementations must be safe to share across
/// threads but provide no cross-process locking.
pub trait KeyValueStore: Send + Sync {
    /// Raw value of `key`, `None` when absent.
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    /// Insert or overwrite `key`.
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    /// Remove `key`; removing a missing key is not an error.
    fn remove(&self, key: &str) -> anyhow::Result<()>;
    /// Every key currently held, in no particular order.
    fn keys(&self) -> anyhow::Result<Vec<String>>;
}
