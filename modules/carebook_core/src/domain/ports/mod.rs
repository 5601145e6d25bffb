pub mod relay;
pub mod storage;

pub use relay::RelayPort;
pub use storage::KeyValueStore;

/// Output port: publish domain events (no knowledge of transport).
pub trait EventPublisher<E>: Send + Sync + 'static {
    fn publish(&self, event: &E);
}
