pub mod broadcast;

pub use broadcast::BroadcastEvents;
