pub mod events;
pub mod relay;
pub mod storage;
