pub mod access_log;
pub mod collections;
pub mod device;
pub mod error;
pub mod events;
pub mod keys;
pub mod ports;
pub mod session;
pub mod store;
