//! Adapters for the domain ports: correlation stores and the backend dispatcher.

pub mod http_dispatcher;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
