//! Domain types of the correlation engine and the ports its adapters implement.

pub mod callback;
pub mod ports;
pub mod transaction;
