//! Library side of the pickup simulator, shared by the binary and its tests.

pub mod config;
pub mod sim;
