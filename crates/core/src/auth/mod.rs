//! Credential persistence port.

pub mod ports;
