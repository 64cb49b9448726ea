//! Remote calendar port interfaces

pub mod ports;
