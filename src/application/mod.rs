//! Application layer — port traits and the five pipeline services.

pub mod ports;
pub mod services;
