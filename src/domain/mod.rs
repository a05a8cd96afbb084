//! Pure domain types — no I/O, no imports from `crate::infra` or
//! `crate::application`.

pub mod aoi;
pub mod bootstrap;
pub mod error;
pub mod job;
