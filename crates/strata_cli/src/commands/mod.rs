//! CLI command implementations.

pub mod combine;
pub mod inspect;
pub mod read;
pub mod write;
