//! Transport backends.

pub mod memory;
