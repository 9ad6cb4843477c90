//! Subcommand implementations.

pub mod classify;
pub mod decode;
pub mod intake;
pub mod scan;
