//! Subcommand implementations for the flowtrack CLI

pub mod benchmark;
pub mod generate;
pub mod inspect;
pub mod replay;
