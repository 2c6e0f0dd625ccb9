//! Stacks Exec
//!
//! Runs [`stacks_core::Invocation`]s as child processes. The driver in
//! `stacks-core` awaits each one before issuing the next.

pub mod runner;

pub use runner::{OutputMode, ProcessExecutor};
