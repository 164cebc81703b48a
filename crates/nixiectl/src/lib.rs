//! nixiectl library - exposes modules for integration tests

pub mod cli;
pub mod commands;
pub mod confirm;
pub mod logging;
pub mod output;
