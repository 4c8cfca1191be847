//! Application module: the `crawlgrid` binary

pub mod cli;
pub mod commands;
pub mod error;
pub mod startup;
