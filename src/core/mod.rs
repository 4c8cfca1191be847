//! Core services and infrastructure

pub mod config;
pub mod context;
pub mod error_handling;
pub mod logging;
pub mod memory;
pub mod retry;
pub mod shutdown;
pub mod sync;
