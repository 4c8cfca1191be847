//! Pipeline Integration Test Modules

pub mod backpressure;
pub mod forwarding;
pub mod restart;
