//! Test modules for the queue layer
//!
//! Tests are organised by backend; `stub_relay` is a minimal HTTP server
//! answering with canned envelopes.

pub(crate) mod stub_relay;
