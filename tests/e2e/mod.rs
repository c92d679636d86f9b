//! End-to-end tests for murmur
//!
//! Drive the real startup pipeline against temporary data directories, with
//! recording fakes standing in for key generation and the router.

pub mod helpers;
pub mod ipc;
pub mod pipeline;

pub use helpers::*;
