//! Integration test utilities for the chat client
//!
//! A mock gateway and HTTP server for end-to-end tests of login, resume and
//! reconnect behavior.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
