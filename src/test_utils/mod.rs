//! Shared fixtures for unit tests: logger setup and mock-backed facades.
mod common;
mod mock_runner;

pub use common::*;
pub use mock_runner::*;
