//! Shared test utilities for mediaforge integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs with a temp work area and database
//! - Scripted fakes for every external service

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
