//! Testing utilities for contestflow workflows.
//!
//! This module provides:
//! - A seeded, published template tree and helpers to drive it
//! - Stores and publishers that fail on demand
//! - Assertions over instances and published events

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_application_status, assert_contest_status, assert_procedure_at, assert_topics,
};
pub use fixtures::World;
pub use mocks::{FlakyStore, UnreachablePublisher};
