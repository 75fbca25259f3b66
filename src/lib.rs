//! Autostub - deterministic record/replay of API traffic for browser tests
//!
//! Each test case either records (real backend, traffic persisted on success)
//! or replays (non-GET calls answered from the fixture). The choice is made
//! per test case from the fixture contents.

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::multiple_crate_versions
)]

pub mod capture;
pub mod config;
pub mod decider;
pub mod error;
pub mod fixture;
pub mod gate;
pub mod harness;
pub mod hosts;
pub mod stub;

pub use error::{AutostubError, Result};
