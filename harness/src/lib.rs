//! Arbor Harness: reference worlds and run orchestration.
//!
//! The harness drives worlds through the engines in `arbor_search` and
//! packages each run as a canonical, digestible report.
//!
//! The harness does NOT implement search logic; it delegates to the engines.
//! Worlds provide domain data only; the harness owns orchestration.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod runner;
pub mod worlds;
