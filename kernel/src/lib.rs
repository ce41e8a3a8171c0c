//! Arbor Kernel: the vocabulary shared by every search engine in Arbor.
//!
//! # API Surface
//!
//! - [`contract::GraphContract`] -- lazily discovered search spaces
//! - [`path::LabeledPath`] -- root-to-head paths with arc labels
//! - [`score::Score`] -- totally ordered node labels (lower is better)
//! - [`annotation::Annotations`] -- per-node and per-solution metadata
//! - [`control`] -- cancellation, deadlines and timed computation
//! - [`digest`] -- canonical JSON and content hashes for run reports
//!
//! # Module Dependency Direction
//!
//! `path` ← `contract`; everything else stands alone. No cycles.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod annotation;
pub mod contract;
pub mod control;
pub mod digest;
pub mod path;
pub mod score;
