//! Reference worlds for the runner, the lock tests and the benchmarks.

pub mod dead_end;
pub mod nested_dichotomy;
pub mod synthetic_tree;
pub mod weighted_grid;
