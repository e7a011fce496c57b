//! Optimization passes.

pub mod copy_prop;
