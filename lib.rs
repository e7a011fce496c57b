//! An optimizer middle-end for a three-address IR: control-flow graphs, gen/kill
//! dataflow analyses and copy propagation.

pub mod commons;
pub mod middle_end;
