pub mod analysis;
pub mod cfg;
pub mod ir;
pub mod optimization;
