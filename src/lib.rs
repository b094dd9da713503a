pub mod branch_bound;
pub mod cancel;
pub mod config;
pub mod error;
pub mod greedy;
pub mod mip;
pub mod parse;
pub mod patterns;
pub mod render;
pub mod report;
pub mod solver;
pub mod stick;
pub mod types;
