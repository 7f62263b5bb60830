pub mod checkpoint;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod optimizer;
pub mod problem;
pub mod report;
// cmd is a binary module (see main.rs).
