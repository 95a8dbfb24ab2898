//! Side-effecting operations: filesystem, containers, child processes.

pub mod config;
pub mod generator;
pub mod parser;
pub mod plan;
pub mod process;
pub mod prompt;
pub mod report;
pub mod retrieval;
pub mod sandbox;
pub mod scan;
