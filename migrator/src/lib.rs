//! Deterministic migration orchestration for legacy codebases.
//!
//! This crate plans and drives a module-by-module translation of a legacy
//! object-oriented codebase into a target language. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (graph, ordering, extraction,
//!   scoring). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, containers, child
//!   processes). Isolated to enable mocking in tests.
//!
//! Orchestration modules ([`plan`], [`migrate`], [`runs`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod migrate;
pub mod plan;
pub mod runs;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
