//! Pure domain logic: no filesystem, network, or process access.
//!
//! Everything here is deterministic and unit-testable in isolation. The io
//! layer produces the inputs (discovered modules, execution records,
//! completions) and consumes the outputs (orders, scores, verdicts).

pub mod behavior;
pub mod context;
pub mod extract;
pub mod graph;
pub mod guidance;
pub mod module;
pub mod order;
pub mod reward;
pub mod transcript;
