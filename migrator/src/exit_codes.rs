//! Stable exit codes for migrator CLI commands.

/// Command succeeded; for `migrate`, every module was accepted.
pub const OK: i32 = 0;
/// Command failed due to invalid config/plan/layout or other errors.
pub const INVALID: i32 = 1;
/// `migrate` finished but one or more modules failed.
pub const FAILED_MODULES: i32 = 2;
/// `migrate` stopped early on cancellation.
pub const CANCELLED: i32 = 3;
