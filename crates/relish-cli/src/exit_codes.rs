//! Exit codes are part of the public contract; CI gates on them.

pub const SUCCESS: i32 = 0;
/// At least one scenario failed or hit an undefined step.
pub const RUN_FAILED: i32 = 1;
/// Setup failed before or during the run: bad config, unreadable
/// features, results directory conflict, driver session failure.
pub const CONFIG_ERROR: i32 = 2;
