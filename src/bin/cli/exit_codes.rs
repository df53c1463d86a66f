//! Exit codes for the CLI tool.
//!
//! A batch run touches many files; the process exit code reflects the most
//! severe category hit anywhere in the batch.

/// Everything succeeded.
pub const SUCCESS: i32 = 0;
/// Bad command-line arguments.
pub const BAD_ARGS: i32 = 1;
/// Major I/O error (couldn't open or commit the archive).
pub const SHOWSTOPPER: i32 = 2;
/// The archive format could not be determined; use `--format`.
pub const BE_MORE_SPECIFIC: i32 = 3;
/// One or more per-file operations failed in an ordinary way (e.g. file
/// not found in the archive).
pub const NONCRITICAL_FAILURE: i32 = 4;
/// One or more per-file operations failed in an unusual way (e.g. I/O
/// error mid-operation).
pub const UNCOMMON_FAILURE: i32 = 5;

/// Severity order for merging per-operation outcomes into one process
/// exit code. Higher wins.
fn severity(code: i32) -> u8 {
    match code {
        SUCCESS => 0,
        NONCRITICAL_FAILURE => 1,
        UNCOMMON_FAILURE => 2,
        BE_MORE_SPECIFIC => 3,
        SHOWSTOPPER => 4,
        BAD_ARGS => 5,
        _ => 6,
    }
}

/// Combines the exit code so far with a new outcome, keeping the most
/// severe.
pub fn merge(current: i32, new: i32) -> i32 {
    if severity(new) > severity(current) {
        new
    } else {
        current
    }
}
