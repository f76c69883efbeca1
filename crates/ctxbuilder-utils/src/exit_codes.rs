//! Exit code constants for the ctxbuilder CLI.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Run completed, all documents processed |
//! | 2 | `USER_ERROR` | Invalid arguments or configuration |
//! | 3 | `PARTIAL` | Run committed but some documents failed |
//! | 4 | `FATAL` | Run aborted before any artifacts were written |
//! | 5 | `CANCELLED` | Run interrupted by the user |

/// Exit codes matching the documented exit code table.
///
/// The numeric values are part of the public CLI contract and will not
/// change within a major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Run completed successfully.
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Invalid CLI arguments or configuration.
    pub const USER_ERROR: ExitCode = ExitCode(2);

    /// Run committed but one or more documents failed a stage.
    pub const PARTIAL: ExitCode = ExitCode(3);

    /// Fatal failure before any artifacts were written.
    pub const FATAL: ExitCode = ExitCode(4);

    /// Run cancelled by the user; `.complete` was withheld.
    pub const CANCELLED: ExitCode = ExitCode(5);

    /// Get the numeric value for `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an `ExitCode` from a raw value. Prefer the named constants.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}
