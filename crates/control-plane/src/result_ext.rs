//! Context logging for results that are reported rather than propagated.
//!
//! Background tasks (the watch loop, failure recording) have nobody to
//! return an error to; `log` records it with the caller's location and
//! hands the result back unchanged.

use std::fmt::Display;

use tracing::{error, warn};

use crate::error::AppError;

/// Adds [`ResultExt::log`] to `Result`.
pub trait ResultExt<T, E> {
    /// Log the error with `context` if this is an `Err`.
    fn log<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display + Severity> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let location = std::panic::Location::caller();
            let file = format!("{}:{}", location.file(), location.line());
            let context = context.to_string();
            if e.is_transient() {
                warn!(
                    target: "flowrun_control_plane",
                    error = %e,
                    file = %file,
                    context = %context,
                    "Operation failed, will retry"
                );
            } else {
                error!(
                    target: "flowrun_control_plane",
                    error = %e,
                    file = %file,
                    context = %context,
                    "Operation failed"
                );
            }
        }
        self
    }
}

/// Whether an error is expected to clear up on its own.
pub trait Severity {
    fn is_transient(&self) -> bool {
        false
    }
}

impl Severity for AppError {
    /// Write collisions resolve on the next pass.
    fn is_transient(&self) -> bool {
        self.is_conflict() || self.is_already_exists()
    }
}

impl Severity for &str {}

impl Severity for String {}
