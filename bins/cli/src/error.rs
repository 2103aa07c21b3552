//! CLI error type and exit codes.

use corpus_sync_shared::{ErrorCode, ErrorEnvelope};
use std::fmt;

/// Error surfaced by CLI commands.
#[derive(Debug)]
pub struct CliError {
    envelope: ErrorEnvelope,
}

impl CliError {
    /// Borrow the underlying envelope.
    #[must_use]
    pub const fn envelope(&self) -> &ErrorEnvelope {
        &self.envelope
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "error: {}", self.envelope)
    }
}

impl std::error::Error for CliError {}

impl From<ErrorEnvelope> for CliError {
    fn from(envelope: ErrorEnvelope) -> Self {
        Self { envelope }
    }
}

/// Map an error to the process exit code.
///
/// Lock contention gets its own code so wrapper scripts (cron, systemd) can
/// tell "another run is active" apart from real failures.
#[must_use]
pub fn exit_code_for(error: &CliError) -> u8 {
    let envelope = error.envelope();
    if envelope.code == ErrorCode::run_lock_held() {
        3
    } else if envelope.is_cancelled() {
        130
    } else if envelope.code == ErrorCode::invalid_input() {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_contention_has_a_dedicated_exit_code() {
        let error = CliError::from(ErrorEnvelope::expected(
            ErrorCode::run_lock_held(),
            "another run is already in progress",
        ));
        assert_eq!(exit_code_for(&error), 3);
    }

    #[test]
    fn cancellation_maps_to_sigint_convention() {
        let error = CliError::from(ErrorEnvelope::cancelled("stopped"));
        assert_eq!(exit_code_for(&error), 130);
    }

    #[test]
    fn generic_failures_exit_one() {
        let error = CliError::from(ErrorEnvelope::unexpected(
            ErrorCode::store_unavailable(),
            "down",
            corpus_sync_shared::ErrorClass::Retriable,
        ));
        assert_eq!(exit_code_for(&error), 1);
    }
}
