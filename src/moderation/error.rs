//! Error types for the moderation system
//!
//! This module defines the errors that can occur while evaluating or acting on a submission.

use crate::platform::PlatformError;
use thiserror::Error;

/// Errors that can occur during moderation operations
#[derive(Debug, Error)]
pub enum ModerationError {
    /// The platform rejected or failed a call
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// A message needed the author's name but the account is gone
    #[error("Submission {0} has no author")]
    MissingAuthor(String),

    /// A submission's worker task died before reporting a result
    #[error("Task for submission {submission_id} failed: {reason}")]
    TaskFailed {
        submission_id: String,
        reason: String,
    },
}

/// Result type for moderation operations
pub type ModerationResult<T> = Result<T, ModerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ModerationError::MissingAuthor("abc".to_string());
        assert_eq!(error.to_string(), "Submission abc has no author");

        let error = ModerationError::from(PlatformError::NotFound("t3_abc".to_string()));
        assert_eq!(error.to_string(), "Platform error: Not found: t3_abc");

        let error = ModerationError::TaskFailed {
            submission_id: "abc".to_string(),
            reason: "panicked".to_string(),
        };
        assert_eq!(error.to_string(), "Task for submission abc failed: panicked");
    }
}
