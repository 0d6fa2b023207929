//! Moderation system for Rules Warden
//!
//! Decides what each recent link post needs (a warning, a removal, a cleanup
//! of an earlier warning, or an approval) and carries it out. Nothing is
//! persisted between scans; the platform's own state is re-read every time.

mod action;
mod error;
mod executor;
mod marker;
pub mod rules;
mod scanner;

pub use action::{ModerationAction, SkipReason};
pub use error::{ModerationError, ModerationResult};
pub use executor::{
    ActionExecutor, CLEANUP_NOTE, ENGAGING_NOTE, MARKER_REMOVED_NOTE, SUBMISSION_REMOVED_NOTE,
};
pub use marker::{MARKER_PREFIX_CHARS, WarningMarker};
pub use rules::{RuleEngine, SubmissionSignals};
pub use scanner::{ScanReport, Scanner, SubmissionFailure, SubmissionOutcome};
