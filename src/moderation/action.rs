//! Moderation action types
//!
//! Actions are computed fresh on every scan and never stored; the live state
//! of the submission and its comments is the only record of what was done.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action chosen for a submission in one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModerationAction {
    /// Nothing to do this scan
    #[default]
    None,
    /// Post a sticky warning asking the author to comment
    Warn,
    /// Remove the submission and notify the author
    Remove,
    /// Retract the warning after the author commented
    Cleanup,
    /// Keep a submission whose discussion is engaging on its own
    Approve,
}

impl fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Warn => write!(f, "Warn"),
            Self::Remove => write!(f, "Remove"),
            Self::Cleanup => write!(f, "Cleanup"),
            Self::Approve => write!(f, "Approve"),
        }
    }
}

impl ModerationAction {
    /// Whether carrying out this action writes to the platform
    #[must_use]
    pub fn is_effectful(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Past-tense label used in the action log
    #[must_use]
    pub fn log_label(&self) -> &'static str {
        match self {
            Self::None => "Skipped",
            Self::Warn => "Warned",
            Self::Remove => "Removed",
            Self::Cleanup => "Cleanup",
            Self::Approve => "Ignored",
        }
    }
}

/// Why a submission is not evaluated at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum SkipReason {
    /// The author's account no longer exists
    #[display("author deleted")]
    AuthorDeleted,
    /// Text posts carry their own context
    #[display("self post")]
    SelfPost,
    #[display("already approved")]
    Approved,
    #[display("locked")]
    Locked,
    #[display("distinguished")]
    Distinguished,
    #[display("already removed")]
    Removed,
    /// Posted by the platform's automated moderator
    #[display("posted by automoderator")]
    AutoModerator,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_display_and_labels() {
        assert_eq!(ModerationAction::Warn.to_string(), "Warn");
        assert_eq!(ModerationAction::Approve.log_label(), "Ignored");
        assert_eq!(ModerationAction::Remove.log_label(), "Removed");
        assert_eq!(ModerationAction::default(), ModerationAction::None);
    }

    #[test]
    fn test_action_is_effectful() {
        assert!(!ModerationAction::None.is_effectful());
        assert!(ModerationAction::Warn.is_effectful());
        assert!(ModerationAction::Remove.is_effectful());
        assert!(ModerationAction::Cleanup.is_effectful());
        assert!(ModerationAction::Approve.is_effectful());
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::AuthorDeleted.to_string(), "author deleted");
        assert_eq!(SkipReason::AutoModerator.to_string(), "posted by automoderator");
    }
}
