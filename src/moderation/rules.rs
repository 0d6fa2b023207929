//! Rule engine
//!
//! A pure decision function over a submission's age and comment signals, plus
//! the eligibility predicate that keeps non-actionable submissions away from it.

use crate::config::{EligibilityPolicy, RuleConfig};
use crate::moderation::{ModerationAction, SkipReason};
use crate::platform::{Comment, Submission};
use std::collections::HashSet;

/// Inputs the decision depends on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmissionSignals {
    pub age_minutes: f64,
    /// The author commented anywhere in the thread
    pub author_commented: bool,
    /// A warning from this bot is present
    pub already_warned: bool,
}

/// Decides which action a submission needs
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: RuleConfig,
    eligibility: EligibilityPolicy,
    automoderator_name: String,
}

impl RuleEngine {
    pub fn new(
        rules: RuleConfig,
        eligibility: EligibilityPolicy,
        automoderator_name: impl Into<String>,
    ) -> Self {
        Self {
            rules,
            eligibility,
            automoderator_name: automoderator_name.into(),
        }
    }

    #[must_use]
    pub fn rules(&self) -> &RuleConfig {
        &self.rules
    }

    /// Whether a submission is too old to be worth any API calls
    #[must_use]
    pub fn is_stale(&self, age_minutes: f64) -> bool {
        age_minutes > f64::from(self.rules.oldest_submission_age_to_process)
    }

    /// Choose the action for a submission
    ///
    /// Never returns `Approve`; that only comes out of [`Self::resolve_removal`].
    #[must_use]
    pub fn decide(&self, signals: SubmissionSignals) -> ModerationAction {
        let SubmissionSignals {
            age_minutes,
            author_commented,
            already_warned,
        } = signals;
        let warn_at = f64::from(self.rules.minutes_to_warn);
        let remove_at = f64::from(self.rules.minutes_to_remove);

        if self.is_stale(age_minutes) {
            ModerationAction::None
        } else if age_minutes >= remove_at && !author_commented {
            ModerationAction::Remove
        } else if age_minutes >= warn_at && author_commented && already_warned {
            ModerationAction::Cleanup
        } else if age_minutes >= warn_at && !author_commented && !already_warned {
            ModerationAction::Warn
        } else {
            ModerationAction::None
        }
    }

    /// Turn a removal into an approval when enough people joined the discussion
    #[must_use]
    pub fn resolve_removal(&self, unique_commenters: usize) -> ModerationAction {
        if unique_commenters >= self.rules.min_unique_commenters_to_keep {
            ModerationAction::Approve
        } else {
            ModerationAction::Remove
        }
    }

    /// Why a submission must not be evaluated, if it must not
    #[must_use]
    pub fn skip_reason(&self, submission: &Submission) -> Option<SkipReason> {
        let Some(author) = submission.author.as_deref() else {
            return Some(SkipReason::AuthorDeleted);
        };

        if submission.is_self {
            Some(SkipReason::SelfPost)
        } else if self.eligibility.skip_approved && submission.approved {
            Some(SkipReason::Approved)
        } else if submission.locked {
            Some(SkipReason::Locked)
        } else if self.eligibility.skip_distinguished && submission.distinguished {
            Some(SkipReason::Distinguished)
        } else if submission.removed {
            Some(SkipReason::Removed)
        } else if author.eq_ignore_ascii_case(&self.automoderator_name) {
            Some(SkipReason::AutoModerator)
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_actionable(&self, submission: &Submission) -> bool {
        self.skip_reason(submission).is_none()
    }
}

/// Whether the submission's author commented anywhere in the tree
#[must_use]
pub fn author_commented(comments: &[Comment]) -> bool {
    comments.iter().any(|comment| comment.is_submitter)
}

/// Count distinct comment authors in the tree
///
/// Every present author counts, this bot included. Deleted accounts have no
/// name left to tell them apart and are not counted.
#[must_use]
pub fn unique_commenters(comments: &[Comment]) -> usize {
    comments
        .iter()
        .filter_map(|comment| comment.author.as_deref())
        .collect::<HashSet<_>>()
        .len()
}
