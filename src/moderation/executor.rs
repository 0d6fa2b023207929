//! Action executor
//!
//! Carries out a decided action against the platform. In dry-run mode every
//! write is skipped and only the effective action is returned.

use crate::moderation::rules::unique_commenters;
use crate::moderation::{ModerationAction, ModerationError, ModerationResult, RuleEngine, WarningMarker};
use crate::platform::{Comment, FlagUpdate, Platform, Submission};
use std::sync::Arc;
use tracing::{debug, info};

/// Note on the warning when the submission it belongs to is removed
pub const MARKER_REMOVED_NOTE: &str = "Submission removed";
/// Note on a removed submission
pub const SUBMISSION_REMOVED_NOTE: &str = "OP did not comment, removed submission";
/// Note on the warning when the discussion saved the submission
pub const ENGAGING_NOTE: &str = "OP did not comment but submission is engaging. Keeping.";
/// Note on the warning once the author commented
pub const CLEANUP_NOTE: &str = "OP commented, removed warning";

/// Executes moderation actions against a platform
#[derive(Clone)]
pub struct ActionExecutor {
    platform: Arc<dyn Platform>,
    engine: RuleEngine,
    marker: WarningMarker,
    dry_run: bool,
    lock_warning: bool,
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("engine", &self.engine)
            .field("marker", &self.marker)
            .field("dry_run", &self.dry_run)
            .field("lock_warning", &self.lock_warning)
            .finish_non_exhaustive()
    }
}

impl ActionExecutor {
    pub fn new(
        platform: Arc<dyn Platform>,
        engine: RuleEngine,
        marker: WarningMarker,
        dry_run: bool,
        lock_warning: bool,
    ) -> Self {
        Self {
            platform,
            engine,
            marker,
            dry_run,
            lock_warning,
        }
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Carry out `action` and return what was actually done
    ///
    /// `comments` is the expanded comment tree the decision was based on. A
    /// removal may turn into an approval, a warning into nothing when a
    /// marker appeared in the meantime, and a cleanup into nothing when the
    /// warning is already gone.
    ///
    /// # Errors
    /// Returns an error if a platform call fails or a message cannot be
    /// addressed to the author
    pub async fn execute(
        &self,
        action: ModerationAction,
        submission: &Submission,
        comments: &[Comment],
    ) -> ModerationResult<ModerationAction> {
        match action {
            ModerationAction::None => Ok(ModerationAction::None),
            ModerationAction::Warn => self.warn(submission).await,
            ModerationAction::Remove => self.remove(submission, comments).await,
            ModerationAction::Cleanup => self.cleanup(submission, comments).await,
            ModerationAction::Approve => self.approve(submission, comments).await,
        }
    }

    /// Post a sticky warning unless one is already there
    ///
    /// # Errors
    /// Returns an error if the submission has no author or a platform call fails
    pub async fn warn(&self, submission: &Submission) -> ModerationResult<ModerationAction> {
        let message = self
            .marker
            .render_warning(submission)
            .ok_or_else(|| ModerationError::MissingAuthor(submission.id.clone()))?;

        // Re-read so a warning posted since the decision is not duplicated
        let current = self.platform.expand_comments(submission).await?;
        if self.marker.has_warning(submission, &current) {
            info!("Submission {} already carries a warning", submission.id);
            return Ok(ModerationAction::None);
        }

        if !self.dry_run {
            let reply = self.platform.reply(submission, &message).await?;
            self.platform
                .set_flags(&reply, FlagUpdate::warning_marker(self.lock_warning))
                .await?;
        }
        Ok(ModerationAction::Warn)
    }

    /// Remove a submission whose author never commented, unless others kept it alive
    ///
    /// # Errors
    /// Returns an error if the submission has no author or a platform call fails
    pub async fn remove(
        &self,
        submission: &Submission,
        comments: &[Comment],
    ) -> ModerationResult<ModerationAction> {
        let commenters = unique_commenters(comments);
        if self.engine.resolve_removal(commenters) == ModerationAction::Approve {
            debug!(
                "Submission {} has {commenters} unique commenters, keeping it",
                submission.id
            );
            return self.approve(submission, comments).await;
        }

        let notice = self
            .marker
            .render_removal(submission)
            .ok_or_else(|| ModerationError::MissingAuthor(submission.id.clone()))?;

        if !self.dry_run {
            // The warning goes first so the notice never races a visible post
            self.remove_warning_marker(submission, comments, MARKER_REMOVED_NOTE)
                .await?;
            self.platform
                .remove(&submission.thing(), SUBMISSION_REMOVED_NOTE)
                .await?;
            self.platform.send_notice(submission, &notice).await?;
        }
        Ok(ModerationAction::Remove)
    }

    /// Retract the warning after the author commented
    ///
    /// Returns `None` when there is no live warning left to retract.
    ///
    /// # Errors
    /// Returns an error if a platform call fails
    pub async fn cleanup(
        &self,
        submission: &Submission,
        comments: &[Comment],
    ) -> ModerationResult<ModerationAction> {
        let Some(marker) = self.live_warning(submission, comments) else {
            debug!("No live warning to clean up on {}", submission.id);
            return Ok(ModerationAction::None);
        };

        if !self.dry_run {
            self.retract_warning(marker, CLEANUP_NOTE).await?;
        }
        Ok(ModerationAction::Cleanup)
    }

    /// Keep an engaging submission and retract its warning
    ///
    /// # Errors
    /// Returns an error if a platform call fails
    pub async fn approve(
        &self,
        submission: &Submission,
        comments: &[Comment],
    ) -> ModerationResult<ModerationAction> {
        if !self.dry_run {
            self.platform.approve(&submission.thing()).await?;
            self.remove_warning_marker(submission, comments, ENGAGING_NOTE)
                .await?;
        }
        Ok(ModerationAction::Approve)
    }

    /// The warning marker, unless there is none or it was already removed
    fn live_warning<'a>(
        &self,
        submission: &Submission,
        comments: &'a [Comment],
    ) -> Option<&'a Comment> {
        self.marker
            .find_warning(submission, comments)
            .filter(|marker| !marker.removed)
    }

    /// Unlock and remove the warning marker, if there is a live one
    async fn remove_warning_marker(
        &self,
        submission: &Submission,
        comments: &[Comment],
        note: &str,
    ) -> ModerationResult<()> {
        match self.live_warning(submission, comments) {
            Some(marker) => self.retract_warning(marker, note).await,
            None => Ok(()),
        }
    }

    async fn retract_warning(&self, marker: &Comment, note: &str) -> ModerationResult<()> {
        if marker.locked {
            self.platform.set_flags(marker, FlagUpdate::unlock()).await?;
        }
        self.platform.remove(&marker.thing(), note).await?;
        Ok(())
    }
}
