//! Warning marker detection
//!
//! The bot keeps no record of the warnings it posted. A submission counts as
//! warned when its first top-level comment is a sticky comment by the bot whose
//! text starts like a freshly rendered warning. The prefix comparison tells our
//! warnings apart from similar sticky comments posted by other bots under the
//! same account; editing the template makes older warnings invisible to it.

use crate::platform::{Comment, Submission};
use crate::templates::{MessageTemplates, TemplateVars};
use std::sync::Arc;

/// Characters of the rendered warning a marker must start with
pub const MARKER_PREFIX_CHARS: usize = 10;

/// Finds this bot's warning among a submission's comments
#[derive(Debug, Clone)]
pub struct WarningMarker {
    bot_username: String,
    templates: Arc<MessageTemplates>,
    minutes_to_remove: u32,
}

impl WarningMarker {
    pub fn new(
        bot_username: impl Into<String>,
        templates: Arc<MessageTemplates>,
        minutes_to_remove: u32,
    ) -> Self {
        Self {
            bot_username: bot_username.into(),
            templates,
            minutes_to_remove,
        }
    }

    #[must_use]
    pub fn bot_username(&self) -> &str {
        &self.bot_username
    }

    /// Render the warning for a submission, if it still has an author
    #[must_use]
    pub fn render_warning(&self, submission: &Submission) -> Option<String> {
        let author = submission.author.as_deref()?;
        Some(
            self.templates
                .warning(&TemplateVars::new(author, self.minutes_to_remove)),
        )
    }

    /// Render the removal notice for a submission, if it still has an author
    #[must_use]
    pub fn render_removal(&self, submission: &Submission) -> Option<String> {
        let author = submission.author.as_deref()?;
        Some(
            self.templates
                .removal(&TemplateVars::new(author, self.minutes_to_remove)),
        )
    }

    /// Locate the warning marker among `comments`
    ///
    /// Only the first top-level comment is considered. A marker that has
    /// already been removed is still returned so callers can tell the
    /// submission was warned.
    #[must_use]
    pub fn find_warning<'a>(
        &self,
        submission: &Submission,
        comments: &'a [Comment],
    ) -> Option<&'a Comment> {
        let first = comments.iter().find(|comment| comment.is_top_level())?;

        let by_bot = first
            .author
            .as_deref()
            .is_some_and(|author| author.eq_ignore_ascii_case(&self.bot_username));
        if !by_bot || !first.stickied {
            return None;
        }

        let expected = self.render_warning(submission)?;
        let prefix: String = expected.chars().take(MARKER_PREFIX_CHARS).collect();
        first.body.starts_with(&prefix).then_some(first)
    }

    #[must_use]
    pub fn has_warning(&self, submission: &Submission, comments: &[Comment]) -> bool {
        self.find_warning(submission, comments).is_some()
    }
}
