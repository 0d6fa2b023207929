//! In-memory platform
//!
//! Keeps submissions and comment trees in concurrent maps and applies every
//! write to that state, so a sequence of scans behaves like it would against
//! the live site.

use crate::platform::{
    Comment, FlagUpdate, Platform, PlatformError, PlatformResult, Submission, Thing,
};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Platform backed by in-memory maps
#[derive(Clone)]
pub struct MemoryPlatform {
    /// Identity used as the author of replies
    username: String,
    /// Collection name -> submission ids, newest first
    collections: Arc<DashMap<String, Vec<String>>>,
    /// Submission id -> submission
    submissions: Arc<DashMap<String, Submission>>,
    /// Submission id -> flattened comment tree
    comments: Arc<DashMap<String, Vec<Comment>>>,
    /// Submission id -> notices sent to its author
    notices: Arc<DashMap<String, Vec<String>>>,
    /// Fullname -> moderation note recorded on removal
    notes: Arc<DashMap<String, String>>,
    /// Submission ids whose comment fetch should fail
    broken: Arc<DashMap<String, ()>>,
}

impl MemoryPlatform {
    /// Create an empty platform whose replies are authored by `username`
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            collections: Arc::new(DashMap::new()),
            submissions: Arc::new(DashMap::new()),
            comments: Arc::new(DashMap::new()),
            notices: Arc::new(DashMap::new()),
            notes: Arc::new(DashMap::new()),
            broken: Arc::new(DashMap::new()),
        }
    }

    /// Add a submission with its comment tree to a collection
    ///
    /// Submissions are listed in insertion order, newest first, so insert the
    /// newest one last.
    pub fn add_submission(&self, collection: &str, submission: Submission, comments: Vec<Comment>) {
        let id = submission.id.clone();
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(0, id.clone());
        self.comments.insert(id.clone(), comments);
        self.submissions.insert(id, submission);
    }

    /// Append a comment to a submission's tree
    pub fn add_comment(&self, submission_id: &str, comment: Comment) {
        self.comments
            .entry(submission_id.to_string())
            .or_default()
            .push(comment);
    }

    /// Make `expand_comments` fail for a submission
    pub fn break_comments(&self, submission_id: &str) {
        self.broken.insert(submission_id.to_string(), ());
    }

    /// Get the current state of a submission
    pub fn submission(&self, id: &str) -> Option<Submission> {
        self.submissions.get(id).map(|entry| entry.value().clone())
    }

    /// Get the current comment tree of a submission
    pub fn comments(&self, submission_id: &str) -> Vec<Comment> {
        self.comments
            .get(submission_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Get the notices sent about a submission
    pub fn notices(&self, submission_id: &str) -> Vec<String> {
        self.notices
            .get(submission_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Get the moderation note recorded when a thing was removed
    pub fn note(&self, target: &Thing) -> Option<String> {
        self.notes
            .get(&target.fullname())
            .map(|entry| entry.value().clone())
    }

    /// Comments authored by this platform's identity that are still visible
    pub fn visible_bot_comments(&self, submission_id: &str) -> Vec<Comment> {
        self.comments(submission_id)
            .into_iter()
            .filter(|c| c.author.as_deref() == Some(self.username.as_str()) && !c.removed)
            .collect()
    }

    fn find_comment_mut<F>(&self, comment_id: &str, update: F) -> PlatformResult<()>
    where
        F: FnOnce(&mut Comment),
    {
        for mut tree in self.comments.iter_mut() {
            if let Some(comment) = tree.value_mut().iter_mut().find(|c| c.id == comment_id) {
                update(comment);
                return Ok(());
            }
        }
        Err(PlatformError::NotFound(format!("t1_{comment_id}")))
    }

    fn update_submission<F>(&self, id: &str, update: F) -> PlatformResult<()>
    where
        F: FnOnce(&mut Submission),
    {
        let mut submission = self
            .submissions
            .get_mut(id)
            .ok_or_else(|| PlatformError::NotFound(format!("t3_{id}")))?;
        update(submission.value_mut());
        Ok(())
    }
}

#[async_trait::async_trait]
impl Platform for MemoryPlatform {
    async fn list_recent(&self, collection: &str, limit: usize) -> PlatformResult<Vec<Submission>> {
        let ids = self
            .collections
            .get(collection)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PlatformError::NotFound(format!("r/{collection}")))?;

        Ok(ids
            .iter()
            .take(limit)
            .filter_map(|id| self.submission(id))
            .collect())
    }

    async fn expand_comments(&self, submission: &Submission) -> PlatformResult<Vec<Comment>> {
        if self.broken.contains_key(&submission.id) {
            return Err(PlatformError::Status {
                status: 500,
                endpoint: format!("/comments/{}", submission.id),
            });
        }
        Ok(self.comments(&submission.id))
    }

    async fn remove(&self, target: &Thing, note: &str) -> PlatformResult<()> {
        match target {
            Thing::Submission(id) => self.update_submission(id, |s| s.removed = true)?,
            Thing::Comment(id) => self.find_comment_mut(id, |c| c.removed = true)?,
        }
        if !note.is_empty() {
            self.notes.insert(target.fullname(), note.to_string());
        }
        Ok(())
    }

    async fn approve(&self, target: &Thing) -> PlatformResult<()> {
        match target {
            Thing::Submission(id) => self.update_submission(id, |s| {
                s.approved = true;
                s.removed = false;
            }),
            Thing::Comment(id) => self.find_comment_mut(id, |c| c.removed = false),
        }
    }

    async fn reply(&self, submission: &Submission, text: &str) -> PlatformResult<Comment> {
        if !self.submissions.contains_key(&submission.id) {
            return Err(PlatformError::NotFound(submission.thing().fullname()));
        }

        let comment = Comment {
            id: Uuid::new_v4().simple().to_string(),
            author: Some(self.username.clone()),
            body: text.to_string(),
            depth: 0,
            is_submitter: false,
            stickied: false,
            distinguished: false,
            locked: false,
            removed: false,
        };
        self.add_comment(&submission.id, comment.clone());
        Ok(comment)
    }

    async fn send_notice(&self, submission: &Submission, text: &str) -> PlatformResult<()> {
        self.notices
            .entry(submission.id.clone())
            .or_default()
            .push(text.to_string());
        Ok(())
    }

    async fn set_flags(&self, comment: &Comment, flags: FlagUpdate) -> PlatformResult<()> {
        let comment_id = comment.id.clone();
        self.find_comment_mut(&comment_id, |c| {
            if let Some(sticky) = flags.sticky {
                c.stickied = sticky;
                c.distinguished = sticky;
            }
            if let Some(locked) = flags.locked {
                c.locked = locked;
            }
        })?;

        // A stickied comment is shown first, ahead of every other top-level comment
        if flags.sticky == Some(true) {
            for mut tree in self.comments.iter_mut() {
                let comments = tree.value_mut();
                if let Some(pos) = comments.iter().position(|c| c.id == comment_id) {
                    let sticky = comments.remove(pos);
                    comments.insert(0, sticky);
                    break;
                }
            }
        }
        Ok(())
    }
}
