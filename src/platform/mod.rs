//! Platform capability interface
//!
//! The moderation core only talks to the outside world through the [`Platform`]
//! trait. Submissions and comments are plain records; every side effect is an
//! explicit trait call.

mod error;
pub mod memory;
pub mod reddit;

pub use error::{PlatformError, PlatformResult};
pub use memory::MemoryPlatform;
pub use reddit::{RedditClient, RedditCredentials};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A community post under moderation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Platform identifier without the kind prefix
    pub id: String,
    pub title: String,
    pub created_utc: DateTime<Utc>,
    /// `None` when the account has been deleted
    pub author: Option<String>,
    pub is_self: bool,
    pub approved: bool,
    pub locked: bool,
    pub distinguished: bool,
    pub removed: bool,
}

impl Submission {
    /// Age of the submission in fractional minutes relative to `now`
    #[must_use]
    pub fn age_minutes(&self, now: DateTime<Utc>) -> f64 {
        let age = now - self.created_utc;
        // Millisecond precision is plenty for minute thresholds
        age.num_milliseconds() as f64 / 60_000.0
    }

    #[must_use]
    pub fn thing(&self) -> Thing {
        Thing::Submission(self.id.clone())
    }
}

impl fmt::Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({})", self.title, self.id)
    }
}

/// A comment anywhere in a submission's comment tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    /// `None` when the account has been deleted
    pub author: Option<String>,
    pub body: String,
    /// Zero for top-level comments
    pub depth: u32,
    /// Written by the author of the submission
    pub is_submitter: bool,
    pub stickied: bool,
    pub distinguished: bool,
    pub locked: bool,
    pub removed: bool,
}

impl Comment {
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.depth == 0
    }

    #[must_use]
    pub fn thing(&self) -> Thing {
        Thing::Comment(self.id.clone())
    }
}

/// Target of a moderation write
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Thing {
    Submission(String),
    Comment(String),
}

impl Thing {
    /// Fully qualified name as understood by the Reddit API (`t3_...`, `t1_...`)
    #[must_use]
    pub fn fullname(&self) -> String {
        match self {
            Self::Submission(id) => format!("t3_{id}"),
            Self::Comment(id) => format!("t1_{id}"),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Submission(id) | Self::Comment(id) => id,
        }
    }
}

impl fmt::Display for Thing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullname())
    }
}

/// Moderation flags to change on a comment; `None` leaves a flag untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagUpdate {
    pub sticky: Option<bool>,
    pub locked: Option<bool>,
    pub ignore_reports: Option<bool>,
}

impl FlagUpdate {
    /// Flags applied to a freshly posted warning
    #[must_use]
    pub fn warning_marker(lock: bool) -> Self {
        Self {
            sticky: Some(true),
            locked: lock.then_some(true),
            ignore_reports: Some(true),
        }
    }

    #[must_use]
    pub fn unlock() -> Self {
        Self {
            locked: Some(false),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sticky.is_none() && self.locked.is_none() && self.ignore_reports.is_none()
    }
}

/// Capabilities the moderation core needs from the community platform
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    /// Fetch up to `limit` newest submissions from a collection
    async fn list_recent(&self, collection: &str, limit: usize) -> PlatformResult<Vec<Submission>>;

    /// Fetch the fully expanded comment tree of a submission, flattened in tree order
    async fn expand_comments(&self, submission: &Submission) -> PlatformResult<Vec<Comment>>;

    /// Remove a submission or comment, attaching a moderation note
    async fn remove(&self, target: &Thing, note: &str) -> PlatformResult<()>;

    /// Approve a submission or comment
    async fn approve(&self, target: &Thing) -> PlatformResult<()>;

    /// Post a top-level reply to a submission
    async fn reply(&self, submission: &Submission, text: &str) -> PlatformResult<Comment>;

    /// Send the author of a submission a private moderation notice
    async fn send_notice(&self, submission: &Submission, text: &str) -> PlatformResult<()>;

    /// Change the moderation flags of a comment
    async fn set_flags(&self, comment: &Comment, flags: FlagUpdate) -> PlatformResult<()>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_thing_fullname() {
        assert_eq!(Thing::Submission("abc".to_string()).fullname(), "t3_abc");
        assert_eq!(Thing::Comment("xyz".to_string()).fullname(), "t1_xyz");
        assert_eq!(Thing::Comment("xyz".to_string()).id(), "xyz");
    }

    #[test]
    fn test_age_minutes() {
        let now = Utc::now();
        let submission = fixtures::submission("a", "poster", now - Duration::seconds(90));
        assert!((submission.age_minutes(now) - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_flag_update_constructors() {
        let locked = FlagUpdate::warning_marker(true);
        assert_eq!(locked.sticky, Some(true));
        assert_eq!(locked.locked, Some(true));
        assert_eq!(locked.ignore_reports, Some(true));

        let unlocked = FlagUpdate::warning_marker(false);
        assert_eq!(unlocked.locked, None);

        assert_eq!(FlagUpdate::unlock().locked, Some(false));
        assert!(FlagUpdate::default().is_empty());
        assert!(!FlagUpdate::unlock().is_empty());
    }
}
