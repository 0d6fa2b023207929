//! Scanner
//!
//! One bounded pass over the newest submissions of a community. Each actionable
//! submission is evaluated and acted on in its own task; at most
//! `max_concurrent_actions` run at once and every task is joined before the
//! scan returns. A failing submission is recorded and does not affect the rest.

use crate::config::BotConfig;
use crate::logging;
use crate::moderation::rules::{author_commented, unique_commenters};
use crate::moderation::{
    ActionExecutor, ModerationAction, ModerationError, ModerationResult, RuleEngine, SkipReason,
    SubmissionSignals, WarningMarker,
};
use crate::platform::{Platform, Submission};
use crate::templates::MessageTemplates;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// What happened to one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub id: String,
    pub title: String,
    pub action: ModerationAction,
}

/// A submission whose processing failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFailure {
    pub id: String,
    pub error: String,
}

/// Summary of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Submissions returned by the listing
    pub examined: usize,
    /// Submissions excluded before evaluation
    pub skipped: Vec<(String, SkipReason)>,
    /// Evaluated submissions, in listing order
    pub outcomes: Vec<SubmissionOutcome>,
    pub failures: Vec<SubmissionFailure>,
}

impl ScanReport {
    /// Number of submissions that ended with `action`
    #[must_use]
    pub fn count(&self, action: ModerationAction) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.action == action)
            .count()
    }

    /// Action taken on a submission, if it was evaluated successfully
    #[must_use]
    pub fn action_for(&self, id: &str) -> Option<ModerationAction> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.id == id)
            .map(|outcome| outcome.action)
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Everything one submission task needs
#[derive(Clone)]
struct SubmissionProcessor {
    platform: Arc<dyn Platform>,
    engine: Arc<RuleEngine>,
    marker: Arc<WarningMarker>,
    executor: Arc<ActionExecutor>,
}

impl SubmissionProcessor {
    async fn process(
        &self,
        submission: &Submission,
        now: DateTime<Utc>,
    ) -> ModerationResult<ModerationAction> {
        let age_minutes = submission.age_minutes(now);
        if self.engine.is_stale(age_minutes) {
            debug!("Submission {} is stale at {age_minutes:.1} minutes", submission.id);
            return Ok(ModerationAction::None);
        }

        let comments = self.platform.expand_comments(submission).await?;
        let signals = SubmissionSignals {
            age_minutes,
            author_commented: author_commented(&comments),
            already_warned: self.marker.has_warning(submission, &comments),
        };
        let action = self.engine.decide(signals);

        debug!(
            submission_id = %submission.id,
            age_minutes = age_minutes,
            author_commented = signals.author_commented,
            already_warned = signals.already_warned,
            action = %action,
            "Evaluated submission"
        );

        let performed = self.executor.execute(action, submission, &comments).await?;
        if performed.is_effectful() {
            logging::log_action(
                performed,
                submission,
                &signals,
                unique_commenters(&comments),
                self.executor.is_dry_run(),
            );
        }
        Ok(performed)
    }
}

/// Scans a community and acts on what it finds
pub struct Scanner {
    processor: SubmissionProcessor,
    subreddit: String,
    limit: usize,
    max_concurrent: usize,
    dry_run: bool,
}

impl Scanner {
    /// Wire the rule engine, marker checker and executor for `config`
    pub fn new(
        platform: Arc<dyn Platform>,
        config: &BotConfig,
        templates: Arc<MessageTemplates>,
        bot_username: &str,
    ) -> Self {
        let engine = RuleEngine::new(
            config.rules.clone(),
            config.eligibility.clone(),
            config.automoderator_name.clone(),
        );
        let marker = WarningMarker::new(bot_username, templates, config.rules.minutes_to_remove);
        let executor = ActionExecutor::new(
            Arc::clone(&platform),
            engine.clone(),
            marker.clone(),
            config.dry_run,
            config.lock_warning,
        );

        Self {
            processor: SubmissionProcessor {
                platform,
                engine: Arc::new(engine),
                marker: Arc::new(marker),
                executor: Arc::new(executor),
            },
            subreddit: config.subreddit.clone(),
            limit: config.rules.max_submissions_to_process,
            max_concurrent: config.max_concurrent_actions.max(1),
            dry_run: config.dry_run,
        }
    }

    /// Run one scan now
    ///
    /// # Errors
    /// Returns an error only if the submission listing cannot be fetched
    pub async fn scan(&self) -> ModerationResult<ScanReport> {
        self.scan_at(Utc::now()).await
    }

    /// Run one scan, measuring submission ages against `now`
    ///
    /// # Errors
    /// Returns an error only if the submission listing cannot be fetched
    pub async fn scan_at(&self, now: DateTime<Utc>) -> ModerationResult<ScanReport> {
        let started = Instant::now();
        logging::log_scan_start(&self.subreddit, self.limit, self.dry_run);

        let submissions = self
            .processor
            .platform
            .list_recent(&self.subreddit, self.limit)
            .await?;

        let mut report = ScanReport {
            examined: submissions.len(),
            ..ScanReport::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<String, usize> = HashMap::new();

        for (position, submission) in submissions.into_iter().enumerate() {
            if let Some(reason) = self.processor.engine.skip_reason(&submission) {
                logging::log_skip(&submission, reason);
                report.skipped.push((submission.id.clone(), reason));
                continue;
            }

            in_flight.insert(submission.id.clone(), position);
            let processor = self.processor.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // The semaphore is never closed, so a permit always arrives
                let _permit = semaphore.acquire_owned().await.ok();
                let result = processor.process(&submission, now).await;
                (position, submission, result)
            });
        }

        let mut outcomes = Vec::new();
        let mut panics = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, submission, result)) => {
                    in_flight.remove(&submission.id);
                    match result {
                        Ok(action) => outcomes.push((
                            position,
                            SubmissionOutcome {
                                id: submission.id,
                                title: submission.title,
                                action,
                            },
                        )),
                        Err(error) => {
                            logging::log_submission_error(&submission.id, &error);
                            report.failures.push(SubmissionFailure {
                                id: submission.id,
                                error: error.to_string(),
                            });
                        }
                    }
                }
                Err(join_error) => panics.push(join_error.to_string()),
            }
        }

        // Whatever is still in flight belongs to a task that panicked
        let mut orphaned: Vec<_> = in_flight.into_iter().collect();
        orphaned.sort_by_key(|(_, position)| *position);
        for (submission_id, _) in orphaned {
            let error = ModerationError::TaskFailed {
                submission_id: submission_id.clone(),
                reason: panics.join("; "),
            };
            logging::log_submission_error(&submission_id, &error);
            report.failures.push(SubmissionFailure {
                id: submission_id,
                error: error.to_string(),
            });
        }

        outcomes.sort_by_key(|(position, _)| *position);
        report.outcomes = outcomes.into_iter().map(|(_, outcome)| outcome).collect();

        logging::log_scan_end(&self.subreddit, &report, started.elapsed());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;
    use crate::platform::{Comment, MemoryPlatform, MockPlatform, PlatformError, Thing, fixtures};
    use crate::moderation::executor::{CLEANUP_NOTE, ENGAGING_NOTE, SUBMISSION_REMOVED_NOTE};
    use chrono::Duration;

    const SUB: &str = "synthesizers";
    const BOT: &str = "warden_bot";
    const WARNING: &str = "Hi u/$author! Link posts need a comment from OP within $minutes minutes.";
    const REMOVAL: &str = "u/$author, your post was removed after $minutes minutes without a comment.";

    fn config() -> BotConfig {
        BotConfig {
            subreddit: SUB.to_string(),
            rules: RuleConfig {
                minutes_to_warn: 5,
                minutes_to_remove: 60,
                min_unique_commenters_to_keep: 5,
                oldest_submission_age_to_process: 90,
                max_submissions_to_process: 25,
            },
            ..BotConfig::default()
        }
    }

    fn scanner(platform: &MemoryPlatform, config: &BotConfig) -> Scanner {
        let templates = MessageTemplates::from_text(WARNING, REMOVAL).unwrap();
        Scanner::new(
            Arc::new(platform.clone()),
            config,
            Arc::new(templates),
            BOT,
        )
    }

    fn warning_for(author: &str) -> Comment {
        let body = format!(
            "Hi u/{author}! Link posts need a comment from OP within 60 minutes."
        );
        fixtures::sticky_comment("warn", BOT, &body)
    }

    fn others(count: usize) -> Vec<Comment> {
        (0..count)
            .map(|i| fixtures::comment(&format!("o{i}"), &format!("fan{i}"), "sounds great", 0))
            .collect()
    }

    #[tokio::test]
    async fn test_scenario_a_too_young() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        platform.add_submission(SUB, fixtures::aged_submission("a", "poster", now, 3), Vec::new());

        let report = scanner(&platform, &config()).scan_at(now).await.unwrap();
        assert_eq!(report.action_for("a"), Some(ModerationAction::None));
        assert!(platform.comments("a").is_empty());
    }

    #[tokio::test]
    async fn test_scenario_b_warn() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        platform.add_submission(
            SUB,
            fixtures::aged_submission("b", "poster", now, 10),
            others(1),
        );

        let report = scanner(&platform, &config()).scan_at(now).await.unwrap();
        assert_eq!(report.action_for("b"), Some(ModerationAction::Warn));

        let comments = platform.comments("b");
        let first = &comments[0];
        assert_eq!(first.author.as_deref(), Some(BOT));
        assert!(first.stickied && first.locked && first.is_top_level());
        assert_eq!(
            first.body,
            "Hi u/poster! Link posts need a comment from OP within 60 minutes."
        );
    }

    #[tokio::test]
    async fn test_scenario_c_remove() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        let mut comments = vec![warning_for("poster")];
        comments.extend(others(3));
        platform.add_submission(SUB, fixtures::aged_submission("c", "poster", now, 70), comments);

        let report = scanner(&platform, &config()).scan_at(now).await.unwrap();
        assert_eq!(report.action_for("c"), Some(ModerationAction::Remove));

        let post = platform.submission("c").unwrap();
        assert!(post.removed);
        assert_eq!(
            platform.note(&post.thing()).as_deref(),
            Some(SUBMISSION_REMOVED_NOTE)
        );
        assert_eq!(
            platform.notices("c"),
            vec!["u/poster, your post was removed after 60 minutes without a comment.".to_string()]
        );
        assert!(platform.visible_bot_comments("c").is_empty());
    }

    #[tokio::test]
    async fn test_scenario_d_engaging_post_is_approved() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        let mut comments = vec![warning_for("poster")];
        comments.extend(others(8));
        platform.add_submission(SUB, fixtures::aged_submission("d", "poster", now, 70), comments);

        let report = scanner(&platform, &config()).scan_at(now).await.unwrap();
        assert_eq!(report.action_for("d"), Some(ModerationAction::Approve));

        let post = platform.submission("d").unwrap();
        assert!(post.approved);
        assert!(!post.removed);
        assert!(platform.notices("d").is_empty());
        assert!(platform.visible_bot_comments("d").is_empty());
        assert_eq!(
            platform.note(&Thing::Comment("warn".to_string())).as_deref(),
            Some(ENGAGING_NOTE)
        );
    }

    #[tokio::test]
    async fn test_bot_warning_is_one_of_the_distinct_authors() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        let mut comments = vec![warning_for("poster")];
        comments.extend(others(9));
        platform.add_submission(SUB, fixtures::aged_submission("p", "poster", now, 70), comments);
        let config = BotConfig {
            rules: RuleConfig {
                min_unique_commenters_to_keep: 10,
                ..config().rules
            },
            ..config()
        };

        let report = scanner(&platform, &config).scan_at(now).await.unwrap();
        assert_eq!(report.action_for("p"), Some(ModerationAction::Approve));
        let post = platform.submission("p").unwrap();
        assert!(post.approved && !post.removed);
        assert!(platform.notices("p").is_empty());
    }

    #[tokio::test]
    async fn test_scenario_e_cleanup_after_author_reply() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        let comments = vec![
            warning_for("poster"),
            fixtures::submitter_comment("op", "poster", "Recorded on a Juno-106", 0),
        ];
        platform.add_submission(SUB, fixtures::aged_submission("e", "poster", now, 10), comments);

        let report = scanner(&platform, &config()).scan_at(now).await.unwrap();
        assert_eq!(report.action_for("e"), Some(ModerationAction::Cleanup));

        let post = platform.submission("e").unwrap();
        assert!(!post.removed && !post.approved);
        assert!(platform.visible_bot_comments("e").is_empty());
        assert_eq!(
            platform.note(&Thing::Comment("warn".to_string())).as_deref(),
            Some(CLEANUP_NOTE)
        );
    }

    #[tokio::test]
    async fn test_scenario_f_stale_is_skipped_without_fetching_comments() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        platform.add_submission(SUB, fixtures::aged_submission("f", "poster", now, 95), Vec::new());
        // Any comment fetch would fail this submission
        platform.break_comments("f");

        let report = scanner(&platform, &config()).scan_at(now).await.unwrap();
        assert_eq!(report.action_for("f"), Some(ModerationAction::None));
        assert!(report.is_clean());
        assert!(!platform.submission("f").unwrap().removed);
    }

    #[tokio::test]
    async fn test_repeated_scans_warn_once() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        platform.add_submission(SUB, fixtures::aged_submission("p", "poster", now, 10), Vec::new());
        let scanner = scanner(&platform, &config());

        let first = scanner.scan_at(now).await.unwrap();
        let second = scanner.scan_at(now + Duration::minutes(1)).await.unwrap();

        assert_eq!(first.action_for("p"), Some(ModerationAction::Warn));
        assert_eq!(second.action_for("p"), Some(ModerationAction::None));
        assert_eq!(platform.visible_bot_comments("p").len(), 1);
    }

    #[tokio::test]
    async fn test_full_lifecycle_warn_then_cleanup() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        platform.add_submission(SUB, fixtures::aged_submission("p", "poster", now, 6), Vec::new());
        let scanner = scanner(&platform, &config());

        let report = scanner.scan_at(now).await.unwrap();
        assert_eq!(report.action_for("p"), Some(ModerationAction::Warn));

        platform.add_comment("p", fixtures::submitter_comment("op", "poster", "Made this on a Digitakt", 0));

        let report = scanner.scan_at(now + Duration::minutes(5)).await.unwrap();
        assert_eq!(report.action_for("p"), Some(ModerationAction::Cleanup));
        assert!(platform.visible_bot_comments("p").is_empty());

        // The removed marker still counts as a warning, so nothing is left to do
        let report = scanner.scan_at(now + Duration::minutes(70)).await.unwrap();
        assert_eq!(report.action_for("p"), Some(ModerationAction::None));
        assert_eq!(report.count(ModerationAction::Cleanup), 0);
        assert!(!platform.submission("p").unwrap().removed);
        assert_eq!(platform.visible_bot_comments("p").len(), 0);
    }

    #[tokio::test]
    async fn test_removed_submission_is_not_revisited() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        platform.add_submission(SUB, fixtures::aged_submission("p", "poster", now, 65), Vec::new());
        let scanner = scanner(&platform, &config());

        let report = scanner.scan_at(now).await.unwrap();
        assert_eq!(report.action_for("p"), Some(ModerationAction::Remove));

        let report = scanner.scan_at(now + Duration::minutes(1)).await.unwrap();
        assert_eq!(report.skipped, vec![("p".to_string(), SkipReason::Removed)]);
        assert_eq!(platform.notices("p").len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_submission() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        platform.add_submission(SUB, fixtures::aged_submission("bad", "poster", now, 10), Vec::new());
        platform.add_submission(SUB, fixtures::aged_submission("good", "other", now, 10), Vec::new());
        platform.break_comments("bad");

        let report = scanner(&platform, &config()).scan_at(now).await.unwrap();
        assert_eq!(report.action_for("good"), Some(ModerationAction::Warn));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "bad");
        assert!(report.failures[0].error.contains("500"));
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported_as_failure() {
        let now = Utc::now();
        let listing = vec![
            fixtures::aged_submission("calm", "poster", now, 2),
            fixtures::aged_submission("boom", "poster", now, 2),
            fixtures::aged_submission("quiet", "other", now, 2),
        ];

        let mut platform = MockPlatform::new();
        platform
            .expect_list_recent()
            .returning(move |_, _| Ok(listing.clone()));
        platform
            .expect_expand_comments()
            .withf(|submission| submission.id == "boom")
            .returning(|_| panic!("comment tree handler crashed"));
        platform
            .expect_expand_comments()
            .withf(|submission| submission.id != "boom")
            .returning(|_| Ok(Vec::new()));

        let templates = MessageTemplates::from_text(WARNING, REMOVAL).unwrap();
        let scanner = Scanner::new(Arc::new(platform), &config(), Arc::new(templates), BOT);

        let report = scanner.scan_at(now).await.unwrap();
        assert_eq!(report.examined, 3);
        assert_eq!(report.action_for("calm"), Some(ModerationAction::None));
        assert_eq!(report.action_for("quiet"), Some(ModerationAction::None));
        assert_eq!(report.action_for("boom"), None);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "boom");
        assert!(
            report.failures[0]
                .error
                .starts_with("Task for submission boom failed"),
            "{}",
            report.failures[0].error
        );
    }

    #[tokio::test]
    async fn test_ineligible_submissions_are_skipped() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        let self_post = Submission {
            is_self: true,
            ..fixtures::aged_submission("text", "poster", now, 70)
        };
        let orphan = Submission {
            author: None,
            ..fixtures::aged_submission("orphan", "poster", now, 70)
        };
        let automod = fixtures::aged_submission("auto", "AutoModerator", now, 70);
        platform.add_submission(SUB, self_post, Vec::new());
        platform.add_submission(SUB, orphan, Vec::new());
        platform.add_submission(SUB, automod, Vec::new());

        let report = scanner(&platform, &config()).scan_at(now).await.unwrap();
        assert_eq!(report.examined, 3);
        assert!(report.outcomes.is_empty());
        assert!(report.is_clean());

        let reasons: Vec<_> = report.skipped.iter().map(|(_, reason)| *reason).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::AutoModerator,
                SkipReason::AuthorDeleted,
                SkipReason::SelfPost
            ]
        );
        assert!(!platform.submission("orphan").unwrap().removed);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_platform_untouched() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        platform.add_submission(SUB, fixtures::aged_submission("w", "poster", now, 10), Vec::new());
        platform.add_submission(SUB, fixtures::aged_submission("r", "poster", now, 70), others(1));
        let config = BotConfig {
            dry_run: true,
            ..config()
        };

        let report = scanner(&platform, &config).scan_at(now).await.unwrap();
        assert_eq!(report.action_for("w"), Some(ModerationAction::Warn));
        assert_eq!(report.action_for("r"), Some(ModerationAction::Remove));
        assert!(platform.comments("w").is_empty());
        assert!(!platform.submission("r").unwrap().removed);
        assert!(platform.notices("r").is_empty());
    }

    #[tokio::test]
    async fn test_listing_respects_limit_and_order() {
        let now = Utc::now();
        let platform = MemoryPlatform::new(BOT);
        for i in 0..6 {
            platform.add_submission(
                SUB,
                fixtures::aged_submission(&format!("s{i}"), "poster", now, 2),
                Vec::new(),
            );
        }
        let config = BotConfig {
            max_concurrent_actions: 2,
            rules: RuleConfig {
                max_submissions_to_process: 4,
                ..config().rules
            },
            ..config()
        };

        let report = scanner(&platform, &config).scan_at(now).await.unwrap();
        assert_eq!(report.examined, 4);
        let ids: Vec<_> = report.outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["s5", "s4", "s3", "s2"]);
        assert_eq!(report.count(ModerationAction::None), 4);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_scan() {
        let platform = MemoryPlatform::new(BOT);
        let config = BotConfig {
            subreddit: "missing".to_string(),
            ..config()
        };
        let result = scanner(&platform, &config).scan().await;
        assert!(matches!(
            result,
            Err(ModerationError::Platform(PlatformError::NotFound(_)))
        ));
    }
}
