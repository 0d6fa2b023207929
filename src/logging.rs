use crate::moderation::{
    ModerationAction, ModerationError, ScanReport, SkipReason, SubmissionSignals,
};
use crate::platform::Submission;
use crate::{ACTION_TARGET, CONSOLE_TARGET, ERROR_TARGET, SCAN_TARGET};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Action log file name
pub const ACTION_LOG_FILE: &str = "actions";

/// Initialize the logging system with console and file outputs
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Create log directory if it doesn't exist
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    // Set up file appenders with daily rotation
    let action_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, ACTION_LOG_FILE);

    // Create a layer for console output (human-readable format)
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // Create a layer for action logs (JSON format)
    let action_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(action_file);

    // Default to INFO, with the HTTP stack only reporting warnings
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info")
            .add_directive("reqwest=warn".parse()?)
            .add_directive("hyper=warn".parse()?)
            .add_directive("hyper_util=warn".parse()?),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(action_layer)
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

/// Log the start of a scan
pub fn log_scan_start(subreddit: &str, limit: usize, dry_run: bool) {
    info!(
        target: SCAN_TARGET,
        subreddit = %subreddit,
        limit = limit,
        dry_run = dry_run,
        event = "start",
        "Scan started"
    );
}

/// Log the end of a scan with its tallies
pub fn log_scan_end(subreddit: &str, report: &ScanReport, elapsed: Duration) {
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or_default();
    info!(
        target: SCAN_TARGET,
        subreddit = %subreddit,
        examined = report.examined,
        skipped = report.skipped.len(),
        warned = report.count(ModerationAction::Warn),
        removed = report.count(ModerationAction::Remove),
        cleaned_up = report.count(ModerationAction::Cleanup),
        approved = report.count(ModerationAction::Approve),
        failed = report.failures.len(),
        duration_ms = duration_ms,
        event = "end",
        "Scan completed"
    );
}

/// Log an action taken on a submission together with the signals behind it
pub fn log_action(
    action: ModerationAction,
    submission: &Submission,
    signals: &SubmissionSignals,
    unique_commenters: usize,
    dry_run: bool,
) {
    let author = submission.author.as_deref().unwrap_or("[deleted]");
    info!(
        target: ACTION_TARGET,
        action = %action,
        submission_id = %submission.id,
        author = %author,
        age_minutes = signals.age_minutes,
        author_commented = signals.author_commented,
        already_warned = signals.already_warned,
        unique_commenters = unique_commenters,
        dry_run = dry_run,
        "{}: {}",
        action.log_label(),
        submission
    );
}

/// Log a submission that was not evaluated
pub fn log_skip(submission: &Submission, reason: SkipReason) {
    debug!(
        target: SCAN_TARGET,
        submission_id = %submission.id,
        reason = %reason,
        "Skipped {submission}"
    );
}

/// Log a submission whose processing failed
pub fn log_submission_error(submission_id: &str, error: &ModerationError) {
    error!(
        target: ERROR_TARGET,
        submission_id = %submission_id,
        error = %error,
        "Submission processing failed"
    );
}

pub fn log_console(message: String) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fixtures;
    use chrono::Utc;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_action_record_carries_rationale() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();

        let submission = fixtures::submission("p1", "poster", Utc::now());
        let signals = SubmissionSignals {
            age_minutes: 70.0,
            author_commented: false,
            already_warned: true,
        };
        tracing::subscriber::with_default(subscriber, || {
            log_action(ModerationAction::Remove, &submission, &signals, 3, true);
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains(ACTION_TARGET));
        assert!(output.contains("\"action\":\"Remove\""));
        assert!(output.contains("\"age_minutes\":70.0"));
        assert!(output.contains("\"author_commented\":false"));
        assert!(output.contains("\"already_warned\":true"));
        assert!(output.contains("\"unique_commenters\":3"));
        assert!(output.contains("\"dry_run\":true"));
        assert!(output.contains("Removed: 'Post p1' (p1)"));
    }
}
