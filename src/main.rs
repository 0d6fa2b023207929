use rules_warden::{
    BotConfig, Error, MessageTemplates, RedditClient, RedditCredentials, Scanner, logging,
};
use std::sync::Arc;
use tracing::info;

/// Run a single scan against the configured subreddit
async fn async_main() -> Result<(), Error> {
    // Initialize logging
    logging::init()?;

    let config = BotConfig::load().await?;
    let templates = MessageTemplates::load(&config.templates).await?;

    // Credentials come from the environment, never from the config file
    let credentials = RedditCredentials::from_env()?;
    let client = RedditClient::connect(credentials).await?;
    let bot_username = client.username().to_string();

    logging::log_console(format!(
        "Logged in as u/{bot_username}, watching r/{}{}",
        config.subreddit,
        if config.dry_run { " (dry run)" } else { "" }
    ));

    let scanner = Scanner::new(Arc::new(client), &config, Arc::new(templates), &bot_username);
    let report = scanner.scan().await?;

    info!(
        "Examined {} submissions: {} warned, {} removed, {} cleaned up, {} approved, {} failed",
        report.examined,
        report.count(rules_warden::ModerationAction::Warn),
        report.count(rules_warden::ModerationAction::Remove),
        report.count(rules_warden::ModerationAction::Cleanup),
        report.count(rules_warden::ModerationAction::Approve),
        report.failures.len()
    );

    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    // Handle any errors that occurred during execution
    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
