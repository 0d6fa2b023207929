pub mod config;
pub mod logging;
pub mod moderation;
pub mod platform;
pub mod templates;

// Log targets
pub const BOT_NAME: &str = "rules_warden";
pub const SCAN_TARGET: &str = "rules_warden::scan";
pub const ACTION_TARGET: &str = "rules_warden::action";
pub const ERROR_TARGET: &str = "rules_warden::error";
pub const CONSOLE_TARGET: &str = "rules_warden";

pub use config::{BotConfig, ConfigError};
pub use moderation::{ModerationAction, ScanReport, Scanner};
pub use platform::{MemoryPlatform, Platform, RedditClient, RedditCredentials};
pub use templates::MessageTemplates;
pub type Error = Box<dyn std::error::Error + Send + Sync>;
