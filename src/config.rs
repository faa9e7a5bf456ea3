use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub analytics: AnalyticsConfig,
    pub admin: AdminConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Empty when neither `DATABASE_URL` nor a config source provides one.
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    /// Trailing window for dashboard statistics.
    pub stats_window_days: i64,
    /// Maximum rows fetched for the history view.
    pub history_limit: i64,
    /// Recent readings shown on the dashboard.
    pub recent_count: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            stats_window_days: 30,
            history_limit: 50,
            recent_count: 5,
        }
    }
}

impl AnalyticsConfig {
    /// Windows and limits are counts and must not be negative.
    pub fn validate(&self) -> Result<()> {
        if self.stats_window_days < 0 {
            anyhow::bail!(
                "analytics.stats_window_days must not be negative, got {}",
                self.stats_window_days
            );
        }
        if self.history_limit < 0 {
            anyhow::bail!(
                "analytics.history_limit must not be negative, got {}",
                self.history_limit
            );
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdminConfig {
    /// Emails that receive the admin role when they sign up.
    pub bootstrap_emails: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file (silently ignore if not present - production uses env vars directly)
        let _ = dotenvy::dotenv();

        let database_url = std::env::var("DATABASE_URL").unwrap_or_default();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("glucose-log");

        let builder = Config::builder()
            // 1. Defaults
            .set_default("database.url", database_url)?
            .set_default("analytics.stats_window_days", 30)?
            .set_default("analytics.history_limit", 50)?
            .set_default("analytics.recent_count", 5)?
            .set_default("admin.bootstrap_emails", Vec::<String>::new())?
            .set_default("export.output_dir", ".")?
            // 2. Local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))
            // 3. User config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))
            // 4. Environment variables (GLUCOSE__ANALYTICS__STATS_WINDOW_DAYS=14)
            .add_source(Environment::with_prefix("GLUCOSE").separator("__"));

        let s = builder.build()?;
        let config: Self = s.try_deserialize()?;
        config.analytics.validate()?;
        Ok(config)
    }

    /// The database URL, or an error explaining how to provide one.
    pub fn database_url(&self) -> Result<&str> {
        let url = self.database.url.trim();
        if url.is_empty() {
            anyhow::bail!("DATABASE_URL must be set (via .env file or environment variable)");
        }
        Ok(url)
    }

    /// Export directory, created if missing.
    pub fn ensure_export_dir(&self) -> Result<&PathBuf> {
        std::fs::create_dir_all(&self.export.output_dir).with_context(|| {
            format!(
                "Failed to create export directory {}",
                self.export.output_dir.display()
            )
        })?;
        Ok(&self.export.output_dir)
    }
}
