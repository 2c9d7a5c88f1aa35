/// config.rs – Load settings from config.yaml + environment variables.
///
/// Environment variables always override YAML values.
/// The API key is read exclusively from the environment / .env file.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub log_level: String,
    /// Path to the SQLite database file.
    pub db_path: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".into(),
            db_path: "challenge-tracker.db".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the account-aggregation REST API.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: f64,
    /// How many days of trade history to request per poll.
    pub history_days: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.metacopier.io/rest/api/v1".into(),
            timeout_seconds: 15.0,
            history_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollConfig {
    /// How often (seconds) to refresh account snapshots and rederive rows.
    pub account_refresh_seconds: f64,
    /// How often (seconds) to poll trade history for new notifications.
    pub trade_poll_seconds: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            account_refresh_seconds: 30.0,
            trade_poll_seconds: 15.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Include master accounts in the trade-notification poll.
    pub include_masters: bool,
    /// Emit alerts for master-account trades (off = silent no-op sink).
    pub push_alerts: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            include_masters: false,
            push_alerts: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Dashboard refresh rate in seconds.
    pub refresh_rate: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { refresh_rate: 1.0 }
    }
}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub tracker: TrackerConfig,
    pub api: ApiConfig,
    pub poll: PollConfig,
    pub notifications: NotificationsConfig,
    pub dashboard: DashboardConfig,

    // API credential – populated from env, not from YAML.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Settings {
    /// Load settings from *config_path* YAML file, then overlay env vars.
    pub fn load(config_path: &str) -> Result<Self> {
        // Try to load .env file (ignore error if absent)
        let _ = dotenvy::dotenv();

        let mut settings = if std::path::Path::new(config_path).exists() {
            let yaml = std::fs::read_to_string(config_path).context("reading config file")?;
            serde_yaml::from_str::<Settings>(&yaml).context("parsing config YAML")?
        } else {
            Settings::default()
        };

        // Credential from environment
        settings.api_key = std::env::var("METACOPIER_API_KEY").ok();

        if let Ok(url) = std::env::var("METACOPIER_API_URL") {
            settings.api.base_url = url;
        }
        if let Ok(val) = std::env::var("INCLUDE_MASTERS") {
            settings.notifications.include_masters =
                matches!(val.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    fn validate(&self) -> Result<()> {
        validate_positive(
            "poll.account_refresh_seconds",
            self.poll.account_refresh_seconds,
        )?;
        validate_positive("poll.trade_poll_seconds", self.poll.trade_poll_seconds)?;
        validate_positive("api.timeout_seconds", self.api.timeout_seconds)?;
        validate_positive("dashboard.refresh_rate", self.dashboard.refresh_rate)?;

        if self.api.base_url.trim().is_empty() {
            bail!("api.base_url must be non-empty");
        }
        if self.api.history_days <= 0 || self.api.history_days > 365 {
            bail!("api.history_days must be in [1, 365]");
        }
        if self.tracker.db_path.trim().is_empty() {
            bail!("tracker.db_path must be non-empty");
        }
        Ok(())
    }
}

fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{name} must be a finite number > 0");
    }
    Ok(())
}
