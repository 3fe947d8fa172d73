use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Backup document imported into every newly created library.
    pub seed_path: Option<PathBuf>,
    pub mail_from: String,
    /// SMTP relay; when unset, invitations are only logged.
    pub smtp_host: Option<String>,
    /// Base of share-acceptance links; falls back to the request's Host header.
    pub public_url: Option<String>,
    pub share_ttl_days: i64,
    pub logout_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: default_database_url(),
            seed_path: None,
            mail_from: "noreply@localhost".to_string(),
            smtp_host: None,
            public_url: None,
            share_ttl_days: 30,
            logout_url: "/logout".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let defaults = Self::default();
        Self {
            port: try_load("MEALPLAN_PORT", defaults.port),
            database_url: var("MEALPLAN_DATABASE").unwrap_or(defaults.database_url),
            seed_path: var("MEALPLAN_SEED").ok().map(PathBuf::from),
            mail_from: var("MEALPLAN_MAIL_FROM").unwrap_or(defaults.mail_from),
            smtp_host: var("MEALPLAN_SMTP_HOST").ok(),
            public_url: var("MEALPLAN_PUBLIC_URL").ok(),
            share_ttl_days: try_load("MEALPLAN_SHARE_TTL_DAYS", defaults.share_ttl_days),
            logout_url: var("MEALPLAN_LOGOUT_URL").unwrap_or(defaults.logout_url),
        }
    }
}

/// Directory holding the default database file.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mealplan")
}

fn default_database_url() -> String {
    format!("sqlite:{}?mode=rwc", data_dir().join("mealplan.db").display())
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("Environment variable {key} not set, using default");
    })
}

fn try_load<T: FromStr + Display>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    match var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
        Err(()) => default,
    }
}
