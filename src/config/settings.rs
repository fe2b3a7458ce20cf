//! Application settings loaded from `config.toml`.
//!
//! Every field has a default so a missing or partial file still yields a
//! usable configuration. `DATABASE_URL` in the environment (or `.env`) wins
//! over the configured database url.

use crate::errors::{Error, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Database connection settings
    pub database: DatabaseSettings,
    /// Logging settings
    pub logging: LoggingSettings,
    /// Promotion run settings
    pub promotion: PromotionSettings,
}

/// `[database]` table
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Connection url, e.g. `sqlite://data/school_reports.sqlite?mode=rwc`
    pub url: Option<String>,
}

/// `[logging]` table
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// `[promotion]` table
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct PromotionSettings {
    /// Window used when term 1 of the next academic year has to be created
    pub first_term: TermWindow,
}

impl Default for PromotionSettings {
    fn default() -> Self {
        Self {
            first_term: TermWindow {
                start_month: 9,
                start_day: 1,
                end_month: 12,
                end_day: 15,
            },
        }
    }
}

/// Month/day window of a term, anchored on the first calendar year of an academic year
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TermWindow {
    /// Month the term starts in (1-12)
    pub start_month: u32,
    /// Day of month the term starts on
    pub start_day: u32,
    /// Month the term ends in (1-12)
    pub end_month: u32,
    /// Day of month the term ends on
    pub end_day: u32,
}

impl TermWindow {
    /// Resolves the window to concrete dates in `year`.
    ///
    /// # Errors
    /// Returns `Error::Config` if either end is not a valid calendar date.
    pub fn dates_in(&self, year: i32) -> Result<(NaiveDate, NaiveDate)> {
        let start = NaiveDate::from_ymd_opt(year, self.start_month, self.start_day);
        let end = NaiveDate::from_ymd_opt(year, self.end_month, self.end_day);
        match (start, end) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(Error::Config {
                message: format!("Invalid term window {self:?} for year {year}"),
            }),
        }
    }
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    tracing::debug!("Loading settings from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path_ref.display()),
    })
}

/// Loads settings from `path` if it exists, otherwise returns the defaults.
///
/// # Errors
/// Returns an error if the file exists but cannot be parsed.
pub fn load_settings_or_default<P: AsRef<Path>>(path: P) -> Result<Settings> {
    if path.as_ref().exists() {
        load_settings(path)
    } else {
        tracing::info!(
            "No config file at {}, using defaults",
            path.as_ref().display()
        );
        Ok(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_full_settings() {
        let toml_str = r#"
            [database]
            url = "sqlite::memory:"

            [logging]
            filter = "school_reports=debug"

            [promotion.first_term]
            start_month = 8
            start_day = 25
            end_month = 12
            end_day = 1
        "#;

        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.database.url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(settings.logging.filter, "school_reports=debug");
        assert_eq!(settings.promotion.first_term.start_month, 8);
        assert_eq!(settings.promotion.first_term.end_day, 1);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert!(settings.database.url.is_none());
        assert_eq!(settings.logging.filter, "info");
        assert_eq!(settings.promotion, PromotionSettings::default());
    }

    #[test]
    fn test_default_first_term_window() {
        let (start, end) = PromotionSettings::default()
            .first_term
            .dates_in(2025)
            .unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 12, 15).unwrap());
    }

    #[test]
    fn test_invalid_window_is_config_error() {
        let window = TermWindow {
            start_month: 2,
            start_day: 30,
            end_month: 3,
            end_day: 1,
        };
        assert!(matches!(window.dates_in(2025), Err(Error::Config { .. })));
    }
}
