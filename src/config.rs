// config.rs
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use uuid::Uuid;

use crate::models::taskmodel::FundingModel;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub port: u16,
    pub log_level: LevelFilter,
    pub cors_origins: Vec<String>,
    // Escrow
    pub platform_fee_bps: u32,
    pub funding_model: FundingModel,
    pub platform_account_id: Uuid,
    // Lifecycle
    pub block_cancel_during_handoff: bool,
    pub open_task_expiry_hours: Option<u64>,
}

impl Config {
    pub fn init() -> Result<Config, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET_KEY").ok_or(ConfigError::Missing("JWT_SECRET_KEY"))?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let port = parse_or(&lookup, "PORT", 8000u16)?;
        let platform_fee_bps = parse_or(&lookup, "PLATFORM_FEE_BPS", 300u32)?;
        if platform_fee_bps > 10_000 {
            return Err(ConfigError::Invalid {
                key: "PLATFORM_FEE_BPS",
                value: platform_fee_bps.to_string(),
            });
        }

        let funding_model = match lookup("FUNDING_MODEL").as_deref() {
            None | Some("deferred") => FundingModel::Deferred,
            Some("prepaid") => FundingModel::Prepaid,
            Some(other) => {
                return Err(ConfigError::Invalid { key: "FUNDING_MODEL", value: other.to_string() });
            }
        };

        let platform_account_id = parse_or(&lookup, "PLATFORM_ACCOUNT_ID", Uuid::nil())?;
        let block_cancel_during_handoff = parse_or(&lookup, "BLOCK_CANCEL_DURING_HANDOFF", true)?;

        let open_task_expiry_hours = match lookup("OPEN_TASK_EXPIRY_HOURS") {
            Some(value) => Some(value.parse::<u64>().map_err(|_| ConfigError::Invalid {
                key: "OPEN_TASK_EXPIRY_HOURS",
                value,
            })?),
            None => None,
        };

        let log_level = parse_or(&lookup, "LOG_LEVEL", LevelFilter::DEBUG)?;

        let cors_origins = lookup("CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["http://localhost:5173".to_string(), "http://localhost:8000".to_string()]);

        Ok(Config {
            database_url,
            jwt_secret,
            port,
            log_level,
            cors_origins,
            platform_fee_bps,
            funding_model,
            platform_account_id,
            block_cancel_during_handoff,
            open_task_expiry_hours,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value.parse::<T>().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let config = Config::from_lookup(lookup_from(&[("JWT_SECRET_KEY", "secret")])).unwrap();

        assert!(config.database_url.is_none());
        assert_eq!(config.port, 8000);
        assert_eq!(config.platform_fee_bps, 300);
        assert_eq!(config.funding_model, FundingModel::Deferred);
        assert_eq!(config.platform_account_id, Uuid::nil());
        assert!(config.block_cancel_during_handoff);
        assert_eq!(config.open_task_expiry_hours, None);
    }

    #[test]
    fn missing_secret_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::Missing("JWT_SECRET_KEY"))));
    }

    #[test]
    fn explicit_values_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("JWT_SECRET_KEY", "secret"),
            ("DATABASE_URL", "postgres://localhost/taskhub"),
            ("PORT", "9090"),
            ("PLATFORM_FEE_BPS", "1000"),
            ("FUNDING_MODEL", "prepaid"),
            ("BLOCK_CANCEL_DURING_HANDOFF", "false"),
            ("OPEN_TASK_EXPIRY_HOURS", "72"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
        ]))
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/taskhub"));
        assert_eq!(config.port, 9090);
        assert_eq!(config.platform_fee_bps, 1000);
        assert_eq!(config.funding_model, FundingModel::Prepaid);
        assert!(!config.block_cancel_during_handoff);
        assert_eq!(config.open_task_expiry_hours, Some(72));
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn out_of_range_fee_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[("JWT_SECRET_KEY", "s"), ("PLATFORM_FEE_BPS", "20000")]));
        assert!(matches!(result, Err(ConfigError::Invalid { key: "PLATFORM_FEE_BPS", .. })));
    }
}
