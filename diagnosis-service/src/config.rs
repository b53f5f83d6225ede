use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::ports::reasoning::ReasoningModels;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Service settings, read once from the environment at startup
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub openrouter_api_key: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub max_steps: usize,
    pub session_ttl_secs: u64,
    pub report_dir: PathBuf,
    pub models: ReasoningModels,
    pub ocr_model: String,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any name -> value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = ReasoningModels::default();

        Ok(Self {
            openrouter_api_key: var("OPENROUTER_API_KEY").ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?,
            port: parsed(&lookup, "PORT", 3000)?,
            database_url: var("DATABASE_URL"),
            max_steps: parsed(&lookup, "MAX_STEPS", 100)?,
            session_ttl_secs: parsed(&lookup, "SESSION_TTL_SECS", 3600)?,
            report_dir: var("REPORT_DIR").unwrap_or_else(|| "reports".to_string()).into(),
            models: ReasoningModels {
                intake: var("INTAKE_MODEL").unwrap_or(defaults.intake),
                triage: var("TRIAGE_MODEL").unwrap_or(defaults.triage),
                specialist: var("SPECIALIST_MODEL").unwrap_or(defaults.specialist),
            },
            ocr_model: var("OCR_MODEL").unwrap_or_else(|| "openai/gpt-4.1-mini".to_string()),
        })
    }
}

fn parsed<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_apply() {
        let config = config(&[("OPENROUTER_API_KEY", "key")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_steps, 100);
        assert_eq!(config.session_ttl_secs, 3600);
        assert_eq!(config.report_dir, PathBuf::from("reports"));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_api_key_is_required() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("OPENROUTER_API_KEY"))));
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = config(&[("OPENROUTER_API_KEY", "key"), ("MAX_STEPS", "lots")]).unwrap_err();
        assert_eq!(err.to_string(), "MAX_STEPS has an invalid value 'lots'");
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("OPENROUTER_API_KEY", "key"),
            ("PORT", "8080"),
            ("TRIAGE_MODEL", "openai/gpt-4o"),
            ("DATABASE_URL", "postgres://localhost/cases"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.models.triage, "openai/gpt-4o");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/cases"));
    }
}
