use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;

pub const DEFAULT_TABLE: &str = "calificaciones_administracion_y_finanzas_utn";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: Url,
    pub api_key: String,
    pub table: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PgConfig {
    pub database_url: String,
    pub table: String,
}

impl RestConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_url = required(&get, "SUPABASE_URL")?;
        let base_url = Url::parse(&raw_url).map_err(|err| ConfigError::Invalid {
            name: "SUPABASE_URL",
            reason: err.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "SUPABASE_URL",
                reason: format!("unsupported scheme `{}`", base_url.scheme()),
            });
        }

        let api_key = required(&get, "SUPABASE_KEY")?;

        let timeout_secs = match get("GRADES_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "GRADES_TIMEOUT_SECS",
                    reason: format!("expected a positive number of seconds, got `{raw}`"),
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url,
            api_key,
            table: table_name(&get)?,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl PgConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required(&get, "DATABASE_URL")?,
            table: table_name(&get)?,
        })
    }
}

fn required(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    get(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn table_name(get: &impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    let table = get("GRADES_TABLE")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_TABLE.to_string());

    // Interpolated into URLs and SQL, so only plain identifiers are accepted.
    let valid = table.split('.').count() <= 2 && table.split('.').all(is_identifier);
    if !valid {
        return Err(ConfigError::Invalid {
            name: "GRADES_TABLE",
            reason: format!("`{table}` is not a plain table identifier"),
        });
    }
    Ok(table)
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
