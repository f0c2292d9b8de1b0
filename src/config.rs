//! The `commentLog` settings section and its environment overrides.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::db;
use crate::ledger::AcademicYear;

pub const SECTION_KEY: &str = "setup.commentLog";
pub const DEFAULT_CURRENT_ACADEMIC_YEAR: &str = "2025-26";

pub const ENV_CURRENT_YEAR: &str = "COMMENTLOG_CURRENT_YEAR";
pub const ENV_ALLOWED_DOMAIN: &str = "COMMENTLOG_ALLOWED_DOMAIN";
pub const ENV_LOG_LEVEL: &str = "COMMENTLOG_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "COMMENTLOG_LOG_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownField(String),
    InvalidValue { field: String, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField(k) => write!(f, "unknown commentLog field: {k}"),
            Self::InvalidValue { field, reason } => write!(f, "{field} {reason}"),
        }
    }
}

impl Error for ConfigError {}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentLogConfig {
    pub current_academic_year: AcademicYear,
    /// Empty means any domain. Otherwise lowercase with a leading `@`.
    pub allowed_email_domain: String,
    pub maintenance_mode: bool,
}

impl Default for CommentLogConfig {
    fn default() -> Self {
        Self {
            current_academic_year: AcademicYear::new(DEFAULT_CURRENT_ACADEMIC_YEAR),
            allowed_email_domain: String::new(),
            maintenance_mode: false,
        }
    }
}

impl CommentLogConfig {
    pub fn allows_email(&self, email: &str) -> bool {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() || !email.contains('@') {
            return false;
        }
        self.allowed_email_domain.is_empty() || email.ends_with(&self.allowed_email_domain)
    }

    fn to_value(&self) -> Value {
        json!({
            "currentAcademicYear": self.current_academic_year.as_str(),
            "allowedEmailDomain": self.allowed_email_domain,
            "maintenanceMode": self.maintenance_mode,
        })
    }
}

pub fn normalize_domain(raw: &str) -> String {
    let d = raw.trim().to_ascii_lowercase();
    if d.is_empty() || d.starts_with('@') {
        d
    } else {
        format!("@{d}")
    }
}

fn parse_year(v: &Value, key: &str) -> Result<AcademicYear, ConfigError> {
    let s = v.as_str().ok_or_else(|| invalid(key, "must be string"))?.trim();
    if s.is_empty() {
        return Err(invalid(key, "must not be empty"));
    }
    if s.len() > 16 {
        return Err(invalid(key, "length must be <= 16"));
    }
    Ok(AcademicYear::new(s))
}

fn parse_domain(v: &Value, key: &str) -> Result<String, ConfigError> {
    let s = v.as_str().ok_or_else(|| invalid(key, "must be string"))?;
    let d = normalize_domain(s);
    if d.len() > 120 {
        return Err(invalid(key, "length must be <= 120"));
    }
    if d.chars().skip(1).any(|c| c == '@' || c.is_whitespace()) {
        return Err(invalid(key, "must be a bare domain such as @school.edu"));
    }
    Ok(d)
}

/// Applies a patch on top of `current`. Rejects unknown keys and bad values
/// without partially applying.
pub fn merge_patch(
    current: &CommentLogConfig,
    patch: &Map<String, Value>,
) -> Result<CommentLogConfig, ConfigError> {
    let mut next = current.clone();
    for (k, v) in patch {
        match k.as_str() {
            "currentAcademicYear" => next.current_academic_year = parse_year(v, k)?,
            "allowedEmailDomain" => next.allowed_email_domain = parse_domain(v, k)?,
            "maintenanceMode" => {
                next.maintenance_mode = v.as_bool().ok_or_else(|| invalid(k, "must be boolean"))?
            }
            _ => return Err(ConfigError::UnknownField(k.clone())),
        }
    }
    Ok(next)
}

/// Values taken from the process environment at startup. They win over the
/// stored section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub current_academic_year: Option<AcademicYear>,
    pub allowed_email_domain: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            current_academic_year: read(ENV_CURRENT_YEAR).map(AcademicYear::new),
            allowed_email_domain: read(ENV_ALLOWED_DOMAIN).map(|d| normalize_domain(&d)),
        }
    }

    pub fn apply(&self, cfg: &mut CommentLogConfig) {
        if let Some(y) = &self.current_academic_year {
            cfg.current_academic_year = y.clone();
        }
        if let Some(d) = &self.allowed_email_domain {
            cfg.allowed_email_domain = d.clone();
        }
    }
}

/// Stored section merged over defaults, then environment overrides.
pub fn load(conn: &Connection, env: &EnvOverrides) -> anyhow::Result<CommentLogConfig> {
    let mut cfg = CommentLogConfig::default();
    if let Some(saved) = db::settings_get_json(conn, SECTION_KEY)? {
        if let Some(obj) = saved.as_object() {
            // Best-effort: a malformed historical value must not lock users out.
            match merge_patch(&cfg, obj) {
                Ok(merged) => cfg = merged,
                Err(e) => log::warn!("event=config_load module=config status=ignored reason={e}"),
            }
        }
    }
    env.apply(&mut cfg);
    Ok(cfg)
}

/// Persists the stored section. Environment overrides are not written back.
pub fn save(conn: &Connection, cfg: &CommentLogConfig) -> anyhow::Result<()> {
    db::settings_set_json(conn, SECTION_KEY, &cfg.to_value())
}
