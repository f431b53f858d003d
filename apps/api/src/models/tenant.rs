use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Operating mode of a tenant. `FireDrill` and `Demo` disable learning-sensitive paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMode {
    Pilot,
    #[default]
    Production,
    Sandbox,
    FireDrill,
    Demo,
}

impl SystemMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemMode::Pilot => "pilot",
            SystemMode::Production => "production",
            SystemMode::Sandbox => "sandbox",
            SystemMode::FireDrill => "fire_drill",
            SystemMode::Demo => "demo",
        }
    }

    /// True for the incident-response / demo modes that short-circuit learning features.
    pub fn suppresses_learning(&self) -> bool {
        matches!(self, SystemMode::FireDrill | SystemMode::Demo)
    }
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pilot" => Ok(SystemMode::Pilot),
            "production" => Ok(SystemMode::Production),
            "sandbox" => Ok(SystemMode::Sandbox),
            "fire_drill" => Ok(SystemMode::FireDrill),
            "demo" => Ok(SystemMode::Demo),
            other => Err(format!("unknown system mode '{other}'")),
        }
    }
}

fn default_min_match_score() -> i32 {
    50
}

fn default_shortlist_max() -> usize {
    5
}

fn default_shortlist_min_score() -> i32 {
    70
}

fn default_explain_verbosity() -> String {
    "standard".to_string()
}

/// Tenant-configurable thresholds governing agent behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guardrails {
    #[serde(default = "default_min_match_score")]
    pub min_match_score: i32,
    #[serde(default = "default_shortlist_max")]
    pub shortlist_max: usize,
    #[serde(default = "default_shortlist_min_score")]
    pub shortlist_min_score: i32,
    #[serde(default = "default_explain_verbosity")]
    pub explain_verbosity: String,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            min_match_score: default_min_match_score(),
            shortlist_max: default_shortlist_max(),
            shortlist_min_score: default_shortlist_min_score(),
            explain_verbosity: default_explain_verbosity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantConfigRow {
    pub tenant_id: Uuid,
    pub system_mode: String,
    pub network_learning_opt_in: bool,
    pub guardrails: Json<Guardrails>,
}

impl TenantConfigRow {
    /// Unknown modes fall back to production.
    pub fn mode(&self) -> SystemMode {
        self.system_mode.parse().unwrap_or_default()
    }
}
