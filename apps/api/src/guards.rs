//! Tenant-scoped preconditions consulted before an agent runs: kill switches,
//! feature flags, usage limits and the tenant's mode/guardrails.

use async_trait::async_trait;
use sqlx::types::Json;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::tenant::{Guardrails, SystemMode, TenantConfigRow};
use crate::store::PgStore;

pub const SCORING_FLAG: &str = "SCORING";

/// Usage counter charged once per agent run.
pub const AGENT_RUNS_RESOURCE: &str = "agent_runs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentName {
    Matcher,
    Shortlist,
}

impl AgentName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Matcher => "MATCHER",
            AgentName::Shortlist => "SHORTLIST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub used: i64,
    /// `None` means the plan has no cap for this resource.
    pub limit: Option<i64>,
}

impl UsageSnapshot {
    pub fn is_exhausted(&self) -> bool {
        self.limit.map(|limit| self.used >= limit).unwrap_or(false)
    }
}

#[async_trait]
pub trait Guards: Send + Sync {
    /// `Some(reason)` while the named switch is engaged.
    async fn kill_switch_reason(&self, name: &str) -> Result<Option<String>, AppError>;

    /// Missing flags read as disabled. Tenant overrides win over the global row.
    async fn is_feature_enabled_for_tenant(&self, tenant_id: Uuid, flag: &str) -> Result<bool, AppError>;

    async fn usage_for(&self, tenant_id: Uuid, resource: &str) -> Result<UsageSnapshot, AppError>;

    async fn record_usage(&self, tenant_id: Uuid, resource: &str, amount: i64) -> Result<(), AppError>;

    /// Falls back to production mode, no learning opt-in and default guardrails.
    async fn tenant_config(&self, tenant_id: Uuid) -> Result<TenantConfigRow, AppError>;
}

pub fn default_tenant_config(tenant_id: Uuid) -> TenantConfigRow {
    TenantConfigRow {
        tenant_id,
        system_mode: SystemMode::default().as_str().to_string(),
        network_learning_opt_in: false,
        guardrails: Json(Guardrails::default()),
    }
}

pub async fn assert_kill_switch_disarmed(guards: &dyn Guards, name: &str) -> Result<(), AppError> {
    match guards.kill_switch_reason(name).await? {
        Some(reason) => {
            warn!(switch = %name, %reason, "Kill switch engaged");
            Err(AppError::KillSwitchEngaged(name.to_string()))
        }
        None => Ok(()),
    }
}

pub async fn assert_feature_enabled(
    guards: &dyn Guards,
    tenant_id: Uuid,
    flag: &str,
) -> Result<(), AppError> {
    if guards.is_feature_enabled_for_tenant(tenant_id, flag).await? {
        Ok(())
    } else {
        Err(AppError::FeatureDisabled {
            flag: flag.to_string(),
            tenant_id: tenant_id.to_string(),
        })
    }
}

pub async fn assert_tenant_within_limits(
    guards: &dyn Guards,
    tenant_id: Uuid,
    resource: &str,
) -> Result<(), AppError> {
    let usage = guards.usage_for(tenant_id, resource).await?;
    if usage.is_exhausted() {
        return Err(AppError::UsageLimitExceeded(format!(
            "tenant {tenant_id} used {}/{} {resource}",
            usage.used,
            usage.limit.unwrap_or_default()
        )));
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl Guards for PgStore {
    async fn kill_switch_reason(&self, name: &str) -> Result<Option<String>, AppError> {
        let row: Option<(bool, Option<String>)> =
            sqlx::query_as("SELECT engaged, reason FROM kill_switches WHERE name = $1")
                .bind(name)
                .fetch_optional(self.pool())
                .await?;

        Ok(match row {
            Some((true, reason)) => Some(reason.unwrap_or_else(|| "engaged by operator".to_string())),
            _ => None,
        })
    }

    async fn is_feature_enabled_for_tenant(&self, tenant_id: Uuid, flag: &str) -> Result<bool, AppError> {
        let enabled: Option<bool> = sqlx::query_scalar(
            r#"
            SELECT enabled FROM feature_flags
            WHERE name = $1 AND (tenant_id = $2 OR tenant_id IS NULL)
            ORDER BY tenant_id NULLS LAST
            LIMIT 1
            "#,
        )
        .bind(flag)
        .bind(tenant_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(enabled.unwrap_or(false))
    }

    async fn usage_for(&self, tenant_id: Uuid, resource: &str) -> Result<UsageSnapshot, AppError> {
        let row: Option<(i64, Option<i64>)> = sqlx::query_as(
            "SELECT used, limit_value FROM tenant_usage WHERE tenant_id = $1 AND resource = $2",
        )
        .bind(tenant_id)
        .bind(resource)
        .fetch_optional(self.pool())
        .await?;

        Ok(row
            .map(|(used, limit)| UsageSnapshot { used, limit })
            .unwrap_or(UsageSnapshot { used: 0, limit: None }))
    }

    async fn record_usage(&self, tenant_id: Uuid, resource: &str, amount: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO tenant_usage (tenant_id, resource, used)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, resource) DO UPDATE SET used = tenant_usage.used + EXCLUDED.used
            "#,
        )
        .bind(tenant_id)
        .bind(resource)
        .bind(amount)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn tenant_config(&self, tenant_id: Uuid) -> Result<TenantConfigRow, AppError> {
        let row = sqlx::query_as::<_, TenantConfigRow>(
            r#"
            SELECT tenant_id, system_mode, network_learning_opt_in, guardrails
            FROM tenant_configs
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.unwrap_or_else(|| default_tenant_config(tenant_id)))
    }
}
