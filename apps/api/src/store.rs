use sqlx::PgPool;

/// Postgres-backed implementation of every persistence seam in the service.
///
/// The trait impls live next to the logic that uses them (`matching::store`,
/// `agent_runs`, `cron::job_state`, ...); this is only the shared handle.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
