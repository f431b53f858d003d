//! Wall-clock triggers for the registered cron jobs.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::cron::jobs::{ETE_INDEX_JOB, HEALTH_CHECK_JOB, LEARNING_AGGREGATION_JOB, SIGNAL_RETENTION_JOB};
use crate::cron::runner::CronRunner;

fn schedule(config: &SchedulerConfig) -> [(&'static str, &str); 4] {
    [
        (LEARNING_AGGREGATION_JOB, config.learning_cron.as_str()),
        (ETE_INDEX_JOB, config.ete_index_cron.as_str()),
        (HEALTH_CHECK_JOB, config.health_cron.as_str()),
        (SIGNAL_RETENTION_JOB, config.retention_cron.as_str()),
    ]
}

/// Builds and starts the scheduler. Returns `None` when scheduling is disabled.
///
/// Each trigger goes through [`CronRunner::run_cron_job`], so backoff and run
/// logging apply exactly as for manual triggers.
pub async fn start_scheduler(runner: Arc<CronRunner>, config: &SchedulerConfig) -> Result<Option<JobScheduler>> {
    if !config.enabled {
        info!("Cron scheduler disabled");
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    for (job_name, cron) in schedule(config) {
        if !runner.has_job(job_name) {
            warn!(job = job_name, "No cron job registered under this name, not scheduling");
            continue;
        }

        let runner = runner.clone();
        let job = Job::new_async(cron, move |_uuid, _l| {
            let runner = runner.clone();
            Box::pin(async move {
                if let Err(e) = runner.run_cron_job(job_name).await {
                    warn!(job = job_name, error = %e, "Scheduled cron run failed");
                }
            })
        })
        .with_context(|| format!("creating scheduler job {job_name} for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        info!(job = job_name, cron, "Cron job scheduled");
    }

    sched.start().await.context("starting scheduler")?;
    Ok(Some(sched))
}
