use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    jobs::{mark_job_failed, mark_job_succeeded, reserve_job, retry_job_after, JobQueueError},
    models::Job,
    state::AppState,
};

pub mod notify;
pub mod publish;

#[derive(Debug)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution;
}

/// Polls the job queue and drives the registered handlers. Side effects of
/// lifecycle operations (document publication, notifications) run here,
/// at-least-once, without ever blocking or failing the primary operation.
pub struct Worker {
    state: Arc<AppState>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        state: Arc<AppState>,
        handlers: Vec<Arc<dyn JobHandler>>,
        poll_interval: Duration,
    ) -> Self {
        let map = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers: map,
            poll_interval,
        }
    }

    pub async fn run(&self) {
        info!("worker started");
        loop {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => sleep(self.poll_interval).await,
                Err(err) => {
                    error!(error = %err, "worker tick failed");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Reserves and runs at most one job. Returns whether a job was found.
    pub async fn tick(&self) -> Result<bool, JobQueueError> {
        let job_types: Vec<&str> = self.handlers.keys().copied().collect();
        if job_types.is_empty() {
            return Ok(false);
        }

        let mut conn = match self.state.db() {
            Ok(conn) => conn,
            Err(err) => {
                error!(?err, "failed to obtain database connection in worker");
                return Ok(false);
            }
        };

        let job_opt = reserve_job(&mut conn, &job_types)?;
        drop(conn);

        let Some(job) = job_opt else {
            return Ok(false);
        };

        let result = match self.handlers.get(job.job_type.as_str()) {
            Some(handler) => handler.handle(self.state.clone(), job.clone()).await,
            None => JobExecution::Failed {
                error: "no handler registered".to_string(),
            },
        };
        self.finish(&job, result)?;
        Ok(true)
    }

    fn finish(&self, job: &Job, result: JobExecution) -> Result<(), JobQueueError> {
        let mut conn = match self.state.db() {
            Ok(conn) => conn,
            Err(err) => {
                error!(?err, job_id = %job.id, "failed to record job outcome due to pool error");
                return Ok(());
            }
        };

        match result {
            JobExecution::Success => {
                mark_job_succeeded(&mut conn, job.id)?;
                info!(job_id = %job.id, job_type = %job.job_type, "job completed successfully");
            }
            JobExecution::Retry { delay, error } => {
                warn!(job_id = %job.id, job_type = %job.job_type, %error, "job will retry");
                retry_job_after(&mut conn, job.id, delay, &error)?;
            }
            JobExecution::Failed { error } => {
                error!(job_id = %job.id, job_type = %job.job_type, %error, "job failed");
                mark_job_failed(&mut conn, job.id, &error)?;
            }
        }
        Ok(())
    }
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![
        Arc::new(publish::PublishDocumentJob::new()),
        Arc::new(notify::SendNotificationJob::new()),
    ]
}
