use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use diesel::prelude::*;
use tokio::task;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    jobs::{self, PublishDocumentPayload, JOB_PUBLISH_DOCUMENT},
    proposals::{load_detail, ProposalDetail},
    publisher::DocumentPublisher,
    schema::proposals,
    state::AppState,
};

use super::{JobExecution, JobHandler};

/// Renders the current proposal state into a PDF, uploads it and persists
/// the resulting URL on the proposal row.
pub struct PublishDocumentJob;

impl PublishDocumentJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for PublishDocumentJob {
    fn job_type(&self) -> &'static str {
        JOB_PUBLISH_DOCUMENT
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: PublishDocumentPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid publish payload: {err}"),
                }
            }
        };

        let detail = match load_active_detail(state.clone(), payload.proposal_id).await {
            Ok(Some(detail)) => detail,
            Ok(None) => {
                // Deleted (or gone) since the job was enqueued; nothing to render.
                info!(proposal_id = %payload.proposal_id, "skipping publish for inactive proposal");
                return JobExecution::Success;
            }
            Err(err) => return retry_or_fail(&job, err),
        };

        let publisher = DocumentPublisher::new(state.storage.clone(), &state.config);
        let published = match publisher.publish(&detail).await {
            Ok(published) => published,
            Err(err) => {
                warn!(proposal_id = %payload.proposal_id, error = %err, "document publish failed");
                return retry_or_fail(&job, err.to_string());
            }
        };

        let proposal_id = payload.proposal_id;
        let url = published.url.clone();
        let persist = task::spawn_blocking(move || -> Result<(), String> {
            let mut conn = state.db().map_err(|err| err.to_string())?;
            diesel::update(proposals::table.find(proposal_id))
                .set(proposals::document_url.eq(Some(url)))
                .execute(&mut conn)
                .map_err(|err| err.to_string())?;
            Ok(())
        })
        .await;

        match persist {
            Ok(Ok(())) => JobExecution::Success,
            Ok(Err(err)) => retry_or_fail(&job, err),
            Err(join_err) => retry_or_fail(&job, format!("worker panicked: {join_err}")),
        }
    }
}

async fn load_active_detail(
    state: Arc<AppState>,
    proposal_id: Uuid,
) -> Result<Option<ProposalDetail>, String> {
    task::spawn_blocking(move || -> Result<Option<ProposalDetail>, String> {
        let mut conn = state.db().map_err(|err| err.to_string())?;
        let active: Option<Uuid> = proposals::table
            .filter(proposals::id.eq(proposal_id))
            .filter(proposals::deleted_at.is_null())
            .select(proposals::id)
            .first(&mut conn)
            .optional()
            .map_err(|err| err.to_string())?;

        if active.is_none() {
            return Ok(None);
        }

        load_detail(&mut conn, proposal_id)
            .map(Some)
            .map_err(|err| err.to_string())
    })
    .await
    .map_err(|join_err| format!("worker panicked: {join_err}"))?
}

pub(super) fn retry_or_fail(job: &crate::models::Job, error: String) -> JobExecution {
    if jobs::attempts_exhausted(job) {
        JobExecution::Failed { error }
    } else {
        JobExecution::Retry {
            delay: Duration::from_secs(30),
            error,
        }
    }
}
