use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::json;
use tokio::task;
use tracing::{info, warn};

use crate::{
    jobs::{self, SendNotificationPayload, JOB_SEND_NOTIFICATION},
    mailer::MailAttachment,
    pdf,
    proposals::{load_detail, ProposalDetail},
    publisher::{document_filename, document_key},
    state::AppState,
};

use super::{publish::retry_or_fail, JobExecution, JobHandler};

/// Emails the client a proposal notification with the published document
/// attached. Waits (by retrying) until the publish job has produced the
/// artifact, so the attachment always matches the proposal state.
pub struct SendNotificationJob;

impl SendNotificationJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for SendNotificationJob {
    fn job_type(&self) -> &'static str {
        JOB_SEND_NOTIFICATION
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: SendNotificationPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid notification payload: {err}"),
                }
            }
        };

        let detail = {
            let state = state.clone();
            let proposal_id = payload.proposal_id;
            let loaded = task::spawn_blocking(move || -> Result<ProposalDetail, String> {
                let mut conn = state.db().map_err(|err| err.to_string())?;
                load_detail(&mut conn, proposal_id).map_err(|err| err.to_string())
            })
            .await;
            match loaded {
                Ok(Ok(detail)) => detail,
                Ok(Err(err)) => return retry_or_fail(&job, err),
                Err(join_err) => {
                    return retry_or_fail(&job, format!("worker panicked: {join_err}"))
                }
            }
        };

        if detail.proposal.deleted_at.is_some() {
            info!(proposal_id = %detail.proposal.id, "skipping notification for deleted proposal");
            return JobExecution::Success;
        }

        let Some(recipient) = detail.client.email.clone() else {
            info!(proposal_id = %detail.proposal.id, "client has no email, skipping notification");
            return JobExecution::Success;
        };

        // The publish job owns the artifact; until it has run, the object
        // is missing and this job simply comes back later.
        let key = document_key(detail.proposal.id);
        let document = match state.storage.get_object(&key).await {
            Ok(bytes) => bytes,
            Err(err) => {
                if jobs::attempts_exhausted(&job) {
                    return JobExecution::Failed {
                        error: format!("document artifact unavailable: {err}"),
                    };
                }
                return JobExecution::Retry {
                    delay: Duration::from_secs(10),
                    error: format!("document artifact not yet available: {err}"),
                };
            }
        };

        let context = notification_context(&detail, &state.config.company_name);
        let attachment = MailAttachment {
            filename: document_filename(detail.proposal.id),
            content_type: "application/pdf".to_string(),
            bytes: document,
        };

        match state
            .mailer
            .send(
                &recipient,
                &payload.subject,
                &payload.template,
                &context,
                &[attachment],
            )
            .await
        {
            Ok(()) => JobExecution::Success,
            Err(err) => {
                warn!(proposal_id = %detail.proposal.id, error = %err, "notification send failed");
                retry_or_fail(&job, err.to_string())
            }
        }
    }
}

fn notification_context(detail: &ProposalDetail, company_name: &str) -> serde_json::Value {
    json!({
        "company_name": company_name,
        "proposal": {
            "title": detail.proposal.title,
            "description": detail.proposal.description,
            "status": detail.proposal.status,
            "version": detail.proposal.version,
        },
        "client": {
            "name": detail.client.name,
        },
        "items": detail
            .items
            .iter()
            .map(|item| {
                json!({
                    "description": item.description,
                    "quantity": item.quantity,
                    "unit_price": pdf::format_currency(item.unit_price),
                    "total": pdf::format_currency(item.total),
                })
            })
            .collect::<Vec<_>>(),
        "total_formatted": pdf::format_currency(detail.proposal.total_amount),
    })
}
