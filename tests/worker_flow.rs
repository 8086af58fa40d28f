mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use common::{acquire_db_lock, TestApp};
use diesel::prelude::*;
use proposia::jobs::{self, JOB_PUBLISH_DOCUMENT, JOB_SEND_NOTIFICATION};
use proposia::proposals::{CreateProposalInput, ItemInput};
use proposia::publisher::{document_filename, document_key};
use proposia::workers::notify::SendNotificationJob;
use proposia::workers::publish::PublishDocumentJob;
use proposia::workers::{JobExecution, JobHandler, Worker};
use uuid::Uuid;

fn proposal_input(client_id: Uuid) -> CreateProposalInput {
    CreateProposalInput {
        title: "Website".to_string(),
        description: None,
        status: None,
        client_id,
        parent_id: None,
        items: vec![ItemInput {
            description: "Design".to_string(),
            quantity: 2,
            unit_price: 1000,
        }],
    }
}

async fn document_url(app: &TestApp, proposal_id: Uuid) -> Result<Option<String>> {
    app.with_conn(move |conn| {
        use proposia::schema::proposals;
        proposals::table
            .find(proposal_id)
            .select(proposals::document_url)
            .first(conn)
            .context("failed to load document url")
    })
    .await
}

#[tokio::test]
async fn publish_job_uploads_pdf_and_persists_url() -> Result<()> {
    let _guard = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let user_id = app.insert_user("Ana", "ana@example.com").await?;
    let client_id = app.insert_client("Cliente A", None).await?;

    let created = app.service().create(proposal_input(client_id), user_id)?;
    let job = app
        .jobs_by_type(JOB_PUBLISH_DOCUMENT)
        .await?
        .into_iter()
        .next()
        .expect("publish job enqueued");

    let execution = PublishDocumentJob::new()
        .handle(app.state.clone(), job)
        .await;
    assert!(matches!(execution, JobExecution::Success));

    let key = document_key(created.proposal.id);
    let stored = app.storage().get(&key).await.expect("uploaded object");
    assert!(stored.bytes.starts_with(b"%PDF"));
    assert_eq!(stored.content_type.as_deref(), Some("application/pdf"));

    let url = document_url(&app, created.proposal.id).await?;
    assert_eq!(url.as_deref(), Some(format!("https://fake-storage/{key}").as_str()));

    app.cleanup().await
}

#[tokio::test]
async fn publish_job_skips_deleted_proposal() -> Result<()> {
    let _guard = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let user_id = app.insert_user("Ana", "ana@example.com").await?;
    let client_id = app.insert_client("Cliente A", None).await?;

    let created = app.service().create(proposal_input(client_id), user_id)?;
    app.service().remove(created.proposal.id, user_id)?;

    let job = app
        .jobs_by_type(JOB_PUBLISH_DOCUMENT)
        .await?
        .into_iter()
        .next()
        .expect("publish job enqueued");

    let execution = PublishDocumentJob::new()
        .handle(app.state.clone(), job)
        .await;
    assert!(matches!(execution, JobExecution::Success));
    assert_eq!(app.storage().object_count().await, 0);

    app.cleanup().await
}

#[tokio::test]
async fn notification_waits_for_document_then_sends_with_attachment() -> Result<()> {
    let _guard = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let user_id = app.insert_user("Ana", "ana@example.com").await?;
    let client_id = app
        .insert_client("Cliente A", Some("cliente-a@example.com"))
        .await?;

    let created = app.service().create(proposal_input(client_id), user_id)?;
    let notify_job = app
        .jobs_by_type(JOB_SEND_NOTIFICATION)
        .await?
        .into_iter()
        .next()
        .expect("notification job enqueued");

    // The document has not been published yet, so the job comes back later.
    let execution = SendNotificationJob::new()
        .handle(app.state.clone(), notify_job.clone())
        .await;
    assert!(matches!(execution, JobExecution::Retry { .. }));
    assert_eq!(app.mailer().sent_count().await, 0);

    let publish_job = app
        .jobs_by_type(JOB_PUBLISH_DOCUMENT)
        .await?
        .into_iter()
        .next()
        .expect("publish job enqueued");
    let execution = PublishDocumentJob::new()
        .handle(app.state.clone(), publish_job)
        .await;
    assert!(matches!(execution, JobExecution::Success));

    let execution = SendNotificationJob::new()
        .handle(app.state.clone(), notify_job)
        .await;
    assert!(matches!(execution, JobExecution::Success));

    let sent = app.mailer().sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "cliente-a@example.com");
    assert_eq!(sent[0].subject, "Nova proposta recebida");
    assert_eq!(sent[0].template, "new-proposal");
    assert_eq!(sent[0].context["proposal"]["title"], "Website");
    assert_eq!(sent[0].context["total_formatted"], "R$ 20,00");
    assert_eq!(sent[0].attachments.len(), 1);
    assert_eq!(
        sent[0].attachments[0].filename,
        document_filename(created.proposal.id)
    );
    assert_eq!(sent[0].attachments[0].content_type, "application/pdf");
    assert!(sent[0].attachments[0].bytes.starts_with(b"%PDF"));

    app.cleanup().await
}

#[tokio::test]
async fn notification_skips_deleted_proposal() -> Result<()> {
    let _guard = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let user_id = app.insert_user("Ana", "ana@example.com").await?;
    let client_id = app
        .insert_client("Cliente A", Some("cliente-a@example.com"))
        .await?;

    let created = app.service().create(proposal_input(client_id), user_id)?;
    app.service().remove(created.proposal.id, user_id)?;

    let notify_job = app
        .jobs_by_type(JOB_SEND_NOTIFICATION)
        .await?
        .into_iter()
        .next()
        .expect("notification job enqueued");

    let execution = SendNotificationJob::new()
        .handle(app.state.clone(), notify_job)
        .await;
    assert!(matches!(execution, JobExecution::Success));
    assert_eq!(app.mailer().sent_count().await, 0);

    app.cleanup().await
}

#[tokio::test]
async fn worker_tick_reserves_and_completes_jobs() -> Result<()> {
    let _guard = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let user_id = app.insert_user("Ana", "ana@example.com").await?;
    let client_id = app.insert_client("Cliente A", None).await?;

    app.service().create(proposal_input(client_id), user_id)?;

    let handlers: Vec<Arc<dyn JobHandler>> = vec![Arc::new(PublishDocumentJob::new())];
    let worker = Worker::new(app.state.clone(), handlers, Duration::from_millis(10));

    assert!(worker.tick().await?);
    assert!(!worker.tick().await?);

    let publish_jobs = app.jobs_by_type(JOB_PUBLISH_DOCUMENT).await?;
    assert_eq!(publish_jobs.len(), 1);
    assert_eq!(publish_jobs[0].status, jobs::STATUS_SUCCEEDED);
    assert_eq!(publish_jobs[0].attempts, 1);
    assert_eq!(app.storage().object_count().await, 1);

    app.cleanup().await
}
