mod common;

use anyhow::Result;
use common::{acquire_db_lock, TestApp};
use proposia::audit::{ACTION_DELETED, ACTION_RESTORED};
use proposia::proposals::{CreateProposalInput, ItemInput, ProposalFilter, UpdateProposalInput};
use uuid::Uuid;

fn simple_input(client_id: Uuid, title: &str) -> CreateProposalInput {
    CreateProposalInput {
        title: title.to_string(),
        description: None,
        status: None,
        client_id,
        parent_id: None,
        items: vec![ItemInput {
            description: "Consultoria".to_string(),
            quantity: 1,
            unit_price: 5000,
        }],
    }
}

#[tokio::test]
async fn remove_hides_proposal_and_keeps_the_row() -> Result<()> {
    let _guard = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let user_id = app.insert_user("Ana", "ana@example.com").await?;
    let client_id = app.insert_client("Cliente A", None).await?;

    let service = app.service();
    let created = service.create(simple_input(client_id, "Website"), user_id)?;

    let removed = service.remove(created.proposal.id, user_id)?;
    assert!(removed.deleted_at.is_some());

    let err = service.find_one(created.proposal.id).unwrap_err();
    assert!(err.is_not_found());
    assert!(service.find_all(&ProposalFilter::default())?.is_empty());

    let deleted = service.find_deleted(&ProposalFilter::default())?;
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].proposal.id, created.proposal.id);
    assert_eq!(deleted[0].items.len(), 1);

    let logs = service.find_logs(created.proposal.id)?;
    assert_eq!(logs[0].log.action, ACTION_DELETED);
    assert!(logs[0].log.old_data.is_some());
    assert!(logs[0].log.new_data.is_none());

    app.cleanup().await
}

#[tokio::test]
async fn restore_brings_proposal_back_with_audit_entry() -> Result<()> {
    let _guard = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let user_id = app.insert_user("Ana", "ana@example.com").await?;
    let client_id = app.insert_client("Cliente A", None).await?;

    let service = app.service();
    let created = service.create(simple_input(client_id, "Website"), user_id)?;
    service.remove(created.proposal.id, user_id)?;

    let restored = service.restore(created.proposal.id, user_id)?;
    assert!(restored.deleted_at.is_none());
    assert_eq!(restored.total_amount, 5000);

    let found = service.find_one(created.proposal.id)?;
    assert_eq!(found.items.len(), 1);
    assert!(service.find_deleted(&ProposalFilter::default())?.is_empty());

    let logs = service.find_logs(created.proposal.id)?;
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0].log.action, ACTION_RESTORED);
    assert!(logs[0].log.old_data.is_some());
    assert!(logs[0].log.new_data.is_some());

    app.cleanup().await
}

#[tokio::test]
async fn lifecycle_operations_reject_the_wrong_state() -> Result<()> {
    let _guard = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let user_id = app.insert_user("Ana", "ana@example.com").await?;
    let client_id = app.insert_client("Cliente A", None).await?;

    let service = app.service();
    let created = service.create(simple_input(client_id, "Website"), user_id)?;

    // Restoring an active proposal is a not-found on the deleted set.
    let err = service.restore(created.proposal.id, user_id).unwrap_err();
    assert!(err.is_not_found());

    service.remove(created.proposal.id, user_id)?;

    let err = service.remove(created.proposal.id, user_id).unwrap_err();
    assert!(err.is_not_found());

    let err = service
        .update(
            created.proposal.id,
            UpdateProposalInput {
                title: Some("Website v2".to_string()),
                ..UpdateProposalInput::default()
            },
            user_id,
        )
        .unwrap_err();
    assert!(err.is_not_found());

    app.cleanup().await
}
