use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{NewProposalLog, Proposal, ProposalItem, ProposalLog};
use crate::schema::proposal_logs;

pub const ACTION_CREATED: &str = "created";
pub const ACTION_VERSIONED: &str = "versioned";
pub const ACTION_REVERTED: &str = "reverted";
pub const ACTION_DELETED: &str = "deleted";
pub const ACTION_RESTORED: &str = "restored";

/// Appends one immutable audit row. Runs on the caller's connection, so a
/// failed append aborts the enclosing state transaction. There is no update
/// or delete path for audit rows anywhere in this crate.
pub fn append_log(
    conn: &mut PgConnection,
    proposal_id: Uuid,
    changed_by: Uuid,
    action: &str,
    old_data: Option<Value>,
    new_data: Option<Value>,
) -> QueryResult<ProposalLog> {
    let new_log = NewProposalLog {
        id: Uuid::new_v4(),
        proposal_id,
        changed_by,
        action: action.to_string(),
        old_data,
        new_data,
    };

    diesel::insert_into(proposal_logs::table)
        .values(&new_log)
        .execute(conn)?;

    proposal_logs::table.find(new_log.id).first(conn)
}

/// Full denormalized snapshot of a proposal and its items, decoupled from
/// the live row types so old log entries survive schema evolution.
pub fn snapshot(proposal: &Proposal, items: &[ProposalItem]) -> Value {
    json!({
        "id": proposal.id,
        "title": proposal.title,
        "description": proposal.description,
        "status": proposal.status,
        "total_amount": proposal.total_amount,
        "version": proposal.version,
        "client_id": proposal.client_id,
        "user_id": proposal.user_id,
        "parent_id": proposal.parent_id,
        "document_url": proposal.document_url,
        "items": items
            .iter()
            .map(|item| {
                json!({
                    "description": item.description,
                    "quantity": item.quantity,
                    "unit_price": item.unit_price,
                    "total": item.total,
                })
            })
            .collect::<Vec<_>>(),
    })
}

/// Item data carried inside a snapshot, as used when reverting.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotItem {
    pub description: String,
    pub quantity: i32,
    pub unit_price: i64,
}

/// Scalar fields restored from a snapshot on revert.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotScalars {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: String,
}

/// Extracts the item list of a snapshot, rejecting snapshots that do not
/// describe a complete, well-formed item set.
pub fn snapshot_items(snapshot: &Value) -> Result<Vec<SnapshotItem>, String> {
    let raw = snapshot
        .get("items")
        .ok_or_else(|| "snapshot has no items array".to_string())?;

    if !raw.is_array() {
        return Err("snapshot items is not an array".to_string());
    }

    let items: Vec<SnapshotItem> = serde_json::from_value(raw.clone())
        .map_err(|err| format!("snapshot items are malformed: {err}"))?;

    for (index, item) in items.iter().enumerate() {
        if item.quantity <= 0 {
            return Err(format!("snapshot item {index} has non-positive quantity"));
        }
        if item.unit_price < 0 {
            return Err(format!("snapshot item {index} has negative unit price"));
        }
    }

    Ok(items)
}

pub fn snapshot_scalars(snapshot: &Value) -> Result<SnapshotScalars, String> {
    serde_json::from_value(snapshot.clone())
        .map_err(|err| format!("snapshot scalars are malformed: {err}"))
}
