use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::audit::{
    self, append_log, ACTION_CREATED, ACTION_DELETED, ACTION_RESTORED, ACTION_REVERTED,
    ACTION_VERSIONED,
};
use crate::error::{ServiceError, ServiceResult};
use crate::jobs::{self, SendNotificationPayload};
use crate::models::{Client, NewProposal, NewProposalItem, Proposal, ProposalItem, ProposalLog};
use crate::schema::{clients, proposal_items, proposal_logs, proposals, users};
use crate::state::AppState;
use crate::totals;

pub const STATUS_DRAFT: &str = "draft";
pub const STATUS_SENT: &str = "sent";
pub const STATUS_ACCEPTED: &str = "accepted";
pub const STATUS_REJECTED: &str = "rejected";

pub const TEMPLATE_NEW_PROPOSAL: &str = "new-proposal";

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub struct ItemInput {
    pub description: String,
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, Clone)]
pub struct CreateProposalInput {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub client_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub items: Vec<ItemInput>,
}

/// Partial update: `None` fields are left untouched. A `Some` item list
/// replaces the full item set; `description: Some(None)` clears the
/// description to null.
#[derive(Debug, Clone, Default)]
pub struct UpdateProposalInput {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    pub client_id: Option<Uuid>,
    pub items: Option<Vec<ItemInput>>,
}

#[derive(Debug, Clone, Default)]
pub struct ProposalFilter {
    pub title: Option<String>,
    pub status: Option<String>,
    pub client_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// A proposal together with the relations every lifecycle operation works
/// on: its exclusively-owned items and the referenced client.
#[derive(Debug, Clone)]
pub struct ProposalDetail {
    pub proposal: Proposal,
    pub client: Client,
    pub items: Vec<ProposalItem>,
}

/// Actor projection exposed on audit entries. Credentials never leave the
/// users table.
#[derive(Debug, Clone, Queryable, Serialize)]
pub struct ActorRef {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct ProposalLogEntry {
    pub log: ProposalLog,
    pub changed_by: ActorRef,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = proposals)]
struct ProposalChangeset<'a> {
    title: Option<&'a str>,
    description: Option<Option<&'a str>>,
    status: Option<&'a str>,
    client_id: Option<Uuid>,
}

/// The proposal lifecycle engine. Every mutating operation runs as one
/// transaction: scalar writes, item replacement, total recomputation, the
/// audit append and the side-effect job enqueues commit or roll back
/// together. Document publication and notification dispatch themselves run
/// later on the worker and never fail a lifecycle call.
#[derive(Clone)]
pub struct ProposalService {
    state: AppState,
}

impl ProposalService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn create(&self, input: CreateProposalInput, actor_id: Uuid) -> ServiceResult<ProposalDetail> {
        let mut conn = self.state.db()?;

        conn.transaction::<_, ServiceError, _>(|conn| {
            let client = load_active_client(conn, input.client_id)?;

            let proposal_id = Uuid::new_v4();
            let new_proposal = NewProposal {
                id: proposal_id,
                title: input.title,
                description: input.description,
                status: input.status.unwrap_or_else(|| STATUS_DRAFT.to_string()),
                total_amount: 0,
                version: 1,
                client_id: client.id,
                user_id: actor_id,
                parent_id: input.parent_id,
            };

            diesel::insert_into(proposals::table)
                .values(&new_proposal)
                .execute(conn)?;

            insert_items(conn, proposal_id, &input.items)?;
            recompute_total(conn, proposal_id)?;

            let detail = load_detail(conn, proposal_id)?;
            let snapshot = audit::snapshot(&detail.proposal, &detail.items);
            append_log(conn, proposal_id, actor_id, ACTION_CREATED, None, Some(snapshot))?;

            enqueue_publish(conn, proposal_id)?;
            if detail.client.email.is_some() {
                enqueue_notification(conn, proposal_id, "Nova proposta recebida")?;
            }

            Ok(detail)
        })
    }

    pub fn find_all(&self, filter: &ProposalFilter) -> ServiceResult<Vec<ProposalDetail>> {
        let mut conn = self.state.db()?;
        list_proposals(&mut conn, filter, false)
    }

    pub fn find_deleted(&self, filter: &ProposalFilter) -> ServiceResult<Vec<ProposalDetail>> {
        let mut conn = self.state.db()?;
        list_proposals(&mut conn, filter, true)
    }

    pub fn find_one(&self, id: Uuid) -> ServiceResult<ProposalDetail> {
        let mut conn = self.state.db()?;

        let exists: Option<Proposal> = proposals::table
            .filter(proposals::id.eq(id))
            .filter(proposals::deleted_at.is_null())
            .first(&mut conn)
            .optional()?;

        if exists.is_none() {
            return Err(ServiceError::ProposalNotFound(id));
        }

        load_detail(&mut conn, id).map_err(ServiceError::from)
    }

    pub fn update(
        &self,
        id: Uuid,
        input: UpdateProposalInput,
        actor_id: Uuid,
    ) -> ServiceResult<ProposalDetail> {
        let mut conn = self.state.db()?;
        conn.transaction::<_, ServiceError, _>(|conn| apply_update(conn, id, input, actor_id))
    }

    /// Soft delete: the row stays behind with `deleted_at` set, so restore
    /// and revert remain meaningful.
    pub fn remove(&self, id: Uuid, actor_id: Uuid) -> ServiceResult<Proposal> {
        let mut conn = self.state.db()?;

        conn.transaction::<_, ServiceError, _>(|conn| {
            let existing = lock_proposal(conn, id, false)?;
            let items = load_items(conn, id)?;
            let snapshot = audit::snapshot(&existing, &items);

            diesel::update(proposals::table.find(id))
                .set((
                    proposals::deleted_at.eq(diesel::dsl::now),
                    proposals::updated_at.eq(diesel::dsl::now),
                ))
                .execute(conn)?;

            append_log(conn, id, actor_id, ACTION_DELETED, Some(snapshot), None)?;

            proposals::table
                .find(id)
                .first(conn)
                .map_err(ServiceError::from)
        })
    }

    pub fn restore(&self, id: Uuid, actor_id: Uuid) -> ServiceResult<Proposal> {
        let mut conn = self.state.db()?;

        conn.transaction::<_, ServiceError, _>(|conn| {
            let existing = lock_proposal(conn, id, true)?;
            let items = load_items(conn, id)?;
            let old_snapshot = audit::snapshot(&existing, &items);

            diesel::update(proposals::table.find(id))
                .set((
                    proposals::deleted_at.eq::<Option<chrono::NaiveDateTime>>(None),
                    proposals::updated_at.eq(diesel::dsl::now),
                ))
                .execute(conn)?;

            let restored: Proposal = proposals::table.find(id).first(conn)?;
            let new_snapshot = audit::snapshot(&restored, &items);
            append_log(
                conn,
                id,
                actor_id,
                ACTION_RESTORED,
                Some(old_snapshot),
                Some(new_snapshot),
            )?;

            Ok(restored)
        })
    }

    /// Rewinds title/description/status and the full item set to the
    /// `new_data` snapshot of an earlier log entry. The version keeps
    /// moving forward; history is never rewritten.
    pub fn revert(
        &self,
        proposal_id: Uuid,
        log_id: Uuid,
        actor_id: Uuid,
    ) -> ServiceResult<ProposalDetail> {
        let mut conn = self.state.db()?;

        conn.transaction::<_, ServiceError, _>(|conn| {
            let existing = lock_proposal(conn, proposal_id, false)?;

            let log: Option<ProposalLog> = proposal_logs::table
                .find(log_id)
                .first(conn)
                .optional()?;
            let log = match log {
                Some(log) if log.proposal_id == proposal_id => log,
                _ => return Err(ServiceError::LogNotFound(log_id, proposal_id)),
            };

            let snapshot_value = log.new_data.as_ref().ok_or_else(|| {
                ServiceError::InvalidSnapshot {
                    log_id,
                    reason: "log entry has no new_data snapshot".to_string(),
                }
            })?;

            let snapshot_items = audit::snapshot_items(snapshot_value)
                .map_err(|reason| ServiceError::InvalidSnapshot { log_id, reason })?;
            let scalars = audit::snapshot_scalars(snapshot_value)
                .map_err(|reason| ServiceError::InvalidSnapshot { log_id, reason })?;

            let old_items = load_items(conn, proposal_id)?;
            let old_snapshot = audit::snapshot(&existing, &old_items);

            delete_items(conn, proposal_id)?;
            let restored_items: Vec<ItemInput> = snapshot_items
                .into_iter()
                .map(|item| ItemInput {
                    description: item.description,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect();
            insert_items(conn, proposal_id, &restored_items)?;

            diesel::update(proposals::table.find(proposal_id))
                .set((
                    proposals::title.eq(&scalars.title),
                    proposals::description.eq(scalars.description.as_deref()),
                    proposals::status.eq(&scalars.status),
                    proposals::version.eq(existing.version + 1),
                    proposals::updated_at.eq(diesel::dsl::now),
                ))
                .execute(conn)?;

            recompute_total(conn, proposal_id)?;

            let detail = load_detail(conn, proposal_id)?;
            let new_snapshot = audit::snapshot(&detail.proposal, &detail.items);
            append_log(
                conn,
                proposal_id,
                actor_id,
                ACTION_REVERTED,
                Some(old_snapshot),
                Some(new_snapshot),
            )?;

            enqueue_publish(conn, proposal_id)?;

            Ok(detail)
        })
    }

    /// Audit history, newest first, with the actor projected down to
    /// id/name/email.
    pub fn find_logs(&self, proposal_id: Uuid) -> ServiceResult<Vec<ProposalLogEntry>> {
        let mut conn = self.state.db()?;

        let rows: Vec<(ProposalLog, ActorRef)> = proposal_logs::table
            .inner_join(users::table)
            .filter(proposal_logs::proposal_id.eq(proposal_id))
            .order(proposal_logs::created_at.desc())
            .select((
                proposal_logs::all_columns,
                (users::id, users::name, users::email),
            ))
            .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|(log, changed_by)| ProposalLogEntry { log, changed_by })
            .collect())
    }

    pub(crate) fn state(&self) -> &AppState {
        &self.state
    }
}

/// Body of [`ProposalService::update`], callable from inside an open
/// transaction so composed mutations (item operations) stay atomic with
/// their preceding reads. Takes the `FOR UPDATE` row lock itself.
pub(crate) fn apply_update(
    conn: &mut PgConnection,
    id: Uuid,
    input: UpdateProposalInput,
    actor_id: Uuid,
) -> ServiceResult<ProposalDetail> {
    let existing = lock_proposal(conn, id, false)?;
    let old_items = load_items(conn, id)?;
    let old_snapshot = audit::snapshot(&existing, &old_items);

    if let Some(client_id) = input.client_id {
        load_active_client(conn, client_id)?;
    }

    let items_replaced = input.items.is_some();
    if let Some(items) = &input.items {
        delete_items(conn, id)?;
        insert_items(conn, id, items)?;
    }

    let changeset = ProposalChangeset {
        title: input.title.as_deref(),
        description: input.description.as_ref().map(|value| value.as_deref()),
        status: input.status.as_deref(),
        client_id: input.client_id,
    };

    // Version bumps by exactly one, no matter which fields changed.
    diesel::update(proposals::table.find(id))
        .set((
            &changeset,
            proposals::version.eq(existing.version + 1),
            proposals::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)?;

    recompute_total(conn, id)?;

    let detail = load_detail(conn, id)?;
    let new_snapshot = audit::snapshot(&detail.proposal, &detail.items);
    append_log(
        conn,
        id,
        actor_id,
        ACTION_VERSIONED,
        Some(old_snapshot),
        Some(new_snapshot),
    )?;

    enqueue_publish(conn, id)?;
    if items_replaced && detail.client.email.is_some() {
        enqueue_notification(conn, id, "Proposta atualizada")?;
    }

    Ok(detail)
}

fn load_active_client(conn: &mut PgConnection, client_id: Uuid) -> ServiceResult<Client> {
    clients::table
        .filter(clients::id.eq(client_id))
        .filter(clients::deleted_at.is_null())
        .first(conn)
        .optional()?
        .ok_or(ServiceError::ClientNotFound(client_id))
}

/// Locks the proposal row for the rest of the transaction, so concurrent
/// mutations cannot interleave the delete-all/insert-all item replacement.
pub(crate) fn lock_proposal(
    conn: &mut PgConnection,
    id: Uuid,
    deleted: bool,
) -> ServiceResult<Proposal> {
    // Locking clauses cannot be applied to boxed queries, hence the branch.
    let row: Option<Proposal> = if deleted {
        proposals::table
            .filter(proposals::id.eq(id))
            .filter(proposals::deleted_at.is_not_null())
            .for_update()
            .first(conn)
            .optional()?
    } else {
        proposals::table
            .filter(proposals::id.eq(id))
            .filter(proposals::deleted_at.is_null())
            .for_update()
            .first(conn)
            .optional()?
    };

    row.ok_or(ServiceError::ProposalNotFound(id))
}

pub(crate) fn load_items(conn: &mut PgConnection, proposal_id: Uuid) -> QueryResult<Vec<ProposalItem>> {
    proposal_items::table
        .filter(proposal_items::proposal_id.eq(proposal_id))
        .order((proposal_items::sort_order.asc(), proposal_items::id.asc()))
        .load(conn)
}

fn delete_items(conn: &mut PgConnection, proposal_id: Uuid) -> QueryResult<usize> {
    diesel::delete(proposal_items::table.filter(proposal_items::proposal_id.eq(proposal_id)))
        .execute(conn)
}

fn insert_items(conn: &mut PgConnection, proposal_id: Uuid, items: &[ItemInput]) -> QueryResult<()> {
    if items.is_empty() {
        return Ok(());
    }

    // Input order is the display order, in listings, snapshots and the
    // rendered document alike.
    let rows: Vec<NewProposalItem> = items
        .iter()
        .enumerate()
        .map(|(index, item)| NewProposalItem {
            id: Uuid::new_v4(),
            proposal_id,
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total: totals::line_total(item.quantity, item.unit_price),
            sort_order: index as i32,
        })
        .collect();

    diesel::insert_into(proposal_items::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

/// Re-derives the total from the persisted item rows, never from
/// caller-supplied values, and writes it back.
fn recompute_total(conn: &mut PgConnection, proposal_id: Uuid) -> QueryResult<i64> {
    let items = load_items(conn, proposal_id)?;
    let total = totals::proposal_total(&items);

    diesel::update(proposals::table.find(proposal_id))
        .set(proposals::total_amount.eq(total))
        .execute(conn)?;

    Ok(total)
}

pub(crate) fn load_detail(conn: &mut PgConnection, proposal_id: Uuid) -> QueryResult<ProposalDetail> {
    let proposal: Proposal = proposals::table.find(proposal_id).first(conn)?;
    let client: Client = clients::table.find(proposal.client_id).first(conn)?;
    let items = load_items(conn, proposal_id)?;

    Ok(ProposalDetail {
        proposal,
        client,
        items,
    })
}

fn list_proposals(
    conn: &mut PgConnection,
    filter: &ProposalFilter,
    deleted: bool,
) -> ServiceResult<Vec<ProposalDetail>> {
    let page = filter.page.unwrap_or(1).max(1);
    let per_page = filter
        .per_page
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let mut query = proposals::table.into_boxed();

    query = if deleted {
        query.filter(proposals::deleted_at.is_not_null())
    } else {
        query.filter(proposals::deleted_at.is_null())
    };

    if let Some(title) = &filter.title {
        query = query.filter(proposals::title.ilike(format!("%{title}%")));
    }
    if let Some(status) = &filter.status {
        query = query.filter(proposals::status.eq(status.clone()));
    }
    if let Some(client_id) = filter.client_id {
        query = query.filter(proposals::client_id.eq(client_id));
    }
    if let Some(user_id) = filter.user_id {
        query = query.filter(proposals::user_id.eq(user_id));
    }

    let rows: Vec<Proposal> = query
        .order(proposals::created_at.desc())
        .offset((page - 1) * per_page)
        .limit(per_page)
        .load(conn)?;

    let grouped_items = ProposalItem::belonging_to(&rows)
        .order((proposal_items::sort_order.asc(), proposal_items::id.asc()))
        .load::<ProposalItem>(conn)?
        .grouped_by(&rows);

    let client_ids: Vec<Uuid> = rows.iter().map(|p| p.client_id).collect();
    let client_rows: Vec<Client> = clients::table
        .filter(clients::id.eq_any(&client_ids))
        .load(conn)?;

    let mut details = Vec::with_capacity(rows.len());
    for (proposal, items) in rows.into_iter().zip(grouped_items) {
        let client = client_rows
            .iter()
            .find(|client| client.id == proposal.client_id)
            .cloned()
            .ok_or(ServiceError::ClientNotFound(proposal.client_id))?;
        details.push(ProposalDetail {
            proposal,
            client,
            items,
        });
    }

    Ok(details)
}

fn enqueue_publish(conn: &mut PgConnection, proposal_id: Uuid) -> ServiceResult<()> {
    jobs::enqueue_publish_document(conn, proposal_id)?;
    Ok(())
}

fn enqueue_notification(
    conn: &mut PgConnection,
    proposal_id: Uuid,
    subject: &str,
) -> ServiceResult<()> {
    jobs::enqueue_send_notification(
        conn,
        &SendNotificationPayload {
            proposal_id,
            template: TEMPLATE_NEW_PROPOSAL.to_string(),
            subject: subject.to_string(),
        },
    )?;
    Ok(())
}
