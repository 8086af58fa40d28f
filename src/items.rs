//! Item-level operations on a proposal.
//!
//! Items are exclusively owned by their proposal, so single-item mutations
//! are expressed as a replacement of the full item set routed through
//! [`ProposalService::update`]'s transaction body. That gives them the same
//! version bump, audit entry, total recomputation and document/notification
//! side effects as any other content change, instead of mutating item rows
//! behind the aggregate's back. The current set is read under the same
//! `FOR UPDATE` lock that guards the replacement, so concurrent item
//! mutations serialize instead of overwriting each other.

use diesel::prelude::*;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Proposal, ProposalItem};
use crate::proposals::{
    self, apply_update, lock_proposal, ItemInput, ProposalDetail, ProposalService,
    UpdateProposalInput,
};
use crate::schema::proposal_items;
use crate::schema::proposals::dsl as proposals_dsl;

/// Partial patch for a single item; `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub unit_price: Option<i64>,
}

impl ProposalService {
    pub fn list_items(&self, proposal_id: Uuid) -> ServiceResult<Vec<ProposalItem>> {
        let mut conn = self.state().db()?;
        require_active_proposal(&mut conn, proposal_id)?;
        proposals::load_items(&mut conn, proposal_id).map_err(ServiceError::from)
    }

    pub fn get_item(&self, proposal_id: Uuid, item_id: Uuid) -> ServiceResult<ProposalItem> {
        let mut conn = self.state().db()?;
        require_active_proposal(&mut conn, proposal_id)?;

        proposal_items::table
            .filter(proposal_items::id.eq(item_id))
            .filter(proposal_items::proposal_id.eq(proposal_id))
            .first(&mut conn)
            .optional()?
            .ok_or(ServiceError::ItemNotFound(item_id, proposal_id))
    }

    pub fn add_item(
        &self,
        proposal_id: Uuid,
        item: ItemInput,
        actor_id: Uuid,
    ) -> ServiceResult<ProposalDetail> {
        self.mutate_items(proposal_id, actor_id, move |existing| {
            let mut items: Vec<ItemInput> = existing.iter().cloned().map(to_input).collect();
            items.push(item);
            Ok(items)
        })
    }

    pub fn update_item(
        &self,
        proposal_id: Uuid,
        item_id: Uuid,
        patch: ItemPatch,
        actor_id: Uuid,
    ) -> ServiceResult<ProposalDetail> {
        self.mutate_items(proposal_id, actor_id, move |existing| {
            if !existing.iter().any(|item| item.id == item_id) {
                return Err(ServiceError::ItemNotFound(item_id, proposal_id));
            }

            Ok(existing
                .iter()
                .cloned()
                .map(|item| {
                    if item.id == item_id {
                        ItemInput {
                            description: patch.description.clone().unwrap_or(item.description),
                            quantity: patch.quantity.unwrap_or(item.quantity),
                            unit_price: patch.unit_price.unwrap_or(item.unit_price),
                        }
                    } else {
                        to_input(item)
                    }
                })
                .collect())
        })
    }

    pub fn remove_item(
        &self,
        proposal_id: Uuid,
        item_id: Uuid,
        actor_id: Uuid,
    ) -> ServiceResult<ProposalDetail> {
        self.mutate_items(proposal_id, actor_id, move |existing| {
            if !existing.iter().any(|item| item.id == item_id) {
                return Err(ServiceError::ItemNotFound(item_id, proposal_id));
            }

            Ok(existing
                .iter()
                .cloned()
                .filter(|item| item.id != item_id)
                .map(to_input)
                .collect())
        })
    }

    /// Reads the current item set under the proposal's row lock, derives the
    /// replacement set and applies it, all in one transaction.
    fn mutate_items<F>(
        &self,
        proposal_id: Uuid,
        actor_id: Uuid,
        build: F,
    ) -> ServiceResult<ProposalDetail>
    where
        F: FnOnce(&[ProposalItem]) -> ServiceResult<Vec<ItemInput>>,
    {
        let mut conn = self.state().db()?;

        conn.transaction::<_, ServiceError, _>(|conn| {
            lock_proposal(conn, proposal_id, false)?;
            let existing = proposals::load_items(conn, proposal_id)?;
            let items = build(&existing)?;

            apply_update(
                conn,
                proposal_id,
                UpdateProposalInput {
                    items: Some(items),
                    ..UpdateProposalInput::default()
                },
                actor_id,
            )
        })
    }
}

fn require_active_proposal(
    conn: &mut diesel::pg::PgConnection,
    proposal_id: Uuid,
) -> ServiceResult<Proposal> {
    proposals_dsl::proposals
        .filter(proposals_dsl::id.eq(proposal_id))
        .filter(proposals_dsl::deleted_at.is_null())
        .first(conn)
        .optional()?
        .ok_or(ServiceError::ProposalNotFound(proposal_id))
}

fn to_input(item: ProposalItem) -> ItemInput {
    ItemInput {
        description: item.description,
        quantity: item.quantity,
        unit_price: item.unit_price,
    }
}
