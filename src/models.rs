use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = clients)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub deleted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = clients)]
pub struct NewClient {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = proposals)]
pub struct Proposal {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub total_amount: i64,
    pub version: i32,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub document_url: Option<String>,
    pub deleted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = proposals)]
pub struct NewProposal {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub total_amount: i64,
    pub version: i32,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize)]
#[diesel(table_name = proposal_items)]
#[diesel(belongs_to(Proposal))]
pub struct ProposalItem {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub description: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub total: i64,
    pub sort_order: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = proposal_items)]
pub struct NewProposalItem {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub description: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub total: i64,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = proposal_logs)]
#[diesel(belongs_to(Proposal))]
pub struct ProposalLog {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub changed_by: Uuid,
    pub action: String,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = proposal_logs)]
pub struct NewProposalLog {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub changed_by: Uuid,
    pub action: String,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}
