use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::pdf;
use crate::proposals::ProposalDetail;
use crate::storage::ObjectStorage;

/// Storage key of a proposal's rendered document. One key per proposal:
/// re-publication overwrites the artifact so it always reflects the
/// current state.
pub fn document_key(proposal_id: Uuid) -> String {
    format!("proposals/{proposal_id}.pdf")
}

pub fn document_filename(proposal_id: Uuid) -> String {
    format!("proposta-{proposal_id}.pdf")
}

#[derive(Debug, Clone)]
pub struct PublishedDocument {
    pub key: String,
    pub url: String,
    pub bytes: Vec<u8>,
}

/// Renders a proposal snapshot and uploads it to durable storage,
/// returning the retrievable reference.
pub struct DocumentPublisher {
    storage: Arc<dyn ObjectStorage>,
    company_name: String,
    company_address: String,
}

impl DocumentPublisher {
    pub fn new(storage: Arc<dyn ObjectStorage>, config: &AppConfig) -> Self {
        Self {
            storage,
            company_name: config.company_name.clone(),
            company_address: config.company_address.clone(),
        }
    }

    pub async fn publish(&self, detail: &ProposalDetail) -> Result<PublishedDocument> {
        let bytes = pdf::render_proposal(detail, &self.company_name, &self.company_address)?;
        let key = document_key(detail.proposal.id);
        let url = self
            .storage
            .put_object(&key, bytes.clone(), Some("application/pdf".to_string()))
            .await?;

        Ok(PublishedDocument { key, url, bytes })
    }
}
