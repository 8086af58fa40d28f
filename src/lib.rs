pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod items;
pub mod jobs;
pub mod mailer;
pub mod models;
pub mod pdf;
pub mod proposals;
pub mod publisher;
pub mod schema;
pub mod state;
pub mod storage;
pub mod totals;
pub mod workers;

pub use error::{ServiceError, ServiceResult};
pub use proposals::ProposalService;
pub use workers::{default_handlers, Worker};
