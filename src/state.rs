use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{PgPool, PgPooledConnection},
    error::{ServiceError, ServiceResult},
    mailer::Mailer,
    storage::ObjectStorage,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            mailer,
        }
    }

    pub fn db(&self) -> ServiceResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| ServiceError::Pool(err.to_string()))
    }
}
