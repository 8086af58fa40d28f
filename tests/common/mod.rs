use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use once_cell::sync::Lazy;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use proposia::config::AppConfig;
use proposia::db::{self, PgPool};
use proposia::mailer::{MailAttachment, Mailer};
use proposia::models::{Job, NewClient, NewUser};
use proposia::state::AppState;
use proposia::storage::ObjectStorage;
use proposia::ProposalService;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String> {
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(format!("https://fake-storage/{key}"))
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let guard = self.objects.lock().await;
        guard
            .get(key)
            .map(|obj| obj.bytes.clone())
            .ok_or_else(|| anyhow!("object {key} missing"))
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }
}

#[allow(dead_code)]
#[derive(Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub context: Value,
    pub attachments: Vec<MailAttachment>,
}

#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<SentMail>>,
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: &Value,
        attachments: &[MailAttachment],
    ) -> Result<()> {
        let mut guard = self.sent.lock().await;
        guard.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            template: template.to_string(),
            context: context.clone(),
            attachments: attachments.to_vec(),
        });
        Ok(())
    }
}

impl FakeMailer {
    #[allow(dead_code)]
    pub async fn sent(&self) -> Vec<SentMail> {
        let guard = self.sent.lock().await;
        guard.clone()
    }

    #[allow(dead_code)]
    pub async fn sent_count(&self) -> usize {
        let guard = self.sent.lock().await;
        guard.len()
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    storage: Arc<FakeStorage>,
    mailer: Arc<FakeMailer>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: "test-bucket".to_string(),
            s3_public_url: None,
            smtp_host: "127.0.0.1".to_string(),
            smtp_port: 25,
            smtp_username: None,
            smtp_password: None,
            mail_from: "no-reply@test.local".to_string(),
            company_name: "Empresa Teste".to_string(),
            company_address: "Rua de Teste, 1 - Cidade/UF".to_string(),
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let mailer = Arc::new(FakeMailer::default());
        let mailer_for_state: Arc<dyn Mailer> = mailer.clone();
        let state = Arc::new(AppState::new(
            pool,
            config,
            storage_for_state,
            mailer_for_state,
        ));

        Ok(Self {
            state,
            storage,
            mailer,
        })
    }

    pub fn service(&self) -> ProposalService {
        ProposalService::new(self.state.as_ref().clone())
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn mailer(&self) -> Arc<FakeMailer> {
        self.mailer.clone()
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    pub async fn insert_user(&self, name: &str, email: &str) -> Result<Uuid> {
        let name = name.to_string();
        let email = email.to_string();
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                name,
                email,
                password_hash: hash_password("test-password"),
                role: "user".to_string(),
            };
            diesel::insert_into(proposia::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn insert_client(&self, name: &str, email: Option<&str>) -> Result<Uuid> {
        let name = name.to_string();
        let email = email.map(|value| value.to_string());
        self.with_conn(move |conn| {
            let client = NewClient {
                id: Uuid::new_v4(),
                name,
                email,
                phone: None,
                tax_id: None,
                address: None,
            };
            diesel::insert_into(proposia::schema::clients::table)
                .values(&client)
                .execute(conn)
                .context("failed to insert client")?;
            Ok(client.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn clear_jobs(&self) -> Result<()> {
        self.with_conn(|conn| {
            use proposia::schema::jobs::dsl::jobs as jobs_table;
            diesel::delete(jobs_table)
                .execute(conn)
                .context("failed to clear jobs")?;
            Ok(())
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn jobs_by_type(&self, ty: &str) -> Result<Vec<Job>> {
        let ty = ty.to_string();
        self.with_conn(move |conn| {
            use proposia::schema::jobs::dsl::{job_type as job_type_col, jobs as jobs_table};
            let rows = jobs_table
                .filter(job_type_col.eq(&ty))
                .load::<Job>(conn)
                .context("failed to load jobs")?;
            Ok(rows)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE proposal_logs, proposal_items, proposals, clients, users, jobs RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}

fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}
