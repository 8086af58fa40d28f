use std::env;

use anyhow::{Context, Result};
use diesel::prelude::*;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use proposia::{
    config::AppConfig,
    db,
    models::{NewClient, NewUser},
    schema::{clients, users},
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "seed",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;

    seed_admin(&mut conn)?;
    seed_demo_client(&mut conn)?;

    Ok(())
}

fn seed_admin(conn: &mut PgConnection) -> Result<()> {
    let email = env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@proposia.local".to_string());
    let name = env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrador".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "changeme".to_string());

    let admin = NewUser {
        id: Uuid::new_v4(),
        name,
        email: email.clone(),
        password_hash: hash_password(&password),
        role: "admin".to_string(),
    };

    let inserted = diesel::insert_into(users::table)
        .values(&admin)
        .on_conflict(users::email)
        .do_nothing()
        .execute(conn)
        .context("failed to insert admin user")?;

    if inserted > 0 {
        tracing::info!(%email, "created admin user");
    } else {
        tracing::info!(%email, "admin user already present");
    }

    Ok(())
}

fn seed_demo_client(conn: &mut PgConnection) -> Result<()> {
    let name = "Cliente Exemplo";
    let existing: i64 = clients::table
        .filter(clients::name.eq(name))
        .count()
        .get_result(conn)
        .context("failed to check for demo client")?;

    if existing > 0 {
        tracing::info!(client = name, "demo client already present");
        return Ok(());
    }

    let demo = NewClient {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: Some("cliente@example.com".to_string()),
        phone: Some("+55 11 99999-0000".to_string()),
        tax_id: None,
        address: Some("Rua Exemplo, 123 - Cidade/Estado".to_string()),
    };

    diesel::insert_into(clients::table)
        .values(&demo)
        .execute(conn)
        .context("failed to insert demo client")?;

    tracing::info!(client = name, "created demo client");
    Ok(())
}

fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    hex::encode(digest)
}
