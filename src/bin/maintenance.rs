use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;

use service_orders::{
    artifacts::ArtifactStore,
    auth::{password, KIND_HASHED, KIND_PLAINTEXT},
    config::AppConfig,
    db,
    models::User,
    orders,
    render::Letterhead,
    s3,
    schema::users,
    storage::S3Storage,
    SubmissionWorkflow,
};

const USAGE: &str = "Usage: maintenance <hash-password <password> | hash-plaintext-credentials | regenerate-missing>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("hash-password") => {
            let plain = args.next().context("hash-password needs a password argument")?;
            println!("{}", password::hash_password(&plain)?);
        }
        Some("hash-plaintext-credentials") => hash_plaintext_credentials()?,
        Some("regenerate-missing") => regenerate_missing().await?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_config() -> Result<AppConfig> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        s3_bucket = %config.s3_bucket,
        "loaded service configuration"
    );
    Ok(config)
}

/// Replaces every plaintext credential with an Argon2 hash of itself.
fn hash_plaintext_credentials() -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    let mut conn = pool
        .get()
        .map_err(|err| anyhow!("failed to get database connection: {err}"))?;

    let pending: Vec<User> = users::table
        .filter(users::credential_kind.eq(KIND_PLAINTEXT))
        .load(&mut conn)
        .context("failed to load users")?;

    if pending.is_empty() {
        println!("No plaintext credentials found.");
        return Ok(());
    }

    for user in &pending {
        let hashed = password::hash_password(&user.credential)?;
        diesel::update(users::table.find(user.id))
            .set((
                users::credential.eq(hashed),
                users::credential_kind.eq(KIND_HASHED),
                users::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)
            .with_context(|| format!("failed to update credential for {}", user.username))?;
    }

    println!("Hashed {} credentials.", pending.len());
    Ok(())
}

/// Renders a document for every order that has none.
async fn regenerate_missing() -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;

    let s3_client = s3::build_client(&config).await?;
    let storage = Arc::new(S3Storage::new(s3_client, config.s3_bucket.clone()));
    let letterhead = Arc::new(Letterhead::from_config(&config)?);
    let workflow = SubmissionWorkflow::new(
        pool.clone(),
        ArtifactStore::new(pool.clone(), storage),
        letterhead,
        config.render_timeout,
    );

    let folios = {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            Ok(orders::folios_without_documents(&mut conn)?)
        })
        .await
        .context("lookup task panicked")??
    };

    if folios.is_empty() {
        println!("Every order already has a document.");
        return Ok(());
    }

    println!("Regenerating {} documents…", folios.len());
    let mut failed = 0usize;
    for folio in &folios {
        if let Err(err) = workflow.regenerate(folio).await {
            failed += 1;
            eprintln!("Failed to regenerate {folio}: {err}");
        }
    }

    println!("Regenerated {} documents, {failed} failed.", folios.len() - failed);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
