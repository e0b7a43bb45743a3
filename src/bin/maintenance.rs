use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;

use postflow::{
    config::AppConfig,
    db,
    models::ProjectFile,
    s3,
    schema::project_files,
    types::UploadStatus,
    upload::{Uploader, UploaderConfig},
};

const USAGE: &str = "Usage: maintenance <migrate|verify-files>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("migrate") => migrate()?,
        Some("verify-files") => verify_files().await?,
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
        pool_size = config.database_max_pool_size,
        s3_bucket = %config.s3_bucket,
        "loaded configuration"
    );
    Ok(config)
}

fn migrate() -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let mut conn = pool.get().context("failed to get database connection")?;
    let applied = db::run_migrations(&mut conn)?;
    println!("Applied {applied} migration(s).");
    Ok(())
}

async fn verify_files() -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let storage = Arc::new(s3::build_storage(&config).await?);
    let uploader = Uploader::new(storage, UploaderConfig::from(&config.upload));

    let mut conn = pool.get().context("failed to get database connection")?;
    let files: Vec<ProjectFile> = project_files::table
        .filter(project_files::upload_status.eq(UploadStatus::Completed))
        .filter(project_files::deleted_at.is_null())
        .order(project_files::created_at.asc())
        .load(&mut conn)
        .context("failed to load completed files")?;
    drop(conn);

    if files.is_empty() {
        println!("No completed files found.");
        return Ok(());
    }

    let (mut verified, mut partial, mut missing, mut mismatched) = (0usize, 0usize, 0usize, 0usize);
    for file in &files {
        let expected = file.md5_hash.as_deref().unwrap_or_default();
        match uploader.verify_upload(&file.storage_key, expected).await {
            Ok(report) if !report.exists => {
                missing += 1;
                tracing::warn!(file_id = %file.id, key = %file.storage_key, "object missing");
            }
            Ok(report) if report.partial => {
                partial += 1;
                tracing::info!(file_id = %file.id, key = %file.storage_key, "multipart object present; checksum not comparable");
            }
            Ok(report) if report.verified => verified += 1,
            Ok(report) => {
                mismatched += 1;
                tracing::warn!(
                    file_id = %file.id,
                    key = %file.storage_key,
                    expected = %expected,
                    etag = report.etag.as_deref().unwrap_or_default(),
                    "checksum mismatch"
                );
            }
            Err(err) => {
                mismatched += 1;
                tracing::warn!(file_id = %file.id, key = %file.storage_key, error = %err, "verification failed");
            }
        }
    }

    println!(
        "Checked {} files: {verified} verified, {partial} partial, {missing} missing, {mismatched} failed.",
        files.len()
    );
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
