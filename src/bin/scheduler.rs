use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use postflow::{
    config::AppConfig,
    db,
    scheduler::{EmailSender, HttpEmailSender, PgActivityLedger, PgBookingSource},
    Scheduler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "scheduler",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        enabled = config.scheduler.enabled,
        interval_secs = config.scheduler.interval.as_secs(),
        email_service = config.email_service_url.as_deref().unwrap_or("<unset>"),
        "loaded scheduler configuration"
    );

    let endpoint = config
        .email_service_url
        .clone()
        .context("EMAIL_SERVICE_URL must be set to run the scheduler")?;
    let email: Arc<dyn EmailSender> = Arc::new(HttpEmailSender::new(
        endpoint,
        config.email_service_token.clone(),
    )?);

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let scheduler = Arc::new(Scheduler::new(
        config.scheduler.clone(),
        Arc::new(PgBookingSource::new(pool.clone())),
        Arc::new(PgActivityLedger::new(pool)),
        email,
    ));

    tokio::select! {
        _ = scheduler.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("scheduler received shutdown signal");
        }
    }

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
