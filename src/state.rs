use std::sync::Arc;

use anyhow::{anyhow, Context};

use crate::{
    config::AppConfig,
    db::{PgPool, PgPooledConnection},
    storage::ObjectStorage,
    upload::{Uploader, UploaderConfig},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub uploader: Arc<Uploader>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, storage: Arc<dyn ObjectStorage>) -> Self {
        let uploader = Uploader::new(storage.clone(), UploaderConfig::from(&config.upload));
        Self {
            pool,
            config: Arc::new(config),
            storage,
            uploader: Arc::new(uploader),
        }
    }

    pub fn db(&self) -> anyhow::Result<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| anyhow!("database pool error: {err}"))
    }

    /// Runs blocking diesel work on the blocking pool.
    pub async fn with_conn<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut diesel::PgConnection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("database task panicked")?
    }
}
