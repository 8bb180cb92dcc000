use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    artifacts::ArtifactStore,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    mail::MailTransport,
    render::Letterhead,
    storage::ObjectStorage,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub mailer: Arc<dyn MailTransport>,
    pub letterhead: Arc<Letterhead>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<dyn MailTransport>,
        letterhead: Letterhead,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            mailer,
            letterhead: Arc::new(letterhead),
        }
    }

    pub fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(self.pool.clone(), self.storage.clone())
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    /// Runs blocking diesel work off the async executor.
    pub async fn with_conn<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = state.db()?;
            f(&mut conn)
        })
        .await?
    }
}
