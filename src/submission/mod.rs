//! Order submission: persist the order, render it, store the document.
//!
//! The stages run strictly in order and nothing is rolled back. An order whose
//! render or upload failed stays stored without a document; it can be rendered
//! again later through [`SubmissionWorkflow::regenerate`].

pub mod schema;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use diesel::PgConnection;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::db::PgPool;
use crate::models::{Order, OrderDocument};
use crate::orders::{self, OrderStoreError};
use crate::render::{self, Attachment, Letterhead, RenderError, SkippedImage};
use crate::state::AppState;

pub use schema::{OrderSubmission, SubmissionValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Received,
    OrderPersisted,
    Rendered,
    ArtifactPersisted,
    Responded,
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubmissionStage::Received => "received",
            SubmissionStage::OrderPersisted => "order_persisted",
            SubmissionStage::Rendered => "rendered",
            SubmissionStage::ArtifactPersisted => "artifact_persisted",
            SubmissionStage::Responded => "responded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] SubmissionValidationError),
    #[error(transparent)]
    Store(#[from] OrderStoreError),
    #[error("order {folio} was saved but could not be rendered: {source}")]
    Render { folio: String, source: RenderError },
    #[error("order {folio} was rendered but its document could not be stored: {source}")]
    Storage { folio: String, source: ArtifactError },
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SubmissionError {
    /// Stage that was reached before the failure.
    pub fn stage(&self) -> SubmissionStage {
        match self {
            SubmissionError::Render { .. } => SubmissionStage::OrderPersisted,
            SubmissionError::Storage { .. } => SubmissionStage::Rendered,
            _ => SubmissionStage::Received,
        }
    }

    /// Folio of the stored order, when the failure happened after persisting.
    pub fn folio(&self) -> Option<&str> {
        match self {
            SubmissionError::Render { folio, .. } | SubmissionError::Storage { folio, .. } => {
                Some(folio)
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct SubmissionOutcome {
    pub order: Order,
    pub document: OrderDocument,
    pub page_count: usize,
    pub skipped_images: Vec<SkippedImage>,
}

#[derive(Clone)]
pub struct SubmissionWorkflow {
    pool: PgPool,
    artifacts: ArtifactStore,
    letterhead: Arc<Letterhead>,
    render_timeout: Duration,
}

impl SubmissionWorkflow {
    pub fn new(
        pool: PgPool,
        artifacts: ArtifactStore,
        letterhead: Arc<Letterhead>,
        render_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            artifacts,
            letterhead,
            render_timeout,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.pool.clone(),
            state.artifacts(),
            state.letterhead.clone(),
            state.config.render_timeout,
        )
    }

    pub async fn submit(
        &self,
        submission: OrderSubmission,
        attachments: Vec<Attachment>,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let draft = submission.into_draft()?;
        info!(
            stage = %SubmissionStage::Received,
            folio = draft.folio.as_deref().unwrap_or("<allocate>"),
            attachments = attachments.len(),
            "order submission received"
        );

        let order = self
            .with_conn(move |conn| orders::persist_order(conn, &draft).map_err(SubmissionError::from))
            .await?;
        info!(stage = %SubmissionStage::OrderPersisted, folio = %order.folio, "order stored");

        self.render_and_store(order, attachments).await
    }

    /// Renders a stored order again and records a new document for it.
    /// Photos are not kept with orders, so regenerated documents have none.
    pub async fn regenerate(&self, folio: &str) -> Result<SubmissionOutcome, SubmissionError> {
        let lookup = folio.to_string();
        let order = self
            .with_conn(move |conn| orders::find_by_folio(conn, &lookup).map_err(SubmissionError::from))
            .await?;
        info!(folio = %order.folio, "regenerating order document");
        self.render_and_store(order, Vec::new()).await
    }

    async fn render_and_store(
        &self,
        order: Order,
        attachments: Vec<Attachment>,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let folio = order.folio.clone();

        let rendered = match render::render_with_timeout(
            order.clone(),
            attachments,
            self.letterhead.clone(),
            self.render_timeout,
        )
        .await
        {
            Ok(rendered) => rendered,
            Err(source) => {
                error!(%folio, error = %source, "order stored without document");
                return Err(SubmissionError::Render { folio, source });
            }
        };
        for skipped in &rendered.skipped_images {
            warn!(%folio, slot = ?skipped.slot, reason = %skipped.reason, "image left out of document");
        }
        info!(
            stage = %SubmissionStage::Rendered,
            %folio,
            pages = rendered.page_count,
            size_bytes = rendered.bytes.len(),
            "order rendered"
        );

        let document = match self.artifacts.save(&folio, rendered.bytes).await {
            Ok(document) => document,
            Err(source) => {
                error!(%folio, error = %source, "order stored without document");
                return Err(SubmissionError::Storage { folio, source });
            }
        };
        info!(stage = %SubmissionStage::ArtifactPersisted, %folio, "order document stored");

        Ok(SubmissionOutcome {
            order,
            document,
            page_count: rendered.page_count,
            skipped_images: rendered.skipped_images,
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, SubmissionError>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, SubmissionError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| SubmissionError::Pool(err.to_string()))?;
            f(&mut conn)
        })
        .await?
    }
}
