//! Rendered order documents: bytes in object storage, one `order_documents`
//! row per render. Rows are never updated; the newest row for a folio is the
//! current document.

use std::sync::Arc;

use diesel::prelude::*;
use diesel::PgConnection;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::{NewOrderDocument, OrderDocument};
use crate::schema::order_documents;
use crate::storage::{ObjectMetadata, ObjectStorage};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("no document stored for order {0}")]
    NotFound(String),
    #[error("object storage error: {0:#}")]
    Storage(anyhow::Error),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type ArtifactResult<T> = Result<T, ArtifactError>;

#[derive(Clone)]
pub struct ArtifactStore {
    pool: PgPool,
    storage: Arc<dyn ObjectStorage>,
}

impl ArtifactStore {
    pub fn new(pool: PgPool, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { pool, storage }
    }

    /// Uploads `bytes` and records them as the newest document of `folio`.
    pub async fn save(&self, folio: &str, bytes: Vec<u8>) -> ArtifactResult<OrderDocument> {
        let id = Uuid::new_v4();
        let s3_key = artifact_key(folio, id);
        let checksum = hex::encode(Sha256::digest(&bytes));
        let size_bytes = bytes.len() as i64;

        self.storage
            .put_object(
                &s3_key,
                bytes,
                ObjectMetadata {
                    content_type: Some(PDF_CONTENT_TYPE.to_string()),
                    content_disposition: Some(attachment_content_disposition(
                        &download_filename(folio),
                    )),
                },
            )
            .await
            .map_err(ArtifactError::Storage)?;

        let row = NewOrderDocument {
            id,
            folio: folio.to_string(),
            s3_key: s3_key.clone(),
            size_bytes,
            checksum,
        };
        let inserted = self
            .with_conn(move |conn| {
                diesel::insert_into(order_documents::table)
                    .values(&row)
                    .get_result::<OrderDocument>(conn)
                    .map_err(ArtifactError::from)
            })
            .await;

        match inserted {
            Ok(document) => {
                info!(%folio, key = %document.s3_key, size_bytes, "stored order document");
                Ok(document)
            }
            Err(err) => {
                warn!(%folio, key = %s3_key, error = %err, "uploaded document has no database row");
                Err(err)
            }
        }
    }

    pub async fn latest(&self, folio: &str) -> ArtifactResult<OrderDocument> {
        let lookup = folio.to_string();
        self.with_conn(move |conn| latest_document(conn, &lookup))
            .await?
            .ok_or_else(|| ArtifactError::NotFound(folio.to_string()))
    }

    /// Bytes of the newest document for `folio`.
    pub async fn load_latest(&self, folio: &str) -> ArtifactResult<(OrderDocument, Vec<u8>)> {
        let document = self.latest(folio).await?;
        let bytes = self
            .storage
            .get_object(&document.s3_key)
            .await
            .map_err(ArtifactError::Storage)?;
        Ok((document, bytes))
    }

    async fn with_conn<F, T>(&self, f: F) -> ArtifactResult<T>
    where
        F: FnOnce(&mut PgConnection) -> ArtifactResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| ArtifactError::Pool(err.to_string()))?;
            f(&mut conn)
        })
        .await?
    }
}

pub fn latest_document(
    conn: &mut PgConnection,
    folio: &str,
) -> ArtifactResult<Option<OrderDocument>> {
    let document = order_documents::table
        .filter(order_documents::folio.eq(folio))
        .order((order_documents::created_at.desc(), order_documents::id.desc()))
        .first::<OrderDocument>(conn)
        .optional()?;
    Ok(document)
}

pub fn artifact_key(folio: &str, id: Uuid) -> String {
    format!("orders/{folio}/{id}.pdf")
}

/// Name offered to the browser and used for mail attachments.
pub fn download_filename(folio: &str) -> String {
    format!("orden-{folio}.pdf")
}

pub fn attachment_content_disposition(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    format!("attachment; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}
