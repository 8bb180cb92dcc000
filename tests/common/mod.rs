use std::collections::BTreeMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use service_orders::auth::{password, KIND_HASHED, KIND_PLAINTEXT};
use service_orders::config::AppConfig;
use service_orders::db::{self, PgPool, MIGRATIONS};
use service_orders::mail::{MailError, MailTransport, OutgoingMail};
use service_orders::models::NewUser;
use service_orders::render::Letterhead;
use service_orders::routes;
use service_orders::state::AppState;
use service_orders::storage::{ObjectMetadata, ObjectStorage};
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub metadata: ObjectMetadata,
}

/// In-memory bucket keyed by object key.
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    reject_uploads: AtomicBool,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, metadata: ObjectMetadata) -> Result<()> {
        if self.reject_uploads.load(Ordering::SeqCst) {
            return Err(anyhow!("bucket unavailable"));
        }
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                key: key.to_string(),
                bytes,
                metadata,
            },
        );
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|stored| stored.bytes.clone())
            .ok_or_else(|| anyhow!("object {key} missing"))
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn objects(&self) -> Vec<StoredObject> {
        self.objects.lock().await.values().cloned().collect()
    }

    #[allow(dead_code)]
    pub fn reject_uploads(&self) {
        self.reject_uploads.store(true, Ordering::SeqCst);
    }
}

/// Records outgoing mail instead of delivering it.
#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: AtomicBool,
}

#[async_trait]
impl MailTransport for FakeMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Transport("connection refused".into()));
        }
        self.sent.lock().await.push(mail);
        Ok(())
    }
}

impl FakeMailer {
    #[allow(dead_code)]
    pub async fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().await.clone()
    }

    #[allow(dead_code)]
    pub fn fail_next_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    mailer: Arc<FakeMailer>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: 8,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: "test-bucket".to_string(),
            smtp: None,
            business_name: "ServiRapid".to_string(),
            business_address: vec!["Av. Siempre Viva 742".to_string()],
            logo_path: None,
            render_timeout: Duration::from_secs(30),
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let mailer = Arc::new(FakeMailer::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let mailer_for_state: Arc<dyn MailTransport> = mailer.clone();
        let letterhead = Letterhead {
            business_name: config.business_name.clone(),
            address_lines: config.business_address.clone(),
            logo: None,
        };
        let state = AppState::new(
            pool.clone(),
            config,
            storage_for_state,
            mailer_for_state,
            letterhead,
        );
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            mailer,
        })
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

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn mailer(&self) -> Arc<FakeMailer> {
        self.mailer.clone()
    }

    /// Stores `secret` either verbatim or as an Argon2 hash.
    #[allow(dead_code)]
    pub async fn insert_user(
        &self,
        username: &str,
        secret: &str,
        hashed: bool,
        profile: &str,
        must_change_password: bool,
    ) -> Result<Uuid> {
        let username = username.to_string();
        let secret = secret.to_string();
        let profile = profile.to_string();
        self.with_conn(move |conn| {
            let (credential, credential_kind) = if hashed {
                (password::hash_password(&secret)?, KIND_HASHED)
            } else {
                (secret, KIND_PLAINTEXT)
            };
            let user = NewUser {
                id: Uuid::new_v4(),
                username,
                credential,
                credential_kind: credential_kind.to_string(),
                profile,
                must_change_password,
            };
            diesel::insert_into(service_orders::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn document_count(&self, folio: &str) -> Result<i64> {
        let folio = folio.to_string();
        self.with_conn(move |conn| {
            use service_orders::schema::order_documents::dsl;
            let count = dsl::order_documents
                .filter(dsl::folio.eq(&folio))
                .count()
                .get_result::<i64>(conn)
                .context("failed to count documents")?;
            Ok(count)
        })
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload).await
    }

    #[allow(dead_code)]
    pub async fn put(&self, path: &str) -> Result<hyper::Response<Body>> {
        self.empty(Method::PUT, path).await
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str) -> Result<hyper::Response<Body>> {
        self.empty(Method::GET, path).await
    }

    /// Posts a multipart form. `photos` are sent as `fotos` file fields.
    #[allow(dead_code)]
    pub async fn post_multipart(
        &self,
        path: &str,
        fields: &[(&str, String)],
        photos: &[(&str, Vec<u8>)],
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend(value.as_bytes());
            body.extend(b"\r\n");
        }
        for (filename, data) in photos {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"fotos\"; filename=\"{filename}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend(b"Content-Type: image/png\r\n\r\n");
            body.extend(data);
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))?;
        self.dispatch(request).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body))?;
        self.dispatch(request).await
    }

    async fn empty(&self, method: Method, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder().method(method).uri(path).body(Body::empty())?;
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
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

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_to_json(body: Body) -> Result<serde_json::Value> {
    let bytes = body_to_vec(body).await?;
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

/// Opaque single-color PNG.
#[allow(dead_code)]
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let buffer = image::ImageBuffer::from_pixel(width, height, image::Rgb([30u8, 90, 160]));
    let mut cursor = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(buffer)
        .write_to(&mut cursor, image::ImageFormat::Png)
        .expect("encode png");
    cursor.into_inner()
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
    conn.batch_execute("TRUNCATE TABLE order_documents, orders, users RESTART IDENTITY CASCADE;")
        .context("failed to truncate tables")?;
    Ok(())
}
