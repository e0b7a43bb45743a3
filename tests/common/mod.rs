#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use diesel::connection::SimpleConnection;
use diesel::PgConnection;
use once_cell::sync::Lazy;
use tokio::sync::Mutex;
use uuid::Uuid;

use postflow::audit::Sentinel;
use postflow::config::{AppConfig, UploadSettings};
use postflow::db::{self, PgPool};
use postflow::error::{StorageError, StorageResult};
use postflow::scheduler::{
    ActivityLedger, BookingContext, BookingSource, EmailOutcome, EmailPayload, EmailSender,
    SchedulerResult,
};
use postflow::state::AppState;
use postflow::storage::{
    CompletedPartInfo, ObjectInfo, ObjectStorage, ObjectSummary, PostPolicy, PresignedPost,
    PutOptions, PutReceipt,
};
use postflow::utils::checksum::md5_hex;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put(String),
    Head(String),
    CreateMultipart(String),
    UploadPart(i32),
    Complete(Vec<i32>),
    Abort(String),
}

#[derive(Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub etag: String,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

struct Failure {
    code: String,
    remaining: u32,
}

impl Failure {
    fn take(&mut self) -> Option<StorageError> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(StorageError::provider(self.code.clone(), "injected failure"))
    }
}

#[derive(Default)]
struct Session {
    key: String,
    parts: HashMap<i32, Bytes>,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, StoredObject>,
    sessions: HashMap<String, Session>,
    calls: Vec<Call>,
    put_failures: Option<Failure>,
    part_failures: HashMap<i32, Failure>,
    complete_failures: Option<Failure>,
    part_delays: HashMap<i32, Duration>,
    etag_override: Option<String>,
}

/// In-memory object store with failure and latency injection.
#[derive(Default)]
pub struct FakeStorage {
    inner: Mutex<Inner>,
    next_upload: AtomicUsize,
}

impl FakeStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn fail_puts(&self, code: &str, times: u32) {
        self.inner.lock().await.put_failures = Some(Failure {
            code: code.to_string(),
            remaining: times,
        });
    }

    pub async fn fail_part(&self, part_number: i32, code: &str, times: u32) {
        self.inner.lock().await.part_failures.insert(
            part_number,
            Failure {
                code: code.to_string(),
                remaining: times,
            },
        );
    }

    pub async fn fail_complete(&self, code: &str, times: u32) {
        self.inner.lock().await.complete_failures = Some(Failure {
            code: code.to_string(),
            remaining: times,
        });
    }

    pub async fn delay_part(&self, part_number: i32, delay: Duration) {
        self.inner.lock().await.part_delays.insert(part_number, delay);
    }

    /// Makes every later put report this entity tag instead of the MD5.
    pub async fn override_etag(&self, etag: &str) {
        self.inner.lock().await.etag_override = Some(etag.to_string());
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.inner.lock().await.calls.iter().filter(|call| predicate(call)).count()
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.inner.lock().await.objects.get(key).cloned()
    }

    pub async fn open_sessions(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    fn bucket(&self) -> &str {
        "test-bucket"
    }

    fn region(&self) -> &str {
        "us-east-1"
    }

    async fn put_object(&self, key: &str, body: Bytes, options: &PutOptions) -> StorageResult<PutReceipt> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(Call::Put(key.to_string()));
        if let Some(err) = inner.put_failures.as_mut().and_then(Failure::take) {
            return Err(err);
        }
        let etag = inner
            .etag_override
            .clone()
            .unwrap_or_else(|| md5_hex(&body));
        let etag = format!("\"{etag}\"");
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                bytes: body,
                etag: etag.clone(),
                content_type: options.content_type.clone(),
                metadata: options.metadata.clone(),
            },
        );
        Ok(PutReceipt { etag })
    }

    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(Call::Head(key.to_string()));
        Ok(inner.objects.get(key).map(|object| ObjectInfo {
            key: key.to_string(),
            size: object.bytes.len() as i64,
            etag: Some(object.etag.clone()),
            content_type: object.content_type.clone(),
            metadata: object.metadata.clone(),
            last_modified: None,
        }))
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        self.inner
            .lock()
            .await
            .objects
            .get(key)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| StorageError::provider("NoSuchKey", format!("{key} missing")))
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.inner.lock().await.objects.remove(key);
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        for key in keys {
            inner.objects.remove(key);
        }
        Ok(())
    }

    async fn copy_object(&self, from: &str, to: &str) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        let object = inner
            .objects
            .get(from)
            .cloned()
            .ok_or_else(|| StorageError::provider("NoSuchKey", format!("{from} missing")))?;
        inner.objects.insert(to.to_string(), object);
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>> {
        let inner = self.inner.lock().await;
        let mut summaries: Vec<ObjectSummary> = inner
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                size: object.bytes.len() as i64,
                etag: Some(object.etag.clone()),
                last_modified: None,
            })
            .collect();
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(summaries)
    }

    async fn create_multipart_upload(&self, key: &str, _options: &PutOptions) -> StorageResult<String> {
        let upload_id = format!("upload-{}", self.next_upload.fetch_add(1, Ordering::SeqCst));
        let mut inner = self.inner.lock().await;
        inner.calls.push(Call::CreateMultipart(key.to_string()));
        inner.sessions.insert(
            upload_id.clone(),
            Session {
                key: key.to_string(),
                parts: HashMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
        _content_md5: Option<&str>,
    ) -> StorageResult<CompletedPartInfo> {
        let delay = {
            let mut inner = self.inner.lock().await;
            inner.calls.push(Call::UploadPart(part_number));
            if let Some(err) = inner
                .part_failures
                .get_mut(&part_number)
                .and_then(Failure::take)
            {
                return Err(err);
            }
            inner.part_delays.get(&part_number).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let etag = format!("\"{}\"", md5_hex(&body));
        let mut inner = self.inner.lock().await;
        let session = inner
            .sessions
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::provider("NoSuchUpload", upload_id.to_string()))?;
        session.parts.insert(part_number, body);
        Ok(CompletedPartInfo { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        _key: &str,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> StorageResult<PutReceipt> {
        let mut inner = self.inner.lock().await;
        inner
            .calls
            .push(Call::Complete(parts.iter().map(|part| part.part_number).collect()));
        if let Some(err) = inner.complete_failures.as_mut().and_then(Failure::take) {
            return Err(err);
        }
        let session = inner
            .sessions
            .remove(upload_id)
            .ok_or_else(|| StorageError::provider("NoSuchUpload", upload_id.to_string()))?;

        let mut body = Vec::new();
        let mut digests = Vec::new();
        for part in parts {
            let bytes = session
                .parts
                .get(&part.part_number)
                .ok_or_else(|| StorageError::provider("InvalidPart", part.part_number.to_string()))?;
            body.extend_from_slice(bytes);
            digests.extend_from_slice(md5_hex(bytes).as_bytes());
        }
        let etag = format!("\"{}-{}\"", md5_hex(&digests), parts.len());
        inner.objects.insert(
            session.key,
            StoredObject {
                bytes: Bytes::from(body),
                etag: etag.clone(),
                content_type: None,
                metadata: HashMap::new(),
            },
        );
        Ok(PutReceipt { etag })
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(Call::Abort(upload_id.to_string()));
        inner.sessions.remove(upload_id);
        Ok(())
    }

    async fn presign_put(
        &self,
        key: &str,
        _content_type: Option<&str>,
        expires_in: Duration,
    ) -> StorageResult<String> {
        Ok(format!("https://fake-storage/{key}?put&expires_in={}", expires_in.as_secs()))
    }

    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
        _download_filename: Option<&str>,
    ) -> StorageResult<String> {
        Ok(format!("https://fake-storage/{key}?expires_in={}", expires_in.as_secs()))
    }

    async fn presign_post(&self, key: &str, _policy: &PostPolicy) -> StorageResult<PresignedPost> {
        Ok(PresignedPost {
            url: "https://fake-storage/test-bucket".to_string(),
            fields: [("key".to_string(), key.to_string())].into_iter().collect(),
        })
    }
}

/// Bookings served from memory, keyed by event date.
#[derive(Default)]
pub struct MemoryBookings {
    by_date: Mutex<HashMap<NaiveDate, Vec<BookingContext>>>,
    failing_dates: Mutex<HashSet<NaiveDate>>,
}

impl MemoryBookings {
    pub async fn add(&self, context: BookingContext) {
        self.by_date
            .lock()
            .await
            .entry(context.booking.event_date)
            .or_default()
            .push(context);
    }

    pub async fn fail_on(&self, date: NaiveDate) {
        self.failing_dates.lock().await.insert(date);
    }
}

#[async_trait]
impl BookingSource for MemoryBookings {
    async fn bookings_on(&self, date: NaiveDate) -> SchedulerResult<Vec<BookingContext>> {
        if self.failing_dates.lock().await.contains(&date) {
            return Err(postflow::scheduler::SchedulerError::Pool("database unavailable".into()));
        }
        Ok(self.by_date.lock().await.get(&date).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<Sentinel>>,
}

impl MemoryLedger {
    pub async fn entries(&self) -> Vec<Sentinel> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl ActivityLedger for MemoryLedger {
    async fn has_sentinel(&self, lead_id: Uuid, marker: &str, key: &str) -> SchedulerResult<bool> {
        Ok(self.entries.lock().await.iter().any(|entry| {
            entry.lead_id == lead_id && entry.marker == marker && entry.idempotence_key == key
        }))
    }

    async fn record_sentinel(&self, sentinel: Sentinel) -> SchedulerResult<bool> {
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|entry| {
            entry.lead_id == sentinel.lead_id
                && entry.marker == sentinel.marker
                && entry.idempotence_key == sentinel.idempotence_key
        }) {
            return Ok(false);
        }
        entries.push(sentinel);
        Ok(true)
    }
}

/// Records every payload; can fail chosen recipients or stall each send.
#[derive(Default)]
pub struct RecordingEmail {
    sent: Mutex<Vec<EmailPayload>>,
    failing_recipients: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingEmail {
    pub async fn sent(&self) -> Vec<EmailPayload> {
        self.sent.lock().await.clone()
    }

    pub async fn fail_for(&self, recipient: &str) {
        self.failing_recipients
            .lock()
            .await
            .insert(recipient.to_string());
    }

    pub async fn recover_for(&self, recipient: &str) {
        self.failing_recipients.lock().await.remove(recipient);
    }

    pub async fn stall(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, payload: &EmailPayload) -> EmailOutcome {
        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_recipients.lock().await.contains(&payload.to) {
            return EmailOutcome::failed("mailbox unavailable");
        }
        self.sent.lock().await.push(payload.clone());
        EmailOutcome::sent()
    }
}

/// A migrated, empty database, or `None` when `TEST_DATABASE_URL` is unset.
pub struct TestDb {
    pub pool: PgPool,
    pub config: AppConfig,
}

impl TestDb {
    pub async fn connect() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping database test");
            return Ok(None);
        };

        let lookup_url = database_url.clone();
        let config = AppConfig::from_lookup(move |name| match name {
            "DATABASE_URL" => Some(lookup_url.clone()),
            "S3_BUCKET" => Some("test-bucket".to_string()),
            _ => None,
        })?;

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;
        Ok(Some(Self { pool, config }))
    }

    pub fn state(&self, storage: Arc<dyn ObjectStorage>) -> AppState {
        AppState::new(self.pool.clone(), self.config.clone(), storage)
    }

    pub fn state_with_upload(&self, storage: Arc<dyn ObjectStorage>, upload: UploadSettings) -> AppState {
        let mut config = self.config.clone();
        config.upload = upload;
        AppState::new(self.pool.clone(), config, storage)
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
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
        .context("connection task panicked")?
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(|conn| truncate_all(conn)).await
    }
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        db::run_migrations(&mut conn)?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

// project_state_history refuses DELETE through a rule, so TRUNCATE is the only reset.
fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE notifications, project_state_history, project_feedback, project_files, \
         projects, activity_log, crew_assignments, bookings, leads, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
