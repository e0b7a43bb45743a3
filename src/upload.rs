//! Large-object upload pipeline.
//!
//! Files up to the multipart threshold go up in one request carrying a
//! Content-MD5 header and are verified against the stored entity tag.
//! Larger files are split into fixed-size parts uploaded with bounded
//! concurrency; the session is aborted on any unrecoverable failure and when
//! the upload future is dropped mid-flight.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use crate::config::UploadSettings;
use crate::error::{StorageError, StorageResult};
use crate::storage::{content_type_for, CompletedPartInfo, ObjectStorage, PutOptions};
use crate::utils::checksum::{self, is_multipart_etag, open_local, strip_etag, FileDigest};
use crate::utils::retry::{with_retry, RetryPolicy};

pub const METADATA_CHECKSUM: &str = "original-checksum";
pub const METADATA_FILENAME: &str = "original-filename";

/// Providers cap a multipart session at this many parts.
pub const MAX_PARTS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadProgress {
    pub percentage: f64,
    pub loaded: u64,
    pub total: u64,
    pub parts_completed: usize,
    pub parts_total: usize,
}

impl UploadProgress {
    fn new(loaded: u64, total: u64, parts_completed: usize, parts_total: usize) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            loaded as f64 * 100.0 / total as f64
        };
        Self {
            percentage,
            loaded,
            total,
            parts_completed,
            parts_total,
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

#[derive(Clone)]
pub struct UploadOptions {
    /// Guessed from the file extension when absent.
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
    /// Falls back to the uploader setting when absent.
    pub server_side_encryption: Option<bool>,
    pub on_progress: Option<ProgressCallback>,
    pub part_size: Option<u64>,
    pub concurrency: Option<usize>,
    pub verify_checksum: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            content_type: None,
            metadata: HashMap::new(),
            server_side_encryption: None,
            on_progress: None,
            part_size: None,
            concurrency: None,
            verify_checksum: true,
        }
    }
}

impl UploadOptions {
    pub fn on_progress(mut self, callback: impl Fn(UploadProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    fn report(&self, progress: UploadProgress) {
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub key: String,
    pub size: u64,
    /// Entity tag with quotes removed.
    pub etag: String,
    pub md5: String,
    pub sha256: String,
    pub multipart: bool,
    pub parts: usize,
    /// Provider session id of a multipart upload.
    pub upload_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub exists: bool,
    pub size: Option<i64>,
    pub etag: Option<String>,
    pub verified: bool,
    /// Multipart tags are not content hashes, so only existence was checked.
    pub partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploaderConfig {
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub server_side_encryption: bool,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self::from(&UploadSettings::default())
    }
}

impl From<&UploadSettings> for UploaderConfig {
    fn from(settings: &UploadSettings) -> Self {
        Self {
            multipart_threshold: settings.multipart_threshold,
            part_size: settings.part_size,
            concurrency: settings.concurrency,
            retry: RetryPolicy::new(settings.max_retries, settings.retry_base_delay),
            server_side_encryption: settings.server_side_encryption,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub part_number: i32,
    pub offset: u64,
    pub len: u64,
}

/// Splits `size` bytes into `part_size` chunks; the last one may be short.
pub fn plan_parts(size: u64, part_size: u64) -> StorageResult<Vec<PartRange>> {
    if part_size == 0 {
        return Err(StorageError::Config("part size must be positive".into()));
    }
    let count = size.div_ceil(part_size).max(1);
    if count > MAX_PARTS {
        return Err(StorageError::Config(format!(
            "{size} bytes need {count} parts of {part_size}; the limit is {MAX_PARTS}"
        )));
    }
    Ok((0..count)
        .map(|index| {
            let offset = index * part_size;
            PartRange {
                part_number: index as i32 + 1,
                offset,
                len: part_size.min(size - offset),
            }
        })
        .collect())
}

/// Aborts the multipart session if dropped while still armed.
struct AbortOnDrop {
    storage: Arc<dyn ObjectStorage>,
    key: String,
    upload_id: String,
    armed: bool,
}

impl AbortOnDrop {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, upload_id = %self.upload_id, "no runtime to abort cancelled upload");
            return;
        };
        let storage = self.storage.clone();
        let key = std::mem::take(&mut self.key);
        let upload_id = std::mem::take(&mut self.upload_id);
        warn!(key = %key, upload_id = %upload_id, "upload cancelled; aborting multipart session");
        handle.spawn(async move {
            if let Err(err) = storage.abort_multipart_upload(&key, &upload_id).await {
                warn!(key = %key, upload_id = %upload_id, error = %err, "failed to abort cancelled upload");
            }
        });
    }
}

pub struct Uploader {
    storage: Arc<dyn ObjectStorage>,
    config: UploaderConfig,
}

impl Uploader {
    pub fn new(storage: Arc<dyn ObjectStorage>, config: UploaderConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    /// Single request at or below the multipart threshold, multipart above it.
    pub async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        options: &UploadOptions,
    ) -> StorageResult<UploadResult> {
        let size = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::FileNotFound(path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };

        if size <= self.config.multipart_threshold {
            self.upload_single(path, key, options).await
        } else {
            self.upload_multipart(path, key, options).await
        }
    }

    fn put_options(&self, path: &Path, options: &UploadOptions, digest: &FileDigest) -> PutOptions {
        let mut metadata = options.metadata.clone();
        metadata.insert(METADATA_CHECKSUM.to_string(), digest.sha256_hex.clone());
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            metadata.insert(METADATA_FILENAME.to_string(), name.to_string());
        }
        PutOptions {
            content_type: Some(
                options
                    .content_type
                    .clone()
                    .unwrap_or_else(|| content_type_for(path)),
            ),
            content_md5: None,
            metadata,
            server_side_encryption: options
                .server_side_encryption
                .unwrap_or(self.config.server_side_encryption),
            content_disposition: None,
        }
    }

    async fn upload_single(
        &self,
        path: &Path,
        key: &str,
        options: &UploadOptions,
    ) -> StorageResult<UploadResult> {
        let mut file = open_local(path).await?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).await?;
        let body = Bytes::from(buffer);

        let digest = FileDigest {
            size: body.len() as u64,
            md5_hex: checksum::md5_hex(&body),
            sha256_hex: checksum::sha256_hex(&body),
        };
        let mut put_options = self.put_options(path, options, &digest);
        put_options.content_md5 = Some(digest.md5_base64()?);

        let receipt = with_retry(self.config.retry, "put_object", || {
            self.storage.put_object(key, body.clone(), &put_options)
        })
        .await?;

        if options.verify_checksum {
            let stored = self.storage.head_object(key).await?;
            let actual = stored
                .and_then(|info| info.etag)
                .map(|etag| strip_etag(&etag).to_string());
            match actual {
                Some(etag) if etag.eq_ignore_ascii_case(&digest.md5_hex) => {}
                other => {
                    return Err(StorageError::UploadVerificationFailed {
                        key: key.to_string(),
                        expected: digest.md5_hex.clone(),
                        actual: other.unwrap_or_else(|| "missing object".to_string()),
                    });
                }
            }
        }

        options.report(UploadProgress::new(digest.size, digest.size, 1, 1));
        info!(key, size = digest.size, "single-part upload finished");

        Ok(UploadResult {
            key: key.to_string(),
            size: digest.size,
            etag: strip_etag(&receipt.etag).to_string(),
            md5: digest.md5_hex,
            sha256: digest.sha256_hex,
            multipart: false,
            parts: 1,
            upload_id: None,
        })
    }

    pub async fn upload_multipart(
        &self,
        path: &Path,
        key: &str,
        options: &UploadOptions,
    ) -> StorageResult<UploadResult> {
        let digest = FileDigest::compute(path).await?;
        let part_size = options.part_size.unwrap_or(self.config.part_size);
        let parts = plan_parts(digest.size, part_size)?;
        let parts_total = parts.len();
        let concurrency = options.concurrency.unwrap_or(self.config.concurrency).max(1);
        let put_options = self.put_options(path, options, &digest);

        let upload_id = with_retry(self.config.retry, "create_multipart_upload", || {
            self.storage.create_multipart_upload(key, &put_options)
        })
        .await?;
        let mut guard = AbortOnDrop {
            storage: self.storage.clone(),
            key: key.to_string(),
            upload_id: upload_id.clone(),
            armed: true,
        };
        info!(key, upload_id = %upload_id, parts = parts_total, concurrency, "multipart upload started");

        let mut completed: Vec<CompletedPartInfo> = Vec::with_capacity(parts_total);
        let mut loaded = 0u64;
        let mut failure: Option<StorageError> = None;
        {
            let mut uploads = stream::iter(parts)
                .map(|range| self.upload_part(path, key, &upload_id, range))
                .buffer_unordered(concurrency);

            while let Some(result) = uploads.next().await {
                match result {
                    Ok((part, len)) => {
                        loaded += len;
                        completed.push(part);
                        options.report(UploadProgress::new(
                            loaded,
                            digest.size,
                            completed.len(),
                            parts_total,
                        ));
                    }
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
        }

        if let Some(err) = failure {
            guard.disarm();
            self.abort_quietly(key, &upload_id).await;
            return Err(err);
        }

        completed.sort_by_key(|part| part.part_number);
        let receipt = match with_retry(self.config.retry, "complete_multipart_upload", || {
            self.storage
                .complete_multipart_upload(key, &upload_id, &completed)
        })
        .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                guard.disarm();
                self.abort_quietly(key, &upload_id).await;
                return Err(err);
            }
        };
        guard.disarm();

        info!(key, upload_id = %upload_id, size = digest.size, parts = parts_total, "multipart upload finished");

        Ok(UploadResult {
            key: key.to_string(),
            size: digest.size,
            etag: strip_etag(&receipt.etag).to_string(),
            md5: digest.md5_hex,
            sha256: digest.sha256_hex,
            multipart: true,
            parts: parts_total,
            upload_id: Some(upload_id),
        })
    }

    async fn upload_part(
        &self,
        path: &Path,
        key: &str,
        upload_id: &str,
        range: PartRange,
    ) -> StorageResult<(CompletedPartInfo, u64)> {
        let mut file = open_local(path).await?;
        file.seek(SeekFrom::Start(range.offset)).await?;
        let mut buffer = vec![0u8; range.len as usize];
        file.read_exact(&mut buffer).await?;
        let body = Bytes::from(buffer);
        let content_md5 = checksum::md5_base64(&body);

        let label = format!("upload_part {}", range.part_number);
        let part = with_retry(self.config.retry, &label, || {
            self.storage.upload_part(
                key,
                upload_id,
                range.part_number,
                body.clone(),
                Some(content_md5.as_str()),
            )
        })
        .await?;
        debug!(key, part_number = range.part_number, bytes = range.len, "part uploaded");
        Ok((part, range.len))
    }

    async fn abort_quietly(&self, key: &str, upload_id: &str) {
        match self.storage.abort_multipart_upload(key, upload_id).await {
            Ok(()) => info!(key, upload_id, "multipart upload aborted"),
            Err(err) => warn!(key, upload_id, error = %err, "failed to abort multipart upload"),
        }
    }

    /// Compares the stored entity tag with `expected_md5` (hex).
    pub async fn verify_upload(&self, key: &str, expected_md5: &str) -> StorageResult<VerificationReport> {
        let Some(info) = self.storage.head_object(key).await? else {
            return Ok(VerificationReport {
                exists: false,
                size: None,
                etag: None,
                verified: false,
                partial: false,
            });
        };

        let etag = info.etag.as_deref().map(|tag| strip_etag(tag).to_string());
        let (verified, partial) = match etag.as_deref() {
            Some(tag) if is_multipart_etag(tag) => (false, true),
            Some(tag) => (tag.eq_ignore_ascii_case(expected_md5.trim()), false),
            None => (false, false),
        };

        Ok(VerificationReport {
            exists: true,
            size: Some(info.size),
            etag,
            verified,
            partial,
        })
    }
}
