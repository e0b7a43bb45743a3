use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier, ServerSideEncryption,
};
use aws_sdk_s3::Client as S3Client;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::types::FileCategory;

const DELETE_BATCH_SIZE: usize = 1000;

/// Unreserved characters that stay literal in a copy source path.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// RFC 5987 `attr-char`: everything else in an extended filename is escaped.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: Option<String>,
    /// Base64 MD5 of the body, checked by the provider on receipt.
    pub content_md5: Option<String>,
    pub metadata: HashMap<String, String>,
    pub server_side_encryption: bool,
    pub content_disposition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    pub etag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: i64,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPartInfo {
    pub part_number: i32,
    pub etag: String,
}

/// Constraints for a browser form upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPolicy {
    pub max_size: u64,
    pub content_type_prefix: String,
    pub expires_in: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedPost {
    pub url: String,
    pub fields: BTreeMap<String, String>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    fn bucket(&self) -> &str;

    fn region(&self) -> &str;

    async fn put_object(&self, key: &str, body: Bytes, options: &PutOptions)
        -> StorageResult<PutReceipt>;

    /// `None` when the object does not exist.
    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectInfo>>;

    async fn get_object(&self, key: &str) -> StorageResult<Bytes>;

    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    async fn delete_objects(&self, keys: &[String]) -> StorageResult<()>;

    async fn copy_object(&self, from: &str, to: &str) -> StorageResult<()>;

    async fn move_object(&self, from: &str, to: &str) -> StorageResult<()> {
        self.copy_object(from, to).await?;
        self.delete_object(from).await
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>>;

    /// Opens a multipart session and returns its upload id.
    async fn create_multipart_upload(&self, key: &str, options: &PutOptions) -> StorageResult<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
        content_md5: Option<&str>,
    ) -> StorageResult<CompletedPartInfo>;

    /// `parts` must already be in ascending part-number order.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> StorageResult<PutReceipt>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()>;

    async fn presign_put(
        &self,
        key: &str,
        content_type: Option<&str>,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// With a filename the URL forces an `attachment` download under that name.
    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
        download_filename: Option<&str>,
    ) -> StorageResult<String>;

    async fn presign_post(&self, key: &str, policy: &PostPolicy) -> StorageResult<PresignedPost>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
    credentials: Option<SharedCredentialsProvider>,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            region: region.into(),
            endpoint: None,
            credentials: None,
        }
    }

    /// Credentials used to sign browser form-post policies.
    pub fn with_credentials(mut self, credentials: Option<SharedCredentialsProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Custom endpoint for S3-compatible providers; used for form-post URLs.
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    fn form_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket),
            None => format!("https://s3.{}.amazonaws.com/{}", self.region, self.bucket),
        }
    }
}

fn provider_error<E, R>(err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let code = match &err {
        SdkError::TimeoutError(_) => "RequestTimeout".to_string(),
        SdkError::DispatchFailure(_) => "DispatchFailure".to_string(),
        _ => err.code().unwrap_or("Unknown").to_string(),
    };
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    StorageError::Provider { code, message }
}

fn to_chrono(value: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<DateTime<Utc>> {
    value.and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
}

fn presigning(expires_in: Duration) -> StorageResult<PresigningConfig> {
    PresigningConfig::expires_in(expires_in)
        .map_err(|err| StorageError::Config(format!("invalid presign expiry: {err}")))
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        options: &PutOptions,
    ) -> StorageResult<PutReceipt> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(options.content_type.clone())
            .set_content_md5(options.content_md5.clone())
            .set_content_disposition(options.content_disposition.clone());

        if !options.metadata.is_empty() {
            request = request.set_metadata(Some(options.metadata.clone()));
        }
        if options.server_side_encryption {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        let output = request.send().await.map_err(provider_error)?;
        Ok(PutReceipt {
            etag: output.e_tag().unwrap_or_default().to_string(),
        })
    }

    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                return Ok(None);
            }
            Err(err) => return Err(provider_error(err)),
        };

        Ok(Some(ObjectInfo {
            key: key.to_string(),
            size: output.content_length().unwrap_or_default(),
            etag: output.e_tag().map(str::to_string),
            content_type: output.content_type().map(str::to_string),
            metadata: output.metadata().cloned().unwrap_or_default(),
            last_modified: to_chrono(output.last_modified()),
        }))
    }

    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(provider_error)?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|err| StorageError::provider("StreamError", err.to_string()))?
            .into_bytes();
        Ok(bytes)
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(provider_error)?;
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> StorageResult<()> {
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            let objects = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| StorageError::provider("InvalidRequest", err.to_string()))?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|err| StorageError::provider("InvalidRequest", err.to_string()))?;

            let output = self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(provider_error)?;

            if let Some(failure) = output.errors().first() {
                return Err(StorageError::provider(
                    failure.code().unwrap_or("Unknown"),
                    format!(
                        "failed to delete {}: {}",
                        failure.key().unwrap_or_default(),
                        failure.message().unwrap_or_default()
                    ),
                ));
            }
        }
        Ok(())
    }

    async fn copy_object(&self, from: &str, to: &str) -> StorageResult<()> {
        let source = format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(from, COPY_SOURCE)
        );
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(source)
            .key(to)
            .send()
            .await
            .map_err(provider_error)?;
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>> {
        let mut summaries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(provider_error)?;

            summaries.extend(output.contents().iter().filter_map(|object| {
                Some(ObjectSummary {
                    key: object.key()?.to_string(),
                    size: object.size().unwrap_or_default(),
                    etag: object.e_tag().map(str::to_string),
                    last_modified: to_chrono(object.last_modified()),
                })
            }));

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(summaries)
    }

    async fn create_multipart_upload(&self, key: &str, options: &PutOptions) -> StorageResult<String> {
        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(options.content_type.clone())
            .set_content_disposition(options.content_disposition.clone());

        if !options.metadata.is_empty() {
            request = request.set_metadata(Some(options.metadata.clone()));
        }
        if options.server_side_encryption {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        let output = request.send().await.map_err(provider_error)?;
        let upload_id = output
            .upload_id()
            .ok_or_else(|| StorageError::provider("MissingUploadId", "provider returned no upload id"))?;
        debug!(key, upload_id, "multipart upload created");
        Ok(upload_id.to_string())
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
        content_md5: Option<&str>,
    ) -> StorageResult<CompletedPartInfo> {
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .set_content_md5(content_md5.map(str::to_string))
            .send()
            .await
            .map_err(provider_error)?;

        Ok(CompletedPartInfo {
            part_number,
            etag: output.e_tag().unwrap_or_default().to_string(),
        })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartInfo],
    ) -> StorageResult<PutReceipt> {
        let completed = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect::<Vec<_>>();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(provider_error)?;

        Ok(PutReceipt {
            etag: output.e_tag().unwrap_or_default().to_string(),
        })
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(provider_error)?;
        Ok(())
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: Option<&str>,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .presigned(presigning(expires_in)?)
            .await
            .map_err(provider_error)?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
        download_filename: Option<&str>,
    ) -> StorageResult<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_response_content_disposition(download_filename.and_then(attachment_disposition))
            .presigned(presigning(expires_in)?)
            .await
            .map_err(provider_error)?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_post(&self, key: &str, policy: &PostPolicy) -> StorageResult<PresignedPost> {
        let provider = self
            .credentials
            .as_ref()
            .ok_or_else(|| StorageError::Config("no credentials provider configured".into()))?;
        let credentials = provider
            .provide_credentials()
            .await
            .map_err(|err| StorageError::Config(format!("failed to load credentials: {err}")))?;

        let signer = PostSigner {
            access_key_id: credentials.access_key_id(),
            secret_access_key: credentials.secret_access_key(),
            session_token: credentials.session_token(),
            region: &self.region,
        };
        let fields = signer.sign(&self.bucket, key, policy, Utc::now())?;
        Ok(PresignedPost {
            url: self.form_url(),
            fields,
        })
    }
}

/// `attachment` disposition carrying both an ASCII fallback name and the
/// percent-encoded UTF-8 name.
pub fn attachment_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_control() => '_',
            _ => ch,
        })
        .collect();
    let fallback: String = sanitized
        .chars()
        .map(|ch| if ch.is_ascii() { ch } else { '_' })
        .collect();

    let encoded = utf8_percent_encode(&sanitized, ATTR_CHAR);
    Some(format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    ))
}

type HmacSha256 = Hmac<Sha256>;

fn hmac(key: &[u8], data: &[u8]) -> StorageResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| StorageError::Config(format!("invalid signing key: {err}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// SigV4 signing key for `date` (`YYYYMMDD`).
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> StorageResult<Vec<u8>> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

/// Signs browser form-post policies with SigV4.
pub struct PostSigner<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub session_token: Option<&'a str>,
    pub region: &'a str,
}

impl PostSigner<'_> {
    pub fn sign(
        &self,
        bucket: &str,
        key: &str,
        policy: &PostPolicy,
        now: DateTime<Utc>,
    ) -> StorageResult<BTreeMap<String, String>> {
        let date = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let credential = format!("{}/{}/{}/s3/aws4_request", self.access_key_id, date, self.region);
        let expires_in = chrono::Duration::from_std(policy.expires_in)
            .map_err(|err| StorageError::Config(format!("invalid policy expiry: {err}")))?;
        let expiration = (now + expires_in)
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();

        let mut conditions: Vec<Value> = vec![
            json!({ "bucket": bucket }),
            json!({ "key": key }),
            json!(["content-length-range", 0, policy.max_size]),
            json!(["starts-with", "$Content-Type", policy.content_type_prefix]),
            json!({ "x-amz-algorithm": "AWS4-HMAC-SHA256" }),
            json!({ "x-amz-credential": credential }),
            json!({ "x-amz-date": amz_date }),
        ];
        if let Some(token) = self.session_token {
            conditions.push(json!({ "x-amz-security-token": token }));
        }

        let document = json!({ "expiration": expiration, "conditions": conditions });
        let encoded_policy = BASE64.encode(document.to_string());
        let key_bytes = signing_key(self.secret_access_key, &date, self.region, "s3")?;
        let signature = hex::encode(hmac(&key_bytes, encoded_policy.as_bytes())?);

        let mut fields = BTreeMap::new();
        fields.insert("key".to_string(), key.to_string());
        fields.insert("policy".to_string(), encoded_policy);
        fields.insert("x-amz-algorithm".to_string(), "AWS4-HMAC-SHA256".to_string());
        fields.insert("x-amz-credential".to_string(), credential);
        fields.insert("x-amz-date".to_string(), amz_date);
        fields.insert("x-amz-signature".to_string(), signature);
        if let Some(token) = self.session_token {
            fields.insert("x-amz-security-token".to_string(), token.to_string());
        }
        Ok(fields)
    }
}

/// `{category folder}/{project id}/{file name}`.
pub fn object_key(category: FileCategory, project_id: Uuid, file_name: &str) -> String {
    format!("{}/{}/{}", category.folder(), project_id, file_name)
}

pub fn object_key_for(category: &str, project_id: Uuid, file_name: &str) -> StorageResult<String> {
    let category: FileCategory = category
        .parse()
        .map_err(|_| StorageError::InvalidCategory(category.to_string()))?;
    Ok(object_key(category, project_id, file_name))
}

pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}
