use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::models::ProjectFile;
use crate::registry::{self, StoredObjectReceipt};
use crate::state::AppState;
use crate::types::UploadStatus;
use crate::upload::{UploadOptions, UploadProgress, UploadResult};

/// Progress is persisted in steps of this many percent.
const PROGRESS_STEP: i32 = 10;

/// Uploads the local copy of a registered file to its storage key and records
/// the outcome on the file row.
pub async fn upload_registered_file(
    state: &AppState,
    file_id: Uuid,
    local_path: &Path,
    options: UploadOptions,
) -> anyhow::Result<ProjectFile> {
    let file = state
        .with_conn(move |conn| Ok(registry::start_upload(conn, file_id, None)?))
        .await
        .with_context(|| format!("failed to start upload for file {file_id}"))?;

    info!(
        file_id = %file_id,
        project_id = %file.project_id,
        key = %file.storage_key,
        path = %local_path.display(),
        "uploading registered file"
    );

    let (options, progress_writer) = track_progress(state, file_id, options);
    let outcome = state
        .uploader
        .upload_file(local_path, &file.storage_key, &options)
        .await;
    // Closing the channel lets the writer drain before the final status lands.
    drop(options);
    if let Err(err) = progress_writer.await {
        warn!(file_id = %file_id, error = %err, "upload progress writer stopped");
    }

    match outcome {
        Ok(result) => {
            let receipt = receipt_for(state, &result);
            let stored = state
                .with_conn(move |conn| Ok(registry::complete_upload(conn, file_id, &receipt)?))
                .await
                .with_context(|| format!("failed to record completed upload for file {file_id}"))?;
            Ok(stored)
        }
        Err(err) => {
            let message = err.to_string();
            if let Err(record_err) = state
                .with_conn(move |conn| Ok(registry::fail_upload(conn, file_id, &message)?))
                .await
            {
                warn!(file_id = %file_id, error = %record_err, "failed to record upload failure");
            }
            Err(anyhow::Error::new(err).context(format!("upload of {} failed", local_path.display())))
        }
    }
}

/// Time-boxed download link that saves under the file's registered name.
pub async fn download_url(state: &AppState, file_id: Uuid) -> anyhow::Result<String> {
    let file = state
        .with_conn(move |conn| Ok(registry::load_file(conn, file_id)?))
        .await?;
    if file.is_deleted() {
        return Err(RegistryError::FileDeleted(file_id).into());
    }
    if file.upload_status != UploadStatus::Completed {
        bail!("file {file_id} is {} and has no stored object", file.upload_status);
    }

    let url = state
        .storage
        .presign_get(
            &file.storage_key,
            state.config.presigned_url_expiry,
            Some(&file.file_name),
        )
        .await
        .with_context(|| format!("failed to presign download for file {file_id}"))?;
    Ok(url)
}

fn receipt_for(state: &AppState, result: &UploadResult) -> StoredObjectReceipt {
    StoredObjectReceipt {
        size_bytes: result.size as i64,
        md5: result.md5.clone(),
        sha256: result.sha256.clone(),
        etag: result.etag.clone(),
        bucket: state.storage.bucket().to_string(),
        region: state.storage.region().to_string(),
        session_id: result.upload_id.clone(),
    }
}

/// Chains a callback that persists coarse progress onto the caller's one.
/// Steps are written in order by a single task that ends once the returned
/// options are dropped.
fn track_progress(
    state: &AppState,
    file_id: Uuid,
    mut options: UploadOptions,
) -> (UploadOptions, JoinHandle<()>) {
    let caller = options.on_progress.take();
    let last_step = AtomicI32::new(0);
    let (steps, mut pending) = mpsc::unbounded_channel::<i32>();

    options.on_progress = Some(Arc::new(move |progress: UploadProgress| {
        if let Some(callback) = &caller {
            callback(progress);
        }
        let step = (progress.percentage as i32 / PROGRESS_STEP) * PROGRESS_STEP;
        // Completion itself is written by the receipt.
        if step >= 100 || last_step.fetch_max(step, Ordering::SeqCst) >= step {
            return;
        }
        let _ = steps.send(step);
    }));

    let state = state.clone();
    let writer = tokio::spawn(async move {
        while let Some(step) = pending.recv().await {
            let result = state
                .with_conn(move |conn| Ok(registry::update_upload_progress(conn, file_id, step)?))
                .await;
            if let Err(err) = result {
                warn!(file_id = %file_id, progress = step, error = %err, "failed to persist upload progress");
            }
        }
    });
    (options, writer)
}
