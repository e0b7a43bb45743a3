use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::types::{EmailStatus, FeedbackStatus, UploadStatus};
use crate::workflow::{GuardFailure, ProjectState};

pub const ACCESS_DENIED: &str = "AccessDenied";
pub const NO_SUCH_BUCKET: &str = "NoSuchBucket";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),
    #[error("project {0} is closed; no further transitions are permitted")]
    ProjectClosed(Uuid),
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: ProjectState, to: ProjectState },
    #[error("cannot enter {to}: {reason}")]
    GuardFailed {
        to: ProjectState,
        reason: GuardFailure,
    },
    #[error("project {project_id} left {expected} before the transition was written")]
    Conflict {
        project_id: Uuid,
        expected: ProjectState,
    },
    #[error("role {0} must act through an identified user")]
    ActorRequired(crate::types::ActorRole),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),
    #[error("file {0} not found")]
    FileNotFound(Uuid),
    #[error("feedback {0} not found")]
    FeedbackNotFound(Uuid),
    #[error("project code `{0}` is already in use")]
    DuplicateProjectCode(String),
    #[error("replaced file {replaced} belongs to a different project")]
    ReplacedFileInOtherProject { replaced: Uuid },
    #[error("version {requested} must be greater than replaced version {replaced}")]
    VersionNotIncreasing { replaced: i32, requested: i32 },
    #[error("upload cannot move from {from} to {to}")]
    InvalidUploadStatus { from: UploadStatus, to: UploadStatus },
    #[error("file {0} is deleted")]
    FileDeleted(Uuid),
    #[error("upload progress {0} is outside 0..=100")]
    ProgressOutOfRange(i32),
    #[error("feedback cannot move from {from} to {to}")]
    InvalidFeedbackStatus {
        from: FeedbackStatus,
        to: FeedbackStatus,
    },
    #[error("ratings are only accepted on final approval feedback")]
    RatingNotAllowed,
    #[error("rating {0} is outside 1..=5")]
    RatingOutOfRange(i32),
    #[error("failed to encode column payload: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification {0} not found")]
    NotFound(Uuid),
    #[error("email status cannot move from {from} to {to}")]
    InvalidEmailTransition { from: EmailStatus, to: EmailStatus },
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type NotificationResult<T> = Result<T, NotificationError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unknown file category `{0}`")]
    InvalidCategory(String),
    #[error("local file {} not found", .0.display())]
    FileNotFound(PathBuf),
    #[error("upload verification failed for {key}: expected {expected}, storage reported {actual}")]
    UploadVerificationFailed {
        key: String,
        expected: String,
        actual: String,
    },
    #[error("storage provider error [{code}]: {message}")]
    Provider { code: String, message: String },
    #[error("storage configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn provider_code(&self) -> Option<&str> {
        match self {
            StorageError::Provider { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// Authorization and missing-bucket failures never succeed on retry,
    /// and neither do local precondition failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Provider { code, .. } => {
                code != ACCESS_DENIED && code != NO_SUCH_BUCKET
            }
            StorageError::Io(_) => true,
            StorageError::InvalidCategory(_)
            | StorageError::FileNotFound(_)
            | StorageError::UploadVerificationFailed { .. }
            | StorageError::Config(_) => false,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
