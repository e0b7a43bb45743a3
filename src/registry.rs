//! Project intake, the file registry, and feedback.
//!
//! Files move `pending -> in_progress -> completed | failed` while the upload
//! pipeline works on them. Their validation results and completion state are
//! what the workflow guards read through [`guard_facts`].

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{RegistryError, RegistryResult},
    models::{
        FeedbackAttachment, MediaInfo, NewProject, NewProjectFeedback, NewProjectFile, Project,
        ProjectFeedback, ProjectFile, ValidationIssue, VideoTimestamp,
    },
    schema::{project_feedback, project_files, projects},
    storage::{content_type_for, object_key},
    types::{
        ActorRole, FeedbackStatus, FeedbackType, FileCategory, IssueSeverity, Priority,
        UploadStatus, ValidationStatus,
    },
    workflow::{GuardFacts, ProjectState},
};

/// Upper bound on version chain walks.
pub const MAX_VERSION_CHAIN: usize = 256;

const OPEN_FEEDBACK: [FeedbackStatus; 3] = [
    FeedbackStatus::Pending,
    FeedbackStatus::Acknowledged,
    FeedbackStatus::InProgress,
];

#[derive(Debug, Clone)]
pub struct NewProjectRequest {
    pub booking_id: Uuid,
    pub code: String,
    pub client_id: Uuid,
    pub creator_id: Option<Uuid>,
    pub editor_id: Option<Uuid>,
    pub qc_reviewer_id: Option<Uuid>,
    pub raw_upload_deadline: Option<NaiveDateTime>,
    pub edit_delivery_deadline: Option<NaiveDateTime>,
    pub final_delivery_deadline: Option<NaiveDateTime>,
}

impl NewProjectRequest {
    pub fn new(booking_id: Uuid, code: impl Into<String>, client_id: Uuid) -> Self {
        Self {
            booking_id,
            code: code.into(),
            client_id,
            creator_id: None,
            editor_id: None,
            qc_reviewer_id: None,
            raw_upload_deadline: None,
            edit_delivery_deadline: None,
            final_delivery_deadline: None,
        }
    }
}

pub fn create_project(conn: &mut PgConnection, request: &NewProjectRequest) -> RegistryResult<Project> {
    let now = Utc::now().naive_utc();
    let row = NewProject {
        id: Uuid::new_v4(),
        booking_id: request.booking_id,
        code: request.code.clone(),
        current_state: ProjectState::INITIAL,
        state_changed_at: now,
        client_id: request.client_id,
        creator_id: request.creator_id,
        editor_id: request.editor_id,
        qc_reviewer_id: request.qc_reviewer_id,
        raw_upload_deadline: request.raw_upload_deadline,
        edit_delivery_deadline: request.edit_delivery_deadline,
        final_delivery_deadline: request.final_delivery_deadline,
    };

    match diesel::insert_into(projects::table).values(&row).get_result::<Project>(conn) {
        Ok(project) => {
            info!(project_id = %project.id, code = %project.code, "project created");
            Ok(project)
        }
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Err(RegistryError::DuplicateProjectCode(request.code.clone()))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn load_project(conn: &mut PgConnection, project_id: Uuid) -> RegistryResult<Project> {
    projects::table
        .find(project_id)
        .first(conn)
        .optional()?
        .ok_or(RegistryError::ProjectNotFound(project_id))
}

pub fn load_file(conn: &mut PgConnection, file_id: Uuid) -> RegistryResult<ProjectFile> {
    project_files::table
        .find(file_id)
        .first(conn)
        .optional()?
        .ok_or(RegistryError::FileNotFound(file_id))
}

fn lock_file(conn: &mut PgConnection, file_id: Uuid) -> RegistryResult<ProjectFile> {
    project_files::table
        .find(file_id)
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(RegistryError::FileNotFound(file_id))
}

/// Live files of a project, oldest first.
pub fn files_for_project(conn: &mut PgConnection, project_id: Uuid) -> QueryResult<Vec<ProjectFile>> {
    project_files::table
        .filter(project_files::project_id.eq(project_id))
        .filter(project_files::deleted_at.is_null())
        .order((project_files::created_at.asc(), project_files::id.asc()))
        .load(conn)
}

#[derive(Debug, Clone)]
pub struct RegisterFile {
    pub project_id: Uuid,
    pub category: FileCategory,
    pub file_name: String,
    pub size_bytes: i64,
    pub mime_type: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub replaces_file_id: Option<Uuid>,
    /// Assigned from the replaced file when absent.
    pub version_number: Option<i32>,
}

impl RegisterFile {
    pub fn new(
        project_id: Uuid,
        category: FileCategory,
        file_name: impl Into<String>,
        size_bytes: i64,
    ) -> Self {
        Self {
            project_id,
            category,
            file_name: file_name.into(),
            size_bytes,
            mime_type: None,
            uploaded_by: None,
            replaces_file_id: None,
            version_number: None,
        }
    }

    pub fn replacing(mut self, file_id: Uuid) -> Self {
        self.replaces_file_id = Some(file_id);
        self
    }

    pub fn uploaded_by(mut self, user_id: Uuid) -> Self {
        self.uploaded_by = Some(user_id);
        self
    }
}

/// The replaced file, as far as version numbering cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacedVersion {
    pub id: Uuid,
    pub project_id: Uuid,
    pub version_number: i32,
}

/// Version number for a new file in `project_id`.
pub fn next_version(
    project_id: Uuid,
    replaced: Option<ReplacedVersion>,
    requested: Option<i32>,
) -> RegistryResult<i32> {
    let Some(replaced) = replaced else {
        return Ok(requested.unwrap_or(1).max(1));
    };
    if replaced.project_id != project_id {
        return Err(RegistryError::ReplacedFileInOtherProject {
            replaced: replaced.id,
        });
    }
    match requested {
        Some(version) if version <= replaced.version_number => {
            Err(RegistryError::VersionNotIncreasing {
                replaced: replaced.version_number,
                requested: version,
            })
        }
        Some(version) => Ok(version),
        None => Ok(replaced.version_number + 1),
    }
}

/// Versions after the first are stored under a `v{n}-` prefixed name.
fn stored_file_name(file_name: &str, version_number: i32) -> String {
    if version_number > 1 {
        format!("v{version_number}-{file_name}")
    } else {
        file_name.to_string()
    }
}

fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn register_file(conn: &mut PgConnection, request: &RegisterFile) -> RegistryResult<ProjectFile> {
    conn.transaction::<_, RegistryError, _>(|conn| {
        let project: Project = projects::table
            .find(request.project_id)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(RegistryError::ProjectNotFound(request.project_id))?;

        let replaced = match request.replaces_file_id {
            Some(replaced_id) => {
                let file = load_file(conn, replaced_id)?;
                Some(ReplacedVersion {
                    id: file.id,
                    project_id: file.project_id,
                    version_number: file.version_number,
                })
            }
            None => None,
        };
        let version_number = next_version(project.id, replaced, request.version_number)?;

        let mime_type = request
            .mime_type
            .clone()
            .unwrap_or_else(|| content_type_for(Path::new(&request.file_name)));

        let row = NewProjectFile {
            id: Uuid::new_v4(),
            project_id: project.id,
            file_category: request.category,
            file_name: request.file_name.clone(),
            storage_key: object_key(
                request.category,
                project.id,
                &stored_file_name(&request.file_name, version_number),
            ),
            size_bytes: request.size_bytes,
            file_extension: file_extension(&request.file_name),
            mime_type: Some(mime_type),
            upload_status: UploadStatus::Pending,
            validation_status: ValidationStatus::Pending,
            validation_errors: serde_json::Value::Array(Vec::new()),
            version_number,
            replaces_file_id: request.replaces_file_id,
            uploaded_by: request.uploaded_by,
        };
        let file: ProjectFile = diesel::insert_into(project_files::table)
            .values(&row)
            .get_result(conn)?;

        let raw_bytes = if request.category.is_raw() {
            request.size_bytes
        } else {
            0
        };
        diesel::update(projects::table.find(project.id))
            .set((
                projects::total_files_count.eq(projects::total_files_count + 1),
                projects::total_raw_size_bytes.eq(projects::total_raw_size_bytes + raw_bytes),
                projects::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        info!(
            project_id = %project.id,
            file_id = %file.id,
            category = %file.file_category,
            version = file.version_number,
            "file registered"
        );
        Ok(file)
    })
}

fn ensure_upload_transition(file: &ProjectFile, to: UploadStatus) -> RegistryResult<()> {
    if file.is_deleted() {
        return Err(RegistryError::FileDeleted(file.id));
    }
    if !file.upload_status.can_transition_to(to) {
        return Err(RegistryError::InvalidUploadStatus {
            from: file.upload_status,
            to,
        });
    }
    Ok(())
}

pub fn start_upload(
    conn: &mut PgConnection,
    file_id: Uuid,
    session_id: Option<&str>,
) -> RegistryResult<ProjectFile> {
    conn.transaction::<_, RegistryError, _>(|conn| {
        let file = lock_file(conn, file_id)?;
        ensure_upload_transition(&file, UploadStatus::InProgress)?;
        let updated = diesel::update(project_files::table.find(file_id))
            .set((
                project_files::upload_status.eq(UploadStatus::InProgress),
                project_files::upload_progress.eq(0),
                project_files::upload_session_id.eq(session_id),
                project_files::upload_error.eq(None::<String>),
                project_files::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        Ok(updated)
    })
}

pub fn update_upload_progress(
    conn: &mut PgConnection,
    file_id: Uuid,
    progress: i32,
) -> RegistryResult<ProjectFile> {
    if !(0..=100).contains(&progress) {
        return Err(RegistryError::ProgressOutOfRange(progress));
    }
    // Only in-progress uploads accept progress, and it never moves backwards.
    let updated: Option<ProjectFile> = diesel::update(
        project_files::table
            .filter(project_files::id.eq(file_id))
            .filter(project_files::upload_status.eq(UploadStatus::InProgress))
            .filter(project_files::upload_progress.lt(progress)),
    )
    .set((
        project_files::upload_progress.eq(progress),
        project_files::updated_at.eq(Utc::now().naive_utc()),
    ))
    .get_result(conn)
    .optional()?;
    match updated {
        Some(file) => Ok(file),
        None => {
            let file = load_file(conn, file_id)?;
            if file.upload_status == UploadStatus::InProgress {
                return Ok(file);
            }
            Err(RegistryError::InvalidUploadStatus {
                from: file.upload_status,
                to: UploadStatus::InProgress,
            })
        }
    }
}

/// What storage reported once an object was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObjectReceipt {
    pub size_bytes: i64,
    pub md5: String,
    pub sha256: String,
    pub etag: String,
    pub bucket: String,
    pub region: String,
    pub session_id: Option<String>,
}

pub fn complete_upload(
    conn: &mut PgConnection,
    file_id: Uuid,
    receipt: &StoredObjectReceipt,
) -> RegistryResult<ProjectFile> {
    conn.transaction::<_, RegistryError, _>(|conn| {
        let file = lock_file(conn, file_id)?;
        ensure_upload_transition(&file, UploadStatus::Completed)?;
        let session_id = receipt
            .session_id
            .clone()
            .or_else(|| file.upload_session_id.clone());
        let updated: ProjectFile = diesel::update(project_files::table.find(file_id))
            .set((
                project_files::upload_status.eq(UploadStatus::Completed),
                project_files::upload_progress.eq(100),
                project_files::upload_session_id.eq(session_id),
                project_files::upload_error.eq(None::<String>),
                project_files::size_bytes.eq(receipt.size_bytes),
                project_files::md5_hash.eq(&receipt.md5),
                project_files::sha256_hash.eq(&receipt.sha256),
                project_files::storage_etag.eq(&receipt.etag),
                project_files::storage_bucket.eq(&receipt.bucket),
                project_files::storage_region.eq(&receipt.region),
                project_files::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;

        let size_delta = receipt.size_bytes - file.size_bytes;
        if file.file_category.is_raw() && size_delta != 0 {
            diesel::update(projects::table.find(file.project_id))
                .set(projects::total_raw_size_bytes.eq(projects::total_raw_size_bytes + size_delta))
                .execute(conn)?;
        }

        info!(file_id = %file_id, etag = %receipt.etag, "upload completed");
        Ok(updated)
    })
}

pub fn fail_upload(conn: &mut PgConnection, file_id: Uuid, error: &str) -> RegistryResult<ProjectFile> {
    conn.transaction::<_, RegistryError, _>(|conn| {
        let file = lock_file(conn, file_id)?;
        ensure_upload_transition(&file, UploadStatus::Failed)?;
        let updated = diesel::update(project_files::table.find(file_id))
            .set((
                project_files::upload_status.eq(UploadStatus::Failed),
                project_files::upload_error.eq(Some(error)),
                project_files::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        warn!(file_id = %file_id, error = %error, "upload failed");
        Ok(updated)
    })
}

/// Validation passes unless at least one issue is an error.
pub fn validation_outcome(issues: &[ValidationIssue]) -> ValidationStatus {
    if issues
        .iter()
        .any(|issue| issue.severity == IssueSeverity::Error)
    {
        ValidationStatus::Failed
    } else {
        ValidationStatus::Passed
    }
}

pub fn record_validation(
    conn: &mut PgConnection,
    file_id: Uuid,
    issues: &[ValidationIssue],
) -> RegistryResult<ProjectFile> {
    let file = load_file(conn, file_id)?;
    if file.is_deleted() {
        return Err(RegistryError::FileDeleted(file_id));
    }
    let status = validation_outcome(issues);
    let encoded = serde_json::to_value(issues)?;
    let updated = diesel::update(project_files::table.find(file_id))
        .set((
            project_files::validation_status.eq(status),
            project_files::validation_errors.eq(encoded),
            project_files::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(conn)?;
    info!(file_id = %file_id, %status, issues = issues.len(), "validation recorded");
    Ok(updated)
}

pub fn record_media_info(
    conn: &mut PgConnection,
    file_id: Uuid,
    info: &MediaInfo,
) -> RegistryResult<ProjectFile> {
    load_file(conn, file_id)?;
    let updated = diesel::update(project_files::table.find(file_id))
        .set((info, project_files::updated_at.eq(Utc::now().naive_utc())))
        .get_result(conn)?;
    Ok(updated)
}

/// Marks a file deleted. The row and its stored object stay; deleting twice
/// keeps the first actor and timestamp.
pub fn soft_delete_file(
    conn: &mut PgConnection,
    file_id: Uuid,
    actor: Option<Uuid>,
) -> RegistryResult<ProjectFile> {
    conn.transaction::<_, RegistryError, _>(|conn| {
        let file = lock_file(conn, file_id)?;
        if file.is_deleted() {
            return Ok(file);
        }
        let now = Utc::now().naive_utc();
        let updated = diesel::update(project_files::table.find(file_id))
            .set((
                project_files::deleted_at.eq(Some(now)),
                project_files::deleted_by.eq(actor),
                project_files::updated_at.eq(now),
            ))
            .get_result(conn)?;

        let raw_bytes = if file.file_category.is_raw() {
            file.size_bytes
        } else {
            0
        };
        diesel::update(projects::table.find(file.project_id))
            .set((
                projects::total_files_count.eq(projects::total_files_count - 1),
                projects::total_raw_size_bytes.eq(projects::total_raw_size_bytes - raw_bytes),
                projects::updated_at.eq(now),
            ))
            .execute(conn)?;
        Ok(updated)
    })
}

/// Walks `replaces` links from `start`, newest first. Stops at the first
/// repeated id or after `max_len` entries.
pub fn resolve_version_chain(
    start: Uuid,
    replaces: &HashMap<Uuid, Option<Uuid>>,
    max_len: usize,
) -> Vec<Uuid> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut cursor = Some(start);

    while let Some(id) = cursor {
        if chain.len() >= max_len {
            warn!(file_id = %start, max_len, "version chain truncated");
            break;
        }
        if !visited.insert(id) {
            warn!(file_id = %start, repeated = %id, "version chain contains a cycle");
            break;
        }
        let Some(next) = replaces.get(&id) else {
            break;
        };
        chain.push(id);
        cursor = *next;
    }
    chain
}

/// The file and every version it replaces, newest first.
pub fn version_chain(conn: &mut PgConnection, file_id: Uuid) -> RegistryResult<Vec<ProjectFile>> {
    let head = load_file(conn, file_id)?;
    let files: Vec<ProjectFile> = project_files::table
        .filter(project_files::project_id.eq(head.project_id))
        .load(conn)?;

    let replaces: HashMap<Uuid, Option<Uuid>> = files
        .iter()
        .map(|file| (file.id, file.replaces_file_id))
        .collect();
    let order = resolve_version_chain(head.id, &replaces, MAX_VERSION_CHAIN);

    let mut by_id: HashMap<Uuid, ProjectFile> =
        files.into_iter().map(|file| (file.id, file)).collect();
    Ok(order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect())
}

pub fn guard_facts(conn: &mut PgConnection, project_id: Uuid) -> QueryResult<GuardFacts> {
    let live_files = project_files::table
        .filter(project_files::project_id.eq(project_id))
        .filter(project_files::deleted_at.is_null());

    let validated_raw_footage = live_files
        .clone()
        .filter(project_files::file_category.eq(FileCategory::RawFootage))
        .filter(project_files::validation_status.eq(ValidationStatus::Passed))
        .count()
        .get_result(conn)?;

    let completed_edits = live_files
        .clone()
        .filter(
            project_files::file_category.eq_any([FileCategory::EditDraft, FileCategory::EditRevision]),
        )
        .filter(project_files::upload_status.eq(UploadStatus::Completed))
        .count()
        .get_result(conn)?;

    let completed_deliverables = live_files
        .filter(
            project_files::file_category
                .eq_any([FileCategory::EditFinal, FileCategory::ClientDeliverable]),
        )
        .filter(project_files::upload_status.eq(UploadStatus::Completed))
        .count()
        .get_result(conn)?;

    let open_feedback = project_feedback::table
        .filter(project_feedback::project_id.eq(project_id))
        .filter(project_feedback::status.eq_any(OPEN_FEEDBACK));

    let open_qc_rejections = open_feedback
        .clone()
        .filter(project_feedback::feedback_type.eq(FeedbackType::InternalQcRejection))
        .count()
        .get_result(conn)?;

    let unresolved_feedback = open_feedback.count().get_result(conn)?;

    Ok(GuardFacts {
        validated_raw_footage,
        completed_edits,
        completed_deliverables,
        open_qc_rejections,
        unresolved_feedback,
    })
}

/// Only final approvals carry a rating, and only 1 through 5.
pub fn check_rating(feedback_type: FeedbackType, rating: Option<i32>) -> RegistryResult<()> {
    match rating {
        None => Ok(()),
        Some(_) if feedback_type != FeedbackType::FinalApproval => {
            Err(RegistryError::RatingNotAllowed)
        }
        Some(value) if !(1..=5).contains(&value) => Err(RegistryError::RatingOutOfRange(value)),
        Some(_) => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct SubmitFeedback {
    pub project_id: Uuid,
    pub feedback_type: FeedbackType,
    pub submitted_by: Uuid,
    pub submitted_by_role: ActorRole,
    pub related_file_id: Option<Uuid>,
    pub body: String,
    pub video_timestamps: Vec<VideoTimestamp>,
    pub priority: Priority,
    pub attachments: Vec<FeedbackAttachment>,
    pub rating: Option<i32>,
}

impl SubmitFeedback {
    pub fn new(
        project_id: Uuid,
        feedback_type: FeedbackType,
        submitted_by: Uuid,
        submitted_by_role: ActorRole,
        body: impl Into<String>,
    ) -> Self {
        Self {
            project_id,
            feedback_type,
            submitted_by,
            submitted_by_role,
            related_file_id: None,
            body: body.into(),
            video_timestamps: Vec::new(),
            priority: Priority::Normal,
            attachments: Vec::new(),
            rating: None,
        }
    }
}

pub fn submit_feedback(
    conn: &mut PgConnection,
    request: &SubmitFeedback,
) -> RegistryResult<ProjectFeedback> {
    check_rating(request.feedback_type, request.rating)?;
    load_project(conn, request.project_id)?;
    if let Some(file_id) = request.related_file_id {
        let file = load_file(conn, file_id)?;
        if file.project_id != request.project_id {
            return Err(RegistryError::FileNotFound(file_id));
        }
    }

    let row = NewProjectFeedback {
        id: Uuid::new_v4(),
        project_id: request.project_id,
        feedback_type: request.feedback_type,
        submitted_by: request.submitted_by,
        submitted_by_role: request.submitted_by_role,
        related_file_id: request.related_file_id,
        body: request.body.clone(),
        video_timestamps: serde_json::to_value(&request.video_timestamps)?,
        priority: request.priority,
        status: FeedbackStatus::Pending,
        attachments: serde_json::to_value(&request.attachments)?,
        rating: request.rating,
    };
    let feedback: ProjectFeedback = diesel::insert_into(project_feedback::table)
        .values(&row)
        .get_result(conn)?;
    info!(
        project_id = %feedback.project_id,
        feedback_id = %feedback.id,
        feedback_type = %feedback.feedback_type,
        "feedback submitted"
    );
    Ok(feedback)
}

fn load_feedback(conn: &mut PgConnection, feedback_id: Uuid) -> RegistryResult<ProjectFeedback> {
    project_feedback::table
        .find(feedback_id)
        .first(conn)
        .optional()?
        .ok_or(RegistryError::FeedbackNotFound(feedback_id))
}

/// Stores an admin rewrite of client feedback for the creator.
pub fn translate_feedback(
    conn: &mut PgConnection,
    feedback_id: Uuid,
    translated_body: &str,
    translator: Uuid,
) -> RegistryResult<ProjectFeedback> {
    load_feedback(conn, feedback_id)?;
    let now = Utc::now().naive_utc();
    let updated = diesel::update(project_feedback::table.find(feedback_id))
        .set((
            project_feedback::translated_body.eq(Some(translated_body)),
            project_feedback::translated_by.eq(Some(translator)),
            project_feedback::translated_at.eq(Some(now)),
            project_feedback::updated_at.eq(now),
        ))
        .get_result(conn)?;
    Ok(updated)
}

pub fn update_feedback_status(
    conn: &mut PgConnection,
    feedback_id: Uuid,
    status: FeedbackStatus,
    actor: Uuid,
    notes: Option<&str>,
) -> RegistryResult<ProjectFeedback> {
    conn.transaction::<_, RegistryError, _>(|conn| {
        let current: ProjectFeedback = project_feedback::table
            .find(feedback_id)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(RegistryError::FeedbackNotFound(feedback_id))?;

        if !current.status.can_transition_to(status) {
            return Err(RegistryError::InvalidFeedbackStatus {
                from: current.status,
                to: status,
            });
        }

        let now = Utc::now().naive_utc();
        let target = project_feedback::table.find(feedback_id);
        let updated: ProjectFeedback = if status.is_closed() {
            diesel::update(target)
                .set((
                    project_feedback::status.eq(status),
                    project_feedback::resolved_by.eq(Some(actor)),
                    project_feedback::resolved_at.eq(Some(now)),
                    project_feedback::resolution_notes.eq(notes),
                    project_feedback::updated_at.eq(now),
                ))
                .get_result(conn)?
        } else {
            diesel::update(target)
                .set((
                    project_feedback::status.eq(status),
                    project_feedback::updated_at.eq(now),
                ))
                .get_result(conn)?
        };
        info!(feedback_id = %feedback_id, from = %current.status, to = %status, "feedback status updated");
        Ok(updated)
    })
}
