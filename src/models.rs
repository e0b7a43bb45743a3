use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;
use crate::types::{
    ActorRole, BookingStatus, EmailStatus, FeedbackStatus, FeedbackType, FileCategory,
    IssueSeverity, NotificationType, PaymentStatus, Priority, TransitionType, UploadStatus,
    ValidationStatus,
};
use crate::workflow::ProjectState;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = leads)]
pub struct Lead {
    pub id: Uuid,
    pub client_name: Option<String>,
    pub guest_email: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = leads)]
pub struct NewLead {
    pub id: Uuid,
    pub client_name: Option<String>,
    pub guest_email: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = bookings)]
pub struct Booking {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub event_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub location: Option<String>,
    pub status: BookingStatus,
    pub is_active: bool,
    pub is_draft: bool,
    pub payment_status: PaymentStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// Only live, paid bookings receive client communication.
    pub fn is_notifiable(&self) -> bool {
        self.is_active
            && !self.is_draft
            && !matches!(self.status, BookingStatus::Cancelled | BookingStatus::Draft)
            && self.payment_status == PaymentStatus::Paid
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bookings)]
pub struct NewBooking {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub event_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub location: Option<String>,
    pub status: BookingStatus,
    pub is_active: bool,
    pub is_draft: bool,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crew_assignments)]
pub struct CrewAssignment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub crew_member_id: Uuid,
    pub status: String,
    pub is_accepted: bool,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crew_assignments)]
pub struct NewCrewAssignment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub crew_member_id: Uuid,
    pub status: String,
    pub is_accepted: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = activity_log)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub actor_role: ActorRole,
    pub action: String,
    pub marker: Option<String>,
    pub idempotence_key: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = activity_log)]
pub struct NewActivityEntry {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub actor_role: ActorRole,
    pub action: String,
    pub marker: Option<String>,
    pub idempotence_key: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = projects)]
pub struct Project {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub code: String,
    pub current_state: ProjectState,
    pub state_changed_at: NaiveDateTime,
    pub client_id: Uuid,
    pub creator_id: Option<Uuid>,
    pub editor_id: Option<Uuid>,
    pub qc_reviewer_id: Option<Uuid>,
    pub raw_upload_deadline: Option<NaiveDateTime>,
    pub edit_delivery_deadline: Option<NaiveDateTime>,
    pub final_delivery_deadline: Option<NaiveDateTime>,
    pub total_raw_size_bytes: i64,
    pub total_files_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Project {
    pub fn is_closed(&self) -> bool {
        self.current_state == ProjectState::ProjectClosed
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = projects)]
pub struct NewProject {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub code: String,
    pub current_state: ProjectState,
    pub state_changed_at: NaiveDateTime,
    pub client_id: Uuid,
    pub creator_id: Option<Uuid>,
    pub editor_id: Option<Uuid>,
    pub qc_reviewer_id: Option<Uuid>,
    pub raw_upload_deadline: Option<NaiveDateTime>,
    pub edit_delivery_deadline: Option<NaiveDateTime>,
    pub final_delivery_deadline: Option<NaiveDateTime>,
}

/// One finding from file validation (codec checks, resolution, corruption).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    pub severity: IssueSeverity,
}

/// Media introspection results for an uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, AsChangeset)]
#[diesel(table_name = project_files, treat_none_as_null = true)]
pub struct MediaInfo {
    pub duration_seconds: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub bitrate: Option<i64>,
    pub sample_rate: Option<i32>,
    pub channels: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = project_files)]
#[diesel(belongs_to(Project))]
pub struct ProjectFile {
    pub id: Uuid,
    pub project_id: Uuid,
    pub file_category: FileCategory,
    pub file_name: String,
    pub storage_key: String,
    pub size_bytes: i64,
    pub file_extension: Option<String>,
    pub mime_type: Option<String>,
    pub upload_status: UploadStatus,
    pub upload_progress: i32,
    pub upload_session_id: Option<String>,
    pub upload_error: Option<String>,
    pub validation_status: ValidationStatus,
    pub validation_errors: serde_json::Value,
    pub duration_seconds: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub bitrate: Option<i64>,
    pub sample_rate: Option<i32>,
    pub channels: Option<i32>,
    pub version_number: i32,
    pub replaces_file_id: Option<Uuid>,
    pub md5_hash: Option<String>,
    pub sha256_hash: Option<String>,
    pub storage_bucket: Option<String>,
    pub storage_region: Option<String>,
    pub storage_etag: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub deleted_at: Option<NaiveDateTime>,
    pub deleted_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ProjectFile {
    pub fn validation_issues(&self) -> Vec<ValidationIssue> {
        serde_json::from_value(self.validation_errors.clone()).unwrap_or_default()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = project_files)]
pub struct NewProjectFile {
    pub id: Uuid,
    pub project_id: Uuid,
    pub file_category: FileCategory,
    pub file_name: String,
    pub storage_key: String,
    pub size_bytes: i64,
    pub file_extension: Option<String>,
    pub mime_type: Option<String>,
    pub upload_status: UploadStatus,
    pub validation_status: ValidationStatus,
    pub validation_errors: serde_json::Value,
    pub version_number: i32,
    pub replaces_file_id: Option<Uuid>,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize)]
#[diesel(table_name = project_state_history)]
#[diesel(belongs_to(Project))]
pub struct StateHistory {
    pub id: Uuid,
    pub project_id: Uuid,
    pub from_state: ProjectState,
    pub to_state: ProjectState,
    pub changed_by: Option<Uuid>,
    pub changed_by_role: ActorRole,
    pub reason: Option<String>,
    pub transition_type: TransitionType,
    pub related_file_id: Option<Uuid>,
    pub related_feedback_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = project_state_history)]
pub struct NewStateHistory {
    pub id: Uuid,
    pub project_id: Uuid,
    pub from_state: ProjectState,
    pub to_state: ProjectState,
    pub changed_by: Option<Uuid>,
    pub changed_by_role: ActorRole,
    pub reason: Option<String>,
    pub transition_type: TransitionType,
    pub related_file_id: Option<Uuid>,
    pub related_feedback_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: serde_json::Value,
}

/// A note pinned to a point in the reviewed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTimestamp {
    pub time_seconds: f64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackAttachment {
    pub storage_key: String,
    pub file_name: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = project_feedback)]
#[diesel(belongs_to(Project))]
pub struct ProjectFeedback {
    pub id: Uuid,
    pub project_id: Uuid,
    pub feedback_type: FeedbackType,
    pub submitted_by: Uuid,
    pub submitted_by_role: ActorRole,
    pub related_file_id: Option<Uuid>,
    pub body: String,
    pub video_timestamps: serde_json::Value,
    pub priority: Priority,
    pub translated_body: Option<String>,
    pub translated_by: Option<Uuid>,
    pub translated_at: Option<NaiveDateTime>,
    pub status: FeedbackStatus,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<NaiveDateTime>,
    pub resolution_notes: Option<String>,
    pub attachments: serde_json::Value,
    pub rating: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ProjectFeedback {
    pub fn timestamps(&self) -> Vec<VideoTimestamp> {
        serde_json::from_value(self.video_timestamps.clone()).unwrap_or_default()
    }

    pub fn attachment_list(&self) -> Vec<FeedbackAttachment> {
        serde_json::from_value(self.attachments.clone()).unwrap_or_default()
    }

    /// Creators see the admin translation once one exists.
    pub fn creator_visible_body(&self) -> &str {
        self.translated_body.as_deref().unwrap_or(&self.body)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = project_feedback)]
pub struct NewProjectFeedback {
    pub id: Uuid,
    pub project_id: Uuid,
    pub feedback_type: FeedbackType,
    pub submitted_by: Uuid,
    pub submitted_by_role: ActorRole,
    pub related_file_id: Option<Uuid>,
    pub body: String,
    pub video_timestamps: serde_json::Value,
    pub priority: Priority,
    pub status: FeedbackStatus,
    pub attachments: serde_json::Value,
    pub rating: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub action_url: Option<String>,
    pub project_id: Option<Uuid>,
    pub file_id: Option<Uuid>,
    pub feedback_id: Option<Uuid>,
    pub assignment_id: Option<Uuid>,
    pub is_read: bool,
    pub read_at: Option<NaiveDateTime>,
    pub email_status: EmailStatus,
    pub email_sent_at: Option<NaiveDateTime>,
    pub email_error: Option<String>,
    pub email_opened_at: Option<NaiveDateTime>,
    pub email_open_count: i32,
    pub priority: Priority,
    pub expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub action_url: Option<String>,
    pub project_id: Option<Uuid>,
    pub file_id: Option<Uuid>,
    pub feedback_id: Option<Uuid>,
    pub assignment_id: Option<Uuid>,
    pub email_status: EmailStatus,
    pub priority: Priority,
    pub expires_at: Option<NaiveDateTime>,
}
