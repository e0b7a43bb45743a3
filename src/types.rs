//! Closed enumerations stored as `TEXT` columns.
//!
//! Every enum decodes at the diesel and serde boundaries, so an unknown
//! string never makes it past a row load or a payload parse.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            diesel::expression::AsExpression,
            diesel::deserialize::FromSqlRow,
        )]
        #[diesel(sql_type = diesel::sql_types::Text)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::types::UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::types::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }

        impl diesel::serialize::ToSql<diesel::sql_types::Text, diesel::pg::Pg> for $name {
            fn to_sql<'b>(
                &'b self,
                out: &mut diesel::serialize::Output<'b, '_, diesel::pg::Pg>,
            ) -> diesel::serialize::Result {
                use std::io::Write;
                out.write_all(self.as_str().as_bytes())?;
                Ok(diesel::serialize::IsNull::No)
            }
        }

        impl diesel::deserialize::FromSql<diesel::sql_types::Text, diesel::pg::Pg> for $name {
            fn from_sql(bytes: diesel::pg::PgValue<'_>) -> diesel::deserialize::Result<Self> {
                let raw = <String as diesel::deserialize::FromSql<
                    diesel::sql_types::Text,
                    diesel::pg::Pg,
                >>::from_sql(bytes)?;
                raw.parse().map_err(Into::into)
            }
        }
    };
}

pub(crate) use text_enum;

text_enum! {
    /// Who acted on a project. `System` covers automatic transitions.
    pub enum ActorRole {
        System => "SYSTEM",
        Client => "CLIENT",
        Creator => "CREATOR",
        Editor => "EDITOR",
        Qc => "QC",
        Admin => "ADMIN",
    }
}

text_enum! {
    pub enum TransitionType {
        Manual => "MANUAL",
        Automatic => "AUTOMATIC",
    }
}

text_enum! {
    pub enum FileCategory {
        RawFootage => "raw_footage",
        RawAudio => "raw_audio",
        EditDraft => "edit_draft",
        EditRevision => "edit_revision",
        EditFinal => "edit_final",
        ClientDeliverable => "client_deliverable",
        Thumbnail => "thumbnail",
        ReferenceMaterial => "reference_material",
    }
}

impl FileCategory {
    /// Top-level storage prefix for files of this category.
    pub fn folder(&self) -> &'static str {
        match self {
            FileCategory::RawFootage => "raw-footage",
            FileCategory::RawAudio => "raw-audio",
            FileCategory::EditDraft => "edits/drafts",
            FileCategory::EditRevision => "edits/revisions",
            FileCategory::EditFinal => "edits/final",
            FileCategory::ClientDeliverable => "deliverables",
            FileCategory::Thumbnail => "thumbnails",
            FileCategory::ReferenceMaterial => "references",
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, FileCategory::RawFootage | FileCategory::RawAudio)
    }
}

text_enum! {
    pub enum UploadStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Failed => "failed",
    }
}

impl UploadStatus {
    /// A failed upload may be started again; a completed one is final.
    pub fn can_transition_to(&self, target: UploadStatus) -> bool {
        matches!(
            (self, target),
            (UploadStatus::Pending, UploadStatus::InProgress)
                | (UploadStatus::Pending, UploadStatus::Failed)
                | (UploadStatus::InProgress, UploadStatus::Completed)
                | (UploadStatus::InProgress, UploadStatus::Failed)
                | (UploadStatus::Failed, UploadStatus::InProgress)
        )
    }
}

text_enum! {
    pub enum ValidationStatus {
        Pending => "pending",
        Passed => "passed",
        Failed => "failed",
    }
}

text_enum! {
    pub enum FeedbackType {
        ClientPreviewFeedback => "client_preview_feedback",
        InternalQcRejection => "internal_qc_rejection",
        CoverageReviewNotes => "coverage_review_notes",
        RevisionRequest => "revision_request",
        FinalApproval => "final_approval",
    }
}

text_enum! {
    pub enum FeedbackStatus {
        Pending => "pending",
        Acknowledged => "acknowledged",
        InProgress => "in_progress",
        Resolved => "resolved",
        Dismissed => "dismissed",
    }
}

impl FeedbackStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, FeedbackStatus::Resolved | FeedbackStatus::Dismissed)
    }

    fn rank(&self) -> u8 {
        match self {
            FeedbackStatus::Pending => 0,
            FeedbackStatus::Acknowledged => 1,
            FeedbackStatus::InProgress => 2,
            FeedbackStatus::Resolved | FeedbackStatus::Dismissed => 3,
        }
    }

    /// Feedback only moves forward; resolved and dismissed are terminal.
    pub fn can_transition_to(&self, target: FeedbackStatus) -> bool {
        !self.is_closed() && target.rank() > self.rank()
    }
}

text_enum! {
    pub enum Priority {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

text_enum! {
    pub enum NotificationType {
        StateTransition => "state_transition",
        Assignment => "assignment",
        FeedbackReceived => "feedback_received",
        FeedbackResolved => "feedback_resolved",
        DeadlineApproaching => "deadline_approaching",
        DeadlineMissed => "deadline_missed",
        UploadCompleted => "upload_completed",
        UploadFailed => "upload_failed",
        DeliveryReady => "delivery_ready",
        ApprovalRequired => "approval_required",
        ApprovalGranted => "approval_granted",
    }
}

text_enum! {
    pub enum EmailStatus {
        Pending => "pending",
        Sent => "sent",
        Delivered => "delivered",
        Failed => "failed",
        Bounced => "bounced",
    }
}

impl EmailStatus {
    pub fn can_transition_to(&self, target: EmailStatus) -> bool {
        matches!(
            (self, target),
            (EmailStatus::Pending, EmailStatus::Sent)
                | (EmailStatus::Pending, EmailStatus::Failed)
                | (EmailStatus::Sent, EmailStatus::Delivered)
                | (EmailStatus::Sent, EmailStatus::Failed)
                | (EmailStatus::Sent, EmailStatus::Bounced)
        )
    }
}

text_enum! {
    pub enum BookingStatus {
        Draft => "draft",
        Pending => "pending",
        Confirmed => "confirmed",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    pub enum PaymentStatus {
        Unpaid => "unpaid",
        PartiallyPaid => "partially_paid",
        Paid => "paid",
        Refunded => "refunded",
    }
}

/// Severity of a single validation finding on an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Error,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueSeverity::Warning => f.write_str("warning"),
            IssueSeverity::Error => f.write_str("error"),
        }
    }
}
