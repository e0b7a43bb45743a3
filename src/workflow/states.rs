use crate::types::{text_enum, NotificationType, Priority};

text_enum! {
    /// The canonical post-production workflow states.
    pub enum ProjectState {
        RawUploaded => "RAW_UPLOADED",
        RawTechQcPending => "RAW_TECH_QC_PENDING",
        RawTechQcRejected => "RAW_TECH_QC_REJECTED",
        RawTechQcApproved => "RAW_TECH_QC_APPROVED",
        CoverageReviewPending => "COVERAGE_REVIEW_PENDING",
        CoverageRejected => "COVERAGE_REJECTED",
        EditApprovalPending => "EDIT_APPROVAL_PENDING",
        EditInProgress => "EDIT_IN_PROGRESS",
        InternalEditReviewPending => "INTERNAL_EDIT_REVIEW_PENDING",
        ClientPreviewReady => "CLIENT_PREVIEW_READY",
        ClientFeedbackReceived => "CLIENT_FEEDBACK_RECEIVED",
        FeedbackInternalReview => "FEEDBACK_INTERNAL_REVIEW",
        RevisionInProgress => "REVISION_IN_PROGRESS",
        RevisionQcPending => "REVISION_QC_PENDING",
        FinalExportPending => "FINAL_EXPORT_PENDING",
        ReadyForDelivery => "READY_FOR_DELIVERY",
        Delivered => "DELIVERED",
        ProjectClosed => "PROJECT_CLOSED",
    }
}

impl ProjectState {
    pub const INITIAL: ProjectState = ProjectState::RawUploaded;

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectState::ProjectClosed)
    }

    /// States reachable in one step. Rejection states loop back to the step
    /// that produces new material for review.
    pub fn legal_targets(&self) -> &'static [ProjectState] {
        use ProjectState::*;
        match self {
            RawUploaded => &[RawTechQcPending],
            RawTechQcPending => &[RawTechQcApproved, RawTechQcRejected],
            RawTechQcRejected => &[RawUploaded],
            RawTechQcApproved => &[CoverageReviewPending],
            CoverageReviewPending => &[EditApprovalPending, CoverageRejected],
            CoverageRejected => &[RawUploaded, CoverageReviewPending],
            EditApprovalPending => &[EditInProgress],
            EditInProgress => &[InternalEditReviewPending],
            InternalEditReviewPending => &[ClientPreviewReady, EditInProgress],
            ClientPreviewReady => &[ClientFeedbackReceived, FinalExportPending],
            ClientFeedbackReceived => &[FeedbackInternalReview],
            FeedbackInternalReview => &[RevisionInProgress, FinalExportPending],
            RevisionInProgress => &[RevisionQcPending],
            RevisionQcPending => &[ClientPreviewReady, RevisionInProgress],
            FinalExportPending => &[ReadyForDelivery],
            ReadyForDelivery => &[Delivered],
            Delivered => &[ProjectClosed],
            ProjectClosed => &[],
        }
    }

    pub fn can_transition_to(&self, target: ProjectState) -> bool {
        self.legal_targets().contains(&target)
    }
}

/// Project role that receives a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Client,
    Creator,
    Editor,
    QcReviewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationRule {
    pub recipients: &'static [Recipient],
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub title: &'static str,
}

/// Who hears about a project entering `state`, if anyone.
pub fn notification_rule(state: ProjectState) -> Option<NotificationRule> {
    use ProjectState::*;
    use Recipient::*;

    fn rule(
        recipients: &'static [Recipient],
        notification_type: NotificationType,
        priority: Priority,
        title: &'static str,
    ) -> NotificationRule {
        NotificationRule {
            recipients,
            notification_type,
            priority,
            title,
        }
    }

    match state {
        RawTechQcPending => Some(rule(
            &[QcReviewer],
            NotificationType::ApprovalRequired,
            Priority::Normal,
            "Raw footage is ready for technical QC",
        )),
        RawTechQcRejected => Some(rule(
            &[Creator],
            NotificationType::StateTransition,
            Priority::High,
            "Raw footage was rejected in technical QC",
        )),
        CoverageRejected => Some(rule(
            &[Creator],
            NotificationType::StateTransition,
            Priority::High,
            "Coverage review requires additional footage",
        )),
        EditInProgress => Some(rule(
            &[Editor],
            NotificationType::Assignment,
            Priority::Normal,
            "Edit is ready to start",
        )),
        InternalEditReviewPending => Some(rule(
            &[QcReviewer],
            NotificationType::ApprovalRequired,
            Priority::Normal,
            "Edit is waiting for internal review",
        )),
        ClientPreviewReady => Some(rule(
            &[Client],
            NotificationType::ApprovalRequired,
            Priority::High,
            "Your preview is ready",
        )),
        ClientFeedbackReceived => Some(rule(
            &[Editor],
            NotificationType::FeedbackReceived,
            Priority::Normal,
            "Client feedback received",
        )),
        RevisionInProgress => Some(rule(
            &[Creator, Editor],
            NotificationType::StateTransition,
            Priority::Normal,
            "Revision requested",
        )),
        RevisionQcPending => Some(rule(
            &[QcReviewer],
            NotificationType::ApprovalRequired,
            Priority::Normal,
            "Revision is waiting for QC",
        )),
        ReadyForDelivery => Some(rule(
            &[Client],
            NotificationType::DeliveryReady,
            Priority::Normal,
            "Your final delivery is being prepared",
        )),
        Delivered => Some(rule(
            &[Client],
            NotificationType::DeliveryReady,
            Priority::High,
            "Your project has been delivered",
        )),
        _ => None,
    }
}
