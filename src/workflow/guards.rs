use thiserror::Error;

use super::ProjectState;

/// Registry counts the guards read, loaded inside the transition's transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardFacts {
    /// Non-deleted raw footage whose validation passed.
    pub validated_raw_footage: i64,
    /// Non-deleted edit drafts and revisions with a completed upload.
    pub completed_edits: i64,
    /// Non-deleted final exports and client deliverables with a completed upload.
    pub completed_deliverables: i64,
    /// Internal QC rejections that are neither resolved nor dismissed.
    pub open_qc_rejections: i64,
    /// Feedback of any type that is neither resolved nor dismissed.
    pub unresolved_feedback: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardFailure {
    #[error("no raw footage has passed validation")]
    NoValidatedRawFootage,
    #[error("{0} internal QC rejection(s) are still open")]
    OpenQcRejections(i64),
    #[error("no completed edit draft or revision is available")]
    NoPreviewableEdit,
    #[error("{0} feedback item(s) are not resolved or dismissed")]
    UnresolvedFeedback(i64),
    #[error("no completed final export or deliverable is available")]
    NoDeliverable,
}

pub fn check_guards(target: ProjectState, facts: &GuardFacts) -> Result<(), GuardFailure> {
    match target {
        ProjectState::RawTechQcApproved => {
            if facts.validated_raw_footage == 0 {
                return Err(GuardFailure::NoValidatedRawFootage);
            }
            no_open_qc_rejections(facts)
        }
        ProjectState::ClientPreviewReady => {
            if facts.completed_edits == 0 {
                return Err(GuardFailure::NoPreviewableEdit);
            }
            no_open_qc_rejections(facts)
        }
        ProjectState::FinalExportPending if facts.unresolved_feedback > 0 => {
            Err(GuardFailure::UnresolvedFeedback(facts.unresolved_feedback))
        }
        ProjectState::ReadyForDelivery if facts.completed_deliverables == 0 => {
            Err(GuardFailure::NoDeliverable)
        }
        _ => Ok(()),
    }
}

fn no_open_qc_rejections(facts: &GuardFacts) -> Result<(), GuardFailure> {
    if facts.open_qc_rejections > 0 {
        Err(GuardFailure::OpenQcRejections(facts.open_qc_rejections))
    } else {
        Ok(())
    }
}
