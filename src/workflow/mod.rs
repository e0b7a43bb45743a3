//! Project state machine.
//!
//! `transition` is the only writer of `projects.current_state`. It validates
//! the request, evaluates guards against registry state, then performs the
//! compare-and-swap state update, the audit append, and the notification
//! inserts inside one database transaction.

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    audit,
    error::{WorkflowError, WorkflowResult},
    models::{NewNotification, NewStateHistory, Project, StateHistory},
    notifications,
    registry,
    schema::projects,
    types::{ActorRole, EmailStatus, TransitionType},
};

mod guards;
mod states;

pub use guards::{check_guards, GuardFacts, GuardFailure};
pub use states::{notification_rule, NotificationRule, ProjectState, Recipient};

/// Request provenance recorded on the audit row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub project_id: Uuid,
    pub to_state: ProjectState,
    pub actor: Option<Uuid>,
    pub role: ActorRole,
    pub reason: Option<String>,
    pub related_file_id: Option<Uuid>,
    pub related_feedback_id: Option<Uuid>,
    pub context: RequestContext,
    pub metadata: Map<String, Value>,
}

impl TransitionRequest {
    pub fn new(project_id: Uuid, to_state: ProjectState, role: ActorRole) -> Self {
        Self {
            project_id,
            to_state,
            actor: None,
            role,
            reason: None,
            related_file_id: None,
            related_feedback_id: None,
            context: RequestContext::default(),
            metadata: Map::new(),
        }
    }

    /// An automatic transition performed by the system itself.
    pub fn system(project_id: Uuid, to_state: ProjectState) -> Self {
        Self::new(project_id, to_state, ActorRole::System)
    }

    pub fn by(mut self, actor: Uuid) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn related_file(mut self, file_id: Uuid) -> Self {
        self.related_file_id = Some(file_id);
        self
    }

    pub fn related_feedback(mut self, feedback_id: Uuid) -> Self {
        self.related_feedback_id = Some(feedback_id);
        self
    }

    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn transition_type(&self) -> TransitionType {
        if self.actor.is_some() {
            TransitionType::Manual
        } else {
            TransitionType::Automatic
        }
    }

    fn history_record(&self, from: ProjectState, to: ProjectState) -> NewStateHistory {
        NewStateHistory {
            id: Uuid::new_v4(),
            project_id: self.project_id,
            from_state: from,
            to_state: to,
            changed_by: self.actor,
            changed_by_role: self.role,
            reason: self.reason.clone(),
            transition_type: self.transition_type(),
            related_file_id: self.related_file_id,
            related_feedback_id: self.related_feedback_id,
            ip_address: self.context.ip_address.clone(),
            user_agent: self.context.user_agent.clone(),
            metadata: Value::Object(self.metadata.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    NoOp,
    Apply {
        from: ProjectState,
        to: ProjectState,
    },
}

#[derive(Debug)]
pub enum TransitionOutcome {
    Applied {
        project: Project,
        history: StateHistory,
        notified: usize,
    },
    /// The project was already in the requested state; nothing was written.
    NoOp(Project),
}

impl TransitionOutcome {
    pub fn project(&self) -> &Project {
        match self {
            TransitionOutcome::Applied { project, .. } => project,
            TransitionOutcome::NoOp(project) => project,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, TransitionOutcome::NoOp(_))
    }
}

/// Decides what a request would do to a project currently in `current`,
/// without consulting guards.
pub fn plan_transition(
    project_id: Uuid,
    current: ProjectState,
    request: &TransitionRequest,
) -> WorkflowResult<TransitionPlan> {
    if current.is_terminal() {
        return Err(WorkflowError::ProjectClosed(project_id));
    }
    if request.to_state == current {
        return Ok(TransitionPlan::NoOp);
    }
    if request.role != ActorRole::System && request.actor.is_none() {
        return Err(WorkflowError::ActorRequired(request.role));
    }
    if !current.can_transition_to(request.to_state) {
        return Err(WorkflowError::InvalidTransition {
            from: current,
            to: request.to_state,
        });
    }
    Ok(TransitionPlan::Apply {
        from: current,
        to: request.to_state,
    })
}

pub fn transition(
    conn: &mut PgConnection,
    request: &TransitionRequest,
) -> WorkflowResult<TransitionOutcome> {
    conn.transaction::<_, WorkflowError, _>(|conn| {
        let project: Project = projects::table
            .find(request.project_id)
            .first(conn)
            .optional()?
            .ok_or(WorkflowError::ProjectNotFound(request.project_id))?;

        let (from, to) = match plan_transition(project.id, project.current_state, request)? {
            TransitionPlan::NoOp => {
                debug!(project_id = %project.id, state = %project.current_state, "transition is a no-op");
                return Ok(TransitionOutcome::NoOp(project));
            }
            TransitionPlan::Apply { from, to } => (from, to),
        };

        let facts = registry::guard_facts(conn, project.id)?;
        if let Err(reason) = check_guards(to, &facts) {
            info!(project_id = %project.id, %from, %to, %reason, "transition guard failed");
            return Err(WorkflowError::GuardFailed { to, reason });
        }

        let now = Utc::now().naive_utc();
        let project: Project = diesel::update(
            projects::table
                .filter(projects::id.eq(project.id))
                .filter(projects::current_state.eq(from)),
        )
        .set((
            projects::current_state.eq(to),
            projects::state_changed_at.eq(now),
            projects::updated_at.eq(now),
        ))
        .get_result(conn)
        .optional()?
        .ok_or(WorkflowError::Conflict {
            project_id: project.id,
            expected: from,
        })?;

        let history = audit::append(conn, &request.history_record(from, to))?;

        let pending = notifications_for(&project, &history);
        let notified = notifications::enqueue_all(conn, &pending)?;

        info!(
            project_id = %project.id,
            %from,
            %to,
            role = %request.role,
            transition_type = %history.transition_type,
            notified,
            "project transitioned"
        );

        Ok(TransitionOutcome::Applied {
            project,
            history,
            notified,
        })
    })
}

/// Notification rows for a project that just entered `history.to_state`.
pub fn notifications_for(project: &Project, history: &StateHistory) -> Vec<NewNotification> {
    let Some(rule) = notification_rule(history.to_state) else {
        return Vec::new();
    };

    let mut recipients: Vec<Uuid> = Vec::new();
    for recipient in rule.recipients {
        let user = match recipient {
            Recipient::Client => Some(project.client_id),
            Recipient::Creator => project.creator_id,
            Recipient::Editor => project.editor_id,
            Recipient::QcReviewer => project.qc_reviewer_id,
        };
        if let Some(user) = user {
            if !recipients.contains(&user) {
                recipients.push(user);
            }
        }
    }

    let body = match &history.reason {
        Some(reason) => format!(
            "Project {} moved to {}: {}",
            project.code, history.to_state, reason
        ),
        None => format!("Project {} moved to {}", project.code, history.to_state),
    };

    recipients
        .into_iter()
        .map(|user_id| NewNotification {
            id: Uuid::new_v4(),
            user_id,
            notification_type: rule.notification_type,
            title: rule.title.to_string(),
            body: body.clone(),
            action_url: Some(format!("/projects/{}", project.id)),
            project_id: Some(project.id),
            file_id: history.related_file_id,
            feedback_id: history.related_feedback_id,
            assignment_id: None,
            email_status: EmailStatus::Pending,
            priority: rule.priority,
            expires_at: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    fn request(to: ProjectState) -> TransitionRequest {
        TransitionRequest::new(Uuid::nil(), to, ActorRole::Qc).by(Uuid::new_v4())
    }

    #[test]
    fn illegal_pairs_are_rejected() {
        for from in ProjectState::ALL {
            if from.is_terminal() {
                continue;
            }
            for to in ProjectState::ALL {
                if from == to || from.can_transition_to(*to) {
                    continue;
                }
                let err = plan_transition(Uuid::nil(), *from, &request(*to)).unwrap_err();
                assert!(
                    matches!(err, WorkflowError::InvalidTransition { .. }),
                    "{from} -> {to} gave {err}"
                );
            }
        }
    }

    #[test]
    fn legal_pairs_plan_an_update() {
        for from in ProjectState::ALL {
            for to in from.legal_targets() {
                let plan = plan_transition(Uuid::nil(), *from, &request(*to)).unwrap();
                assert_eq!(plan, TransitionPlan::Apply { from: *from, to: *to });
            }
        }
    }

    #[test]
    fn closed_projects_reject_every_target() {
        for to in ProjectState::ALL {
            let err =
                plan_transition(Uuid::nil(), ProjectState::ProjectClosed, &request(*to)).unwrap_err();
            assert!(matches!(err, WorkflowError::ProjectClosed(_)));
        }
    }

    #[test]
    fn same_state_is_a_noop() {
        let plan = plan_transition(
            Uuid::nil(),
            ProjectState::EditInProgress,
            &request(ProjectState::EditInProgress),
        )
        .unwrap();
        assert_eq!(plan, TransitionPlan::NoOp);
    }

    #[test]
    fn same_state_without_an_actor_is_still_a_noop() {
        let anonymous =
            TransitionRequest::new(Uuid::nil(), ProjectState::EditInProgress, ActorRole::Client);
        let plan = plan_transition(Uuid::nil(), ProjectState::EditInProgress, &anonymous).unwrap();
        assert_eq!(plan, TransitionPlan::NoOp);
    }

    #[test]
    fn human_roles_need_an_actor() {
        let anonymous =
            TransitionRequest::new(Uuid::nil(), ProjectState::RawTechQcPending, ActorRole::Editor);
        let err = plan_transition(Uuid::nil(), ProjectState::RawUploaded, &anonymous).unwrap_err();
        assert!(matches!(err, WorkflowError::ActorRequired(ActorRole::Editor)));

        let system = TransitionRequest::system(Uuid::nil(), ProjectState::RawTechQcPending);
        assert_eq!(system.transition_type(), TransitionType::Automatic);
        assert!(plan_transition(Uuid::nil(), ProjectState::RawUploaded, &system).is_ok());
        assert_eq!(request(ProjectState::RawUploaded).transition_type(), TransitionType::Manual);
    }

    fn sample_project(creator: Option<Uuid>, editor: Option<Uuid>) -> Project {
        let now = NaiveDateTime::default();
        Project {
            id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            code: "PRJ-0001".into(),
            current_state: ProjectState::RevisionInProgress,
            state_changed_at: now,
            client_id: Uuid::new_v4(),
            creator_id: creator,
            editor_id: editor,
            qc_reviewer_id: None,
            raw_upload_deadline: None,
            edit_delivery_deadline: None,
            final_delivery_deadline: None,
            total_raw_size_bytes: 0,
            total_files_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_history(project: &Project, to: ProjectState) -> StateHistory {
        StateHistory {
            id: Uuid::new_v4(),
            project_id: project.id,
            from_state: ProjectState::FeedbackInternalReview,
            to_state: to,
            changed_by: None,
            changed_by_role: ActorRole::System,
            reason: Some("client asked for a shorter intro".into()),
            transition_type: TransitionType::Automatic,
            related_file_id: None,
            related_feedback_id: Some(Uuid::new_v4()),
            ip_address: None,
            user_agent: None,
            metadata: Value::Object(Map::new()),
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn revision_notifies_creator_and_editor_once_each() {
        let person = Uuid::new_v4();
        let project = sample_project(Some(person), Some(person));
        let history = sample_history(&project, ProjectState::RevisionInProgress);

        let rows = notifications_for(&project, &history);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, person);
        assert_eq!(rows[0].feedback_id, history.related_feedback_id);
        assert!(rows[0].body.contains("shorter intro"));
    }

    #[test]
    fn missing_recipients_are_skipped() {
        let project = sample_project(None, None);
        let history = sample_history(&project, ProjectState::RevisionInProgress);
        assert!(notifications_for(&project, &history).is_empty());

        let preview = sample_history(&project, ProjectState::ClientPreviewReady);
        let rows = notifications_for(&project, &preview);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, project.client_id);
    }
}
