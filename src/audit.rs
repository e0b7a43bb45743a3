//! Append-only history.
//!
//! `project_state_history` holds one row per applied transition and has no
//! update or delete path. `activity_log` doubles as the scheduler's
//! idempotence ledger: a sentinel row per (lead, marker, key) records that a
//! scheduled email went out.

use diesel::dsl::exists;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{NewActivityEntry, NewStateHistory, StateHistory},
    schema::{activity_log, project_state_history},
    types::ActorRole,
    workflow::ProjectState,
};

pub fn append(conn: &mut PgConnection, record: &NewStateHistory) -> QueryResult<StateHistory> {
    diesel::insert_into(project_state_history::table)
        .values(record)
        .get_result(conn)
}

/// Every transition of a project, oldest first.
pub fn history(conn: &mut PgConnection, project_id: Uuid) -> QueryResult<Vec<StateHistory>> {
    project_state_history::table
        .filter(project_state_history::project_id.eq(project_id))
        .order((
            project_state_history::created_at.asc(),
            project_state_history::id.asc(),
        ))
        .load(conn)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("record {index} starts at {found} but the previous record ended at {expected}")]
    Discontinuous {
        index: usize,
        expected: ProjectState,
        found: ProjectState,
    },
    #[error("record {index} moves {from} -> {to}, which is not a legal transition")]
    Illegal {
        index: usize,
        from: ProjectState,
        to: ProjectState,
    },
}

/// Replays a project's history from the initial state and returns the state
/// it ends in.
pub fn replay(records: &[StateHistory]) -> Result<ProjectState, ReplayError> {
    let mut state = ProjectState::INITIAL;
    for (index, record) in records.iter().enumerate() {
        if record.from_state != state {
            return Err(ReplayError::Discontinuous {
                index,
                expected: state,
                found: record.from_state,
            });
        }
        if !record.from_state.can_transition_to(record.to_state) {
            return Err(ReplayError::Illegal {
                index,
                from: record.from_state,
                to: record.to_state,
            });
        }
        state = record.to_state;
    }
    Ok(state)
}

/// Ledger entry written after a scheduled email is confirmed sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentinel {
    pub lead_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub marker: String,
    pub idempotence_key: String,
    pub details: Value,
}

pub fn has_sentinel(
    conn: &mut PgConnection,
    lead_id: Uuid,
    marker: &str,
    idempotence_key: &str,
) -> QueryResult<bool> {
    diesel::select(exists(
        activity_log::table
            .filter(activity_log::lead_id.eq(lead_id))
            .filter(activity_log::marker.eq(marker))
            .filter(activity_log::idempotence_key.eq(idempotence_key)),
    ))
    .get_result(conn)
}

/// Writes the sentinel. Returns `false` when an identical sentinel already
/// existed, which happens when two schedulers race on the same window.
pub fn record_sentinel(conn: &mut PgConnection, sentinel: &Sentinel) -> QueryResult<bool> {
    let entry = NewActivityEntry {
        id: Uuid::new_v4(),
        lead_id: sentinel.lead_id,
        booking_id: sentinel.booking_id,
        actor_role: ActorRole::System,
        action: "scheduled_email_sent".to_string(),
        marker: Some(sentinel.marker.clone()),
        idempotence_key: Some(sentinel.idempotence_key.clone()),
        metadata: json!({
            "marker": sentinel.marker,
            "idempotence_key": sentinel.idempotence_key,
            "details": sentinel.details,
        }),
    };

    let inserted = diesel::insert_into(activity_log::table)
        .values(&entry)
        .on_conflict_do_nothing()
        .execute(conn)?;
    Ok(inserted == 1)
}
