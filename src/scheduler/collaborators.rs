//! Seams between the reminder jobs and the outside world.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task;
use tracing::warn;
use uuid::Uuid;

use crate::audit::{self, Sentinel};
use crate::db::PgPool;
use crate::models::{Booking, CrewAssignment, Lead, User};
use crate::schema::{bookings, crew_assignments, leads, users};

use super::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone)]
pub struct CrewMember {
    pub assignment: CrewAssignment,
    pub display_name: Option<String>,
}

/// One booking with everything a reminder needs to address it.
#[derive(Debug, Clone)]
pub struct BookingContext {
    pub booking: Booking,
    pub user: Option<User>,
    pub lead: Option<Lead>,
    pub crew: Vec<CrewMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailPayload {
    #[serde(skip)]
    pub template: &'static str,
    pub to: String,
    pub booking_id: Uuid,
    pub first_name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl EmailOutcome {
    pub fn sent() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait BookingSource: Send + Sync {
    /// Bookings whose event falls on `date`, notifiable or not.
    async fn bookings_on(&self, date: NaiveDate) -> SchedulerResult<Vec<BookingContext>>;
}

#[async_trait]
pub trait ActivityLedger: Send + Sync {
    async fn has_sentinel(&self, lead_id: Uuid, marker: &str, key: &str) -> SchedulerResult<bool>;
    async fn record_sentinel(&self, sentinel: Sentinel) -> SchedulerResult<bool>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Anything but an explicit success counts as a failed send.
    async fn send(&self, payload: &EmailPayload) -> EmailOutcome;
}

async fn blocking<F, T>(pool: &PgPool, f: F) -> SchedulerResult<T>
where
    F: FnOnce(&mut PgConnection) -> SchedulerResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|err| SchedulerError::Pool(err.to_string()))?;
        f(&mut conn)
    })
    .await
    .map_err(|err| SchedulerError::Task(err.to_string()))?
}

pub struct PgBookingSource {
    pool: PgPool,
}

impl PgBookingSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Loads bookings on `date` with their account, lead and active crew.
pub fn load_booking_contexts(
    conn: &mut PgConnection,
    date: NaiveDate,
) -> QueryResult<Vec<BookingContext>> {
    let rows: Vec<Booking> = bookings::table
        .filter(bookings::event_date.eq(date))
        .order(bookings::created_at.asc())
        .load(conn)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let user_ids: Vec<Uuid> = rows.iter().filter_map(|booking| booking.user_id).collect();
    let lead_ids: Vec<Uuid> = rows.iter().filter_map(|booking| booking.lead_id).collect();
    let booking_ids: Vec<Uuid> = rows.iter().map(|booking| booking.id).collect();
    let mut person_ids = user_ids;

    let assignments: Vec<CrewAssignment> = crew_assignments::table
        .filter(crew_assignments::booking_id.eq_any(booking_ids))
        .filter(crew_assignments::is_active.eq(true))
        .order(crew_assignments::created_at.asc())
        .load(conn)?;
    let crew_ids = assignments
        .iter()
        .map(|assignment| assignment.crew_member_id);

    person_ids.extend(crew_ids);

    let people: HashMap<Uuid, User> = users::table
        .filter(users::id.eq_any(person_ids))
        .load::<User>(conn)?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();
    let lead_rows: HashMap<Uuid, Lead> = leads::table
        .filter(leads::id.eq_any(lead_ids))
        .load::<Lead>(conn)?
        .into_iter()
        .map(|lead| (lead.id, lead))
        .collect();

    let mut crew_by_booking: HashMap<Uuid, Vec<CrewMember>> = HashMap::new();
    for assignment in assignments {
        let display_name = people
            .get(&assignment.crew_member_id)
            .and_then(|user| user.full_name.clone());
        crew_by_booking
            .entry(assignment.booking_id)
            .or_default()
            .push(CrewMember {
                assignment,
                display_name,
            });
    }

    Ok(rows
        .into_iter()
        .map(|booking| BookingContext {
            user: booking.user_id.and_then(|id| people.get(&id).cloned()),
            lead: booking.lead_id.and_then(|id| lead_rows.get(&id).cloned()),
            crew: crew_by_booking.remove(&booking.id).unwrap_or_default(),
            booking,
        })
        .collect())
}

#[async_trait]
impl BookingSource for PgBookingSource {
    async fn bookings_on(&self, date: NaiveDate) -> SchedulerResult<Vec<BookingContext>> {
        blocking(&self.pool, move |conn| Ok(load_booking_contexts(conn, date)?)).await
    }
}

pub struct PgActivityLedger {
    pool: PgPool,
}

impl PgActivityLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityLedger for PgActivityLedger {
    async fn has_sentinel(&self, lead_id: Uuid, marker: &str, key: &str) -> SchedulerResult<bool> {
        let marker = marker.to_string();
        let key = key.to_string();
        blocking(&self.pool, move |conn| {
            Ok(audit::has_sentinel(conn, lead_id, &marker, &key)?)
        })
        .await
    }

    async fn record_sentinel(&self, sentinel: Sentinel) -> SchedulerResult<bool> {
        blocking(&self.pool, move |conn| Ok(audit::record_sentinel(conn, &sentinel)?)).await
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts payloads to an external email service at `{endpoint}/send/{template}`.
pub struct HttpEmailSender {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpEmailSender {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> SchedulerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| SchedulerError::Email(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url_for(&self, template: &str) -> String {
        format!("{}/send/{}", self.endpoint, template)
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, payload: &EmailPayload) -> EmailOutcome {
        let mut request = self.client.post(self.url_for(payload.template)).json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(template = payload.template, booking_id = %payload.booking_id, error = %err, "email service unreachable");
                return EmailOutcome::failed(err.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            return EmailOutcome::failed(format!("email service returned {status}"));
        }

        match response.json::<SendResponse>().await {
            Ok(SendResponse { success: true, .. }) => EmailOutcome::sent(),
            Ok(SendResponse { error, .. }) => EmailOutcome::failed(
                error.unwrap_or_else(|| "email service did not report success".to_string()),
            ),
            Err(err) => EmailOutcome::failed(format!("invalid email service response: {err}")),
        }
    }
}
