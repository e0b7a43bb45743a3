use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    error::{NotificationError, NotificationResult},
    models::{NewNotification, Notification},
    schema::notifications,
    types::EmailStatus,
};

pub fn enqueue(conn: &mut PgConnection, notification: &NewNotification) -> QueryResult<Notification> {
    diesel::insert_into(notifications::table)
        .values(notification)
        .get_result(conn)
}

pub fn enqueue_all(conn: &mut PgConnection, batch: &[NewNotification]) -> QueryResult<usize> {
    if batch.is_empty() {
        return Ok(0);
    }
    diesel::insert_into(notifications::table)
        .values(batch)
        .execute(conn)
}

fn load(conn: &mut PgConnection, id: Uuid) -> NotificationResult<Notification> {
    notifications::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or(NotificationError::NotFound(id))
}

/// Marks a notification read. Re-reading keeps the first `read_at`.
pub fn mark_read(conn: &mut PgConnection, id: Uuid) -> NotificationResult<Notification> {
    let current = load(conn, id)?;
    if current.is_read {
        return Ok(current);
    }
    let updated = diesel::update(notifications::table.find(id))
        .set((
            notifications::is_read.eq(true),
            notifications::read_at.eq(Some(Utc::now().naive_utc())),
        ))
        .get_result(conn)?;
    Ok(updated)
}

pub fn record_email_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: EmailStatus,
    error: Option<&str>,
) -> NotificationResult<Notification> {
    conn.transaction::<_, NotificationError, _>(|conn| {
        let current: Notification = notifications::table
            .find(id)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(NotificationError::NotFound(id))?;

        if !current.email_status.can_transition_to(status) {
            return Err(NotificationError::InvalidEmailTransition {
                from: current.email_status,
                to: status,
            });
        }

        let sent_at = if status == EmailStatus::Sent {
            Some(Utc::now().naive_utc())
        } else {
            current.email_sent_at
        };

        let updated = diesel::update(notifications::table.find(id))
            .set((
                notifications::email_status.eq(status),
                notifications::email_sent_at.eq(sent_at),
                notifications::email_error.eq(error),
            ))
            .get_result(conn)?;
        Ok(updated)
    })
}

/// Open tracking: first open time is kept, every open is counted.
pub fn record_email_open(conn: &mut PgConnection, id: Uuid) -> NotificationResult<Notification> {
    let current = load(conn, id)?;
    let opened_at = current
        .email_opened_at
        .or_else(|| Some(Utc::now().naive_utc()));
    let updated = diesel::update(notifications::table.find(id))
        .set((
            notifications::email_opened_at.eq(opened_at),
            notifications::email_open_count.eq(notifications::email_open_count + 1),
        ))
        .get_result(conn)?;
    Ok(updated)
}

/// Unread, unexpired notifications for a user, newest first.
pub fn unread_for_user(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Vec<Notification>> {
    let now = Utc::now().naive_utc();
    notifications::table
        .filter(notifications::user_id.eq(user_id))
        .filter(notifications::is_read.eq(false))
        .filter(
            notifications::expires_at
                .is_null()
                .or(notifications::expires_at.gt(now)),
        )
        .order(notifications::created_at.desc())
        .load(conn)
}
