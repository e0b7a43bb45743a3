use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::config::SchedulerSettings;
use crate::models::Booking;

use super::collaborators::{BookingContext, EmailPayload};
use super::recipients;

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderKind {
    PreShootFiveDay,
    PreShootTwoHour,
    ShootCompletion,
    FinalNudge,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 4] = [
        ReminderKind::PreShootFiveDay,
        ReminderKind::PreShootTwoHour,
        ReminderKind::ShootCompletion,
        ReminderKind::FinalNudge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReminderKind::PreShootFiveDay => "pre-shoot-5-day",
            ReminderKind::PreShootTwoHour => "pre-shoot-2-hour",
            ReminderKind::ShootCompletion => "shoot-completion",
            ReminderKind::FinalNudge => "final-nudge",
        }
    }

    /// Ledger marker identifying sentinels written by this job.
    pub fn marker(&self) -> &'static str {
        match self {
            ReminderKind::PreShootFiveDay => "pre_shoot_reminder_5_day_sent",
            ReminderKind::PreShootTwoHour => "pre_shoot_reminder_2_hour_sent",
            ReminderKind::ShootCompletion => "shoot_completion_email_sent",
            ReminderKind::FinalNudge => "final_nudge_email_sent",
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            ReminderKind::PreShootFiveDay => "pre-shoot-reminder-5-day",
            ReminderKind::PreShootTwoHour => "pre-shoot-reminder-2-hour",
            ReminderKind::ShootCompletion => "shoot-completion",
            ReminderKind::FinalNudge => "final-nudge",
        }
    }

    /// Event date this job looks at when the business-local date is `today`.
    pub fn target_date(&self, today: NaiveDate, settings: &SchedulerSettings) -> NaiveDate {
        match self {
            ReminderKind::PreShootFiveDay => today + Duration::days(5),
            ReminderKind::PreShootTwoHour => today,
            ReminderKind::ShootCompletion => today - Duration::days(1),
            ReminderKind::FinalNudge => today - Duration::days(settings.final_nudge_days_after),
        }
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotNotifiable,
    NoLead,
    NoRecipient,
    NoStartTime,
    OutsideWindow { minutes_until_start: i64 },
    AlreadySent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotNotifiable => f.write_str("booking is not active and paid"),
            SkipReason::NoLead => f.write_str("booking has no lead to key the ledger on"),
            SkipReason::NoRecipient => f.write_str("no recipient email could be resolved"),
            SkipReason::NoStartTime => f.write_str("booking has no start time"),
            SkipReason::OutsideWindow { minutes_until_start } => {
                write!(f, "{minutes_until_start} minutes until start is outside the send window")
            }
            SkipReason::AlreadySent => f.write_str("already sent"),
        }
    }
}

/// A reminder that is due, addressed, and keyed for the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedReminder {
    pub kind: ReminderKind,
    pub lead_id: Uuid,
    pub idempotence_key: String,
    pub payload: EmailPayload,
}

pub fn event_start(booking: &Booking, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let start_time = booking.start_time?;
    offset
        .from_local_datetime(&booking.event_date.and_time(start_time))
        .single()
}

/// Whole minutes until `start`, rounded down.
pub fn minutes_until(start: DateTime<FixedOffset>, now: DateTime<Utc>) -> i64 {
    (start.with_timezone(&Utc) - now).num_seconds().div_euclid(60)
}

pub fn plan(
    kind: ReminderKind,
    context: &BookingContext,
    now: DateTime<Utc>,
    settings: &SchedulerSettings,
) -> Result<PlannedReminder, SkipReason> {
    let booking = &context.booking;
    if !booking.is_notifiable() {
        return Err(SkipReason::NotNotifiable);
    }
    let lead_id = booking.lead_id.ok_or(SkipReason::NoLead)?;

    let start = event_start(booking, settings.utc_offset);
    let idempotence_key = match kind {
        ReminderKind::PreShootTwoHour => {
            let start = start.ok_or(SkipReason::NoStartTime)?;
            let minutes_until_start = minutes_until(start, now);
            if minutes_until_start < settings.two_hour_min_minutes
                || minutes_until_start > settings.two_hour_max_minutes
            {
                return Err(SkipReason::OutsideWindow { minutes_until_start });
            }
            start.to_rfc3339()
        }
        _ => booking.event_date.format(DATE_KEY_FORMAT).to_string(),
    };

    let to = recipients::recipient_email(context).ok_or(SkipReason::NoRecipient)?;
    let first_name = recipients::first_name(context, Some(&to));

    let mut fields = Map::new();
    fields.insert(
        "event_date".into(),
        Value::String(booking.event_date.format(DATE_KEY_FORMAT).to_string()),
    );
    if matches!(kind, ReminderKind::PreShootFiveDay | ReminderKind::PreShootTwoHour) {
        if let Some(start) = start {
            fields.insert("start_time".into(), json!(start.format("%H:%M").to_string()));
            fields.insert("starts_at".into(), json!(start.to_rfc3339()));
        }
        if let Some(location) = &booking.location {
            fields.insert("location".into(), json!(location));
        }
    }
    fields.insert(
        "creative_partner".into(),
        json!(recipients::creative_partner(&context.crew)),
    );

    Ok(PlannedReminder {
        kind,
        lead_id,
        idempotence_key,
        payload: EmailPayload {
            template: kind.template(),
            to,
            booking_id: booking.id,
            first_name,
            fields,
        },
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDateTime, NaiveTime};

    use super::*;
    use crate::models::Lead;
    use crate::types::{BookingStatus, PaymentStatus};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn stamp() -> NaiveDateTime {
        date(1).and_hms_opt(0, 0, 0).unwrap()
    }

    fn context(event_date: NaiveDate, start: Option<(u32, u32)>) -> BookingContext {
        let lead_id = Uuid::new_v4();
        BookingContext {
            booking: Booking {
                id: Uuid::new_v4(),
                lead_id: Some(lead_id),
                user_id: None,
                guest_email: Some("guest@example.com".into()),
                event_date,
                start_time: start.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0)),
                location: Some("Studio 4".into()),
                status: BookingStatus::Confirmed,
                is_active: true,
                is_draft: false,
                payment_status: PaymentStatus::Paid,
                created_at: stamp(),
                updated_at: stamp(),
            },
            user: None,
            lead: Some(Lead {
                id: lead_id,
                client_name: None,
                guest_email: None,
                created_at: stamp(),
                updated_at: stamp(),
            }),
            crew: Vec::new(),
        }
    }

    fn utc(day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date(day).and_hms_opt(hour, minute, second).unwrap())
    }

    #[test]
    fn targets_are_relative_to_today() {
        let settings = SchedulerSettings::default();
        let today = date(10);
        assert_eq!(ReminderKind::PreShootFiveDay.target_date(today, &settings), date(15));
        assert_eq!(ReminderKind::PreShootTwoHour.target_date(today, &settings), today);
        assert_eq!(ReminderKind::ShootCompletion.target_date(today, &settings), date(9));
        assert_eq!(ReminderKind::FinalNudge.target_date(today, &settings), date(3));
    }

    #[test]
    fn minutes_round_down() {
        let start = utc(10, 14, 0, 0).fixed_offset();
        assert_eq!(minutes_until(start, utc(10, 12, 0, 0)), 120);
        assert_eq!(minutes_until(start, utc(10, 12, 0, 30)), 119);
        assert_eq!(minutes_until(start, utc(10, 14, 0, 30)), -1);
    }

    #[test]
    fn two_hour_window_is_inclusive() {
        let settings = SchedulerSettings::default();
        let ctx = context(date(10), Some((14, 0)));
        let cases = [(114, false), (115, true), (120, true), (125, true), (126, false)];
        for (minutes, due) in cases {
            let now = utc(10, 14, 0, 0) - Duration::minutes(minutes);
            let result = plan(ReminderKind::PreShootTwoHour, &ctx, now, &settings);
            assert_eq!(result.is_ok(), due, "{minutes} minutes before start");
        }
    }

    #[test]
    fn two_hour_key_is_the_exact_start() {
        let settings = SchedulerSettings::default();
        let ctx = context(date(10), Some((14, 0)));
        let planned = plan(
            ReminderKind::PreShootTwoHour,
            &ctx,
            utc(10, 12, 0, 0),
            &settings,
        )
        .unwrap();
        assert_eq!(planned.idempotence_key, "2024-06-10T14:00:00+00:00");
        assert_eq!(planned.payload.fields["start_time"], "14:00");
    }

    #[test]
    fn local_offset_shifts_the_start() {
        let settings = SchedulerSettings {
            utc_offset: FixedOffset::west_opt(4 * 3600).unwrap(),
            ..SchedulerSettings::default()
        };
        let ctx = context(date(10), Some((14, 0)));
        // 14:00 at UTC-4 is 18:00 UTC.
        assert!(plan(ReminderKind::PreShootTwoHour, &ctx, utc(10, 16, 0, 0), &settings).is_ok());
        assert!(plan(ReminderKind::PreShootTwoHour, &ctx, utc(10, 12, 0, 0), &settings).is_err());
    }

    #[test]
    fn date_jobs_key_on_event_date() {
        let settings = SchedulerSettings::default();
        let ctx = context(date(9), None);
        let planned = plan(ReminderKind::ShootCompletion, &ctx, utc(10, 9, 0, 0), &settings).unwrap();
        assert_eq!(planned.idempotence_key, "2024-06-09");
        assert_eq!(planned.payload.template, "shoot-completion");
        assert_eq!(planned.payload.first_name, "Guest");
        assert_eq!(planned.payload.fields["creative_partner"], recipients::FALLBACK_CREATIVE_PARTNER);
    }

    #[test]
    fn unpaid_or_unkeyed_bookings_are_skipped() {
        let settings = SchedulerSettings::default();
        let now = utc(10, 9, 0, 0);

        let mut unpaid = context(date(15), None);
        unpaid.booking.payment_status = PaymentStatus::PartiallyPaid;
        assert_eq!(
            plan(ReminderKind::PreShootFiveDay, &unpaid, now, &settings),
            Err(SkipReason::NotNotifiable)
        );

        let mut no_lead = context(date(15), None);
        no_lead.booking.lead_id = None;
        assert_eq!(
            plan(ReminderKind::PreShootFiveDay, &no_lead, now, &settings),
            Err(SkipReason::NoLead)
        );

        let mut no_email = context(date(15), None);
        no_email.booking.guest_email = None;
        assert_eq!(
            plan(ReminderKind::PreShootFiveDay, &no_email, now, &settings),
            Err(SkipReason::NoRecipient)
        );
    }
}
