mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use common::{MemoryBookings, MemoryLedger, RecordingEmail};
use postflow::config::SchedulerSettings;
use postflow::models::{Booking, CrewAssignment, Lead};
use postflow::scheduler::{BookingContext, CrewMember, SchedulerError};
use postflow::types::{BookingStatus, PaymentStatus};
use postflow::{ReminderKind, Scheduler, TickReport};
use uuid::Uuid;

struct Harness {
    scheduler: Arc<Scheduler>,
    bookings: Arc<MemoryBookings>,
    ledger: Arc<MemoryLedger>,
    email: Arc<RecordingEmail>,
}

fn harness(settings: SchedulerSettings) -> Harness {
    let bookings = Arc::new(MemoryBookings::default());
    let ledger = Arc::new(MemoryLedger::default());
    let email = Arc::new(RecordingEmail::default());
    let scheduler = Arc::new(Scheduler::new(
        settings,
        bookings.clone(),
        ledger.clone(),
        email.clone(),
    ));
    Harness {
        scheduler,
        bookings,
        ledger,
        email,
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn stamp() -> NaiveDateTime {
    day(1).and_hms_opt(0, 0, 0).unwrap()
}

fn at(d: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day(d).and_hms_opt(hour, minute, 0).unwrap())
}

fn booking(event_date: NaiveDate, start: Option<(u32, u32)>, guest_email: Option<&str>) -> BookingContext {
    let lead_id = Uuid::new_v4();
    BookingContext {
        booking: Booking {
            id: Uuid::new_v4(),
            lead_id: Some(lead_id),
            user_id: None,
            guest_email: guest_email.map(str::to_string),
            event_date,
            start_time: start.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0)),
            location: Some("Harbor Loft".into()),
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

fn sent(count: usize, candidates: usize) -> TickReport {
    TickReport {
        candidates,
        sent: count,
        skipped: candidates - count,
        failed: 0,
    }
}

#[tokio::test]
async fn two_hour_reminder_only_fires_inside_the_window() {
    let h = harness(SchedulerSettings::default());
    h.bookings
        .add(booking(day(10), Some((14, 0)), Some("pat@example.com")))
        .await;
    let start = at(10, 14, 0);

    for minutes in [126, 114] {
        let report = h
            .scheduler
            .run_job_once(ReminderKind::PreShootTwoHour, start - chrono::Duration::minutes(minutes))
            .await
            .unwrap();
        assert_eq!(report, sent(0, 1), "{minutes} minutes before start");
    }
    assert!(h.email.sent().await.is_empty());

    let report = h
        .scheduler
        .run_job_once(ReminderKind::PreShootTwoHour, start - chrono::Duration::minutes(120))
        .await
        .unwrap();
    assert_eq!(report, sent(1, 1));

    let report = h
        .scheduler
        .run_job_once(ReminderKind::PreShootTwoHour, start - chrono::Duration::minutes(117))
        .await
        .unwrap();
    assert_eq!(report, sent(0, 1));

    let emails = h.email.sent().await;
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].template, "pre-shoot-reminder-2-hour");
    assert_eq!(emails[0].fields["start_time"], "14:00");

    let ledger = h.ledger.entries().await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].marker, ReminderKind::PreShootTwoHour.marker());
    assert_eq!(ledger[0].idempotence_key, "2024-06-10T14:00:00+00:00");
}

#[tokio::test]
async fn five_day_reminder_is_sent_once_per_event_date() {
    let h = harness(SchedulerSettings::default());
    h.bookings
        .add(booking(day(15), Some((9, 30)), Some("pat@example.com")))
        .await;

    let first = h
        .scheduler
        .run_job_once(ReminderKind::PreShootFiveDay, at(10, 8, 0))
        .await
        .unwrap();
    let second = h
        .scheduler
        .run_job_once(ReminderKind::PreShootFiveDay, at(10, 17, 0))
        .await
        .unwrap();

    assert_eq!(first, sent(1, 1));
    assert_eq!(second, sent(0, 1));
    assert_eq!(h.ledger.entries().await[0].idempotence_key, "2024-06-15");
}

#[tokio::test]
async fn failed_send_leaves_no_sentinel_and_retries_next_run() {
    let h = harness(SchedulerSettings::default());
    h.bookings
        .add(booking(day(9), None, Some("pat@example.com")))
        .await;
    h.email.fail_for("pat@example.com").await;

    let report = h
        .scheduler
        .run_job_once(ReminderKind::ShootCompletion, at(10, 10, 0))
        .await
        .unwrap();
    assert_eq!(report.failed, 1);
    assert!(h.ledger.entries().await.is_empty());

    h.email.recover_for("pat@example.com").await;
    let report = h
        .scheduler
        .run_job_once(ReminderKind::ShootCompletion, at(10, 10, 30))
        .await
        .unwrap();
    assert_eq!(report, sent(1, 1));
    assert_eq!(h.ledger.entries().await.len(), 1);
}

#[tokio::test]
async fn one_failing_booking_does_not_stop_the_rest() {
    let h = harness(SchedulerSettings::default());
    h.bookings.add(booking(day(3), None, Some("bad@example.com"))).await;
    h.bookings.add(booking(day(3), None, Some("good@example.com"))).await;
    h.bookings.add(booking(day(3), None, None)).await;
    h.email.fail_for("bad@example.com").await;

    let report = h
        .scheduler
        .run_job_once(ReminderKind::FinalNudge, at(10, 12, 0))
        .await
        .unwrap();

    assert_eq!(
        report,
        TickReport {
            candidates: 3,
            sent: 1,
            skipped: 1,
            failed: 1,
        }
    );
    let emails = h.email.sent().await;
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "good@example.com");
}

#[tokio::test]
async fn job_level_failure_is_reported() {
    let h = harness(SchedulerSettings::default());
    h.bookings.fail_on(day(9)).await;

    let err = h
        .scheduler
        .run_job_once(ReminderKind::ShootCompletion, at(10, 12, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Pool(_)));
    assert!(!h.scheduler.is_running(ReminderKind::ShootCompletion));
}

#[tokio::test]
async fn overlapping_run_is_skipped() {
    let h = harness(SchedulerSettings::default());
    h.bookings
        .add(booking(day(9), None, Some("pat@example.com")))
        .await;
    h.email.stall(Duration::from_millis(200)).await;

    let scheduler = h.scheduler.clone();
    let first = tokio::spawn(async move {
        scheduler
            .run_job_once(ReminderKind::ShootCompletion, at(10, 10, 0))
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.scheduler.is_running(ReminderKind::ShootCompletion));

    let busy = h
        .scheduler
        .run_job_once(ReminderKind::ShootCompletion, at(10, 10, 0))
        .await;
    assert!(matches!(busy, Err(SchedulerError::JobBusy(ReminderKind::ShootCompletion))));

    let spawned = h.scheduler.tick(at(10, 10, 0));
    assert!(spawned
        .iter()
        .all(|(kind, _)| *kind != ReminderKind::ShootCompletion));
    assert_eq!(spawned.len(), ReminderKind::ALL.len() - 1);
    for (_, handle) in spawned {
        handle.await.unwrap();
    }

    assert_eq!(first.await.unwrap().unwrap(), sent(1, 1));
    assert!(!h.scheduler.is_running(ReminderKind::ShootCompletion));
    assert_eq!(h.email.sent().await.len(), 1);
}

#[tokio::test]
async fn lead_guest_email_is_used_with_derived_first_name() {
    let h = harness(SchedulerSettings::default());
    let mut context = booking(day(9), None, None);
    if let Some(lead) = context.lead.as_mut() {
        lead.guest_email = Some("a.b-c@x.com".into());
    }
    context.crew.push(CrewMember {
        assignment: CrewAssignment {
            id: Uuid::new_v4(),
            booking_id: context.booking.id,
            crew_member_id: Uuid::new_v4(),
            status: "Confirmed".into(),
            is_accepted: false,
            is_active: true,
            created_at: stamp(),
            updated_at: stamp(),
        },
        display_name: Some("Rowan Ellis".into()),
    });
    h.bookings.add(context).await;

    h.scheduler
        .run_job_once(ReminderKind::ShootCompletion, at(10, 9, 0))
        .await
        .unwrap();

    let emails = h.email.sent().await;
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "a.b-c@x.com");
    assert_eq!(emails[0].first_name, "A");
    assert_eq!(emails[0].fields["creative_partner"], "Rowan Ellis");
}

#[tokio::test]
async fn disabled_scheduler_returns_immediately() {
    let h = harness(SchedulerSettings {
        enabled: false,
        ..SchedulerSettings::default()
    });

    let finished = tokio::time::timeout(Duration::from_secs(1), h.scheduler.clone().run()).await;
    assert!(finished.is_ok());
    assert!(h.email.sent().await.is_empty());
}
