//! Interval-polled reminder emails.
//!
//! Each [`ReminderKind`] runs as an independent job. A job that is still busy
//! when its next tick arrives is skipped for that tick. A sentinel is written
//! to the activity ledger only after the email service confirms a send, so a
//! failed send is retried on the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::audit::Sentinel;
use crate::config::SchedulerSettings;

pub mod collaborators;
pub mod jobs;
pub mod recipients;

pub use collaborators::{
    ActivityLedger, BookingContext, BookingSource, CrewMember, EmailOutcome, EmailPayload,
    EmailSender, HttpEmailSender, PgActivityLedger, PgBookingSource,
};
pub use jobs::{PlannedReminder, ReminderKind, SkipReason};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("background task failed: {0}")]
    Task(String),
    #[error("email send failed: {0}")]
    Email(String),
    #[error("job {0} is already running")]
    JobBusy(ReminderKind),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub candidates: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum BookingOutcome {
    Sent,
    Skipped(SkipReason),
}

/// Running flag for one job.
pub struct JobSlot {
    kind: ReminderKind,
    running: AtomicBool,
}

impl JobSlot {
    fn new(kind: ReminderKind) -> Self {
        Self {
            kind,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SlotGuard { slot: self.clone() })
    }
}

struct SlotGuard {
    slot: Arc<JobSlot>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slot.running.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler {
    settings: SchedulerSettings,
    bookings: Arc<dyn BookingSource>,
    ledger: Arc<dyn ActivityLedger>,
    email: Arc<dyn EmailSender>,
    slots: Vec<Arc<JobSlot>>,
}

impl Scheduler {
    pub fn new(
        settings: SchedulerSettings,
        bookings: Arc<dyn BookingSource>,
        ledger: Arc<dyn ActivityLedger>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        let slots = ReminderKind::ALL
            .iter()
            .map(|kind| Arc::new(JobSlot::new(*kind)))
            .collect();
        Self {
            settings,
            bookings,
            ledger,
            email,
            slots,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn is_running(&self, kind: ReminderKind) -> bool {
        self.slot(kind).is_some_and(|slot| slot.is_running())
    }

    fn slot(&self, kind: ReminderKind) -> Option<&Arc<JobSlot>> {
        self.slots.iter().find(|slot| slot.kind == kind)
    }

    /// Polls until the future is dropped. Returns at once when disabled.
    pub async fn run(self: Arc<Self>) {
        if !self.settings.enabled {
            info!("scheduled emails disabled; scheduler not started");
            return;
        }

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.settings.interval.as_secs(),
            jobs = self.slots.len(),
            "scheduler started"
        );

        loop {
            ticker.tick().await;
            self.tick(Utc::now());
        }
    }

    /// Spawns every idle job for `now`. Busy jobs are skipped.
    pub fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> Vec<(ReminderKind, JoinHandle<()>)> {
        let mut spawned = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let kind = slot.kind;
            let Some(guard) = slot.try_acquire() else {
                info!(job = %kind, "previous run still in progress; skipping tick");
                continue;
            };
            let scheduler = self.clone();
            let handle = tokio::spawn(async move {
                let _guard = guard;
                match scheduler.execute(kind, now).await {
                    Ok(report) => info!(
                        job = %kind,
                        candidates = report.candidates,
                        sent = report.sent,
                        skipped = report.skipped,
                        failed = report.failed,
                        "scheduled job finished"
                    ),
                    Err(err) => error!(job = %kind, error = %err, "scheduled job failed; retrying next tick"),
                }
            });
            spawned.push((kind, handle));
        }
        spawned
    }

    /// Runs one job to completion unless it is already running.
    pub async fn run_job_once(&self, kind: ReminderKind, now: DateTime<Utc>) -> SchedulerResult<TickReport> {
        let _guard = self
            .slot(kind)
            .and_then(|slot| slot.try_acquire())
            .ok_or(SchedulerError::JobBusy(kind))?;
        self.execute(kind, now).await
    }

    async fn execute(&self, kind: ReminderKind, now: DateTime<Utc>) -> SchedulerResult<TickReport> {
        let today = now.with_timezone(&self.settings.utc_offset).date_naive();
        let target = kind.target_date(today, &self.settings);
        let contexts = self.bookings.bookings_on(target).await?;
        debug!(job = %kind, target = %target, bookings = contexts.len(), "scheduled job candidates loaded");

        let mut report = TickReport::default();
        for context in &contexts {
            report.candidates += 1;
            let booking_id = context.booking.id;
            match self.process_booking(kind, context, now).await {
                Ok(BookingOutcome::Sent) => report.sent += 1,
                Ok(BookingOutcome::Skipped(reason)) => {
                    report.skipped += 1;
                    if reason == SkipReason::NoRecipient {
                        warn!(job = %kind, booking_id = %booking_id, "no recipient email; skipping booking");
                    } else {
                        debug!(job = %kind, booking_id = %booking_id, reason = %reason, "booking skipped");
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(job = %kind, booking_id = %booking_id, error = %err, "scheduled email failed");
                }
            }
        }
        Ok(report)
    }

    async fn process_booking(
        &self,
        kind: ReminderKind,
        context: &BookingContext,
        now: DateTime<Utc>,
    ) -> SchedulerResult<BookingOutcome> {
        let planned = match jobs::plan(kind, context, now, &self.settings) {
            Ok(planned) => planned,
            Err(reason) => return Ok(BookingOutcome::Skipped(reason)),
        };

        if self
            .ledger
            .has_sentinel(planned.lead_id, kind.marker(), &planned.idempotence_key)
            .await?
        {
            return Ok(BookingOutcome::Skipped(SkipReason::AlreadySent));
        }

        let outcome = self.email.send(&planned.payload).await;
        if !outcome.success {
            return Err(SchedulerError::Email(
                outcome
                    .error
                    .unwrap_or_else(|| "email service reported failure".to_string()),
            ));
        }

        let sentinel = Sentinel {
            lead_id: planned.lead_id,
            booking_id: Some(context.booking.id),
            marker: kind.marker().to_string(),
            idempotence_key: planned.idempotence_key.clone(),
            details: json!({
                "template": kind.template(),
                "recipient": planned.payload.to,
                "sent_at": now.to_rfc3339(),
            }),
        };
        if !self.ledger.record_sentinel(sentinel).await? {
            warn!(
                job = %kind,
                lead_id = %planned.lead_id,
                key = %planned.idempotence_key,
                "sentinel already present after send"
            );
        }
        info!(
            job = %kind,
            booking_id = %context.booking.id,
            key = %planned.idempotence_key,
            "scheduled email sent"
        );
        Ok(BookingOutcome::Sent)
    }
}
