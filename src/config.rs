use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;
use crate::utils::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};

pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;
pub const DEFAULT_PART_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 5;
/// Smallest part size providers accept for every part but the last.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSettings {
    /// Files at or below this size go up in a single request.
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub server_side_encryption: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            part_size: DEFAULT_PART_SIZE,
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_BASE_DELAY,
            server_side_encryption: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub interval: Duration,
    /// Inclusive bounds, in whole minutes before the event start.
    pub two_hour_min_minutes: i64,
    pub two_hour_max_minutes: i64,
    pub final_nudge_days_after: i64,
    /// Offset of the business's local time from UTC.
    pub utc_offset: FixedOffset,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30 * 60),
            two_hour_min_minutes: 115,
            two_hour_max_minutes: 125,
            final_nudge_days_after: 7,
            utc_offset: Utc.fix(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub s3_bucket: String,
    pub presigned_url_expiry: Duration,
    pub upload: UploadSettings,
    pub scheduler: SchedulerSettings,
    pub email_service_url: Option<String>,
    pub email_service_token: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let database_url = vars.required("DATABASE_URL")?;
        let database_max_pool_size = vars.parse_or("DATABASE_MAX_POOL_SIZE", DEFAULT_MAX_POOL_SIZE)?;
        let aws_endpoint_url = vars.optional("AWS_ENDPOINT_URL");
        let aws_access_key_id = vars.optional("AWS_ACCESS_KEY_ID");
        let aws_secret_access_key = vars.optional("AWS_SECRET_ACCESS_KEY");
        let aws_region = vars
            .optional("AWS_REGION")
            .unwrap_or_else(|| "us-east-1".to_string());
        let s3_bucket = vars.required("S3_BUCKET")?;
        let presigned_url_expiry =
            Duration::from_secs(vars.parse_or("PRESIGNED_URL_EXPIRY_SECONDS", 3600u64)?);

        let defaults = UploadSettings::default();
        let upload = UploadSettings {
            multipart_threshold: vars
                .parse_or("UPLOAD_MULTIPART_THRESHOLD_BYTES", defaults.multipart_threshold)?,
            part_size: vars.parse_or("UPLOAD_PART_SIZE_BYTES", defaults.part_size)?,
            concurrency: vars.parse_or("UPLOAD_CONCURRENCY", defaults.concurrency)?,
            max_retries: vars.parse_or("UPLOAD_MAX_RETRIES", defaults.max_retries)?,
            retry_base_delay: Duration::from_millis(vars.parse_or(
                "UPLOAD_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )?),
            server_side_encryption: vars
                .flag_or("UPLOAD_SERVER_SIDE_ENCRYPTION", defaults.server_side_encryption)?,
        };
        if upload.part_size < MIN_PART_SIZE {
            bail!("UPLOAD_PART_SIZE_BYTES must be at least {MIN_PART_SIZE}");
        }
        if upload.concurrency == 0 {
            bail!("UPLOAD_CONCURRENCY must be at least 1");
        }

        let defaults = SchedulerSettings::default();
        let interval_minutes: u64 = vars.parse_or("SCHEDULED_EMAILS_INTERVAL_MINUTES", 30)?;
        if interval_minutes == 0 {
            bail!("SCHEDULED_EMAILS_INTERVAL_MINUTES must be at least 1");
        }
        let offset_minutes: i32 = vars.parse_or("SCHEDULER_UTC_OFFSET_MINUTES", 0)?;
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60)
            .ok_or_else(|| anyhow!("SCHEDULER_UTC_OFFSET_MINUTES is out of range"))?;
        let scheduler = SchedulerSettings {
            enabled: vars.flag_or("SCHEDULED_EMAILS_ENABLED", defaults.enabled)?,
            interval: Duration::from_secs(interval_minutes * 60),
            two_hour_min_minutes: vars
                .parse_or("TWO_HOUR_REMINDER_MIN_MINUTES", defaults.two_hour_min_minutes)?,
            two_hour_max_minutes: vars
                .parse_or("TWO_HOUR_REMINDER_MAX_MINUTES", defaults.two_hour_max_minutes)?,
            final_nudge_days_after: vars
                .parse_or("FINAL_NUDGE_DAYS_AFTER", defaults.final_nudge_days_after)?,
            utc_offset,
        };
        if scheduler.two_hour_min_minutes > scheduler.two_hour_max_minutes {
            bail!("TWO_HOUR_REMINDER_MIN_MINUTES must not exceed TWO_HOUR_REMINDER_MAX_MINUTES");
        }

        Ok(Self {
            database_url,
            database_max_pool_size,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            s3_bucket,
            presigned_url_expiry,
            upload,
            scheduler,
            email_service_url: vars.optional("EMAIL_SERVICE_URL"),
            email_service_token: vars.optional("EMAIL_SERVICE_TOKEN"),
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.optional(name)
            .with_context(|| format!("{name} must be set"))
    }

    fn parse_or<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|err| anyhow!("{name} is invalid: {err}")),
            None => Ok(default),
        }
    }

    fn flag_or(&self, name: &str, default: bool) -> Result<bool> {
        match self.optional(name) {
            Some(raw) => parse_flag(&raw).with_context(|| format!("{name} must be true or false")),
            None => Ok(default),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
