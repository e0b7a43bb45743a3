pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod notifications;
pub mod registry;
pub mod s3;
pub mod scheduler;
pub mod schema;
pub mod state;
pub mod storage;
pub mod types;
pub mod upload;
pub mod utils;
pub mod workflow;

pub use scheduler::{ReminderKind, Scheduler, TickReport};
pub use upload::{UploadOptions, UploadResult, Uploader};
pub use workflow::{transition, TransitionOutcome, TransitionRequest};
