#![forbid(unsafe_code)]

pub mod best_effort;
pub mod error;
pub mod host;
pub mod recorder;
pub mod statistics_service;
pub mod telemetry_services;

pub use telemetry_core::Clock;

pub use best_effort::BestEffort;
pub use error::{StatisticsError, TelemetryServicesError, WriteError};
pub use recorder::{Recorder, RecorderConfig, DEFAULT_SNAPSHOT_KEY};
pub use statistics_service::{EmptyEnrollmentPolicy, StatisticsConfig, StatisticsService};
pub use telemetry_services::TelemetryServices;
