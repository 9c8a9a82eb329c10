use std::sync::Arc;

use storage::repository::{LocalStore, Storage};

use crate::error::TelemetryServicesError;
use crate::host::BrowserHost;
use crate::recorder::{Recorder, RecorderConfig};
use crate::statistics_service::{StatisticsConfig, StatisticsService};
use crate::Clock;

/// Assembles the recorder and the statistics aggregator over one storage bundle.
///
/// Build it once at startup and hand out clones; there is no process-wide instance.
#[derive(Clone)]
pub struct TelemetryServices {
    recorder: Recorder,
    statistics: Arc<StatisticsService>,
}

impl TelemetryServices {
    #[must_use]
    pub fn new(
        storage: &Storage,
        local: Arc<dyn LocalStore>,
        host: Arc<dyn BrowserHost>,
        clock: Clock,
        recorder_config: RecorderConfig,
        statistics_config: StatisticsConfig,
    ) -> Self {
        let recorder = Recorder::new(recorder_config, clock, host, storage, local);
        let statistics = Arc::new(StatisticsService::new(
            clock,
            statistics_config,
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.profiles),
        ));
        Self {
            recorder,
            statistics,
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryServicesError` if the database cannot be opened.
    pub async fn new_sqlite(
        db_url: &str,
        local: Arc<dyn LocalStore>,
        host: Arc<dyn BrowserHost>,
        clock: Clock,
    ) -> Result<Self, TelemetryServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(
            &storage,
            local,
            host,
            clock,
            RecorderConfig::default(),
            StatisticsConfig::default(),
        ))
    }

    #[must_use]
    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }

    #[must_use]
    pub fn statistics(&self) -> Arc<StatisticsService> {
        Arc::clone(&self.statistics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SimulatedHost;
    use storage::repository::InMemoryRepository;
    use telemetry_core::model::UserId;
    use telemetry_core::statistics::StatisticsSource;
    use telemetry_core::time::fixed_clock;

    #[tokio::test]
    async fn services_share_one_backend() {
        let repo = InMemoryRepository::new();
        let user = UserId::new("u-7").unwrap();
        repo.insert_profile(user.clone());

        let services = TelemetryServices::new(
            &Storage::from_backend(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(SimulatedHost::new("/dashboard")),
            fixed_clock(),
            RecorderConfig::default(),
            StatisticsConfig::default(),
        );

        services.recorder().start().settle().await.unwrap();
        let stats = services
            .statistics()
            .calculate_user_statistics(&user)
            .await
            .unwrap();

        assert_eq!(services.recorder().session_id(), services.recorder().session_id());
        assert_eq!(repo.session_count(), 1);
        assert_eq!(stats.source, StatisticsSource::SampleData);
        assert_eq!(repo.progress(&user), Some(stats));
    }
}
