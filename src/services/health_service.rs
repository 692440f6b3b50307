use crate::adapters::database::DbPool;
use crate::config::HealthConfig;
use crate::services::broadcast::Broadcaster;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct Metrics {
    pub status: Gauge<i64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            status: meter
                .i64_gauge("parley_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    pool: DbPool,
    broadcaster: Arc<dyn Broadcaster>,
    config: HealthConfig,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(pool: DbPool, broadcaster: Arc<dyn Broadcaster>, config: HealthConfig) -> Self {
        Self { pool, broadcaster, config, metrics: Metrics::new() }
    }

    /// Checks database connectivity.
    ///
    /// # Errors
    /// Returns a string describing the failure if the database is unreachable.
    pub async fn check_db(&self) -> Result<(), String> {
        let outcome = timeout(self.timeout(), sqlx::query("SELECT 1").execute(&self.pool)).await;
        self.report("database", outcome.map(|r| r.map(|_| ()).map_err(|e| format!("Database connection failed: {e:?}"))))
    }

    /// Checks the broadcaster transport. Always healthy when running in-process.
    ///
    /// # Errors
    /// Returns a string describing the failure if the transport is unreachable.
    pub async fn check_broadcaster(&self) -> Result<(), String> {
        let outcome = timeout(self.timeout(), self.broadcaster.ping()).await;
        self.report("broadcaster", outcome.map(|r| r.map_err(|e| format!("Broadcaster check failed: {e:?}"))))
    }

    const fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    fn report(
        &self,
        component: &'static str,
        outcome: Result<Result<(), String>, tokio::time::error::Elapsed>,
    ) -> Result<(), String> {
        let result = outcome.unwrap_or_else(|_| Err(format!("{component} check timed out")));
        let status = i64::from(result.is_ok());
        self.metrics.status.record(status, &[KeyValue::new("component", component)]);
        result
    }
}
