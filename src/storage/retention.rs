use crate::config::RetentionConfig;
use crate::error::AppResult;
use crate::storage::{deals, sqlite::Db};
use std::time::Duration;
use tokio::time;

/// Background task that hard-deletes deals past the retention horizon. The
/// first tick fires immediately, so a long-stopped instance catches up on
/// startup.
pub async fn retention_loop(db: Db, cfg: RetentionConfig) {
    let mut interval = time::interval(Duration::from_secs(cfg.sweep_interval_secs));

    loop {
        interval.tick().await;

        match run_retention_once(&db, &cfg).await {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::info!(deleted, deal_days = cfg.deal_days, "cleaned up old deals");
                }
            }
            Err(e) => tracing::error!(error = %e, "retention sweep failed"),
        }
    }
}

/// Run a single retention pass. Returns the number of deals deleted.
pub async fn run_retention_once(db: &Db, cfg: &RetentionConfig) -> AppResult<usize> {
    // A horizon past i64 range saturates instead of wrapping negative
    let days = i64::try_from(cfg.deal_days).unwrap_or(i64::MAX);
    deals::cleanup_old_deals(db, days).await
}
