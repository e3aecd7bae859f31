use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};

use crate::error::Result;
use crate::services::NewsIngestor;

/// Starts a scheduler that runs one ingestion pass per tick of `schedule`
/// (six-field cron, UTC). The caller owns shutdown.
pub async fn start(ingestor: Arc<NewsIngestor>, schedule: &str) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let ingestor = Arc::clone(&ingestor);
        Box::pin(async move {
            let report = ingestor.run().await;
            if report.skipped {
                return;
            }
            tracing::info!(
                users = report.users,
                items_enriched = report.items_enriched,
                "Scheduled ingestion complete"
            );
        })
    })?;

    sched.add(job).await?;
    sched.start().await?;
    tracing::info!(schedule, "Ingestion scheduler started");
    Ok(sched)
}
