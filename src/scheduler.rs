//! Cron jobs
use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info};

use crate::constants::GENERATE_WALLPAPER_CRON;
use crate::pipeline::WallpaperGenerationPipeline;

/// Body of the generation job. Failures are logged and swallowed so the
/// scheduler keeps firing.
pub async fn run_generate_wallpaper(pipeline: &WallpaperGenerationPipeline) {
    info!("Running wallpaper generation job");
    match pipeline.run_scheduled().await {
        Ok(Some(wallpaper)) => info!(id = wallpaper.id, "wallpaper generation job finished"),
        Ok(None) => {}
        Err(err) => error!("Wallpaper generation job error: {}", err),
    }
}

/// Wallpaper generation, every 30 minutes on the half hour
pub fn generate_wallpaper_job(
    pipeline: Arc<WallpaperGenerationPipeline>,
) -> Result<Job, JobSchedulerError> {
    Job::new_async(GENERATE_WALLPAPER_CRON, move |_uuid, _l| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            run_generate_wallpaper(&pipeline).await;
        })
    })
}

/// Initialize and start the job scheduler.
///
/// The job is always registered; the feature flags are checked each time it
/// fires.
pub async fn start_scheduler(
    pipeline: Arc<WallpaperGenerationPipeline>,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    scheduler.add(generate_wallpaper_job(pipeline)?).await?;
    scheduler.start().await?;

    info!(cron = GENERATE_WALLPAPER_CRON, "Job scheduler started");
    Ok(scheduler)
}
