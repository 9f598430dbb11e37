use std::time::Duration;

use core_smap::{GenerationBudget, PassOutcome, QueueWorker, Settings, Stores};

use crate::errors::Error;

/// Saves settings built from SMAP_* env vars when none were saved before.
/// Returns the settings now in effect.
pub async fn seed_settings(stores: &Stores) -> Result<Settings, Error> {
    if let Some(settings) = stores.settings.load().await? {
        return Ok(settings);
    }
    let settings = Settings::from_env()?;
    stores.settings.save(&settings).await?;
    tracing::info!("Saved initial sitemap settings from the environment");
    Ok(settings)
}

/// One generation pass under the generation lock.
pub async fn generate(worker: &mut QueueWorker, budget: GenerationBudget) -> Result<PassOutcome, Error> {
    let lock = worker.stores().lock.clone();
    if !lock.try_lock().await? {
        return Err(Error::Busy);
    }
    let outcome = worker.resume_or_start(budget).await;
    lock.unlock().await?;
    Ok(outcome?)
}

/// Rebuilds the task queue under the generation lock. Returns the number of queued tasks.
pub async fn rebuild_queue(worker: &mut QueueWorker) -> Result<usize, Error> {
    let lock = worker.stores().lock.clone();
    if !lock.try_lock().await? {
        return Err(Error::Busy);
    }
    let queued = worker.rebuild_queue().await;
    lock.unlock().await?;
    Ok(queued?)
}

/// Runs budgeted passes until ctrl-c. A suspended pass continues right away, anything else
/// waits `poll_interval` first.
pub async fn poll_loop(worker: &mut QueueWorker, poll_interval: Duration) {
    loop {
        let wait = match generate(worker, GenerationBudget::Limited).await {
            Ok(PassOutcome::Suspended(progress)) => {
                tracing::debug!("Pass suspended at {}, continuing", progress);
                false
            }
            Ok(PassOutcome::Completed(progress)) => {
                tracing::info!("Sitemaps up to date ({})", progress);
                true
            }
            Err(Error::Busy) => {
                tracing::debug!("Generation lock is held elsewhere");
                true
            }
            Err(error) => {
                tracing::error!("[SKIP] Sitemap generation pass failed: {}", error);
                true
            }
        };

        if wait {
            tracing::debug!("Waiting to poll for next generation pass");
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = tokio::signal::ctrl_c() => break,
            }
        } else {
            tokio::task::yield_now().await;
        }
    }
    tracing::info!("Worker shutting down");
}
