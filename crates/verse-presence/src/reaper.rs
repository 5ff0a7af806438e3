use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::store::PresenceStore;

/// Timing for the stale-record sweep.
#[derive(Clone, Debug)]
pub struct ReaperConfig {
    /// How often the sweep runs.
    pub tick: Duration,
    /// Age past which a record is evicted.
    pub stale_after: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            stale_after: Duration::from_secs(10),
        }
    }
}

/// Start the periodic sweep that evicts player states whose last update
/// is older than `stale_after`. Each tick is idempotent and safe to run
/// concurrently with upserts; the store re-checks staleness at delete
/// time, so a user mid-refresh is never lost by a stale scan.
pub fn start_reaper(
    store: Arc<PresenceStore>,
    config: ReaperConfig,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.tick);
        ticker.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let cutoff = Utc::now()
                        - chrono::Duration::milliseconds(config.stale_after.as_millis() as i64);
                    let removed = store.remove_stale(cutoff);
                    if removed > 0 {
                        tracing::info!(removed = removed, "reaper evicted stale players");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use verse_core::ids::UserId;
    use verse_core::player::Pose;

    #[tokio::test(start_paused = true)]
    async fn reaper_ticks_and_leaves_fresh_records() {
        let store = Arc::new(PresenceStore::new(16));
        let user = UserId::new();
        store.upsert(&user, Pose::default());

        let shutdown = CancellationToken::new();
        let handle = start_reaper(
            Arc::clone(&store),
            ReaperConfig {
                tick: Duration::from_millis(10),
                stale_after: Duration::from_secs(10),
            },
            shutdown.clone(),
        );

        // Several ticks pass; the record is fresh in wall-clock terms
        // (paused tokio time does not advance Utc), so it survives.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.len(), 1);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_evicts_backdated_record_on_next_tick() {
        let store = Arc::new(PresenceStore::new(16));
        let user = UserId::new();
        store.upsert(&user, Pose::default());
        store.backdate(&user, chrono::Duration::seconds(30));

        let shutdown = CancellationToken::new();
        let handle = start_reaper(
            Arc::clone(&store),
            ReaperConfig {
                tick: Duration::from_millis(10),
                stale_after: Duration::from_secs(10),
            },
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn reaper_stops_on_shutdown() {
        let store = Arc::new(PresenceStore::new(16));
        let shutdown = CancellationToken::new();
        let handle = start_reaper(Arc::clone(&store), ReaperConfig::default(), shutdown.clone());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
