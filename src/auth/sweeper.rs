//! Cleanup Sweeper
//! Mission: Purge expired sessions on a fixed schedule, off the request path

use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::store::CredentialStore;

pub struct SessionSweeper {
    store: Arc<dyn CredentialStore>,
    period: Duration,
    run_timeout: Duration,
}

impl SessionSweeper {
    pub fn new(store: Arc<dyn CredentialStore>, period: Duration, run_timeout: Duration) -> Self {
        Self {
            store,
            period,
            run_timeout,
        }
    }

    /// One bounded pass. Returns how many sessions were removed.
    pub async fn sweep_once(&self) -> Result<u64> {
        let purged = tokio::time::timeout(self.run_timeout, self.store.delete_expired_sessions())
            .await
            .context("session sweep timed out")?
            .context("failed to delete expired sessions")?;

        if purged > 0 {
            info!("🧹 Swept {} expired sessions", purged);
        } else {
            debug!("session sweep found nothing to purge");
        }
        Ok(purged)
    }

    /// Start the periodic loop. The first pass runs one period after start.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(
                "🧹 Session sweeper started (every {:?}, timeout {:?})",
                self.period, self.run_timeout
            );
            let mut ticker = interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            warn!("⚠️  Session sweep failed (non-critical): {:#}", e);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Session sweeper stopped");
        });

        SweeperHandle { shutdown_tx, task }
    }
}

/// Owner of a running sweeper loop.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the loop and wait for any in-flight sweep to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Session sweeper task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{Client, Session, User};
    use crate::store::InMemoryCredentialStore;
    use chrono::Utc;

    async fn seeded(expired: usize, live: usize) -> Arc<InMemoryCredentialStore> {
        let store = Arc::new(InMemoryCredentialStore::new());
        let now = Utc::now();
        store
            .create_client(&Client {
                client_id: "c1".to_string(),
                name: "app".to_string(),
                secret_hash: "hash".to_string(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        for i in 0..expired + live {
            let user_id = format!("u{i}");
            store
                .create_user(&User {
                    user_id: user_id.clone(),
                    username: user_id.clone(),
                    email: format!("{user_id}@x.com"),
                    password_hash: "hash".to_string(),
                    client_id: "c1".to_string(),
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();

            let ttl = if i < expired {
                chrono::Duration::seconds(-1)
            } else {
                chrono::Duration::days(1)
            };
            store
                .upsert_session(&Session {
                    user_id,
                    client_id: "c1".to_string(),
                    refresh_token: format!("r{i}"),
                    user_agent: String::new(),
                    expires_at: now + ttl,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_sweep_once_purges_only_expired() {
        let store = seeded(3, 2).await;
        let sweeper = SessionSweeper::new(
            store.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        );

        assert_eq!(sweeper.sweep_once().await.unwrap(), 3);
        assert_eq!(store.session_count(), 2);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_periodic_loop_runs_and_stops() {
        let store = seeded(2, 1).await;
        let handle = SessionSweeper::new(
            store.clone(),
            Duration::from_millis(20),
            Duration::from_secs(5),
        )
        .spawn();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.session_count(), 1);

        tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .expect("sweeper should stop promptly");
    }

    #[tokio::test]
    async fn test_stop_before_first_tick() {
        let store = seeded(1, 0).await;
        let handle = SessionSweeper::new(
            store.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        )
        .spawn();

        tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .expect("sweeper should stop promptly");
        // First pass is one period out, so nothing was swept
        assert_eq!(store.session_count(), 1);
    }
}
