//! Cached, per-user notification store
//!
//! Holds the logged-in user's notifications with a stale time. Reads serve the cache while it
//! is fresh; mutations invalidate it so the next read refetches.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use sincronica_shared::{Notification, UserId};
use tokio::task::JoinHandle;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::Config;
use crate::error::NotificationResult;

use super::client::NotificationClient;

/// Default stale time (30 seconds)
const DEFAULT_STALE_TIME: Duration = Duration::from_secs(30);

/// Poll interval used when a zero interval is requested (60 seconds)
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of fetch retries
const DEFAULT_RETRIES: usize = 3;

/// Initial backoff duration for retries (100ms)
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Maximum backoff duration for retries (5 seconds)
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Cached fetch result for one user
#[derive(Clone)]
struct CacheEntry {
    user_id: UserId,
    notifications: Vec<Notification>,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(user_id: UserId, notifications: Vec<Notification>, ttl: Duration) -> Self {
        Self {
            user_id,
            notifications,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| n.is_unread()).count()
    }
}

#[derive(Default)]
struct StoreState {
    user_id: Option<UserId>,
    entry: Option<CacheEntry>,
    /// Bumped whenever cached data becomes invalid; a fetch started under an older
    /// generation must not populate the cache
    generation: u64,
}

/// Thread-safe notification store for the current user
pub struct NotificationStore {
    client: NotificationClient,
    state: RwLock<StoreState>,
    stale_time: Duration,
    retries: usize,
}

impl NotificationStore {
    /// Create a store with default stale time and retry count
    pub fn new(client: NotificationClient) -> Self {
        Self {
            client,
            state: RwLock::new(StoreState::default()),
            stale_time: DEFAULT_STALE_TIME,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Create a store using the notification settings from config
    pub fn from_config(config: &Config) -> NotificationResult<Self> {
        Ok(Self::new(NotificationClient::new(config)?)
            .with_stale_time(config.notifications_stale_time())
            .with_retries(config.notifications_retries))
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Number of retries for transient fetch failures. Mutations are never retried.
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch the authenticated user. Cached data for any other user is dropped.
    pub fn set_user(&self, user_id: Option<UserId>) {
        let mut state = self.write_state();
        if state.user_id == user_id {
            return;
        }

        tracing::debug!(
            previous = ?state.user_id.map(UserId::get),
            current = ?user_id.map(UserId::get),
            "Notification store user changed"
        );
        state.user_id = user_id;
        state.entry = None;
        state.generation += 1;
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.read_state().user_id
    }

    /// Notifications for the current user, served from cache while fresh
    ///
    /// Empty when no user is authenticated.
    pub async fn notifications(&self) -> NotificationResult<Vec<Notification>> {
        {
            let state = self.read_state();
            let Some(user_id) = state.user_id else {
                return Ok(Vec::new());
            };
            if let Some(entry) = state.entry.as_ref() {
                if entry.user_id == user_id && !entry.is_expired() {
                    return Ok(entry.notifications.clone());
                }
            }
        }

        self.refresh().await
    }

    /// Fetch from the backend regardless of cache freshness
    pub async fn refresh(&self) -> NotificationResult<Vec<Notification>> {
        let (user_id, generation) = {
            let state = self.read_state();
            let Some(user_id) = state.user_id else {
                return Ok(Vec::new());
            };
            (user_id, state.generation)
        };

        let notifications = self.fetch_with_retry(user_id).await?;

        let mut state = self.write_state();
        if state.generation == generation && state.user_id == Some(user_id) {
            state.entry = Some(CacheEntry::new(
                user_id,
                notifications.clone(),
                self.stale_time,
            ));
        } else {
            tracing::debug!(
                user_id = %user_id,
                "Cache invalidated during fetch, not caching result"
            );
        }
        drop(state);

        tracing::debug!(
            user_id = %user_id,
            count = notifications.len(),
            "Fetched notifications"
        );
        Ok(notifications)
    }

    async fn fetch_with_retry(&self, user_id: UserId) -> NotificationResult<Vec<Notification>> {
        let retry_strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY.as_millis() as u64)
            .max_delay(RETRY_MAX_DELAY)
            .take(self.retries)
            .map(jitter);

        Retry::spawn(retry_strategy, || async {
            let result = self.client.fetch(user_id).await;

            match &result {
                Ok(_) => Ok(result),
                Err(e) if e.is_transient() => {
                    tracing::debug!(
                        user_id = %user_id,
                        error = %e,
                        "Transient error - will retry"
                    );
                    Err(result) // Return error to trigger retry
                }
                Err(e) => {
                    tracing::debug!(
                        user_id = %user_id,
                        error = %e,
                        "Permanent error - will not retry"
                    );
                    Ok(result) // Return error wrapped in Ok to stop retrying
                }
            }
        })
        .await
        .unwrap_or_else(|e| e)
    }

    /// Mark a single notification read, then invalidate the cache
    pub async fn mark_read(&self, notification_id: i64) -> NotificationResult<()> {
        self.client.mark_read(notification_id).await?;
        self.invalidate();
        tracing::info!(notification_id, "Notification marked as read");
        Ok(())
    }

    /// Mark every notification of the current user read, then invalidate the cache
    ///
    /// No-op when no user is authenticated.
    pub async fn mark_all_read(&self) -> NotificationResult<()> {
        let Some(user_id) = self.current_user() else {
            return Ok(());
        };

        self.client.mark_all_read(user_id).await?;
        self.invalidate();
        tracing::info!(user_id = %user_id, "All notifications marked as read");
        Ok(())
    }

    /// Drop cached data so the next read refetches
    pub fn invalidate(&self) {
        let mut state = self.write_state();
        state.entry = None;
        state.generation += 1;
    }

    /// Number of unread notifications, fetching if the cache is stale
    pub async fn unread_count(&self) -> NotificationResult<usize> {
        let notifications = self.notifications().await?;
        Ok(notifications.iter().filter(|n| n.is_unread()).count())
    }

    /// Unread count from the cache only, stale or not. `None` if nothing is cached.
    pub fn cached_unread_count(&self) -> Option<usize> {
        let state = self.read_state();
        state
            .entry
            .as_ref()
            .filter(|entry| Some(entry.user_id) == state.user_id)
            .map(CacheEntry::unread_count)
    }

    /// Refresh in the background every `interval`. Failures are logged; the loop keeps going.
    ///
    /// A zero interval is replaced by the 60 second default.
    pub fn spawn_polling(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let interval = if interval.is_zero() {
            tracing::warn!("Notification poll interval must be positive, using default");
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if self.current_user().is_none() {
                    continue;
                }
                if let Err(e) = self.refresh().await {
                    tracing::warn!(error = %e, "Notification poll failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStore")
            .field("base_url", &self.client.base_url())
            .field("user_id", &self.current_user())
            .field("stale_time", &self.stale_time)
            .field("retries", &self.retries)
            .finish()
    }
}
