use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::Provider;
use crate::config::RateLimitSettings;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    pub min_spacing: Duration,
    /// Zero disables the ceiling
    pub max_per_minute: u32,
}

impl From<RateLimitSettings> for RateLimitPolicy {
    fn from(settings: RateLimitSettings) -> Self {
        Self {
            min_spacing: Duration::from_millis(settings.min_spacing_ms),
            max_per_minute: settings.max_per_minute,
        }
    }
}

#[derive(Debug, Default)]
struct ProviderWindow {
    last_request: Option<Instant>,
    recent: VecDeque<Instant>,
}

impl ProviderWindow {
    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.recent.front() {
            if now.duration_since(*front) >= WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-provider request scheduler: minimum spacing between calls plus a
/// rolling per-minute ceiling. Waiting is the only outcome, never an error.
#[derive(Debug)]
pub struct RateLimiter {
    default_policy: RateLimitPolicy,
    overrides: HashMap<Provider, RateLimitPolicy>,
    // The provider lock is held across the wait so same-provider callers queue up.
    windows: HashMap<Provider, Arc<Mutex<ProviderWindow>>>,
}

impl RateLimiter {
    pub fn new(default_policy: RateLimitPolicy) -> Self {
        let windows = Provider::ALL
            .iter()
            .map(|p| (*p, Arc::new(Mutex::new(ProviderWindow::default()))))
            .collect();

        Self {
            default_policy,
            overrides: HashMap::new(),
            windows,
        }
    }

    pub fn with_policy(mut self, provider: Provider, policy: RateLimitPolicy) -> Self {
        self.overrides.insert(provider, policy);
        self
    }

    pub fn policy_for(&self, provider: Provider) -> RateLimitPolicy {
        self.overrides
            .get(&provider)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Wait until the next request to `provider` is allowed, then record it.
    pub async fn acquire(&self, provider: Provider) {
        let policy = self.policy_for(provider);
        let Some(window) = self.windows.get(&provider) else {
            return;
        };
        let mut window = window.lock().await;

        loop {
            let now = Instant::now();
            window.prune(now);

            if policy.max_per_minute > 0 && window.recent.len() >= policy.max_per_minute as usize {
                if let Some(oldest) = window.recent.front() {
                    let wait = WINDOW.saturating_sub(now.duration_since(*oldest));
                    info!(
                        "{} reached {} requests/min, waiting {:.1}s",
                        provider,
                        policy.max_per_minute,
                        wait.as_secs_f64()
                    );
                    sleep(wait).await;
                    continue;
                }
            }

            if let Some(last) = window.last_request {
                let elapsed = now.duration_since(last);
                if elapsed < policy.min_spacing {
                    let wait = policy.min_spacing - elapsed;
                    debug!("{}: spacing requests, waiting {:?}", provider, wait);
                    sleep(wait).await;
                    continue;
                }
            }

            break;
        }

        let now = Instant::now();
        window.last_request = Some(now);
        window.recent.push_back(now);
    }

    /// Requests recorded for `provider` within the last minute.
    pub async fn requests_in_window(&self, provider: Provider) -> usize {
        match self.windows.get(&provider) {
            Some(window) => {
                let mut window = window.lock().await;
                window.prune(Instant::now());
                window.recent.len()
            }
            None => 0,
        }
    }
}
