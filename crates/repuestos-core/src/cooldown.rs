use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Identity a cooldown window is tracked under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(value: impl AsRef<str>) -> Self {
        let value = value.as_ref().trim();
        if value.is_empty() {
            Self::anonymous()
        } else {
            Self(value.to_owned())
        }
    }

    pub fn anonymous() -> Self {
        Self(String::from("anonymous"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minimum interval between live searches, per client.
///
/// Only live dispatches start a window; cache hits never touch it.
#[derive(Debug)]
pub struct CooldownRegistry {
    window: Duration,
    last_live: Mutex<HashMap<ClientKey, Instant>>,
}

impl Default for CooldownRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl CooldownRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_live: Mutex::new(HashMap::new()),
        }
    }

    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Starts a live-search window for `client`, or returns the time left on the current one.
    pub fn try_begin(&self, client: &ClientKey) -> Result<(), Duration> {
        let now = Instant::now();
        let mut last_live = self
            .last_live
            .lock()
            .expect("cooldown registry lock is not poisoned");

        if let Some(started) = last_live.get(client) {
            let elapsed = now.saturating_duration_since(*started);
            if elapsed < self.window {
                return Err(self.window - elapsed);
            }
        }

        last_live.retain(|_, started| now.saturating_duration_since(*started) < self.window);
        last_live.insert(client.clone(), now);
        Ok(())
    }

    /// Keeps `client` cooling down and returns the time left. A window that
    /// already ran out, or was never started, is restarted from now.
    pub fn rearm(&self, client: &ClientKey) -> Duration {
        let now = Instant::now();
        let mut last_live = self
            .last_live
            .lock()
            .expect("cooldown registry lock is not poisoned");

        let started = last_live.entry(client.clone()).or_insert(now);
        let elapsed = now.saturating_duration_since(*started);
        if elapsed < self.window {
            return self.window - elapsed;
        }
        *started = now;
        self.window
    }

    /// Ends the window early so the client may search again immediately.
    pub fn release(&self, client: &ClientKey) {
        self.last_live
            .lock()
            .expect("cooldown registry lock is not poisoned")
            .remove(client);
    }

    /// Time left before `client` may start another live search.
    pub fn remaining(&self, client: &ClientKey) -> Option<Duration> {
        let now = Instant::now();
        let last_live = self
            .last_live
            .lock()
            .expect("cooldown registry lock is not poisoned");
        let elapsed = now.saturating_duration_since(*last_live.get(client)?);
        (elapsed < self.window).then(|| self.window - elapsed)
    }
}

/// Whole seconds to advertise in a `Retry-After`, rounded up and at least one.
pub fn retry_after_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}
