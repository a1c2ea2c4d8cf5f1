use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{CounterStore, StoreError, WindowCount};

#[derive(Debug, Clone)]
enum Value {
    Counter(u64),
    Text(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Expired entries are swept from the map at most this often.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    next_sweep: Instant,
}

impl Entries {
    /// Drops every expired entry once the sweep interval has passed.
    fn sweep(&mut self, now: Instant) {
        if now < self.next_sweep {
            return;
        }
        let before = self.map.len();
        self.map.retain(|_, e| e.is_live(now));
        self.next_sweep = now + SWEEP_INTERVAL;
        let freed = before - self.map.len();
        if freed > 0 {
            tracing::debug!(freed, held = self.map.len(), "Swept expired memory store entries");
        }
    }
}

/// In-process store for single-instance deployments.
///
/// Every operation takes the single map lock, which makes increment and
/// expiry atomic. Writes periodically sweep expired entries.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
    offline: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                next_sweep: Instant::now() + SWEEP_INTERVAL,
            }),
            offline: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent operation fail as if the backend were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.map.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn remaining_secs(expires_at: Instant, now: Instant) -> u64 {
    let left = expires_at.saturating_duration_since(now);
    // Round up so a live key never reports zero seconds left.
    let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl CounterStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn increment_with_expiry(
        &self,
        key: &str,
        window_secs: u64,
    ) -> Result<WindowCount, StoreError> {
        self.ensure_online()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.sweep(now);

        let entry = entries
            .map
            .entry(key.to_string())
            .and_modify(|e| {
                if !e.is_live(now) {
                    *e = Entry {
                        value: Value::Counter(0),
                        expires_at: now + Duration::from_secs(window_secs),
                    };
                }
            })
            .or_insert_with(|| Entry {
                value: Value::Counter(0),
                expires_at: now + Duration::from_secs(window_secs),
            });

        let count = match &mut entry.value {
            Value::Counter(count) => {
                *count += 1;
                *count
            }
            Value::Text(_) => {
                return Err(StoreError::Command(format!(
                    "key '{}' does not hold a counter",
                    key
                )))
            }
        };

        Ok(WindowCount {
            count,
            ttl_secs: remaining_secs(entry.expires_at, now),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_online()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.map.get(key) {
            Some(entry) if !entry.is_live(now) => {
                entries.map.remove(key);
                Ok(None)
            }
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(Entry {
                value: Value::Counter(count),
                ..
            }) => Ok(Some(count.to_string())),
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.ensure_online()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.sweep(now);
        entries.map.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: now + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_online()
    }
}
