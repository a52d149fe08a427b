//! In-memory cache of decrypted payloads.
//!
//! Three independently bounded maps so that re-rendering a session never
//! re-runs AEAD over data that has not changed:
//!
//! - messages, keyed by message id (messages are immutable)
//! - session data, keyed `{id}:{version}` (agent state: `{id}:agent-state:{version}`)
//! - machine data, keyed `{id}:{version}` (daemon state: `{id}:daemon-state:{version}`)
//!
//! Eviction runs synchronously on every insert: once a map is over capacity
//! the entries with the oldest access time are dropped until it fits again.
//! Nothing here is ever persisted.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use happy_core::config::CacheConfig;
use serde_json::Value;

use crate::session::DecryptedMessage;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    access_time: u64,
}

/// Capacity-bounded map with least-recently-accessed eviction.
///
/// Access time is a per-map logical clock, so two accesses never tie.
#[derive(Debug)]
pub struct BoundedCache<T> {
    entries: HashMap<String, CacheEntry<T>>,
    capacity: usize,
    clock: u64,
}

impl<T: Clone> BoundedCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Look up a value and mark it as most recently used.
    pub fn get(&mut self, key: &str) -> Option<T> {
        let now = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.access_time = now;
        Some(entry.data.clone())
    }

    /// Insert or overwrite, then evict down to capacity.
    pub fn insert(&mut self, key: String, data: T) {
        let access_time = self.tick();
        self.entries.insert(key, CacheEntry { data, access_time });
        self.evict();
    }

    /// Drop every key matching `pred`. Returns how many went.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !pred(key));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict(&mut self) {
        let excess = self.entries.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }

        let mut by_age: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.access_time, key.clone()))
            .collect();
        by_age.sort_unstable();

        for (_, key) in by_age.into_iter().take(excess) {
            self.entries.remove(&key);
        }
    }
}

/// Entry counts per map, for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub messages: usize,
    pub sessions: usize,
    pub machines: usize,
}

/// The three decrypted-data maps for one account.
#[derive(Debug)]
pub struct DecryptedCache {
    messages: Mutex<BoundedCache<DecryptedMessage>>,
    sessions: Mutex<BoundedCache<Value>>,
    machines: Mutex<BoundedCache<Value>>,
}

impl Default for DecryptedCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

fn versioned_key(id: &str, version: u64) -> String {
    format!("{id}:{version}")
}

fn tagged_key(id: &str, tag: &str, version: u64) -> String {
    format!("{id}:{tag}:{version}")
}

/// True if `key` is `{id}:{version}` or `{id}:{tag}:{version}`.
///
/// Ids may themselves contain `:`, so a bare prefix match would also hit
/// `{id}:other:{version}` belonging to a different entity.
fn owned_by(key: &str, id: &str, tag: &str) -> bool {
    let Some(rest) = key.strip_prefix(id).and_then(|r| r.strip_prefix(':')) else {
        return false;
    };
    let version = rest
        .strip_prefix(tag)
        .and_then(|r| r.strip_prefix(':'))
        .unwrap_or(rest);
    !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit())
}

const AGENT_STATE_TAG: &str = "agent-state";
const DAEMON_STATE_TAG: &str = "daemon-state";

impl DecryptedCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            messages: Mutex::new(BoundedCache::new(config.messages)),
            sessions: Mutex::new(BoundedCache::new(config.session_metadata)),
            machines: Mutex::new(BoundedCache::new(config.machine_metadata)),
        }
    }

    pub fn get_message(&self, message_id: &str) -> Option<DecryptedMessage> {
        lock(&self.messages).get(message_id)
    }

    pub fn set_message(&self, message_id: &str, message: DecryptedMessage) {
        lock(&self.messages).insert(message_id.to_string(), message);
    }

    pub fn get_session_data(&self, session_id: &str, version: u64) -> Option<Value> {
        lock(&self.sessions).get(&versioned_key(session_id, version))
    }

    pub fn set_session_data(&self, session_id: &str, version: u64, data: Value) {
        lock(&self.sessions).insert(versioned_key(session_id, version), data);
    }

    pub fn get_agent_state(&self, session_id: &str, version: u64) -> Option<Value> {
        lock(&self.sessions).get(&tagged_key(session_id, AGENT_STATE_TAG, version))
    }

    pub fn set_agent_state(&self, session_id: &str, version: u64, data: Value) {
        lock(&self.sessions).insert(tagged_key(session_id, AGENT_STATE_TAG, version), data);
    }

    pub fn get_machine_data(&self, machine_id: &str, version: u64) -> Option<Value> {
        lock(&self.machines).get(&versioned_key(machine_id, version))
    }

    pub fn set_machine_data(&self, machine_id: &str, version: u64, data: Value) {
        lock(&self.machines).insert(versioned_key(machine_id, version), data);
    }

    pub fn get_daemon_state(&self, machine_id: &str, version: u64) -> Option<Value> {
        lock(&self.machines).get(&tagged_key(machine_id, DAEMON_STATE_TAG, version))
    }

    pub fn set_daemon_state(&self, machine_id: &str, version: u64, data: Value) {
        lock(&self.machines).insert(tagged_key(machine_id, DAEMON_STATE_TAG, version), data);
    }

    /// Remove every cached version of one session.
    pub fn clear_session_cache(&self, session_id: &str) {
        let removed =
            lock(&self.sessions).remove_where(|key| owned_by(key, session_id, AGENT_STATE_TAG));
        tracing::debug!(session = session_id, removed, "cleared session cache");
    }

    /// Remove every cached version of one machine.
    pub fn clear_machine_cache(&self, machine_id: &str) {
        let removed =
            lock(&self.machines).remove_where(|key| owned_by(key, machine_id, DAEMON_STATE_TAG));
        tracing::debug!(machine = machine_id, removed, "cleared machine cache");
    }

    pub fn clear_all(&self) {
        lock(&self.messages).clear();
        lock(&self.sessions).clear();
        lock(&self.machines).clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            messages: lock(&self.messages).len(),
            sessions: lock(&self.sessions).len(),
            machines: lock(&self.machines).len(),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_over_capacity_evicts_oldest() {
        let mut cache = BoundedCache::new(3);
        for i in 0..4 {
            cache.insert(format!("k{i}"), i);
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.get("k0").is_none());
        assert_eq!(cache.get("k3"), Some(3));
    }

    #[test]
    fn test_access_protects_from_eviction() {
        let mut cache = BoundedCache::new(3);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        cache.insert("c".into(), 3);
        assert_eq!(cache.get("a"), Some(1));

        cache.insert("d".into(), 4);
        assert_eq!(cache.len(), 3);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a"), Some(1));
    }

    #[test]
    fn test_overwrite_does_not_grow() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a".into(), 1);
        cache.insert("a".into(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(2));
    }

    #[test]
    fn test_zero_capacity_holds_nothing() {
        let mut cache = BoundedCache::new(0);
        cache.insert("a".into(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_where_counts_removed() {
        let mut cache = BoundedCache::new(10);
        cache.insert("a1".into(), 1);
        cache.insert("a2".into(), 2);
        cache.insert("b1".into(), 3);
        assert_eq!(cache.remove_where(|key| key.starts_with('a')), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b1"), Some(3));
    }

    #[test]
    fn test_clear_session_only_touches_own_keys() {
        let cache = DecryptedCache::default();
        cache.set_session_data("s1", 1, json!("own"));
        cache.set_agent_state("s1", 1, json!("own agent"));
        cache.set_session_data("s10", 1, json!("sibling"));
        cache.set_session_data("s1:b", 1, json!("nested id"));
        cache.set_agent_state("s1:b", 2, json!("nested agent"));

        cache.clear_session_cache("s1");
        assert!(cache.get_session_data("s1", 1).is_none());
        assert!(cache.get_agent_state("s1", 1).is_none());
        assert_eq!(cache.get_session_data("s10", 1), Some(json!("sibling")));
        assert_eq!(cache.get_session_data("s1:b", 1), Some(json!("nested id")));
        assert_eq!(cache.get_agent_state("s1:b", 2), Some(json!("nested agent")));
    }

    #[test]
    fn test_clear_machine_with_colon_in_id() {
        let cache = DecryptedCache::default();
        cache.set_machine_data("m:x", 3, json!(1));
        cache.set_daemon_state("m:x", 3, json!(2));
        cache.set_machine_data("m", 3, json!(3));

        cache.clear_machine_cache("m");
        assert_eq!(cache.get_machine_data("m:x", 3), Some(json!(1)));
        assert_eq!(cache.get_daemon_state("m:x", 3), Some(json!(2)));
        assert!(cache.get_machine_data("m", 3).is_none());

        cache.clear_machine_cache("m:x");
        assert_eq!(cache.stats().machines, 0);
    }

    #[test]
    fn test_versions_do_not_collide() {
        let cache = DecryptedCache::default();
        cache.set_session_data("s", 2, json!({"title": "new"}));
        assert!(cache.get_session_data("s", 1).is_none());
        assert_eq!(cache.get_session_data("s", 2), Some(json!({"title": "new"})));
    }

    #[test]
    fn test_agent_state_separate_from_metadata() {
        let cache = DecryptedCache::default();
        cache.set_session_data("s", 1, json!("meta"));
        cache.set_agent_state("s", 1, json!("agent"));
        assert_eq!(cache.get_session_data("s", 1), Some(json!("meta")));
        assert_eq!(cache.get_agent_state("s", 1), Some(json!("agent")));

        cache.clear_session_cache("s");
        assert!(cache.get_session_data("s", 1).is_none());
        assert!(cache.get_agent_state("s", 1).is_none());
    }

    #[test]
    fn test_clear_machine_leaves_sessions() {
        let cache = DecryptedCache::default();
        cache.set_machine_data("x", 1, json!(1));
        cache.set_daemon_state("x", 1, json!(2));
        cache.set_session_data("x", 1, json!(3));

        cache.clear_machine_cache("x");
        assert_eq!(
            cache.stats(),
            CacheStats {
                messages: 0,
                sessions: 1,
                machines: 0
            }
        );
    }

    #[test]
    fn test_configured_capacities() {
        let cache = DecryptedCache::new(&CacheConfig {
            messages: 1,
            session_metadata: 2,
            machine_metadata: 1,
        });
        for v in 0..5 {
            cache.set_session_data("s", v, json!(v));
            cache.set_machine_data("m", v, json!(v));
        }
        let stats = cache.stats();
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.machines, 1);
        assert_eq!(cache.get_machine_data("m", 4), Some(json!(4)));

        cache.clear_all();
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
