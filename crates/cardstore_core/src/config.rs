//! Engine configuration.

use crate::keys;
use cardstore_codec::CompressionPolicy;
use std::time::Duration;

/// Whether a legacy key holds a collection or a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// An ordered list of records, possibly segmented.
    Collection,
    /// A single JSON value.
    Document,
}

/// A key in the legacy store that migration moves to the primary store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyEntry {
    /// Key in the legacy store.
    pub legacy_key: String,
    /// Key in the primary store.
    pub target_key: String,
    /// What the key holds.
    pub kind: EntryKind,
}

impl LegacyEntry {
    /// A collection stored under the same key in both stores.
    pub fn collection(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            legacy_key: key.clone(),
            target_key: key,
            kind: EntryKind::Collection,
        }
    }

    /// A document stored under the same key in both stores.
    pub fn document(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            legacy_key: key.clone(),
            target_key: key,
            kind: EntryKind::Document,
        }
    }

    /// Moves the entry to a different key in the primary store.
    #[must_use]
    pub fn renamed(mut self, target_key: impl Into<String>) -> Self {
        self.target_key = target_key.into();
        self
    }
}

/// Configuration for a [`crate::StorageEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of records per segment.
    pub segment_capacity: usize,

    /// How long a fetched value is served from the cache.
    pub cache_ttl: Duration,

    /// When values are compressed before storage.
    pub compression: CompressionPolicy,

    /// Prefix of backup keys in the legacy store.
    pub backup_prefix: String,

    /// Primary-store key holding the migration-completed flag.
    pub migration_flag_key: String,

    /// Keys that are mirrored to the backup store.
    pub critical_keys: Vec<String>,

    /// Legacy keys migrated at startup.
    pub legacy_entries: Vec<LegacyEntry>,

    /// Largest serialized size accepted for a single record or document.
    pub max_record_bytes: usize,

    /// How often the health probe tries to reconnect an unhealthy backend.
    pub health_probe_interval: Duration,

    /// How often orphaned segments are swept.
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            segment_capacity: 10,
            cache_ttl: Duration::from_secs(30),
            compression: CompressionPolicy::default(),
            backup_prefix: "backup:".to_string(),
            migration_flag_key: "cardstore:migrated".to_string(),
            critical_keys: keys::CRITICAL.iter().map(|k| (*k).to_string()).collect(),
            legacy_entries: keys::COLLECTIONS
                .iter()
                .map(|k| LegacyEntry::collection(*k))
                .chain(keys::DOCUMENTS.iter().map(|k| LegacyEntry::document(*k)))
                .collect(),
            max_record_bytes: 5 * 1024 * 1024, // 5 MiB
            health_probe_interval: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10 * 60),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of records per segment.
    #[must_use]
    pub fn segment_capacity(mut self, capacity: usize) -> Self {
        self.segment_capacity = capacity.max(1);
        self
    }

    /// Sets the cache time-to-live.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the compression policy.
    #[must_use]
    pub fn compression(mut self, policy: CompressionPolicy) -> Self {
        self.compression = policy;
        self
    }

    /// Sets the backup key prefix.
    #[must_use]
    pub fn backup_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.backup_prefix = prefix.into();
        self
    }

    /// Sets the migration flag key.
    #[must_use]
    pub fn migration_flag_key(mut self, key: impl Into<String>) -> Self {
        self.migration_flag_key = key.into();
        self
    }

    /// Replaces the set of mirrored keys.
    #[must_use]
    pub fn critical_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the list of legacy keys to migrate.
    #[must_use]
    pub fn legacy_entries(mut self, entries: Vec<LegacyEntry>) -> Self {
        self.legacy_entries = entries;
        self
    }

    /// Sets the largest accepted record size.
    #[must_use]
    pub fn max_record_bytes(mut self, bytes: usize) -> Self {
        self.max_record_bytes = bytes;
        self
    }

    /// Sets the health probe interval.
    #[must_use]
    pub fn health_probe_interval(mut self, interval: Duration) -> Self {
        self.health_probe_interval = interval;
        self
    }

    /// Sets the orphan sweep interval.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Returns true if `key` is mirrored to the backup store.
    #[must_use]
    pub fn is_critical(&self, key: &str) -> bool {
        self.critical_keys.iter().any(|k| k == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.segment_capacity, 10);
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert!(config.compression.enabled);
        assert!(config.is_critical(keys::FLASHCARDS));
        assert!(config.is_critical(keys::SESSION));
        assert!(!config.is_critical(keys::SHARE_CODES));
        assert_eq!(config.legacy_entries.len(), 7);
    }

    #[test]
    fn builder_pattern() {
        let config = EngineConfig::new()
            .segment_capacity(20)
            .cache_ttl(Duration::from_secs(5))
            .compression(CompressionPolicy::disabled())
            .critical_keys(["user"])
            .max_record_bytes(10 * 1024 * 1024);

        assert_eq!(config.segment_capacity, 20);
        assert_eq!(config.cache_ttl, Duration::from_secs(5));
        assert!(!config.compression.enabled);
        assert_eq!(config.critical_keys, vec!["user".to_string()]);
        assert_eq!(config.max_record_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn zero_segment_capacity_is_clamped() {
        assert_eq!(EngineConfig::new().segment_capacity(0).segment_capacity, 1);
    }

    #[test]
    fn renamed_legacy_entry() {
        let entry = LegacyEntry::collection("cards_v1").renamed(keys::FLASHCARDS);
        assert_eq!(entry.legacy_key, "cards_v1");
        assert_eq!(entry.target_key, "flashcards");
        assert_eq!(entry.kind, EntryKind::Collection);
    }
}
