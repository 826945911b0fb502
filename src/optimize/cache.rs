//! Content-addressed verification cache.
//!
//! Entries are keyed by a fingerprint of file content, requirements text,
//! role, and tier. Hits require the entry to be inside its TTL and to hold
//! enough confidence after linear decay; eviction is LRU at capacity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::config::CacheConfig;
use crate::optimize::confidence::ConfidenceScore;

/// Hex length of a cache fingerprint (SHA-256 prefix).
const FINGERPRINT_LEN: usize = 16;

/// Hex length of a requirements fingerprint.
const REQUIREMENTS_FINGERPRINT_LEN: usize = 8;

/// Compute the cache fingerprint for a verification artifact.
pub fn fingerprint(content: &str, requirements: &str, role: &str, tier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(requirements.as_bytes());
    hasher.update(role.as_bytes());
    hasher.update(tier.as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, FINGERPRINT_LEN)
}

/// Short fingerprint identifying a requirements text.
pub fn requirements_fingerprint(requirements: &str) -> String {
    let digest = Sha256::digest(requirements.as_bytes());
    hex_prefix(&digest, REQUIREMENTS_FINGERPRINT_LEN)
}

/// Full SHA-256 content hash, hex encoded.
pub fn content_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_prefix(digest: &[u8], len: usize) -> String {
    digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
        .chars()
        .take(len)
        .collect()
}

/// One cached verification artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Entry fingerprint.
    pub fingerprint: String,
    /// Cached verdict text.
    pub verdict: String,
    /// Cached issues payload.
    pub issues: serde_json::Value,
    /// Confidence the verification carried when cached.
    pub confidence: f64,
    /// Storage timestamp.
    pub created_at: DateTime<Utc>,
    /// Last hit timestamp, for LRU ordering.
    pub last_used: DateTime<Utc>,
}

/// A successful cache lookup.
#[derive(Debug, Clone)]
pub struct CacheHit {
    /// The stored entry.
    pub entry: CacheEntry,
    /// Entry age at lookup time, in seconds.
    pub age_seconds: u64,
    /// Confidence after decay, scored as a cache-sourced result.
    pub confidence: ConfidenceScore,
}

/// Cache statistics for clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Live entries.
    pub entries: usize,
    /// Lookup hits.
    pub hits: u64,
    /// Lookup misses (absent, expired, or below confidence).
    pub misses: u64,
    /// Evictions performed.
    pub evictions: u64,
    /// hits / (hits + misses), 0 when no lookups happened.
    pub hit_rate: f64,
}

/// Fingerprinted verification cache with TTL, decay, and LRU eviction.
#[derive(Debug)]
pub struct VerificationCache {
    config: CacheConfig,
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl VerificationCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Confidence of `entry` after linear decay at `now`.
    ///
    /// Decay starts at TTL/2 and subtracts `decay_rate_per_hour` for every
    /// hour past that point.
    pub fn decayed_confidence(&self, entry: &CacheEntry, now: DateTime<Utc>) -> f64 {
        let age_seconds = (now - entry.created_at).num_seconds().max(0) as u64;
        let half_ttl = self.config.ttl_seconds / 2;
        if age_seconds <= half_ttl {
            return entry.confidence;
        }
        let excess_hours = (age_seconds - half_ttl) as f64 / 3600.0;
        (entry.confidence - excess_hours * self.config.decay_rate_per_hour).max(0.0)
    }

    /// Look up a fingerprint.
    ///
    /// Hits require: the entry exists, its age is inside the TTL, decayed
    /// confidence clears the configured minimum, and the caller's own
    /// minimum (when supplied) also passes. Anything else is a miss.
    pub fn lookup(
        &mut self,
        fingerprint: &str,
        required_min_confidence: Option<f64>,
        requirements_changed: bool,
        dependencies_changed: bool,
        now: DateTime<Utc>,
    ) -> Option<CacheHit> {
        let Some(entry) = self.entries.get_mut(fingerprint) else {
            self.misses += 1;
            return None;
        };

        let age_seconds = (now - entry.created_at).num_seconds().max(0) as u64;
        if age_seconds > self.config.ttl_seconds {
            self.misses += 1;
            return None;
        }

        let entry_snapshot = entry.clone();
        let decayed = self.decayed_confidence(&entry_snapshot, now);
        if decayed < self.config.min_confidence {
            self.misses += 1;
            return None;
        }
        if let Some(required) = required_min_confidence {
            if decayed < required {
                self.misses += 1;
                return None;
            }
        }

        let entry = self
            .entries
            .get_mut(fingerprint)
            .expect("entry present above");
        entry.last_used = now;
        self.hits += 1;

        Some(CacheHit {
            entry: entry.clone(),
            age_seconds,
            confidence: ConfidenceScore::cache(
                age_seconds,
                self.config.ttl_seconds,
                self.config.decay_rate_per_hour,
                requirements_changed,
                dependencies_changed,
            ),
        })
    }

    /// Store an artifact, evicting the least-recently-used entry at
    /// capacity.
    pub fn store(
        &mut self,
        fingerprint: String,
        verdict: String,
        issues: serde_json::Value,
        confidence: f64,
        now: DateTime<Utc>,
    ) {
        if !self.entries.contains_key(&fingerprint)
            && self.entries.len() >= self.config.max_entries
        {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            {
                self.entries.remove(&oldest);
                self.evictions += 1;
            }
        }

        self.entries.insert(
            fingerprint.clone(),
            CacheEntry {
                fingerprint,
                verdict,
                issues,
                confidence,
                created_at: now,
                last_used: now,
            },
        );
    }

    /// Drop all entries, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
        }
    }
}
