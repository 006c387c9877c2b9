//! Idempotency Store
//!
//! In-memory, TTL-bounded record of idempotency keys and the responses they
//! produced. Best-effort: records are lost on restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// In-progress keys older than this are considered abandoned
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Idempotency key status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
}

impl std::fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdempotencyStatus::Processing => write!(f, "processing"),
            IdempotencyStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Response recorded for a completed key
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Result of claiming a key
#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// Key is new (or was released); the caller runs the request
    Proceed,
    /// Key already completed with the same request
    Replay(CachedResponse),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdempotencyError {
    #[error("Key already exists and is being processed")]
    KeyInProgress,

    #[error("Request hash mismatch for key {0}")]
    HashMismatch(String),
}

#[derive(Debug, Clone)]
struct Record {
    request_hash: String,
    status: IdempotencyStatus,
    response: Option<CachedResponse>,
    started_at: Instant,
    expires_at: Instant,
}

/// Shared idempotency store
#[derive(Debug, Clone)]
pub struct IdempotencyStore {
    records: Arc<Mutex<HashMap<String, Record>>>,
    ttl: Duration,
    stale_after: Duration,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// Override how long an in-progress key blocks repeats
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Record>> {
        // A panic while holding the lock cannot leave a record half-written.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // =========================================================================
    // begin
    // =========================================================================

    /// Claim a key for a request with the given body hash.
    pub fn begin(&self, key: &str, request_hash: &str) -> Result<BeginOutcome, IdempotencyError> {
        let now = Instant::now();
        let mut records = self.lock();

        if let Some(existing) = records.get(key) {
            let expired = existing.expires_at <= now;
            let stale = existing.status == IdempotencyStatus::Processing
                && now.duration_since(existing.started_at) >= self.stale_after;

            if !expired && !stale {
                if existing.request_hash != request_hash {
                    return Err(IdempotencyError::HashMismatch(key.to_string()));
                }
                return match (&existing.status, &existing.response) {
                    (IdempotencyStatus::Completed, Some(response)) => {
                        Ok(BeginOutcome::Replay(response.clone()))
                    }
                    _ => Err(IdempotencyError::KeyInProgress),
                };
            }
        }

        records.insert(
            key.to_string(),
            Record {
                request_hash: request_hash.to_string(),
                status: IdempotencyStatus::Processing,
                response: None,
                started_at: now,
                expires_at: now + self.ttl.max(self.stale_after),
            },
        );

        Ok(BeginOutcome::Proceed)
    }

    /// Record the response for a key and start its TTL.
    pub fn complete(&self, key: &str, response: CachedResponse) {
        let now = Instant::now();
        if let Some(record) = self.lock().get_mut(key) {
            record.status = IdempotencyStatus::Completed;
            record.response = Some(response);
            record.expires_at = now + self.ttl;
        }
    }

    /// Forget a key so the request may be retried.
    pub fn release(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn status(&self, key: &str) -> Option<IdempotencyStatus> {
        self.lock().get(key).map(|record| record.status)
    }

    /// Remove expired records and abandoned in-progress markers
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let stale_after = self.stale_after;
        let mut records = self.lock();
        let before = records.len();

        records.retain(|_, record| {
            let stale = record.status == IdempotencyStatus::Processing
                && now.duration_since(record.started_at) >= stale_after;
            record.expires_at > now && !stale
        });

        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Compute SHA-256 hash of an operation and its request body for conflict detection.
///
/// Keys share one namespace, so the operation is part of the fingerprint.
pub fn compute_request_hash(operation: &str, body: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update([0u8]);
    hasher.update(body);
    hex::encode(hasher.finalize())
}
