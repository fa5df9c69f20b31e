//! Credential pool for spreading calls across multiple API keys.
//!
//! This is load spreading, not concurrency control: there is no affinity and
//! no per-key rate tracking. The pool is built once per process from an
//! injected key list, so tests can substitute a deterministic strategy.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::error::BatchError;

/// An API credential. `Debug` redacts the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(..{} chars)", self.0.len())
    }
}

/// How the pool picks a key for the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Uniform random pick per call (production default).
    Random,

    /// Deterministic cycling, for tests and local debugging.
    RoundRobin,
}

/// A fixed set of credentials with a pluggable selection strategy.
#[derive(Debug)]
pub struct CredentialPool {
    keys: Vec<ApiKey>,
    strategy: SelectionStrategy,
    cursor: AtomicUsize,
}

impl CredentialPool {
    pub fn new(keys: Vec<ApiKey>, strategy: SelectionStrategy) -> Result<Self, BatchError> {
        if keys.is_empty() {
            return Err(BatchError::NoCredentials);
        }
        Ok(Self {
            keys,
            strategy,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key to use for the next call.
    pub fn next(&self) -> &ApiKey {
        let index = match self.strategy {
            SelectionStrategy::Random => rand::thread_rng().gen_range(0..self.keys.len()),
            SelectionStrategy::RoundRobin => {
                self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len()
            }
        };
        &self.keys[index]
    }
}
