// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Memoisation of expression results.
//!
//! Results are keyed by (node, request). Many baselines share per-station and
//! per-source sub-expressions, so when several threads miss on the same key
//! at the same time exactly one of them computes the result and the others
//! wait for it.


use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::trace;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{expr::NodeId, request::RequestId, value_set::ValueSet};

/// How long a cached result stays valid. Ordered from shortest- to
/// longest-lived.
#[derive(
    Debug,
    Display,
    EnumIter,
    EnumString,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub enum CachePolicy {
    /// Never cached; recomputed on every access.
    #[strum(serialize = "none")]
    None,

    /// Valid for the current solver iteration only.
    #[strum(serialize = "volatile")]
    Volatile,

    /// Valid for as long as the request is.
    #[strum(serialize = "permanent")]
    Permanent,
}

#[derive(Debug)]
struct Entry {
    value: Arc<ValueSet>,
    policy: CachePolicy,
}

type Key = (NodeId, RequestId);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub queries: u64,
    pub hits: u64,
    pub computations: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.queries == 0 {
            0.0
        } else {
            self.hits as f64 / self.queries as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} queries, {} hits ({:.1}%), {} computations, {} entries",
            self.queries,
            self.hits,
            self.hit_rate() * 100.0,
            self.computations,
            self.entries
        )
    }
}

#[derive(Debug, Default)]
pub struct Cache {
    /// Each slot is filled at most once. A slot that is present but empty is
    /// being computed (or its computation failed and may be retried).
    entries: DashMap<Key, Arc<OnceCell<Entry>>>,

    queries: AtomicU64,
    hits: AtomicU64,
    computations: AtomicU64,
}

impl Cache {
    pub fn new() -> Cache {
        Cache::default()
    }

    pub fn get(&self, node: NodeId, request: RequestId) -> Option<Arc<ValueSet>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let value = self
            .entries
            .get(&(node, request))
            .and_then(|slot| slot.get().map(|e| Arc::clone(&e.value)));
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Store a result, replacing anything already stored under the same key.
    /// Results with [`CachePolicy::None`] are not stored.
    pub fn put(
        &self,
        node: NodeId,
        request: RequestId,
        value: Arc<ValueSet>,
        policy: CachePolicy,
    ) {
        if policy == CachePolicy::None {
            return;
        }
        let slot = OnceCell::new();
        // A fresh cell can't already be set.
        let _ = slot.set(Entry { value, policy });
        self.entries.insert((node, request), Arc::new(slot));
    }

    /// Get the cached result for (node, request), or compute it with `f`.
    /// If several threads call this for the same key at the same time, `f` is
    /// run by exactly one of them and the rest wait for its result. `f`
    /// returns the value and the policy it should be cached with.
    ///
    /// If `f` fails, nothing is cached, the key's slot is removed and the
    /// error is returned; any waiting threads will try the computation
    /// themselves.
    pub fn get_or_compute<E>(
        &self,
        node: NodeId,
        request: RequestId,
        f: impl FnOnce() -> Result<(ValueSet, CachePolicy), E>,
    ) -> Result<Arc<ValueSet>, E> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let key = (node, request);
        // Don't hold the map's shard lock while computing; `f` will recurse
        // into this cache for the node's children.
        let slot = Arc::clone(self.entries.entry(key).or_default().value());

        let mut computed = false;
        let entry = match slot.get_or_try_init(|| {
            computed = true;
            self.computations.fetch_add(1, Ordering::Relaxed);
            f().map(|(value, policy)| Entry {
                value: Arc::new(value),
                policy,
            })
        }) {
            Ok(entry) => entry,
            Err(e) => {
                // Drop the empty slot, unless a waiting thread has filled it
                // in the meantime.
                self.entries
                    .remove_if(&key, |_, s| Arc::ptr_eq(s, &slot) && s.get().is_none());
                return Err(e);
            }
        };
        if computed {
            trace!("Computed node {node} for request {request}");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        if entry.policy == CachePolicy::None {
            self.entries.remove_if(&key, |_, s| Arc::ptr_eq(s, &slot));
        }
        Ok(Arc::clone(&entry.value))
    }

    /// Remove all entries with the given policy.
    pub fn clear_policy(&self, policy: CachePolicy) {
        self.entries
            .retain(|_, slot| slot.get().map(|e| e.policy != policy).unwrap_or(false));
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove all entries that don't belong to `request`.
    pub fn evict_stale(&self, request: RequestId) {
        self.entries.retain(|(_, r), _| *r == request);
    }

    pub fn contains(&self, node: NodeId, request: RequestId) -> bool {
        self.entries
            .get(&(node, request))
            .map(|slot| slot.get().is_some())
            .unwrap_or(false)
    }

    /// The policy a result is cached with, if it is cached.
    pub fn policy(&self, node: NodeId, request: RequestId) -> Option<CachePolicy> {
        self.entries
            .get(&(node, request))
            .and_then(|slot| slot.get().map(|e| e.policy))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            queries: self.queries.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    pub fn reset_stats(&self) {
        self.queries.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.computations.store(0, Ordering::Relaxed);
    }
}
