// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Evaluation requests.
//!
//! A [`Request`] says "evaluate over this grid, and give me derivatives for
//! these derivative indices". Requests are immutable and are compared by their
//! id alone, which makes them cheap to use as part of a cache key.

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use itertools::Itertools;

use crate::grid::Grid;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(0);

/// The identity of a [`Request`]. Ids increase monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    id: RequestId,
    grid: Arc<Grid>,
    /// Sorted, deduplicated derivative indices.
    spids: Arc<[usize]>,
}

impl Request {
    /// Create a new request. The derivative indices are sorted and
    /// deduplicated; an empty list means "values only".
    pub fn new(grid: Arc<Grid>, spids: impl IntoIterator<Item = usize>) -> Request {
        let spids: Vec<usize> = spids.into_iter().sorted().dedup().collect();
        Request {
            id: RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)),
            grid,
            spids: spids.into(),
        }
    }

    /// A request for values only.
    pub fn values_only(grid: Arc<Grid>) -> Request {
        Request::new(grid, std::iter::empty())
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_arc(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// The derivative indices for which derivatives are wanted.
    pub fn spids(&self) -> &[usize] {
        &self.spids
    }

    pub fn wants_derivatives(&self) -> bool {
        !self.spids.is_empty()
    }

    pub fn wants(&self, spid: usize) -> bool {
        self.spids.binary_search(&spid).is_ok()
    }

    /// A new request over the same grid, with different derivative indices.
    pub fn with_spids(&self, spids: impl IntoIterator<Item = usize>) -> Request {
        Request::new(Arc::clone(&self.grid), spids)
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Request {}
