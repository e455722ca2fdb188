// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameter storage.
//!
//! How parameters are persisted is not this crate's concern; anything that
//! can read and save [`Polc`]s per domain can be used through the [`ParmDb`]
//! trait. [`MemoryParmDb`] is a simple in-memory implementation.

use glob::Pattern;
use indexmap::IndexMap;
use log::trace;

use super::{ParmDbError, Polc};
use crate::grid::Domain;

pub trait ParmDb: Send {
    /// Read the coefficients of parameter `name` that apply to `domain`.
    fn read_polc(&self, name: &str, domain: &Domain) -> Result<Polc, ParmDbError>;

    /// Persist the coefficients of parameter `name`. The polc's own domain
    /// says where it is valid.
    fn save(&mut self, name: &str, polc: &Polc) -> Result<(), ParmDbError>;
}

/// An in-memory [`ParmDb`].
///
/// Stored polcs are looked up by name and domain. If nothing stored covers a
/// requested domain, the first default whose name pattern matches is used;
/// defaults are keyed by glob patterns (e.g. `Gain:11:Ampl:*`).
#[derive(Debug, Clone, Default)]
pub struct MemoryParmDb {
    values: IndexMap<String, Vec<Polc>>,
    defaults: Vec<(Pattern, Polc)>,
}

impl MemoryParmDb {
    pub fn new() -> MemoryParmDb {
        MemoryParmDb::default()
    }

    /// Add a default for all parameters matching `pattern`. Earlier defaults
    /// take precedence.
    pub fn set_default(&mut self, pattern: &str, polc: Polc) -> Result<(), ParmDbError> {
        let pattern = Pattern::new(pattern).map_err(|e| ParmDbError::Pattern {
            pattern: pattern.to_string(),
            err: e.to_string(),
        })?;
        self.defaults.push((pattern, polc));
        Ok(())
    }

    /// Add a constant default for all parameters matching `pattern`.
    pub fn set_default_value(&mut self, pattern: &str, value: f64) -> Result<(), ParmDbError> {
        self.set_default(pattern, Polc::constant(value))
    }

    /// All stored polcs for `name`.
    pub fn stored(&self, name: &str) -> &[Polc] {
        self.values.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|s| s.as_str())
    }
}

impl ParmDb for MemoryParmDb {
    fn read_polc(&self, name: &str, domain: &Domain) -> Result<Polc, ParmDbError> {
        // Prefer the most recently saved polc that covers the domain.
        if let Some(polc) = self
            .stored(name)
            .iter()
            .rev()
            .find(|p| p.domain().covers(domain))
        {
            trace!("Using stored value for '{name}'");
            return Ok(polc.clone());
        }

        self.defaults
            .iter()
            .find(|(pattern, _)| pattern.matches(name))
            .map(|(_, polc)| {
                trace!("Using default value for '{name}'");
                polc.clone().with_domain(*domain)
            })
            .ok_or_else(|| ParmDbError::NotFound(name.to_string()))
    }

    fn save(&mut self, name: &str, polc: &Polc) -> Result<(), ParmDbError> {
        let stored = self.values.entry(name.to_string()).or_default();
        match stored.iter_mut().find(|p| p.domain() == polc.domain()) {
            Some(existing) => *existing = polc.clone(),
            None => stored.push(polc.clone()),
        }
        Ok(())
    }
}
