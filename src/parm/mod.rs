// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Model parameters.
//!
//! Every named model parameter (a [`Parm`]) is a 2D polynomial over time and
//! frequency. When a parameter is solvable, each of its (unmasked)
//! coefficients gets a derivative index ("spid"); the derivative of the
//! parameter's value with respect to a coefficient is simply that
//! coefficient's basis function, so derivatives are exact.

mod error;
mod parmdb;
mod polc;
#[cfg(test)]
mod tests;

pub use error::{ParmDbError, ParmError};
pub use parmdb::{MemoryParmDb, ParmDb};
pub use polc::Polc;

use glob::Pattern;
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, trace};
use ndarray::prelude::*;

use crate::{
    grid::Domain,
    request::Request,
    value_set::{Sample, Shape, ValueSet},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Parm {
    name: String,
    polc: Polc,

    /// Which coefficients may be solved for. Defaults to all of them.
    solvable_mask: Vec<bool>,

    /// The derivative index of the first solvable coefficient, if this
    /// parameter is currently being solved for.
    spid_offset: Option<usize>,
}

impl Parm {
    pub fn new(name: impl Into<String>, polc: Polc) -> Parm {
        Parm {
            name: name.into(),
            solvable_mask: vec![true; polc.n_coeffs()],
            polc,
            spid_offset: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn polc(&self) -> &Polc {
        &self.polc
    }

    pub fn coefficients(&self) -> &[f64] {
        self.polc.coeffs()
    }

    /// Replace the coefficients. The number of coefficients can't change.
    pub fn update(&mut self, coeffs: &[f64]) -> Result<(), ParmError> {
        if coeffs.len() != self.polc.n_coeffs() {
            return Err(ParmError::CoefficientCount {
                name: self.name.clone(),
                expected: self.polc.n_coeffs(),
                got: coeffs.len(),
            });
        }
        if let Some(&value) = coeffs.iter().find(|c| !c.is_finite()) {
            return Err(ParmError::NonFiniteCoefficient {
                name: self.name.clone(),
                value,
            });
        }
        self.polc.coeffs_mut().copy_from_slice(coeffs);
        Ok(())
    }

    pub fn solvable_mask(&self) -> &[bool] {
        &self.solvable_mask
    }

    /// Restrict which coefficients may be solved for. Only takes effect the
    /// next time the solvable set is assigned.
    pub fn set_solvable_mask(&mut self, mask: Vec<bool>) -> Result<(), ParmError> {
        if mask.len() != self.polc.n_coeffs() {
            return Err(ParmError::CoefficientCount {
                name: self.name.clone(),
                expected: self.polc.n_coeffs(),
                got: mask.len(),
            });
        }
        self.solvable_mask = mask;
        Ok(())
    }

    pub fn is_solvable(&self) -> bool {
        self.spid_offset.is_some() && self.n_solvable() > 0
    }

    /// The number of coefficients that may be solved for.
    pub fn n_solvable(&self) -> usize {
        self.solvable_mask.iter().filter(|&&s| s).count()
    }

    /// (coefficient index, derivative index) pairs. Empty if this parameter
    /// isn't being solved for.
    pub fn spids(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let offset = self.spid_offset;
        self.solvable_mask
            .iter()
            .enumerate()
            .filter(|(_, &s)| s)
            .enumerate()
            .filter_map(move |(n, (k, _))| offset.map(|o| (k, o + n)))
    }

    /// Evaluate this parameter over the request's grid. Derivatives are
    /// attached for each of this parameter's derivative indices that the
    /// request asks for. Cells outside the validity domain are flagged.
    pub fn evaluate(&self, request: &Request) -> ValueSet {
        let grid = request.grid();
        let domain = self.polc.domain();
        let times = grid.time().centers().collect::<Vec<_>>();
        let freqs = grid.freq().centers().collect::<Vec<_>>();

        let flags = Array2::from_shape_fn(grid.shape(), |(i, j)| {
            !domain.contains(times[i], freqs[j])
        });
        let values = Array2::from_shape_fn(grid.shape(), |(i, j)| {
            Sample::real(self.polc.evaluate(times[i], freqs[j]))
        });

        let mut vs = ValueSet::new(Shape::Scalar, values, flags).with_volatile(self.is_solvable());
        for (k, spid) in self.spids().filter(|(_, spid)| request.wants(*spid)) {
            let partial = Array2::from_shape_fn(grid.shape(), |(i, j)| {
                Sample::real(self.polc.basis(k, times[i], freqs[j]))
            });
            vs.insert_partial(spid, partial);
        }
        vs
    }
}

/// The collection of all parameters used by a model, and the assignment of
/// derivative indices to the solvable ones.
#[derive(Debug, Clone, Default)]
pub struct ParmManager {
    parms: IndexMap<String, Parm>,
    n_solvable: usize,
}

impl ParmManager {
    pub fn new() -> ParmManager {
        ParmManager::default()
    }

    /// Read the named parameters for a domain out of a [`ParmDb`].
    pub fn load<S: AsRef<str>>(
        db: &dyn ParmDb,
        names: &[S],
        domain: &Domain,
    ) -> Result<ParmManager, ParmDbError> {
        let mut pm = ParmManager::new();
        for name in names.iter().map(|n| n.as_ref()).unique() {
            let polc = db.read_polc(name, domain)?;
            pm.add(Parm::new(name, polc))?;
        }
        debug!("Loaded {} parameters from the parameter database", pm.len());
        Ok(pm)
    }

    pub fn add(&mut self, parm: Parm) -> Result<(), ParmError> {
        if self.parms.contains_key(parm.name()) {
            return Err(ParmError::Duplicate(parm.name().to_string()));
        }
        self.parms.insert(parm.name().to_string(), parm);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.parms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parms.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parms.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&Parm, ParmError> {
        self.parms
            .get(name)
            .ok_or_else(|| ParmError::Unknown(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Parm, ParmError> {
        self.parms
            .get_mut(name)
            .ok_or_else(|| ParmError::Unknown(name.to_string()))
    }

    /// All parameters, in the order they were added.
    pub fn get_parms(&self) -> impl Iterator<Item = &Parm> {
        self.parms.values()
    }

    /// The parameters currently being solved for, in derivative-index order.
    pub fn get_solvable_parms(&self) -> Vec<&Parm> {
        self.parms
            .values()
            .filter(|p| p.is_solvable())
            .sorted_by_key(|p| p.spid_offset)
            .collect()
    }

    /// The total number of derivative indices currently assigned.
    pub fn n_solvable(&self) -> usize {
        self.n_solvable
    }

    /// Make exactly the named parameters solvable. Derivative indices
    /// `0..N` are assigned to their coefficients in name order, so that
    /// the columns of the normal equations are reproducible. Returns `N`.
    pub fn set_solvable_parms<S: AsRef<str>>(&mut self, names: &[S]) -> Result<usize, ParmError> {
        let names: Vec<&str> = names.iter().map(|n| n.as_ref()).sorted().dedup().collect();
        if let Some(missing) = names.iter().find(|n| !self.parms.contains_key(**n)) {
            return Err(ParmError::Unknown(missing.to_string()));
        }

        self.clear_solvable_parms();
        let mut next = 0;
        for name in names {
            if let Some(parm) = self.parms.get_mut(name) {
                parm.spid_offset = Some(next);
                trace!("Parameter '{name}' gets derivative indices from {next}");
                next += parm.n_solvable();
            }
        }
        self.n_solvable = next;
        debug!("{next} solvable coefficients");
        Ok(next)
    }

    pub fn clear_solvable_parms(&mut self) {
        for parm in self.parms.values_mut() {
            parm.spid_offset = None;
        }
        self.n_solvable = 0;
    }

    /// Resolve solvable-parameter name patterns (globs, e.g. `Gain:*`) into
    /// sorted parameter names. Names matching any exclusion pattern are
    /// dropped.
    pub fn select_solvable<S: AsRef<str>, T: AsRef<str>>(
        &self,
        solve_patterns: &[S],
        exclude_patterns: &[T],
    ) -> Result<Vec<String>, ParmError> {
        let compile = |p: &str| {
            Pattern::new(p).map_err(|e| ParmError::Pattern {
                pattern: p.to_string(),
                err: e.to_string(),
            })
        };
        let solve = solve_patterns
            .iter()
            .map(|p| compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude = exclude_patterns
            .iter()
            .map(|p| compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self
            .parms
            .keys()
            .filter(|name| solve.iter().any(|p| p.matches(name)))
            .filter(|name| !exclude.iter().any(|p| p.matches(name)))
            .sorted()
            .cloned()
            .collect())
    }

    /// A human-readable name for each derivative index.
    pub fn spid_names(&self) -> Vec<String> {
        let mut names = vec![String::new(); self.n_solvable];
        for parm in self.parms.values() {
            let n_freq = parm.polc.degree().1;
            let single = parm.polc.n_coeffs() == 1;
            for (k, spid) in parm.spids() {
                names[spid] = if single {
                    parm.name.clone()
                } else {
                    format!("{}[{},{}]", parm.name, k / n_freq, k % n_freq)
                };
            }
        }
        names
    }

    /// The current values of all solvable coefficients, indexed by
    /// derivative index.
    pub fn coefficients(&self) -> Vec<f64> {
        let mut coeffs = vec![0.0; self.n_solvable];
        for parm in self.parms.values() {
            for (k, spid) in parm.spids() {
                coeffs[spid] = parm.polc.coeffs()[k];
            }
        }
        coeffs
    }

    /// Set all solvable coefficients, indexed by derivative index (e.g. to
    /// undo a rejected solver step).
    pub fn restore(&mut self, coeffs: &[f64]) -> Result<(), ParmError> {
        self.apply(coeffs, |_, new| new)
    }

    /// Add a solution vector (indexed by derivative index) to the solvable
    /// coefficients.
    pub fn update_from_solution(&mut self, delta: &[f64]) -> Result<(), ParmError> {
        self.apply(delta, |old, d| old + d)
    }

    fn apply(&mut self, v: &[f64], f: impl Fn(f64, f64) -> f64) -> Result<(), ParmError> {
        if v.len() != self.n_solvable {
            return Err(ParmError::SolutionLength {
                expected: self.n_solvable,
                got: v.len(),
            });
        }
        if let Some(&value) = v.iter().find(|x| !x.is_finite()) {
            return Err(ParmError::NonFiniteCoefficient {
                name: "<solution>".to_string(),
                value,
            });
        }
        for parm in self.parms.values_mut() {
            let mut coeffs = parm.polc.coeffs().to_vec();
            let spids = parm.spids().collect::<Vec<_>>();
            for (k, spid) in spids {
                coeffs[k] = f(coeffs[k], v[spid]);
            }
            parm.update(&coeffs)?;
        }
        Ok(())
    }

    /// Write the solvable parameters to a [`ParmDb`]. Constant parameters
    /// are stored as valid for `domain`; higher-order polcs keep the domain
    /// their coefficients are normalised over.
    pub fn save(&self, db: &mut dyn ParmDb, domain: &Domain) -> Result<(), ParmDbError> {
        for parm in self.get_solvable_parms() {
            let polc = if parm.polc.n_coeffs() == 1 {
                parm.polc.clone().with_domain(*domain)
            } else {
                parm.polc.clone()
            };
            db.save(parm.name(), &polc)?;
        }
        Ok(())
    }
}
