// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The per-baseline model expressions of a calibration domain.

mod error;
#[cfg(test)]
mod tests;

pub use error::ExprSetError;

use std::fmt;
use std::sync::Arc;

use log::{debug, trace};
use rayon::prelude::*;

use crate::{
    cache::{CachePolicy, CacheStats},
    expr::{count_nodes, parm_names, ExprError, ExprRef, SolveContext},
    grid::{Domain, Grid},
    parm::{ParmError, ParmManager},
    request::Request,
    value_set::ValueSet,
};

/// A pair of station indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Baseline(pub usize, pub usize);

impl fmt::Display for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

/// One expression per baseline, all sharing one set of parameters, one cache
/// and one evaluation grid.
///
/// The request that expressions are evaluated for only changes when the grid
/// or the set of solvable parameters changes, so results that don't depend
/// on solvable parameters stay cached across solver iterations. Changing the
/// values of the solvable parameters only discards volatile results.
#[derive(Debug)]
pub struct ExprSet {
    baselines: Vec<Baseline>,
    roots: Vec<ExprRef>,
    ctx: SolveContext,
    request: Option<Request>,
}

impl ExprSet {
    /// All parameters referenced by `roots` must be present in `parms`.
    pub fn new(
        baselines: Vec<Baseline>,
        roots: Vec<ExprRef>,
        parms: ParmManager,
    ) -> Result<ExprSet, ExprSetError> {
        if baselines.len() != roots.len() {
            return Err(ExprSetError::LengthMismatch {
                baselines: baselines.len(),
                roots: roots.len(),
            });
        }
        if let Some(missing) = parm_names(&roots).into_iter().find(|n| !parms.contains(n)) {
            return Err(ExprError::UnknownParameter(missing).into());
        }
        debug!(
            "Expression set with {} baselines, {} distinct nodes and {} parameters",
            roots.len(),
            count_nodes(&roots),
            parms.len()
        );
        Ok(ExprSet {
            baselines,
            roots,
            ctx: SolveContext::new(parms),
            request: None,
        })
    }

    /// The number of baselines.
    pub fn size(&self) -> usize {
        self.roots.len()
    }

    pub fn baselines(&self) -> &[Baseline] {
        &self.baselines
    }

    pub fn root(&self, i: usize) -> Option<&ExprRef> {
        self.roots.get(i)
    }

    /// The names of all parameters referenced by the expressions.
    pub fn parm_names(&self) -> Vec<String> {
        parm_names(&self.roots)
    }

    pub fn parms(&self) -> &ParmManager {
        self.ctx.parms()
    }

    pub fn into_parms(self) -> ParmManager {
        self.ctx.into_parms()
    }

    pub fn context(&self) -> &SolveContext {
        &self.ctx
    }

    pub fn grid(&self) -> Option<&Arc<Grid>> {
        self.request.as_ref().map(|r| r.grid_arc())
    }

    /// The time-frequency extent of the current grid.
    pub fn domain(&self) -> Option<Domain> {
        self.grid().map(|g| g.domain())
    }

    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// Evaluate over a new grid. Volatile results are discarded, as is
    /// anything computed for the previous grid.
    pub fn set_eval_grid(&mut self, grid: Arc<Grid>) {
        let n = self.ctx.parms().n_solvable();
        let (n_time, n_freq) = grid.shape();
        let request = Request::new(grid, 0..n);
        debug!(
            "New evaluation grid ({n_time} times x {n_freq} channels), request {}",
            request.id()
        );
        self.ctx.cache().clear_policy(CachePolicy::Volatile);
        self.ctx.cache().evict_stale(request.id());
        self.request = Some(request);
    }

    /// Make the named parameters solvable. Which results are volatile
    /// depends on this, so the cache is cleared and a new request is made.
    /// Returns the number of derivative indices.
    pub fn set_solvable_parms<S: AsRef<str>>(&mut self, names: &[S]) -> Result<usize, ExprSetError> {
        let n = self.ctx.parms_mut().set_solvable_parms(names)?;
        self.reset_request();
        Ok(n)
    }

    pub fn clear_solvable_parms(&mut self) {
        self.ctx.parms_mut().clear_solvable_parms();
        self.reset_request();
    }

    fn reset_request(&mut self) {
        self.ctx.cache().clear();
        let n = self.ctx.parms().n_solvable();
        if let Some(request) = self.request.as_mut() {
            *request = request.with_spids(0..n);
            trace!("Solvable set changed; new request {}", request.id());
        }
    }

    /// Discard results that depend on solvable parameters.
    pub fn new_iteration(&self) {
        self.ctx.cache().clear_policy(CachePolicy::Volatile);
    }

    /// The values of the solvable coefficients, by derivative index.
    pub fn coefficients(&self) -> Vec<f64> {
        self.ctx.parms().coefficients()
    }

    /// Add a solution vector to the solvable coefficients.
    pub fn apply_update(&mut self, delta: &[f64]) -> Result<(), ParmError> {
        self.ctx.parms_mut().update_from_solution(delta)?;
        self.new_iteration();
        Ok(())
    }

    /// Set the solvable coefficients.
    pub fn restore(&mut self, coeffs: &[f64]) -> Result<(), ParmError> {
        self.ctx.parms_mut().restore(coeffs)?;
        self.new_iteration();
        Ok(())
    }

    /// Evaluate baseline `i` for the current request.
    pub fn evaluate(&self, i: usize) -> Result<Arc<ValueSet>, ExprSetError> {
        let request = self.request.as_ref().ok_or(ExprSetError::NoGrid)?;
        let root = self
            .roots
            .get(i)
            .ok_or(ExprSetError::BaselineOutOfRange {
                index: i,
                size: self.size(),
            })?;
        Ok(self.ctx.evaluate(root.as_ref(), request)?)
    }

    /// Evaluate every baseline in parallel. A failing baseline doesn't stop
    /// the others from being evaluated.
    pub fn evaluate_each(&self) -> Result<Vec<Result<Arc<ValueSet>, ExprError>>, ExprSetError> {
        let request = self.request.as_ref().ok_or(ExprSetError::NoGrid)?;
        Ok(self
            .roots
            .par_iter()
            .map(|root| self.ctx.evaluate(root.as_ref(), request))
            .collect())
    }

    /// Evaluate every baseline in parallel, failing on the first error.
    pub fn evaluate_all(&self) -> Result<Vec<Arc<ValueSet>>, ExprSetError> {
        let request = self.request.as_ref().ok_or(ExprSetError::NoGrid)?;
        let results = self
            .roots
            .par_iter()
            .map(|root| self.ctx.evaluate(root.as_ref(), request))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.ctx.cache().stats()
    }
}
