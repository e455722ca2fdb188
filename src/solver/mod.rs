// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fitting solvable parameters to observed visibilities.
//!
//! The [`Solver`] is a Levenberg-Marquardt iteration over the states of
//! [`SolverState`]. Each iteration evaluates every baseline's model (with
//! derivatives for all solvable coefficients), accumulates the normal
//! equations from the unflagged cells and solves the damped equations for a
//! step.
//!
//! A step is judged by the chi² of the evaluation that follows it. If chi²
//! didn't increase, the step is kept and the damping factor is divided by
//! `lm_factor`; otherwise the coefficients are restored and the damping factor
//! is multiplied by `lm_factor`. Convergence is only declared right after an
//! accepted step, when the fraction of coefficients whose next update is
//! smaller than `epsilon` (relative to the coefficient, or absolute for
//! coefficients smaller than 1) reaches `min_converged`.

mod error;
mod normal_equations;

pub use error::SolveError;
pub use normal_equations::{NormalEquations, Singular};

use std::sync::Arc;

use crossbeam_utils::atomic::AtomicCell;
use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    constants::{
        DEFAULT_EPSILON, DEFAULT_LM_FACTOR, DEFAULT_LM_LAMBDA, DEFAULT_LM_MAX_LAMBDA,
        DEFAULT_MAX_ITER, DEFAULT_MIN_CONVERGED, LM_MIN_LAMBDA,
    },
    expr_set::ExprSet,
    value_set::ValueSet,
    vis::VisBuffer,
};

/// Which correlations of the visibilities are fitted.
#[derive(
    Debug,
    Display,
    EnumIter,
    EnumString,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
)]
#[allow(non_camel_case_types)]
pub enum Polarisations {
    #[default]
    XX_XY_YX_YY,
    XX_YY,
    XX_YY_XY,
    XX,
    YY,
}

impl Polarisations {
    /// The [`Sample`](crate::value_set::Sample) element indices of the
    /// correlations.
    pub fn indices(self) -> &'static [usize] {
        match self {
            Polarisations::XX_XY_YX_YY => &[0, 1, 2, 3],
            Polarisations::XX_YY => &[0, 3],
            Polarisations::XX_YY_XY => &[0, 1, 3],
            Polarisations::XX => &[0],
            Polarisations::YY => &[3],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverOptions {
    /// The maximum number of iterations.
    pub max_iter: u32,

    /// The relative update below which a coefficient is converged.
    pub epsilon: f64,

    /// The fraction of coefficients that must be converged, in (0, 1].
    pub min_converged: f64,

    /// The initial Levenberg-Marquardt damping factor.
    pub lm_lambda: f64,

    /// The damping factor is multiplied (divided) by this after a rejected
    /// (accepted) step. Must be larger than 1.
    pub lm_factor: f64,

    /// The fit is considered diverged if the damping factor exceeds this.
    pub lm_max_lambda: f64,

    pub polarisations: Polarisations,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            max_iter: DEFAULT_MAX_ITER,
            epsilon: DEFAULT_EPSILON,
            min_converged: DEFAULT_MIN_CONVERGED,
            lm_lambda: DEFAULT_LM_LAMBDA,
            lm_factor: DEFAULT_LM_FACTOR,
            lm_max_lambda: DEFAULT_LM_MAX_LAMBDA,
            polarisations: Polarisations::default(),
        }
    }
}

/// The states of a solve.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Init,
    Iterate,
    Evaluate,
    BuildNormalEquations,
    SolveStep,
    CheckConvergence,
    Converged,
    MaxIter,
    Diverged,
}

/// How a solve ended.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Converged,

    /// Stopped at the iteration limit; the parameters are the best found.
    MaxIter,

    /// The damping factor grew out of bounds or chi² became non-finite; the
    /// parameters are the best found, but shouldn't be trusted.
    Diverged,
}

impl SolveStatus {
    /// Should parameters from a solve with this status be saved?
    pub fn is_usable(self) -> bool {
        !matches!(self, SolveStatus::Diverged)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub iteration: u32,
    pub chi2: f64,
    pub lambda: f64,
    pub accepted: bool,
    pub converged_fraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub status: SolveStatus,
    pub iterations: u32,
    /// chi² at the starting coefficients.
    pub initial_chi2: f64,
    /// chi² at the final coefficients.
    pub chi2: f64,
    pub lambda: f64,
    pub converged_fraction: f64,
    /// The number of real-valued equations per iteration.
    pub n_equations: usize,
    pub n_unknowns: usize,
    pub history: Vec<IterationRecord>,
}

impl SolveReport {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }

    /// Turn anything but convergence into an error.
    pub fn require_converged(self) -> Result<SolveReport, SolveError> {
        if self.converged() {
            Ok(self)
        } else {
            Err(SolveError::NotConverged {
                status: self.status,
                iterations: self.iterations,
            })
        }
    }
}

/// The last accepted point of the fit.
struct Accepted {
    equations: NormalEquations,
    coeffs: Vec<f64>,
}

pub struct Solver<'a> {
    options: SolverOptions,
    cancel: Option<&'a AtomicCell<bool>>,
}

impl<'a> Solver<'a> {
    pub fn new(options: SolverOptions) -> Solver<'a> {
        Solver {
            options,
            cancel: None,
        }
    }

    /// Stop solving (with [`SolveError::Cancelled`]) when `flag` is set. The
    /// flag is checked between iterations.
    pub fn with_cancel(mut self, flag: &'a AtomicCell<bool>) -> Solver<'a> {
        self.cancel = Some(flag);
        self
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.map(|c| c.load()).unwrap_or(false)
    }

    /// Fit the named parameters of `set` to `vis`. On return, `set` holds the
    /// best coefficients found, whatever the status.
    pub fn solve<S: AsRef<str>>(
        &self,
        set: &mut ExprSet,
        vis: &VisBuffer,
        solvable: &[S],
    ) -> Result<SolveReport, SolveError> {
        let opts = &self.options;
        let mut state = SolverState::Init;
        let mut n_unknowns = 0;
        let mut iteration = 0;
        let mut lambda = opts.lm_lambda;
        let mut best: Option<Accepted> = None;
        let mut model: Vec<Arc<ValueSet>> = vec![];
        let mut chi2 = f64::NAN;
        let mut initial_chi2 = f64::NAN;
        let mut accepted = false;
        let mut step: Vec<f64> = vec![];
        let mut converged_fraction = 0.0;
        let mut history = vec![];

        let status = loop {
            trace!("Solver state: {state}");
            state = match state {
                SolverState::Init => {
                    n_unknowns = set.set_solvable_parms(solvable)?;
                    if n_unknowns == 0 {
                        return Err(SolveError::NoSolvableParms);
                    }
                    vis.check_alignment(set)?;
                    SolverState::Iterate
                }

                SolverState::Iterate => {
                    if self.is_cancelled() {
                        if let Some(b) = &best {
                            set.restore(&b.coeffs)?;
                        }
                        return Err(SolveError::Cancelled {
                            iterations: iteration,
                        });
                    }
                    if iteration >= opts.max_iter {
                        SolverState::MaxIter
                    } else {
                        iteration += 1;
                        set.new_iteration();
                        SolverState::Evaluate
                    }
                }

                SolverState::Evaluate => {
                    model = set
                        .evaluate_each()?
                        .into_iter()
                        .zip(set.baselines())
                        .map(|(result, &baseline)| {
                            result.map_err(|err| SolveError::Evaluation { baseline, err })
                        })
                        .collect::<Result<_, _>>()?;
                    SolverState::BuildNormalEquations
                }

                SolverState::BuildNormalEquations => {
                    let equations =
                        build_normal_equations(n_unknowns, &model, vis, opts.polarisations);
                    model.clear();
                    if equations.n_equations() == 0 {
                        return Err(SolveError::NoUsableData);
                    }
                    chi2 = equations.chi2();

                    let worse = best
                        .as_ref()
                        .map(|b| chi2 > b.equations.chi2())
                        .unwrap_or(false);
                    if !chi2.is_finite() {
                        SolverState::Diverged
                    } else if worse {
                        accepted = false;
                        lambda *= opts.lm_factor;
                        if let Some(b) = &best {
                            set.restore(&b.coeffs)?;
                        }
                        if lambda > opts.lm_max_lambda {
                            SolverState::Diverged
                        } else {
                            SolverState::SolveStep
                        }
                    } else {
                        if best.is_none() {
                            initial_chi2 = chi2;
                        } else {
                            lambda = (lambda / opts.lm_factor).max(LM_MIN_LAMBDA);
                        }
                        accepted = true;
                        best = Some(Accepted {
                            equations,
                            coeffs: set.coefficients(),
                        });
                        SolverState::SolveStep
                    }
                }

                SolverState::SolveStep => match &best {
                    Some(b) => {
                        step = b.equations.solve(lambda).map_err(|singular| {
                            let names = set.parms().spid_names();
                            SolveError::SingularNormalEquations {
                                names: singular
                                    .unknowns
                                    .into_iter()
                                    .filter_map(|i| names.get(i).cloned())
                                    .collect(),
                            }
                        })?;
                        SolverState::CheckConvergence
                    }
                    // Only reachable before anything has been evaluated.
                    None => SolverState::Iterate,
                },

                SolverState::CheckConvergence => {
                    let coeffs = best.as_ref().map(|b| b.coeffs.as_slice()).unwrap_or(&[]);
                    let n_converged = step
                        .iter()
                        .zip(coeffs)
                        .filter(|(d, p)| d.abs() <= opts.epsilon * p.abs().max(1.0))
                        .count();
                    converged_fraction = n_converged as f64 / n_unknowns as f64;

                    debug!(
                        "Iteration {iteration}: chi² = {chi2:.6e} ({}), λ = {lambda:.1e}, {:.1}% converged",
                        if accepted { "accepted" } else { "rejected" },
                        converged_fraction * 100.0
                    );
                    history.push(IterationRecord {
                        iteration,
                        chi2,
                        lambda,
                        accepted,
                        converged_fraction,
                    });

                    if accepted && converged_fraction >= opts.min_converged {
                        SolverState::Converged
                    } else {
                        set.apply_update(&step)?;
                        SolverState::Iterate
                    }
                }

                SolverState::Converged => break SolveStatus::Converged,
                SolverState::MaxIter => break SolveStatus::MaxIter,
                SolverState::Diverged => break SolveStatus::Diverged,
            };
        };

        // Trial coefficients may not have been evaluated, or may have been
        // worse than the best.
        let (final_chi2, n_equations) = match &best {
            Some(b) => {
                set.restore(&b.coeffs)?;
                (b.equations.chi2(), b.equations.n_equations())
            }
            None => (chi2, 0),
        };
        debug!("Solve finished after {iteration} iterations: {status}, chi² = {final_chi2:.6e}");

        Ok(SolveReport {
            status,
            iterations: iteration,
            initial_chi2,
            chi2: final_chi2,
            lambda,
            converged_fraction,
            n_equations,
            n_unknowns,
            history,
        })
    }
}

/// Accumulate the normal equations of the residuals `vis - model`. Cells
/// flagged in either are skipped. Each complex residual gives two real
/// equations.
pub fn build_normal_equations(
    n_unknowns: usize,
    model: &[Arc<ValueSet>],
    vis: &VisBuffer,
    pols: Polarisations,
) -> NormalEquations {
    model
        .par_iter()
        .enumerate()
        .fold(
            || NormalEquations::new(n_unknowns),
            |mut equations, (i_bl, model)| {
                let data = vis.baseline_data(i_bl);
                let flags = vis.baseline_flags(i_bl);
                let partials: Vec<_> = model.partials().collect();
                let mut row_re = Vec::with_capacity(partials.len());
                let mut row_im = Vec::with_capacity(partials.len());

                for ((i_time, i_freq), &model_flagged) in model.flags().indexed_iter() {
                    if model_flagged || flags[(i_time, i_freq)] {
                        continue;
                    }
                    let residual = data[(i_time, i_freq)] - model.value(i_time, i_freq);
                    for &pol in pols.indices() {
                        row_re.clear();
                        row_im.clear();
                        for (spid, partial) in &partials {
                            let d = partial[(i_time, i_freq)][pol];
                            row_re.push((*spid, d.re));
                            row_im.push((*spid, d.im));
                        }
                        equations.add_equation(&row_re, residual[pol].re);
                        equations.add_equation(&row_im, residual[pol].im);
                    }
                }
                equations
            },
        )
        .reduce(
            || NormalEquations::new(n_unknowns),
            |mut a, b| {
                a.merge(&b);
                a
            },
        )
}
