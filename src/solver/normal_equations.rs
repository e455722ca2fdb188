// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Accumulating and solving the normal equations `JᵗJ δ = Jᵗr`.

use nalgebra::{DMatrix, DVector};

use crate::constants::{
    NULL_SPACE_COMPONENT_THRESHOLD, SINGULAR_DIAGONAL_THRESHOLD, SINGULAR_EIGENVALUE_THRESHOLD,
};

/// Iteration limit of the eigendecomposition used to find degenerate
/// unknowns.
const MAX_EIGEN_ITERATIONS: usize = 1000;

/// The unknowns that make a set of normal equations unsolvable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Singular {
    pub unknowns: Vec<usize>,
}

/// The normal equations of a linearised least-squares problem, built up one
/// real-valued equation (a row of the Jacobian and its residual) at a time.
/// Equations from disjoint sets of data can be accumulated separately and
/// merged.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEquations {
    /// JᵗJ
    a: DMatrix<f64>,
    /// Jᵗr
    b: DVector<f64>,
    /// Σ r²
    chi2: f64,
    n_equations: usize,
}

impl NormalEquations {
    pub fn new(n_unknowns: usize) -> NormalEquations {
        NormalEquations {
            a: DMatrix::zeros(n_unknowns, n_unknowns),
            b: DVector::zeros(n_unknowns),
            chi2: 0.0,
            n_equations: 0,
        }
    }

    pub fn n_unknowns(&self) -> usize {
        self.b.len()
    }

    pub fn n_equations(&self) -> usize {
        self.n_equations
    }

    /// The sum of the squared residuals of all equations.
    pub fn chi2(&self) -> f64 {
        self.chi2
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.b
    }

    /// Add one equation. `row` holds the non-zero Jacobian entries as
    /// (unknown, derivative) pairs; each unknown may appear at most once.
    pub fn add_equation(&mut self, row: &[(usize, f64)], residual: f64) {
        for &(i, d_i) in row {
            self.b[i] += d_i * residual;
            for &(j, d_j) in row {
                self.a[(i, j)] += d_i * d_j;
            }
        }
        self.chi2 += residual * residual;
        self.n_equations += 1;
    }

    pub fn merge(&mut self, other: &NormalEquations) {
        assert_eq!(self.n_unknowns(), other.n_unknowns());
        self.a += &other.a;
        self.b += &other.b;
        self.chi2 += other.chi2;
        self.n_equations += other.n_equations;
    }

    /// Unknowns that no equation is sensitive to.
    pub fn insensitive_unknowns(&self) -> Vec<usize> {
        self.a
            .diagonal()
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d <= SINGULAR_DIAGONAL_THRESHOLD)
            .map(|(i, _)| i)
            .collect()
    }

    /// Unknowns in the null space of JᵗJ: combinations of them can change
    /// without changing the fit, e.g. a phase common to every station. Only
    /// meaningful when there are no insensitive unknowns.
    ///
    /// JᵗJ is scaled to a unit diagonal first, so the threshold is relative
    /// and independent of the units of each unknown.
    pub fn degenerate_unknowns(&self) -> Vec<usize> {
        let n = self.n_unknowns();
        if n == 0 {
            return vec![];
        }
        let scale = self.a.diagonal().map(|d| 1.0 / d.sqrt());
        let scaled = DMatrix::from_fn(n, n, |i, j| self.a[(i, j)] * scale[i] * scale[j]);
        if scaled.iter().any(|x| !x.is_finite()) {
            return (0..n).collect();
        }
        let eigen = match scaled.try_symmetric_eigen(f64::EPSILON, MAX_EIGEN_ITERATIONS) {
            Some(e) => e,
            None => return (0..n).collect(),
        };

        let largest = eigen.eigenvalues.max();
        let mut degenerate = vec![false; n];
        for (k, &value) in eigen.eigenvalues.iter().enumerate() {
            if value > largest * SINGULAR_EIGENVALUE_THRESHOLD {
                continue;
            }
            for (i, c) in eigen.eigenvectors.column(k).iter().enumerate() {
                if c.abs() > NULL_SPACE_COMPONENT_THRESHOLD {
                    degenerate[i] = true;
                }
            }
        }
        degenerate
            .into_iter()
            .enumerate()
            .filter(|&(_, d)| d)
            .map(|(i, _)| i)
            .collect()
    }

    /// Solve `(JᵗJ + λ diag(JᵗJ)) δ = Jᵗr` for `δ`.
    ///
    /// Damping makes any JᵗJ with a positive diagonal invertible, so the rank
    /// of the undamped matrix is checked first.
    pub fn solve(&self, lambda: f64) -> Result<Vec<f64>, Singular> {
        let insensitive = self.insensitive_unknowns();
        if !insensitive.is_empty() {
            return Err(Singular {
                unknowns: insensitive,
            });
        }
        let degenerate = self.degenerate_unknowns();
        if !degenerate.is_empty() {
            return Err(Singular {
                unknowns: degenerate,
            });
        }

        let mut damped = self.a.clone();
        for i in 0..damped.nrows() {
            damped[(i, i)] *= 1.0 + lambda;
        }
        let cholesky = damped.cholesky().ok_or_else(|| Singular {
            unknowns: (0..self.n_unknowns()).collect(),
        })?;
        let step = cholesky.solve(&self.b);
        if step.iter().any(|x| !x.is_finite()) {
            return Err(Singular {
                unknowns: (0..self.n_unknowns()).collect(),
            });
        }
        Ok(step.iter().copied().collect())
    }
}
