// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Polynomial coefficients ("polcs").

use serde::{Deserialize, Serialize};

use super::ParmError;
use crate::grid::Domain;

/// A 2D polynomial in (time, frequency) valid over a [`Domain`].
///
/// Coordinates are normalised to `[0, 1]` over the domain, and coefficient
/// `(i, j)` multiplies `x^i y^j`, where `x` is normalised time and `y` is
/// normalised frequency. Coefficients are stored time-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polc {
    domain: Domain,
    n_time: usize,
    n_freq: usize,
    coeffs: Vec<f64>,
}

impl Polc {
    /// Create a polc with `n_time` coefficients along time and `n_freq`
    /// along frequency.
    pub fn new(
        domain: Domain,
        n_time: usize,
        n_freq: usize,
        coeffs: Vec<f64>,
    ) -> Result<Polc, ParmError> {
        if n_time == 0 || n_freq == 0 {
            return Err(ParmError::EmptyPolc);
        }
        if coeffs.len() != n_time * n_freq {
            return Err(ParmError::CoefficientCount {
                name: "<polc>".to_string(),
                expected: n_time * n_freq,
                got: coeffs.len(),
            });
        }
        Ok(Polc {
            domain,
            n_time,
            n_freq,
            coeffs,
        })
    }

    /// A constant valid everywhere.
    pub fn constant(value: f64) -> Polc {
        Polc {
            domain: Domain::unbounded(),
            n_time: 1,
            n_freq: 1,
            coeffs: vec![value],
        }
    }

    /// The same coefficients, valid over a different domain.
    pub fn with_domain(mut self, domain: Domain) -> Polc {
        self.domain = domain;
        self
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// The number of coefficients along (time, frequency).
    pub fn degree(&self) -> (usize, usize) {
        (self.n_time, self.n_freq)
    }

    pub fn n_coeffs(&self) -> usize {
        self.coeffs.len()
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    pub(super) fn coeffs_mut(&mut self) -> &mut [f64] {
        &mut self.coeffs
    }

    /// Map (time, frequency) to normalised coordinates. An axis with an
    /// unbounded or zero-width domain contributes a coordinate of 0.
    pub fn normalise(&self, time: f64, freq: f64) -> (f64, f64) {
        fn norm(v: f64, start: f64, end: f64) -> f64 {
            let width = end - start;
            if width.is_finite() && width > 0.0 {
                (v - start) / width
            } else {
                0.0
            }
        }
        (
            norm(time, self.domain.time_start, self.domain.time_end),
            norm(freq, self.domain.freq_start, self.domain.freq_end),
        )
    }

    /// The value of the basis function for coefficient `k` at (time,
    /// frequency). This is exactly the derivative of [`Polc::evaluate`] with
    /// respect to coefficient `k`.
    pub fn basis(&self, k: usize, time: f64, freq: f64) -> f64 {
        let (x, y) = self.normalise(time, freq);
        let (i, j) = (k / self.n_freq, k % self.n_freq);
        x.powi(i as i32) * y.powi(j as i32)
    }

    pub fn evaluate(&self, time: f64, freq: f64) -> f64 {
        let (x, y) = self.normalise(time, freq);
        // Horner's method along both axes.
        let mut result = 0.0;
        for i in (0..self.n_time).rev() {
            let mut row = 0.0;
            for j in (0..self.n_freq).rev() {
                row = row * y + self.coeffs[i * self.n_freq + j];
            }
            result = result * x + row;
        }
        result
    }
}
