// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The contents of a single (time, frequency) cell.

use std::ops::{Add, AddAssign, Index, IndexMut, Mul, Neg, Sub};

use marlu::{c64, Jones};

/// A fixed-size cell value. Scalars only use element 0, vectors use the first
/// `n` elements and Jones matrices use all 4 ([XX XY YX YY]). Unused elements
/// are always zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample(pub [c64; 4]);

impl Sample {
    pub fn zero() -> Sample {
        Sample::default()
    }

    pub fn scalar(c: c64) -> Sample {
        Sample([c, c64::default(), c64::default(), c64::default()])
    }

    pub fn real(re: f64) -> Sample {
        Sample::scalar(c64::new(re, 0.0))
    }

    /// A real-valued vector. Only the first 4 elements are used.
    pub fn vector(elements: &[f64]) -> Sample {
        let mut s = Sample::default();
        for (dst, &src) in s.0.iter_mut().zip(elements) {
            *dst = c64::new(src, 0.0);
        }
        s
    }

    pub fn jones(xx: c64, xy: c64, yx: c64, yy: c64) -> Sample {
        Sample([xx, xy, yx, yy])
    }

    pub fn identity() -> Sample {
        let one = c64::new(1.0, 0.0);
        let zero = c64::default();
        Sample([one, zero, zero, one])
    }

    /// Element 0.
    pub fn as_scalar(&self) -> c64 {
        self.0[0]
    }

    /// The real part of element `i`; handy for real vectors.
    pub fn re(&self, i: usize) -> f64 {
        self.0[i].re
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.re.is_finite() && c.im.is_finite())
    }

    /// Multiply every element by a complex scalar.
    pub fn scale(self, c: c64) -> Sample {
        Sample(self.0.map(|e| e * c))
    }

    /// The conjugate transpose of a Jones matrix.
    pub fn h(self) -> Sample {
        let [xx, xy, yx, yy] = self.0;
        Sample([xx.conj(), yx.conj(), xy.conj(), yy.conj()])
    }

    /// Element-wise complex conjugate.
    pub fn conj(self) -> Sample {
        Sample(self.0.map(|e| e.conj()))
    }

    /// The 2x2 matrix product of two Jones matrices.
    pub fn matmul(self, rhs: Sample) -> Sample {
        let [a0, a1, a2, a3] = self.0;
        let [b0, b1, b2, b3] = rhs.0;
        Sample([
            a0 * b0 + a1 * b2,
            a0 * b1 + a1 * b3,
            a2 * b0 + a3 * b2,
            a2 * b1 + a3 * b3,
        ])
    }

    /// The squared magnitude of every element, summed.
    pub fn norm_sqr(&self) -> f64 {
        self.0.iter().map(|c| c.norm_sqr()).sum()
    }
}

impl From<Jones<f64>> for Sample {
    fn from(j: Jones<f64>) -> Self {
        Sample([j[0], j[1], j[2], j[3]])
    }
}

impl From<Sample> for Jones<f64> {
    fn from(s: Sample) -> Self {
        Jones::from(s.0)
    }
}

impl Index<usize> for Sample {
    type Output = c64;

    fn index(&self, i: usize) -> &c64 {
        &self.0[i]
    }
}

impl IndexMut<usize> for Sample {
    fn index_mut(&mut self, i: usize) -> &mut c64 {
        &mut self.0[i]
    }
}

impl Add for Sample {
    type Output = Sample;

    fn add(self, rhs: Sample) -> Sample {
        let mut out = self;
        out += rhs;
        out
    }
}

impl AddAssign for Sample {
    fn add_assign(&mut self, rhs: Sample) {
        self.0.iter_mut().zip(rhs.0).for_each(|(a, b)| *a += b);
    }
}

impl Sub for Sample {
    type Output = Sample;

    fn sub(self, rhs: Sample) -> Sample {
        let mut out = self;
        out.0.iter_mut().zip(rhs.0).for_each(|(a, b)| *a -= b);
        out
    }
}

impl Neg for Sample {
    type Output = Sample;

    fn neg(self) -> Sample {
        Sample(self.0.map(|e| -e))
    }
}

impl Mul<f64> for Sample {
    type Output = Sample;

    fn mul(self, rhs: f64) -> Sample {
        Sample(self.0.map(|e| e * rhs))
    }
}
