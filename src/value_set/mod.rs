// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Computed values over a [`Grid`](crate::grid::Grid).
//!
//! A [`ValueSet`] is what an expression node produces for a request: a dense
//! (time, frequency) array of [`Sample`]s, a flag per cell, and one derivative
//! array per derivative index that the value actually depends on. A missing
//! derivative array means the derivative is zero everywhere.

mod sample;

pub use sample::Sample;

use std::collections::BTreeMap;
use std::fmt;

use ndarray::prelude::*;

/// The kind of thing stored in each cell of a [`ValueSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A single complex number.
    Scalar,
    /// A small vector of (up to 4) numbers, e.g. UVW coordinates.
    Vector(usize),
    /// A 2x2 complex matrix, ordered [XX XY YX YY].
    Jones,
}

impl Shape {
    /// The number of [`Sample`] elements used by this shape.
    pub fn n_elements(self) -> usize {
        match self {
            Shape::Scalar => 1,
            Shape::Vector(n) => n,
            Shape::Jones => 4,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "scalar"),
            Shape::Vector(n) => write!(f, "vector({n})"),
            Shape::Jones => write!(f, "Jones matrix"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueSet {
    shape: Shape,

    /// The values of each (time, frequency) cell. Flagged cells hold zeros.
    values: Array2<Sample>,

    /// `true` means the cell is unavailable.
    flags: Array2<bool>,

    /// Derivative index -> derivative of `values` with respect to that
    /// coefficient.
    partials: BTreeMap<usize, Array2<Sample>>,

    /// Does this value depend on anything that changes between solver
    /// iterations?
    volatile: bool,
}

impl ValueSet {
    /// Create a new value set. Any values in flagged cells are zeroed.
    pub fn new(shape: Shape, mut values: Array2<Sample>, flags: Array2<bool>) -> ValueSet {
        assert_eq!(
            values.dim(),
            flags.dim(),
            "values and flags must have the same dimensions"
        );
        values
            .iter_mut()
            .zip(flags.iter())
            .filter(|(_, &f)| f)
            .for_each(|(v, _)| *v = Sample::default());
        ValueSet {
            shape,
            values,
            flags,
            partials: BTreeMap::new(),
            volatile: false,
        }
    }

    /// A value set where every cell has the same value.
    pub fn constant(shape: Shape, sample: Sample, dim: (usize, usize)) -> ValueSet {
        ValueSet::new(
            shape,
            Array2::from_elem(dim, sample),
            Array2::from_elem(dim, false),
        )
    }

    /// Attach a derivative array. The dimensions must match the values.
    pub fn with_partial(mut self, spid: usize, partial: Array2<Sample>) -> ValueSet {
        self.insert_partial(spid, partial);
        self
    }

    pub fn insert_partial(&mut self, spid: usize, mut partial: Array2<Sample>) {
        assert_eq!(
            partial.dim(),
            self.values.dim(),
            "partial derivatives must have the same dimensions as the values"
        );
        partial
            .iter_mut()
            .zip(self.flags.iter())
            .filter(|(_, &f)| f)
            .for_each(|(v, _)| *v = Sample::default());
        self.partials.insert(spid, partial);
    }

    pub fn with_volatile(mut self, volatile: bool) -> ValueSet {
        self.volatile = volatile;
        self
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// The (time, frequency) dimensions.
    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn values(&self) -> ArrayView2<Sample> {
        self.values.view()
    }

    pub fn flags(&self) -> ArrayView2<bool> {
        self.flags.view()
    }

    pub fn value(&self, i_time: usize, i_freq: usize) -> Sample {
        self.values[(i_time, i_freq)]
    }

    pub fn is_flagged(&self, i_time: usize, i_freq: usize) -> bool {
        self.flags[(i_time, i_freq)]
    }

    pub fn num_flagged(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }

    pub fn all_flagged(&self) -> bool {
        self.flags.iter().all(|&f| f)
    }

    /// Get the derivative with respect to `spid`, if this value depends on it.
    pub fn partial(&self, spid: usize) -> Option<ArrayView2<Sample>> {
        self.partials.get(&spid).map(|p| p.view())
    }

    /// The derivative of a single cell. Zero if this value doesn't depend on
    /// `spid`.
    pub fn partial_value(&self, spid: usize, i_time: usize, i_freq: usize) -> Sample {
        self.partials
            .get(&spid)
            .map(|p| p[(i_time, i_freq)])
            .unwrap_or_default()
    }

    /// The derivative indices this value depends on, in ascending order.
    pub fn spids(&self) -> impl Iterator<Item = usize> + '_ {
        self.partials.keys().copied()
    }

    pub fn partials(&self) -> impl Iterator<Item = (usize, ArrayView2<Sample>)> {
        self.partials.iter().map(|(&k, v)| (k, v.view()))
    }

    pub fn has_partials(&self) -> bool {
        !self.partials.is_empty()
    }

    pub fn is_volatile(&self) -> bool {
        self.volatile
    }
}
