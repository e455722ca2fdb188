// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Time-frequency grids.
//!
//! A [`Grid`] is made of two [`Axis`]es, time and frequency. Each axis is a
//! sequence of cells with a centre and width; cells need not be regular (e.g.
//! after compressing flagged or duplicate cells), but they are always
//! boundary-continuous. To guarantee this, an [`Axis`] is stored as its cell
//! edges rather than as centres and widths.

mod error;

pub use error::GridError;

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Two cell boundaries are considered equal if they differ by less than this
/// fraction of the cell width.
const CONTINUITY_TOLERANCE: f64 = 1e-9;

static NEXT_GRID_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Display, EnumIter, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisKind {
    #[strum(serialize = "time")]
    Time,
    #[strum(serialize = "frequency")]
    Freq,
}

/// A single axis of a [`Grid`].
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    /// The cell boundaries. There is always one more edge than cells, and the
    /// edges are strictly increasing.
    edges: Vec<f64>,
}

impl Axis {
    /// Create an axis from its cell edges. `edges` must have at least two
    /// elements and must be strictly increasing.
    pub fn from_edges(edges: Vec<f64>) -> Result<Axis, GridError> {
        if edges.len() < 2 {
            return Err(GridError::Empty);
        }
        for (i, &e) in edges.iter().enumerate() {
            if !e.is_finite() {
                return Err(GridError::NonFinite { index: i, value: e });
            }
        }
        for (i, w) in edges.windows(2).enumerate() {
            if w[1] <= w[0] {
                return Err(GridError::NotIncreasing {
                    index: i + 1,
                    value: w[1],
                    previous: w[0],
                });
            }
        }
        Ok(Axis { edges })
    }

    /// Create a regular axis with `n` cells of width `width`, the first cell
    /// starting at `start`.
    pub fn regular(start: f64, width: f64, n: usize) -> Result<Axis, GridError> {
        if n == 0 {
            return Err(GridError::Empty);
        }
        Axis::from_edges((0..=n).map(|i| start + i as f64 * width).collect())
    }

    /// Create an axis from cell centres and widths. Neighbouring cells must
    /// touch; a gap or overlap is a [`GridError::Discontinuous`] error.
    pub fn from_centers_widths(centers: &[f64], widths: &[f64]) -> Result<Axis, GridError> {
        if centers.len() != widths.len() {
            return Err(GridError::LengthMismatch {
                centers: centers.len(),
                widths: widths.len(),
            });
        }
        if centers.is_empty() {
            return Err(GridError::Empty);
        }

        let mut edges = Vec::with_capacity(centers.len() + 1);
        edges.push(centers[0] - widths[0] / 2.0);
        for (i, (&c, &w)) in centers.iter().zip(widths.iter()).enumerate() {
            let lower = c - w / 2.0;
            let upper = c + w / 2.0;
            let previous_upper = edges[i];
            if i > 0 && (lower - previous_upper).abs() > CONTINUITY_TOLERANCE * w.abs() {
                return Err(GridError::Discontinuous {
                    index: i - 1,
                    upper: previous_upper,
                    lower,
                });
            }
            edges.push(upper);
        }
        Axis::from_edges(edges)
    }

    /// The number of cells.
    pub fn size(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn lower(&self, i: usize) -> f64 {
        self.edges[i]
    }

    pub fn upper(&self, i: usize) -> f64 {
        self.edges[i + 1]
    }

    pub fn center(&self, i: usize) -> f64 {
        0.5 * (self.edges[i] + self.edges[i + 1])
    }

    pub fn width(&self, i: usize) -> f64 {
        self.edges[i + 1] - self.edges[i]
    }

    /// The lower edge of the first cell.
    pub fn start(&self) -> f64 {
        self.edges[0]
    }

    /// The upper edge of the last cell.
    pub fn end(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn centers(&self) -> impl Iterator<Item = f64> + '_ {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1]))
    }

    /// Are all cells the same width?
    pub fn is_regular(&self) -> bool {
        let w0 = self.width(0);
        (1..self.size()).all(|i| (self.width(i) - w0).abs() <= CONTINUITY_TOLERANCE * w0)
    }

    /// Get the index of the cell containing `x`, if any. A value on the
    /// boundary between two cells belongs to the upper cell.
    pub fn locate(&self, x: f64) -> Option<usize> {
        if x < self.start() || x > self.end() {
            return None;
        }
        // `partition_point` gives the number of edges <= x.
        let i = self.edges.partition_point(|&e| e <= x);
        Some(i.saturating_sub(1).min(self.size() - 1))
    }

    /// Get a view of the cells `i0..=i1`.
    pub fn subset(&self, i0: usize, i1: usize) -> Result<Axis, GridError> {
        if i0 > i1 || i1 >= self.size() {
            return Err(GridError::InvalidRange {
                start: i0,
                end: i1,
                size: self.size(),
            });
        }
        Ok(Axis {
            edges: self.edges[i0..=i1 + 1].to_vec(),
        })
    }

    /// Append the cells of `other` to this axis. `other` must start exactly
    /// where this axis ends.
    pub fn merge(&self, other: &Axis) -> Result<Axis, GridError> {
        let upper = self.end();
        let lower = other.start();
        if (upper - lower).abs() > CONTINUITY_TOLERANCE * self.width(self.size() - 1) {
            return Err(GridError::Discontinuous {
                index: self.size() - 1,
                upper,
                lower,
            });
        }
        let mut edges = self.edges.clone();
        edges.extend_from_slice(&other.edges[1..]);
        Axis::from_edges(edges)
    }

    /// Coalesce every `factor` cells into one. The last cell may be made of
    /// fewer cells.
    pub fn compress(&self, factor: usize) -> Result<(Axis, AxisMapping), GridError> {
        if factor == 0 {
            return Err(GridError::ZeroFactor);
        }
        let n = self.size();
        let ranges = (0..n)
            .step_by(factor)
            .map(|i0| i0..(i0 + factor).min(n))
            .collect::<Vec<_>>();
        self.compress_ranges(&ranges)
    }

    /// Coalesce the cells in each of `ranges` into a single cell. The ranges
    /// must be non-empty, in order and cover every cell exactly once.
    pub fn compress_ranges(&self, ranges: &[Range<usize>]) -> Result<(Axis, AxisMapping), GridError> {
        let size = self.size();
        let mut expected_start = 0;
        for r in ranges {
            if r.start != expected_start || r.is_empty() {
                return Err(GridError::InvalidCompressRanges { size });
            }
            expected_start = r.end;
        }
        if expected_start != size {
            return Err(GridError::InvalidCompressRanges { size });
        }

        let mut edges = Vec::with_capacity(ranges.len() + 1);
        edges.push(self.start());
        edges.extend(ranges.iter().map(|r| self.edges[r.end]));
        Ok((
            Axis::from_edges(edges)?,
            AxisMapping {
                groups: ranges.to_vec(),
            },
        ))
    }

    /// Split the axis into consecutive chunks of cells, each spanning at most
    /// `size` (but always at least one cell). A `size` of `None` yields a
    /// single chunk.
    pub fn split(&self, size: Option<f64>) -> Result<Vec<Range<usize>>, GridError> {
        let size = match size {
            None => return Ok(vec![0..self.size()]),
            Some(s) if s > 0.0 => s,
            Some(s) => return Err(GridError::InvalidDomainSize(s)),
        };

        let mut chunks = vec![];
        let mut start = 0;
        while start < self.size() {
            let chunk_lower = self.lower(start);
            let mut end = start + 1;
            while end < self.size()
                && self.upper(end) - chunk_lower <= size * (1.0 + CONTINUITY_TOLERANCE)
            {
                end += 1;
            }
            chunks.push(start..end);
            start = end;
        }
        Ok(chunks)
    }
}

/// How the cells of a compressed axis relate to the original axis. New cell
/// `i` is made of the original cells `groups[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisMapping {
    pub groups: Vec<Range<usize>>,
}

impl AxisMapping {
    /// The identity mapping for an axis with `n` cells.
    pub fn identity(n: usize) -> AxisMapping {
        AxisMapping {
            groups: (0..n).map(|i| i..i + 1).collect(),
        }
    }

    /// The number of cells after compression.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Get the compressed cell index of an original cell.
    pub fn new_index(&self, old: usize) -> Option<usize> {
        let i = self.groups.partition_point(|r| r.end <= old);
        self.groups.get(i).filter(|r| r.contains(&old)).map(|_| i)
    }
}

/// A unique identity for a constructed [`Grid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridId(u64);

/// A time-frequency grid. Times are GPS seconds, frequencies are Hz.
#[derive(Debug, Clone)]
pub struct Grid {
    id: GridId,
    time: Axis,
    freq: Axis,
}

impl PartialEq for Grid {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.freq == other.freq
    }
}

impl Grid {
    pub fn new(time: Axis, freq: Axis) -> Grid {
        Grid {
            id: GridId(NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed)),
            time,
            freq,
        }
    }

    pub fn id(&self) -> GridId {
        self.id
    }

    pub fn time(&self) -> &Axis {
        &self.time
    }

    pub fn freq(&self) -> &Axis {
        &self.freq
    }

    pub fn axis(&self, kind: AxisKind) -> &Axis {
        match kind {
            AxisKind::Time => &self.time,
            AxisKind::Freq => &self.freq,
        }
    }

    pub fn size(&self, kind: AxisKind) -> usize {
        self.axis(kind).size()
    }

    pub fn center(&self, kind: AxisKind, i: usize) -> f64 {
        self.axis(kind).center(i)
    }

    pub fn width(&self, kind: AxisKind, i: usize) -> f64 {
        self.axis(kind).width(i)
    }

    /// The number of (time, frequency) cells.
    pub fn shape(&self) -> (usize, usize) {
        (self.time.size(), self.freq.size())
    }

    pub fn num_cells(&self) -> usize {
        self.time.size() * self.freq.size()
    }

    /// The time-frequency extent covered by this grid.
    pub fn domain(&self) -> Domain {
        Domain {
            time_start: self.time.start(),
            time_end: self.time.end(),
            freq_start: self.freq.start(),
            freq_end: self.freq.end(),
        }
    }

    /// Get the sub-grid made of the given (exclusive) cell ranges.
    pub fn subset(
        &self,
        time_range: Range<usize>,
        freq_range: Range<usize>,
    ) -> Result<Grid, GridError> {
        let subset = |axis: &Axis, r: Range<usize>| {
            if r.is_empty() {
                return Err(GridError::InvalidRange {
                    start: r.start,
                    end: r.end,
                    size: axis.size(),
                });
            }
            axis.subset(r.start, r.end - 1)
        };
        Ok(Grid::new(
            subset(&self.time, time_range)?,
            subset(&self.freq, freq_range)?,
        ))
    }

    /// Split this grid into calibration domains. The returned cell ranges are
    /// ordered by time first, then frequency.
    pub fn split(&self, size: &DomainSize) -> Result<Vec<DomainRanges>, GridError> {
        let time_chunks = self.time.split(size.time_interval)?;
        let freq_chunks = self.freq.split(size.band_width)?;
        let mut out = Vec::with_capacity(time_chunks.len() * freq_chunks.len());
        for time in &time_chunks {
            for freq in &freq_chunks {
                out.push(DomainRanges {
                    time: time.clone(),
                    freq: freq.clone(),
                });
            }
        }
        Ok(out)
    }

    /// Append the cells of `other` along one axis. The other axis of both
    /// grids must be the same, and `other` must start where this grid ends.
    pub fn merge(&self, other: &Grid, kind: AxisKind) -> Result<Grid, GridError> {
        let (time, freq) = match kind {
            AxisKind::Time => (self.time.merge(&other.time)?, self.freq.clone()),
            AxisKind::Freq => (self.time.clone(), self.freq.merge(&other.freq)?),
        };
        let (mine, theirs) = match kind {
            AxisKind::Time => (&self.freq, &other.freq),
            AxisKind::Freq => (&self.time, &other.time),
        };
        if mine != theirs {
            return Err(GridError::AxisMismatch { merged: kind });
        }
        Ok(Grid::new(time, freq))
    }

    /// Coalesce cells along both axes.
    pub fn compress(
        &self,
        time_factor: usize,
        freq_factor: usize,
    ) -> Result<(Grid, AxisMapping, AxisMapping), GridError> {
        let (time, time_map) = self.time.compress(time_factor)?;
        let (freq, freq_map) = self.freq.compress(freq_factor)?;
        Ok((Grid::new(time, freq), time_map, freq_map))
    }
}

/// The cell ranges of one calibration domain within a larger [`Grid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRanges {
    pub time: Range<usize>,
    pub freq: Range<usize>,
}

/// A bounded time-frequency region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    /// \[GPS seconds\]
    pub time_start: f64,
    /// \[GPS seconds\]
    pub time_end: f64,
    /// \[Hz\]
    pub freq_start: f64,
    /// \[Hz\]
    pub freq_end: f64,
}

impl Domain {
    /// A domain covering everything.
    pub fn unbounded() -> Domain {
        Domain {
            time_start: f64::NEG_INFINITY,
            time_end: f64::INFINITY,
            freq_start: f64::NEG_INFINITY,
            freq_end: f64::INFINITY,
        }
    }

    pub fn contains(&self, time: f64, freq: f64) -> bool {
        (self.time_start..=self.time_end).contains(&time)
            && (self.freq_start..=self.freq_end).contains(&freq)
    }

    /// Does `other` lie entirely within this domain?
    pub fn covers(&self, other: &Domain) -> bool {
        self.time_start <= other.time_start
            && self.time_end >= other.time_end
            && self.freq_start <= other.freq_start
            && self.freq_end >= other.freq_end
    }

    pub fn overlaps(&self, other: &Domain) -> bool {
        self.time_start < other.time_end
            && other.time_start < self.time_end
            && self.freq_start < other.freq_end
            && other.freq_start < self.freq_end
    }

    pub fn time_width(&self) -> f64 {
        self.time_end - self.time_start
    }

    pub fn freq_width(&self) -> f64 {
        self.freq_end - self.freq_start
    }
}

/// The size of the calibration domains an observation is chunked into. `None`
/// means "don't chunk along this axis".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainSize {
    /// \[Hz\]
    #[serde(default)]
    pub band_width: Option<f64>,
    /// \[s\]
    #[serde(default)]
    pub time_interval: Option<f64>,
}
