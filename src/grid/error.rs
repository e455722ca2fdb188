// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with grids and axes.

use thiserror::Error;

use super::AxisKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("An axis must have at least one cell")]
    Empty,

    #[error("Axis edge {index} ({value}) is not finite")]
    NonFinite { index: usize, value: f64 },

    #[error("Axis edges must be strictly increasing, but edge {index} ({value}) is not larger than its predecessor ({previous})")]
    NotIncreasing {
        index: usize,
        value: f64,
        previous: f64,
    },

    #[error("Axis cells {index} and {} are not boundary-continuous: upper edge {upper} != lower edge {lower}", index + 1)]
    Discontinuous { index: usize, upper: f64, lower: f64 },

    #[error("Got {centers} cell centres but {widths} cell widths")]
    LengthMismatch { centers: usize, widths: usize },

    #[error("Invalid cell range {start}..={end} for an axis with {size} cells")]
    InvalidRange {
        start: usize,
        end: usize,
        size: usize,
    },

    #[error("Can't merge grids along {merged}; their other axes differ")]
    AxisMismatch { merged: AxisKind },

    #[error("A compression factor of 0 is not permitted")]
    ZeroFactor,

    #[error("Compression ranges must tile all {size} cells of the axis in order")]
    InvalidCompressRanges { size: usize },

    #[error("Domain sizes must be positive, but got {0}")]
    InvalidDomainSize(f64),
}
