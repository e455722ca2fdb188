// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with observed visibilities.

use thiserror::Error;

use crate::{expr_set::ExprSetError, grid::GridError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VisError {
    #[error("Visibility array has shape {got:?}, but the grid and baselines require {expected:?} (time, freq, baseline)")]
    BadShape {
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    #[error("Visibilities and flags have different shapes: {data:?} vs. {flags:?}")]
    FlagShape {
        data: (usize, usize, usize),
        flags: (usize, usize, usize),
    },

    #[error("The visibilities have {vis} baselines but the model has {model}")]
    BaselineMismatch { vis: usize, model: usize },

    #[error("The visibilities' grid ({vis_time} times x {vis_freq} channels) doesn't match the model's ({model_time} x {model_freq})")]
    GridMismatch {
        vis_time: usize,
        vis_freq: usize,
        model_time: usize,
        model_freq: usize,
    },

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    ExprSet(#[from] ExprSetError),
}
