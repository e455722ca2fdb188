// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all calibration-related errors.

use thiserror::Error;

use crate::{
    config::ConfigError,
    grid::GridError,
    model::ModelError,
    parm::{ParmDbError, ParmError},
    solver::SolveError,
    vis::VisError,
};

#[derive(Error, Debug)]
pub enum CalibrateError {
    #[error("Calibration was cancelled before this domain was started")]
    Cancelled,

    #[error("The parameter database lock was poisoned by a panicking thread")]
    Poisoned,

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Grid(#[from] GridError),

    #[error("{0}")]
    Vis(#[from] VisError),

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("{0}")]
    Parm(#[from] ParmError),

    #[error("{0}")]
    ParmDb(#[from] ParmDbError),

    #[error("{0}")]
    Solve(#[from] SolveError),
}
