// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all bbs_kernel-related errors.
//!
//! Every module has its own error type; [`KernelError`] wraps them all and
//! sorts them into the kinds of [`ErrorKind`], which say how a caller should
//! react.

use strum_macros::Display;
use thiserror::Error;

use crate::{
    calibrate::CalibrateError,
    config::ConfigError,
    expr::ExprError,
    expr_set::ExprSetError,
    grid::GridError,
    model::ModelError,
    parm::{ParmDbError, ParmError},
    solver::SolveError,
    vis::VisError,
};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Expressions or data with incompatible shapes. Fatal.
    ShapeMismatch,

    /// A parameter that doesn't exist or has no value. Fatal.
    UnknownParameter,

    /// There is no unflagged data to fit; the domain is skipped.
    UnavailableData,

    /// Some coefficients are unconstrained by the data; the domain is
    /// skipped.
    SingularNormalEquations,

    /// The solver stopped before converging; its parameters are the best
    /// found.
    ConvergenceFailure,

    /// Invalid configuration. Fatal.
    Config,

    Other,
}

impl ErrorKind {
    /// Should this stop a whole calibration run, rather than just the
    /// affected domain or baseline?
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::ShapeMismatch | ErrorKind::UnknownParameter | ErrorKind::Config
        )
    }
}

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("{0}")]
    Grid(#[from] GridError),

    #[error("{0}")]
    Expr(#[from] ExprError),

    #[error("{0}")]
    ExprSet(#[from] ExprSetError),

    #[error("{0}")]
    Parm(#[from] ParmError),

    #[error("{0}")]
    ParmDb(#[from] ParmDbError),

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("{0}")]
    Vis(#[from] VisError),

    #[error("{0}")]
    Solve(#[from] SolveError),

    #[error("{0}")]
    Calibrate(#[from] CalibrateError),

    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl KernelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::Grid(_) => ErrorKind::Other,
            KernelError::Expr(e) => expr_kind(e),
            KernelError::ExprSet(e) => expr_set_kind(e),
            KernelError::Parm(e) => parm_kind(e),
            KernelError::ParmDb(e) => parm_db_kind(e),
            KernelError::Model(e) => model_kind(e),
            KernelError::Vis(e) => vis_kind(e),
            KernelError::Solve(e) => solve_kind(e),
            KernelError::Calibrate(e) => calibrate_kind(e),
            KernelError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}

fn expr_kind(e: &ExprError) -> ErrorKind {
    match e {
        ExprError::ShapeMismatch { .. }
        | ExprError::ArgumentCount { .. }
        | ExprError::GridMismatch { .. } => ErrorKind::ShapeMismatch,
        ExprError::UnknownParameter(_) => ErrorKind::UnknownParameter,
    }
}

fn expr_set_kind(e: &ExprSetError) -> ErrorKind {
    match e {
        ExprSetError::LengthMismatch { .. } => ErrorKind::ShapeMismatch,
        ExprSetError::Expr(e) => expr_kind(e),
        ExprSetError::Parm(e) => parm_kind(e),
        ExprSetError::BaselineOutOfRange { .. } | ExprSetError::NoGrid => ErrorKind::Other,
    }
}

fn parm_kind(e: &ParmError) -> ErrorKind {
    match e {
        ParmError::Unknown(_) => ErrorKind::UnknownParameter,
        ParmError::Pattern { .. } => ErrorKind::Config,
        _ => ErrorKind::Other,
    }
}

fn parm_db_kind(e: &ParmDbError) -> ErrorKind {
    match e {
        ParmDbError::NotFound(_) => ErrorKind::UnknownParameter,
        ParmDbError::Pattern { .. } => ErrorKind::Config,
        ParmDbError::Parm(e) => parm_kind(e),
    }
}

fn model_kind(e: &ModelError) -> ErrorKind {
    match e {
        ModelError::ExprSet(e) => expr_set_kind(e),
        ModelError::ParmDb(e) => parm_db_kind(e),
        ModelError::StationOutOfRange { .. } => ErrorKind::ShapeMismatch,
        ModelError::NoStations
        | ModelError::NoSources
        | ModelError::DuplicateStation(_)
        | ModelError::DuplicateSource(_) => ErrorKind::Config,
    }
}

fn vis_kind(e: &VisError) -> ErrorKind {
    match e {
        VisError::BadShape { .. }
        | VisError::FlagShape { .. }
        | VisError::BaselineMismatch { .. }
        | VisError::GridMismatch { .. } => ErrorKind::ShapeMismatch,
        VisError::Grid(_) => ErrorKind::Other,
        VisError::ExprSet(e) => expr_set_kind(e),
    }
}

fn solve_kind(e: &SolveError) -> ErrorKind {
    match e {
        SolveError::NoUsableData => ErrorKind::UnavailableData,
        SolveError::SingularNormalEquations { .. } => ErrorKind::SingularNormalEquations,
        SolveError::NotConverged { .. } => ErrorKind::ConvergenceFailure,
        SolveError::NoSolvableParms => ErrorKind::Config,
        SolveError::Cancelled { .. } => ErrorKind::Other,
        SolveError::Evaluation { err, .. } => expr_kind(err),
        SolveError::ExprSet(e) => expr_set_kind(e),
        SolveError::Parm(e) => parm_kind(e),
        SolveError::Vis(e) => vis_kind(e),
    }
}

fn calibrate_kind(e: &CalibrateError) -> ErrorKind {
    match e {
        CalibrateError::Cancelled | CalibrateError::Poisoned | CalibrateError::Grid(_) => {
            ErrorKind::Other
        }
        CalibrateError::Config(_) => ErrorKind::Config,
        CalibrateError::Vis(e) => vis_kind(e),
        CalibrateError::Model(e) => model_kind(e),
        CalibrateError::Parm(e) => parm_kind(e),
        CalibrateError::ParmDb(e) => parm_db_kind(e),
        CalibrateError::Solve(e) => solve_kind(e),
    }
}
