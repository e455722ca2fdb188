// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with parameters and their storage.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParmError {
    #[error("Unknown parameter '{0}'")]
    Unknown(String),

    #[error("Parameter '{0}' was added twice")]
    Duplicate(String),

    #[error("Parameter '{name}' has {expected} coefficients, but {got} were supplied")]
    CoefficientCount {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Parameter '{name}' was given a non-finite coefficient ({value})")]
    NonFiniteCoefficient { name: String, value: f64 },

    #[error("A polc needs at least one coefficient along each axis")]
    EmptyPolc,

    #[error("Expected a solution vector of length {expected}, got {got}")]
    SolutionLength { expected: usize, got: usize },

    #[error("Invalid parameter name pattern '{pattern}': {err}")]
    Pattern { pattern: String, err: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParmDbError {
    #[error("No value or default is available for parameter '{0}'")]
    NotFound(String),

    #[error("Invalid default-value pattern '{pattern}': {err}")]
    Pattern { pattern: String, err: String },

    #[error(transparent)]
    Parm(#[from] ParmError),
}
