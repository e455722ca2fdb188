// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from evaluating expressions.

use thiserror::Error;

use crate::value_set::Shape;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("{node}: argument {argument} is a {found}, but a {expected} was expected")]
    ShapeMismatch {
        node: &'static str,
        argument: usize,
        expected: String,
        found: Shape,
    },

    #[error("{node}: expected {expected} arguments, but got {got}")]
    ArgumentCount {
        node: &'static str,
        expected: String,
        got: usize,
    },

    #[error("{node}: produced {found:?} cells, but the grid has {expected:?} cells; this is a programmer error")]
    GridMismatch {
        node: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),
}
