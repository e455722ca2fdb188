// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with solving.

use thiserror::Error;

use super::SolveStatus;
use crate::{
    expr::ExprError, expr_set::Baseline, expr_set::ExprSetError, parm::ParmError, vis::VisError,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("No solvable parameters were selected")]
    NoSolvableParms,

    #[error("Every cell is flagged; there is nothing to fit")]
    NoUsableData,

    #[error("The normal equations are singular; these coefficients are unconstrained: {}", names.join(", "))]
    SingularNormalEquations { names: Vec<String> },

    #[error("Solving did not converge: stopped with status {status} after {iterations} iterations")]
    NotConverged { status: SolveStatus, iterations: u32 },

    #[error("Solving was cancelled after {iterations} iterations")]
    Cancelled { iterations: u32 },

    #[error("Couldn't evaluate the model of baseline {baseline}: {err}")]
    Evaluation {
        baseline: Baseline,
        #[source]
        err: ExprError,
    },

    #[error(transparent)]
    ExprSet(#[from] ExprSetError),

    #[error(transparent)]
    Parm(#[from] ParmError),

    #[error(transparent)]
    Vis(#[from] VisError),
}
