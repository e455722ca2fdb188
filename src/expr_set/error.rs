// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::{expr::ExprError, parm::ParmError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprSetError {
    #[error("Got {baselines} baselines but {roots} expressions")]
    LengthMismatch { baselines: usize, roots: usize },

    #[error("Baseline index {index} is out of range; there are {size} baselines")]
    BaselineOutOfRange { index: usize, size: usize },

    #[error("No evaluation grid has been set")]
    NoGrid,

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error(transparent)]
    Parm(#[from] ParmError),
}
