// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from building measurement models.

use thiserror::Error;

use crate::{expr_set::Baseline, expr_set::ExprSetError, parm::ParmDbError};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("A measurement model needs at least one station")]
    NoStations,

    #[error("A measurement model needs at least one source")]
    NoSources,

    #[error("Station '{0}' is specified more than once")]
    DuplicateStation(String),

    #[error("Source '{0}' is specified more than once")]
    DuplicateSource(String),

    #[error("Baseline {baseline} refers to a station that doesn't exist; there are {n_stations} stations")]
    StationOutOfRange { baseline: Baseline, n_stations: usize },

    #[error(transparent)]
    ExprSet(#[from] ExprSetError),

    #[error(transparent)]
    ParmDb(#[from] ParmDbError),
}
