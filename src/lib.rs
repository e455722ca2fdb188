// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
A kernel for calibrating radio interferometers.

Measurement equations are built as graphs of expression nodes
([`expr`]), evaluated with derivatives over a time-frequency [`grid`] and
fitted to observed visibilities ([`vis`]) domain by domain with a
Levenberg-Marquardt [`solver`].
 */

pub mod cache;
pub mod calibrate;
pub mod config;
pub mod constants;
pub mod error;
pub mod expr;
pub mod expr_set;
pub mod grid;
pub mod logging;
pub mod model;
pub mod parm;
pub mod request;
pub mod solver;
pub mod value_set;
pub mod vis;

use crossbeam_utils::atomic::AtomicCell;

/// Should progress bars be drawn? They're hidden unless this is set.
pub static PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);

// Re-exports.
pub use cache::{Cache, CachePolicy, CacheStats};
pub use calibrate::{solve_domains, CalibrateError, DomainOutcome};
pub use config::{ConfigError, SolveConfig};
pub use error::{ErrorKind, KernelError};
pub use expr::{Expr, ExprError, ExprRef, SolveContext};
pub use expr_set::{Baseline, ExprSet, ExprSetError};
pub use grid::{Axis, Domain, DomainSize, Grid, GridError};
pub use logging::setup_logging;
pub use model::{MeasurementModel, ModelConfig, ModelError, SkySource, Station};
pub use parm::{MemoryParmDb, Parm, ParmDb, ParmDbError, ParmError, ParmManager, Polc};
pub use request::{Request, RequestId};
pub use solver::{Polarisations, SolveError, SolveReport, SolveStatus, Solver, SolverOptions};
pub use value_set::{Sample, Shape, ValueSet};
pub use vis::{VisBuffer, VisError};

// External re-exports.
pub use marlu::{c64, Jones, LatLngHeight, RADec, XyzGeodetic};
