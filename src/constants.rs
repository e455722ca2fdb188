// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. All model quantities are computed
in double precision; observed data is promoted to double precision before it
touches the normal equations.
 */

pub use marlu::constants::VEL_C;
pub use std::f64::consts::TAU;

/// The maximum number of times to iterate when solving a domain.
pub const DEFAULT_MAX_ITER: u32 = 50;

/// A parameter is considered converged when its update relative to its value
/// drops below this threshold.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// The fraction of solvable coefficients that must be converged before a
/// domain counts as converged.
pub const DEFAULT_MIN_CONVERGED: f64 = 1.0;

/// The initial Levenberg-Marquardt damping factor.
pub const DEFAULT_LM_LAMBDA: f64 = 1e-3;

/// The factor the damping factor is multiplied (divided) by after a rejected
/// (accepted) step.
pub const DEFAULT_LM_FACTOR: f64 = 10.0;

/// If the damping factor grows beyond this value, the fit has diverged.
pub const DEFAULT_LM_MAX_LAMBDA: f64 = 1e12;

/// The damping factor never shrinks below this value.
pub(crate) const LM_MIN_LAMBDA: f64 = 1e-15;

/// Diagonal entries of the normal-equation matrix at or below this value mean
/// that the associated coefficient has no sensitivity.
pub(crate) const SINGULAR_DIAGONAL_THRESHOLD: f64 = 1e-300;

/// An eigenvalue of the unit-diagonal scaled normal-equation matrix at or
/// below this fraction of the largest one marks a direction the data doesn't
/// constrain.
pub(crate) const SINGULAR_EIGENVALUE_THRESHOLD: f64 = 1e-10;

/// Unknowns whose component in such a direction exceeds this are reported as
/// degenerate.
pub(crate) const NULL_SPACE_COMPONENT_THRESHOLD: f64 = 1e-3;

/// The default elevation cutoff \[degrees\].
pub const DEFAULT_ELEVATION_CUTOFF_DEG: f64 = 0.0;

/// The default height of a dipole above its ground plane \[metres\].
pub const DEFAULT_DIPOLE_HEIGHT: f64 = 0.3;

/// The default orientation of the X dipoles, measured from north through east
/// \[degrees\].
pub const DEFAULT_DIPOLE_ORIENTATION_DEG: f64 = 45.0;
