// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Nodes producing Jones matrices for instrumental and propagation effects.

use std::sync::Arc;

use marlu::c64;

use super::{
    cellwise, check_arity, check_shape, ArrayPosition, Expr, ExprError, ExprRef, NodeId,
    SolveContext,
};
use crate::{
    constants::{TAU, VEL_C},
    request::Request,
    value_set::{Sample, Shape, ValueSet},
};

/// Two directions closer than this (in the sine of the angle between them)
/// are considered coincident.
const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// A rotation by `angle`: [[cos, -sin], [sin, cos]].
fn rotation(angle: f64) -> Sample {
    let (s, c) = angle.sin_cos();
    Sample::jones(
        c64::new(c, 0.0),
        c64::new(-s, 0.0),
        c64::new(s, 0.0),
        c64::new(c, 0.0),
    )
}

/// The tangent of [`rotation`] for an angle tangent `d_angle`.
fn d_rotation(angle: f64, d_angle: f64) -> Sample {
    let (s, c) = angle.sin_cos();
    Sample::jones(
        c64::new(-s * d_angle, 0.0),
        c64::new(-c * d_angle, 0.0),
        c64::new(c * d_angle, 0.0),
        c64::new(-s * d_angle, 0.0),
    )
}

/// Rotation of the receptors relative to the sky by the parallactic angle.
/// Arguments: right ascension and declination \[radians\]. Cells where the
/// parallactic angle is undefined (source at the zenith or a pole) are
/// flagged.
#[derive(Debug)]
pub struct ParallacticRotation {
    id: NodeId,
    args: [ExprRef; 2],
    array: ArrayPosition,
}

impl ParallacticRotation {
    pub fn new(ra: ExprRef, dec: ExprRef, array: ArrayPosition) -> ExprRef {
        Arc::new(ParallacticRotation {
            id: NodeId::next(),
            args: [ra, dec],
            array,
        })
    }
}

/// The parallactic angle is `atan2(a, b)`; returns (a, b, da, db).
fn parallactic_terms(ha: f64, dec: f64, lat: f64, d_ha: f64, d_dec: f64) -> (f64, f64, f64, f64) {
    let (s_ha, c_ha) = ha.sin_cos();
    let (s_dec, c_dec) = dec.sin_cos();
    let (s_lat, c_lat) = lat.sin_cos();
    let a = s_ha * c_lat;
    let b = s_lat * c_dec - c_lat * s_dec * c_ha;
    let da = c_ha * c_lat * d_ha;
    let db = c_lat * s_dec * s_ha * d_ha - (s_lat * s_dec + c_lat * c_dec * c_ha) * d_dec;
    (a, b, da, db)
}

impl Expr for ParallacticRotation {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "ParallacticRotation"
    }

    fn arguments(&self) -> &[ExprRef] {
        &self.args
    }

    fn compute(
        &self,
        _: &SolveContext,
        request: &Request,
        args: &[Arc<ValueSet>],
    ) -> Result<ValueSet, ExprError> {
        check_arity(self.name(), args, 2)?;
        check_shape(self.name(), args, 0, Shape::Scalar)?;
        check_shape(self.name(), args, 1, Shape::Scalar)?;
        let lmsts = self.array.lmsts(request.grid());
        let lat = self.array.latitude_rad();

        Ok(cellwise(
            request,
            Shape::Jones,
            args,
            |cell, x| {
                let ha = lmsts[cell.i_time] - x[0].re(0);
                let (a, b, _, _) = parallactic_terms(ha, x[1].re(0), lat, 0.0, 0.0);
                if a.hypot(b) < SINGULARITY_TOLERANCE {
                    return None;
                }
                Some(rotation(a.atan2(b)))
            },
            |cell, x, dx| {
                let ha = lmsts[cell.i_time] - x[0].re(0);
                let (a, b, da, db) =
                    parallactic_terms(ha, x[1].re(0), lat, -dx[0].re(0), dx[1].re(0));
                let dq = (b * da - a * db) / (a * a + b * b);
                d_rotation(a.atan2(b), dq)
            },
        ))
    }
}

/// The voltage response of a pair of crossed dipoles at height `h` above a
/// ground plane. Arguments: the source's azimuth/elevation and the dipole
/// height \[metres\].
///
/// With `θ` the zenith angle and `φ` the azimuth relative to the dipoles'
/// orientation, the response is `g [[cosθ sinφ, cosφ], [cosθ cosφ, -sinφ]]`
/// where `g = 2 sin(2π f h cosθ / c)` is the ground-plane gain.
#[derive(Debug)]
pub struct DipoleBeam {
    id: NodeId,
    args: [ExprRef; 2],
    /// \[radians\]
    orientation: f64,
}

impl DipoleBeam {
    pub fn new(azel: ExprRef, height: ExprRef, orientation: f64) -> ExprRef {
        Arc::new(DipoleBeam {
            id: NodeId::next(),
            args: [azel, height],
            orientation,
        })
    }
}

impl Expr for DipoleBeam {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "DipoleBeam"
    }

    fn arguments(&self) -> &[ExprRef] {
        &self.args
    }

    fn compute(
        &self,
        _: &SolveContext,
        request: &Request,
        args: &[Arc<ValueSet>],
    ) -> Result<ValueSet, ExprError> {
        check_arity(self.name(), args, 2)?;
        check_shape(self.name(), args, 0, Shape::Vector(2))?;
        check_shape(self.name(), args, 1, Shape::Scalar)?;
        let orientation = self.orientation;

        // The unscaled response for cos(θ) and φ.
        let pattern = |c: f64, phi: f64| {
            let (s_phi, c_phi) = phi.sin_cos();
            [c * s_phi, c_phi, c * c_phi, -s_phi]
        };
        let to_sample = |e: [f64; 4]| {
            Sample::jones(
                c64::new(e[0], 0.0),
                c64::new(e[1], 0.0),
                c64::new(e[2], 0.0),
                c64::new(e[3], 0.0),
            )
        };

        Ok(cellwise(
            request,
            Shape::Jones,
            args,
            |cell, x| {
                let (phi, el, h) = (x[0].re(0) - orientation, x[0].re(1), x[1].re(0));
                let c = el.sin();
                let k = TAU * cell.freq / VEL_C;
                let g = 2.0 * (k * h * c).sin();
                Some(to_sample(pattern(c, phi).map(|e| g * e)))
            },
            |cell, x, dx| {
                let (phi, el, h) = (x[0].re(0) - orientation, x[0].re(1), x[1].re(0));
                let (d_phi, d_el, dh) = (dx[0].re(0), dx[0].re(1), dx[1].re(0));
                let c = el.sin();
                let dc = el.cos() * d_el;
                let k = TAU * cell.freq / VEL_C;
                let g = 2.0 * (k * h * c).sin();
                let dg = 2.0 * (k * h * c).cos() * k * (dh * c + h * dc);

                let (s_phi, c_phi) = phi.sin_cos();
                let e = pattern(c, phi);
                let de = [
                    dc * s_phi + c * c_phi * d_phi,
                    -s_phi * d_phi,
                    dc * c_phi - c * s_phi * d_phi,
                    -c_phi * d_phi,
                ];
                to_sample([0, 1, 2, 3].map(|i| dg * e[i] + g * de[i]))
            },
        ))
    }
}

/// Faraday rotation by `RM λ²`. Argument: the rotation measure
/// \[rad m^-2\].
#[derive(Debug)]
pub struct FaradayRotation {
    id: NodeId,
    args: [ExprRef; 1],
}

impl FaradayRotation {
    pub fn new(rm: ExprRef) -> ExprRef {
        Arc::new(FaradayRotation {
            id: NodeId::next(),
            args: [rm],
        })
    }
}

impl Expr for FaradayRotation {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "FaradayRotation"
    }

    fn arguments(&self) -> &[ExprRef] {
        &self.args
    }

    fn compute(
        &self,
        _: &SolveContext,
        request: &Request,
        args: &[Arc<ValueSet>],
    ) -> Result<ValueSet, ExprError> {
        check_arity(self.name(), args, 1)?;
        check_shape(self.name(), args, 0, Shape::Scalar)?;
        let lambda_sq = |freq: f64| (VEL_C / freq).powi(2);

        Ok(cellwise(
            request,
            Shape::Jones,
            args,
            |cell, x| Some(rotation(x[0].re(0) * lambda_sq(cell.freq))),
            |cell, x, dx| {
                let l2 = lambda_sq(cell.freq);
                d_rotation(x[0].re(0) * l2, dx[0].re(0) * l2)
            },
        ))
    }
}

/// The identity when a source is at or above an elevation cutoff, and zero
/// below it. Argument: the source's azimuth/elevation.
#[derive(Debug)]
pub struct ElevationCut {
    id: NodeId,
    args: [ExprRef; 1],
    /// \[radians\]
    cutoff: f64,
}

impl ElevationCut {
    pub fn new(azel: ExprRef, cutoff: f64) -> ExprRef {
        Arc::new(ElevationCut {
            id: NodeId::next(),
            args: [azel],
            cutoff,
        })
    }
}

impl Expr for ElevationCut {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "ElevationCut"
    }

    fn arguments(&self) -> &[ExprRef] {
        &self.args
    }

    fn compute(
        &self,
        _: &SolveContext,
        request: &Request,
        args: &[Arc<ValueSet>],
    ) -> Result<ValueSet, ExprError> {
        check_arity(self.name(), args, 1)?;
        check_shape(self.name(), args, 0, Shape::Vector(2))?;
        let cutoff = self.cutoff;

        // Piecewise constant, so the derivative is zero everywhere it exists.
        Ok(cellwise(
            request,
            Shape::Jones,
            args,
            |_, x| {
                Some(if x[0].re(1) >= cutoff {
                    Sample::identity()
                } else {
                    Sample::zero()
                })
            },
            |_, _, _| Sample::zero(),
        ))
    }
}

/// A diagonal Jones matrix (e.g. a gain or bandpass). Arguments: the XX and
/// YY elements.
#[derive(Debug)]
pub struct DiagonalJones {
    id: NodeId,
    args: [ExprRef; 2],
}

impl DiagonalJones {
    pub fn new(xx: ExprRef, yy: ExprRef) -> ExprRef {
        Arc::new(DiagonalJones {
            id: NodeId::next(),
            args: [xx, yy],
        })
    }
}

impl Expr for DiagonalJones {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "DiagonalJones"
    }

    fn arguments(&self) -> &[ExprRef] {
        &self.args
    }

    fn compute(
        &self,
        _: &SolveContext,
        request: &Request,
        args: &[Arc<ValueSet>],
    ) -> Result<ValueSet, ExprError> {
        check_arity(self.name(), args, 2)?;
        check_shape(self.name(), args, 0, Shape::Scalar)?;
        check_shape(self.name(), args, 1, Shape::Scalar)?;
        let diag = |xx: &Sample, yy: &Sample| {
            Sample::jones(
                xx.as_scalar(),
                c64::default(),
                c64::default(),
                yy.as_scalar(),
            )
        };

        Ok(cellwise(
            request,
            Shape::Jones,
            args,
            |_, x| Some(diag(&x[0], &x[1])),
            |_, _, dx| diag(&dx[0], &dx[1]),
        ))
    }
}

/// A complex number from an amplitude and a phase \[radians\].
#[derive(Debug)]
pub struct AmplitudePhase {
    id: NodeId,
    args: [ExprRef; 2],
}

impl AmplitudePhase {
    pub fn new(amplitude: ExprRef, phase: ExprRef) -> ExprRef {
        Arc::new(AmplitudePhase {
            id: NodeId::next(),
            args: [amplitude, phase],
        })
    }
}

impl Expr for AmplitudePhase {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "AmplitudePhase"
    }

    fn arguments(&self) -> &[ExprRef] {
        &self.args
    }

    fn compute(
        &self,
        _: &SolveContext,
        request: &Request,
        args: &[Arc<ValueSet>],
    ) -> Result<ValueSet, ExprError> {
        check_arity(self.name(), args, 2)?;
        check_shape(self.name(), args, 0, Shape::Scalar)?;
        check_shape(self.name(), args, 1, Shape::Scalar)?;

        Ok(cellwise(
            request,
            Shape::Scalar,
            args,
            |_, x| Some(Sample::scalar(c64::cis(x[1].re(0)) * x[0].re(0))),
            |_, x, dx| {
                let (a, phase) = (x[0].re(0), x[1].re(0));
                let (da, d_phase) = (dx[0].re(0), dx[1].re(0));
                Sample::scalar(c64::cis(phase) * c64::new(da, a * d_phase))
            },
        ))
    }
}
