// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Geometry: station UVWs, source direction cosines, azimuth/elevation and
//! the geometric-delay phase term.

use std::sync::Arc;

use hifitime::{Duration, Epoch};
use marlu::{c64, precession::get_lmst, LatLngHeight, RADec, XyzGeodetic, UVW};
use ndarray::prelude::*;

use super::{cellwise, check_arity, check_shape, Expr, ExprError, ExprRef, NodeId, SolveContext};
use crate::{
    constants::{TAU, VEL_C},
    grid::Grid,
    request::Request,
    value_set::{Sample, Shape, ValueSet},
};

/// Below this, the horizontal projection of a direction is considered to be
/// zero (i.e. the direction is the zenith or a pole) and angles measured
/// around it are undefined.
const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// Where the array is on the Earth.
#[derive(Debug, Clone, Copy)]
pub struct ArrayPosition {
    pub position: LatLngHeight,
    /// The UT1 - UTC offset. If this is 0, effectively UT1 == UTC.
    pub dut1: Duration,
}

impl ArrayPosition {
    pub fn new(position: LatLngHeight) -> ArrayPosition {
        ArrayPosition {
            position,
            dut1: Duration::from_seconds(0.0),
        }
    }

    pub fn latitude_rad(&self) -> f64 {
        self.position.latitude_rad
    }

    /// The local mean sidereal time \[radians\] at a GPS time \[seconds\].
    pub fn lmst(&self, gps_seconds: f64) -> f64 {
        get_lmst(
            self.position.longitude_rad,
            Epoch::from_gpst_seconds(gps_seconds),
            self.dut1,
        )
    }

    /// The LMST of the centre of every time cell of a grid.
    pub(crate) fn lmsts(&self, grid: &Grid) -> Vec<f64> {
        grid.time().centers().map(|t| self.lmst(t)).collect()
    }
}

/// The UVW coordinates \[metres\] of a single station towards the phase
/// centre. Baseline UVWs are differences of station UVWs. Doesn't depend on
/// anything solvable, so it is always cached for the whole request.
#[derive(Debug)]
pub struct StationUvw {
    id: NodeId,
    position: XyzGeodetic,
    array: ArrayPosition,
    phase_centre: RADec,
}

impl StationUvw {
    pub fn new(position: XyzGeodetic, array: ArrayPosition, phase_centre: RADec) -> ExprRef {
        Arc::new(StationUvw {
            id: NodeId::next(),
            position,
            array,
            phase_centre,
        })
    }
}

impl Expr for StationUvw {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "StationUvw"
    }

    fn compute(
        &self,
        _: &SolveContext,
        request: &Request,
        _: &[Arc<ValueSet>],
    ) -> Result<ValueSet, ExprError> {
        let grid = request.grid();
        let uvws: Vec<Sample> = self
            .array
            .lmsts(grid)
            .into_iter()
            .map(|lst| {
                let UVW { u, v, w } =
                    UVW::from_xyz(self.position, self.phase_centre.to_hadec(lst));
                Sample::vector(&[u, v, w])
            })
            .collect();
        let values = Array2::from_shape_fn(grid.shape(), |(i, _)| uvws[i]);
        Ok(ValueSet::new(
            Shape::Vector(3),
            values,
            Array2::from_elem(grid.shape(), false),
        ))
    }
}

/// Direction cosines (l, m, n) of a source relative to the phase centre.
/// Arguments: right ascension and declination \[radians\].
#[derive(Debug)]
pub struct Lmn {
    id: NodeId,
    args: [ExprRef; 2],
    phase_centre: RADec,
}

impl Lmn {
    pub fn new(ra: ExprRef, dec: ExprRef, phase_centre: RADec) -> ExprRef {
        Arc::new(Lmn {
            id: NodeId::next(),
            args: [ra, dec],
            phase_centre,
        })
    }
}

impl Expr for Lmn {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "Lmn"
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
        let RADec { ra: ra0, dec: dec0 } = self.phase_centre;
        let (s_dec0, c_dec0) = dec0.sin_cos();

        Ok(cellwise(
            request,
            Shape::Vector(3),
            args,
            |_, x| {
                let (s_dra, c_dra) = (x[0].re(0) - ra0).sin_cos();
                let (s_dec, c_dec) = x[1].re(0).sin_cos();
                Some(Sample::vector(&[
                    c_dec * s_dra,
                    s_dec * c_dec0 - c_dec * s_dec0 * c_dra,
                    s_dec * s_dec0 + c_dec * c_dec0 * c_dra,
                ]))
            },
            |_, x, dx| {
                let (s_dra, c_dra) = (x[0].re(0) - ra0).sin_cos();
                let (s_dec, c_dec) = x[1].re(0).sin_cos();
                let (d_ra, d_dec) = (dx[0].re(0), dx[1].re(0));
                Sample::vector(&[
                    c_dec * c_dra * d_ra - s_dec * s_dra * d_dec,
                    c_dec * s_dec0 * s_dra * d_ra + (c_dec * c_dec0 + s_dec * s_dec0 * c_dra) * d_dec,
                    -c_dec * c_dec0 * s_dra * d_ra + (c_dec * s_dec0 - s_dec * c_dec0 * c_dra) * d_dec,
                ])
            },
        ))
    }
}

/// The horizontal coordinates of a direction and their tangents.
struct Horizontal {
    x: f64,
    y: f64,
    z: f64,
    dx: f64,
    dy: f64,
    dz: f64,
}

impl Horizontal {
    /// `ha`/`dec` and their tangents `d_ha`/`d_dec`, at latitude `lat`.
    fn new(ha: f64, dec: f64, d_ha: f64, d_dec: f64, lat: f64) -> Horizontal {
        let (s_ha, c_ha) = ha.sin_cos();
        let (s_dec, c_dec) = dec.sin_cos();
        let (s_lat, c_lat) = lat.sin_cos();
        Horizontal {
            x: -c_ha * c_dec * s_lat + s_dec * c_lat,
            y: -s_ha * c_dec,
            z: c_ha * c_dec * c_lat + s_dec * s_lat,
            dx: s_ha * c_dec * s_lat * d_ha + (c_ha * s_dec * s_lat + c_dec * c_lat) * d_dec,
            dy: -c_ha * c_dec * d_ha + s_ha * s_dec * d_dec,
            dz: -s_ha * c_dec * c_lat * d_ha + (-c_ha * s_dec * c_lat + c_dec * s_lat) * d_dec,
        }
    }

    fn r(&self) -> f64 {
        self.x.hypot(self.y)
    }

    fn is_singular(&self) -> bool {
        self.r() < SINGULARITY_TOLERANCE
    }

    /// Azimuth (North through East) in `[0, 2π)` and elevation.
    fn azel(&self) -> (f64, f64) {
        let az = self.y.atan2(self.x);
        let az = if az < 0.0 { az + TAU } else { az };
        (az, self.z.atan2(self.r()))
    }

    fn d_azel(&self) -> (f64, f64) {
        let r = self.r();
        let d_az = (self.x * self.dy - self.y * self.dx) / (r * r);
        let dr = (self.x * self.dx + self.y * self.dy) / r;
        let d_el = (r * self.dz - self.z * dr) / (r * r + self.z * self.z);
        (d_az, d_el)
    }
}

/// Azimuth and elevation \[radians\] of a source as seen from the array.
/// Arguments: right ascension and declination \[radians\]. Cells where the
/// source is at the zenith (where azimuth is undefined) are flagged.
#[derive(Debug)]
pub struct AzEl {
    id: NodeId,
    args: [ExprRef; 2],
    array: ArrayPosition,
}

impl AzEl {
    pub fn new(ra: ExprRef, dec: ExprRef, array: ArrayPosition) -> ExprRef {
        Arc::new(AzEl {
            id: NodeId::next(),
            args: [ra, dec],
            array,
        })
    }
}

impl Expr for AzEl {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "AzEl"
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
            Shape::Vector(2),
            args,
            |cell, x| {
                let h = Horizontal::new(lmsts[cell.i_time] - x[0].re(0), x[1].re(0), 0.0, 0.0, lat);
                if h.is_singular() {
                    return None;
                }
                let (az, el) = h.azel();
                Some(Sample::vector(&[az, el]))
            },
            |cell, x, dx| {
                // The hour angle decreases as the right ascension increases.
                let h = Horizontal::new(
                    lmsts[cell.i_time] - x[0].re(0),
                    x[1].re(0),
                    -dx[0].re(0),
                    dx[1].re(0),
                    lat,
                );
                let (d_az, d_el) = h.d_azel();
                Sample::vector(&[d_az, d_el])
            },
        ))
    }
}

/// The phase term of a single station towards a source:
/// `exp(2πi f (ul + vm + w(n - 1)) / c)`. Arguments: the station's UVW
/// (metres) and the source's direction cosines.
#[derive(Debug)]
pub struct StationShift {
    id: NodeId,
    args: [ExprRef; 2],
}

impl StationShift {
    pub fn new(uvw: ExprRef, lmn: ExprRef) -> ExprRef {
        Arc::new(StationShift {
            id: NodeId::next(),
            args: [uvw, lmn],
        })
    }
}

impl Expr for StationShift {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "StationShift"
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
        check_shape(self.name(), args, 0, Shape::Vector(3))?;
        check_shape(self.name(), args, 1, Shape::Vector(3))?;

        fn delay(uvw: &Sample, lmn: &Sample) -> f64 {
            uvw.re(0) * lmn.re(0) + uvw.re(1) * lmn.re(1) + uvw.re(2) * (lmn.re(2) - 1.0)
        }

        Ok(cellwise(
            request,
            Shape::Scalar,
            args,
            |cell, x| {
                let phase = TAU * cell.freq / VEL_C * delay(&x[0], &x[1]);
                Some(Sample::scalar(c64::cis(phase)))
            },
            |cell, x, dx| {
                let (uvw, lmn) = (&x[0], &x[1]);
                let (d_uvw, d_lmn) = (&dx[0], &dx[1]);
                let phase = TAU * cell.freq / VEL_C * delay(uvw, lmn);
                let d_delay =
                    delay(d_uvw, lmn) + (0..3).map(|k| uvw.re(k) * d_lmn.re(k)).sum::<f64>();
                let d_phase = TAU * cell.freq / VEL_C * d_delay;
                Sample::scalar(c64::cis(phase) * c64::new(0.0, d_phase))
            },
        ))
    }
}
