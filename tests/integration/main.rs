// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod calibrate;
mod effects;

use std::sync::Arc;

use ndarray::s;

use bbs_kernel::{
    expr::ArrayPosition,
    model::set_default_values,
    Axis, DomainSize, Grid, LatLngHeight, MeasurementModel, MemoryParmDb, ModelConfig, ParmDb,
    Polc, RADec, SkySource, Station, VisBuffer, XyzGeodetic,
};

/// GPS seconds at the start of the test observations.
const T0: f64 = 1090008640.0;

fn array() -> ArrayPosition {
    ArrayPosition::new(LatLngHeight {
        longitude_rad: 6.87_f64.to_radians(),
        latitude_rad: 52.91_f64.to_radians(),
        height_metres: 50.0,
    })
}

/// High in the sky at `T0`.
fn phase_centre() -> RADec {
    RADec::from_radians(array().lmst(T0) - 0.2, 0.8)
}

fn stations(n: usize) -> Vec<Station> {
    (0..n)
        .map(|i| {
            let i = i as f64;
            Station {
                name: format!("CS{:03}", i as usize),
                position: XyzGeodetic {
                    x: 30.0 * i - 4.0 * i * i,
                    y: 55.0 - 20.0 * i,
                    z: 3.0 * i,
                },
            }
        })
        .collect()
}

/// Sources and their (RA offset, Dec offset, Stokes I, Stokes Q) relative to
/// the phase centre.
type SourceSpec = (&'static str, f64, f64, f64, f64);

fn model(config: ModelConfig, n_stations: usize, sources: &[SourceSpec]) -> MeasurementModel {
    MeasurementModel::new(
        config,
        array(),
        phase_centre(),
        stations(n_stations),
        sources
            .iter()
            .map(|&(name, ..)| SkySource {
                name: name.to_string(),
                reference_freq: 150e6,
            })
            .collect(),
    )
    .unwrap()
}

/// A database with the sources and default values for everything else.
fn sky_db(sources: &[SourceSpec]) -> MemoryParmDb {
    let pc = phase_centre();
    let mut db = MemoryParmDb::new();
    set_default_values(&mut db).unwrap();
    for &(name, d_ra, d_dec, i, q) in sources {
        for (parm, value) in [
            (format!("Ra:{name}"), pc.ra + d_ra),
            (format!("Dec:{name}"), pc.dec + d_dec),
            (format!("I:{name}"), i),
            (format!("Q:{name}"), q),
        ] {
            db.save(&parm, &Polc::constant(value)).unwrap();
        }
    }
    db
}

fn grid(n_time: usize, n_freq: usize) -> Arc<Grid> {
    Arc::new(Grid::new(
        Axis::regular(T0, 8.0, n_time).unwrap(),
        Axis::regular(150e6, 40e3, n_freq).unwrap(),
    ))
}

/// Noiseless visibilities of all cross baselines. Every domain of
/// `domain_size` is predicted with the parameters `db` has for it.
fn simulate(
    model: &MeasurementModel,
    db: &MemoryParmDb,
    grid: &Arc<Grid>,
    domain_size: &DomainSize,
) -> VisBuffer {
    let baselines = model.cross_baselines();
    let mut vis = VisBuffer::zeros(Arc::clone(grid), baselines.clone());
    for ranges in grid.split(domain_size).unwrap() {
        let sub = Arc::new(
            grid.subset(ranges.time.clone(), ranges.freq.clone())
                .unwrap(),
        );
        let mut set = model
            .expr_set(baselines.clone(), db, &sub.domain())
            .unwrap();
        set.set_eval_grid(sub);
        let part = VisBuffer::simulate(&set).unwrap();
        vis.data_mut()
            .slice_mut(s![ranges.time.clone(), ranges.freq.clone(), ..])
            .assign(&part.data());
        vis.flags_mut()
            .slice_mut(s![ranges.time, ranges.freq, ..])
            .assign(&part.flags());
    }
    vis
}

/// The largest difference between the unflagged samples of two buffers.
fn max_abs_diff(a: &VisBuffer, b: &VisBuffer) -> f64 {
    a.data()
        .iter()
        .zip(b.data().iter())
        .zip(a.flags().iter())
        .filter(|&(_, &flagged)| !flagged)
        .flat_map(|((x, y), _)| (0..4).map(move |i| (x[i] - y[i]).norm()))
        .fold(0.0, f64::max)
}
