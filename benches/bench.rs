// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use criterion::*;

use bbs_kernel::{
    expr::ArrayPosition, model::set_default_values, Axis, Grid, LatLngHeight, MeasurementModel,
    MemoryParmDb, ModelConfig, ParmDb, Polc, RADec, SkySource, Solver, SolverOptions, Station,
    VisBuffer, XyzGeodetic,
};

const T0: f64 = 1090008640.0;

fn setup(n_stations: usize, n_sources: usize) -> (MeasurementModel, MemoryParmDb, Arc<Grid>) {
    let array = ArrayPosition::new(LatLngHeight {
        longitude_rad: 6.87_f64.to_radians(),
        latitude_rad: 52.91_f64.to_radians(),
        height_metres: 50.0,
    });
    let pc = RADec::from_radians(array.lmst(T0), 0.8);
    let stations = (0..n_stations)
        .map(|i| Station {
            name: format!("CS{i:03}"),
            position: XyzGeodetic {
                x: 37.0 * i as f64,
                y: -21.0 * (i % 7) as f64,
                z: 1.5 * i as f64,
            },
        })
        .collect();
    let sources: Vec<SkySource> = (0..n_sources)
        .map(|i| SkySource {
            name: format!("S{i}"),
            reference_freq: 150e6,
        })
        .collect();

    let mut db = MemoryParmDb::new();
    set_default_values(&mut db).unwrap();
    for (i, src) in sources.iter().enumerate() {
        let offset = 0.005 * i as f64;
        for (name, value) in [
            (format!("Ra:{}", src.name), pc.ra + offset),
            (format!("Dec:{}", src.name), pc.dec - offset),
            (format!("I:{}", src.name), 1.0 + i as f64),
            (format!("Q:{}", src.name), 0.0),
        ] {
            db.save(&name, &Polc::constant(value)).unwrap();
        }
    }

    let config = ModelConfig {
        beam: true,
        parallactic: true,
        ..Default::default()
    };
    let model = MeasurementModel::new(config, array, pc, stations, sources).unwrap();
    let grid = Arc::new(Grid::new(
        Axis::regular(T0, 8.0, 10).unwrap(),
        Axis::regular(150e6, 40e3, 16).unwrap(),
    ));
    (model, db, grid)
}

fn evaluation(c: &mut Criterion) {
    let (model, db, grid) = setup(16, 3);
    let mut set = model
        .expr_set(model.cross_baselines(), &db, &grid.domain())
        .unwrap();
    set.set_eval_grid(Arc::clone(&grid));
    let solvable = set
        .parms()
        .select_solvable(&["Gain:*"], &[] as &[&str])
        .unwrap();
    set.set_solvable_parms(&solvable).unwrap();

    c.bench_function("evaluate 120 baselines with derivatives", |b| {
        b.iter(|| {
            set.new_iteration();
            set.evaluate_all().unwrap()
        })
    });
}

fn solving(c: &mut Criterion) {
    let (model, db, grid) = setup(8, 2);
    let mut set = model
        .expr_set(model.cross_baselines(), &db, &grid.domain())
        .unwrap();
    set.set_eval_grid(Arc::clone(&grid));
    let vis = VisBuffer::simulate(&set).unwrap();

    let names = ["Gain:*:Ampl:CS00[1-7]"];
    let solvable = set.parms().select_solvable(&names, &[] as &[&str]).unwrap();
    set.set_solvable_parms(&solvable).unwrap();
    let start: Vec<f64> = set.coefficients().iter().map(|c| c * 1.1).collect();
    let solver = Solver::new(SolverOptions::default());

    let mut group = c.benchmark_group("solve");
    group.sample_size(10);
    group.bench_function("8 stations, 14 amplitudes", |b| {
        b.iter(|| {
            set.set_solvable_parms(&solvable).unwrap();
            set.restore(&start).unwrap();
            solver.solve(&mut set, &vis, &solvable).unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, evaluation, solving);
criterion_main!(benches);
