// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Solving for direction-dependent effects.

use std::sync::Mutex;

use approx::assert_abs_diff_eq;

use super::*;
use bbs_kernel::{
    solve_domains, CalibrateError, ErrorKind, KernelError, SolveConfig, SolveError,
};

const SOURCES: [SourceSpec; 1] = [("A", 0.01, 0.005, 3.0, 0.8)];

fn all_effects() -> ModelConfig {
    ModelConfig {
        gain: false,
        beam: true,
        parallactic: true,
        faraday: true,
        elevation_cut: true,
        ..Default::default()
    }
}

fn config(solve: &str, model: ModelConfig) -> SolveConfig {
    SolveConfig {
        solve_parms: vec![solve.to_string()],
        model,
        ..Default::default()
    }
}

/// Simulate with `truth` overriding the defaults, then solve for `solve`
/// starting from `start`.
fn solve_one(
    model_config: ModelConfig,
    truth: (&str, f64),
    start: f64,
) -> (Vec<bbs_kernel::DomainOutcome>, MemoryParmDb) {
    let model = model(model_config.clone(), 4, &SOURCES);
    let grid = grid(3, 4);
    let size = DomainSize::default();

    let mut truth_db = sky_db(&SOURCES);
    truth_db.save(truth.0, &Polc::constant(truth.1)).unwrap();
    let observed = simulate(&model, &truth_db, &grid, &size);

    let mut start_db = sky_db(&SOURCES);
    start_db.save(truth.0, &Polc::constant(start)).unwrap();
    let db = Mutex::new(start_db);
    let config = config(truth.0, model_config);
    let outcomes = solve_domains(&model, &observed, &db, &config, None).unwrap();
    (outcomes, db.into_inner().unwrap())
}

#[test]
fn test_solve_rotation_measure() {
    let (outcomes, db) = solve_one(all_effects(), ("RotationMeasure:A", 2.0), 1.97);
    assert!(outcomes[0].converged(), "{:?}", outcomes[0].result);
    let saved = db.stored("RotationMeasure:A");
    // The starting value and the solution.
    assert_eq!(saved.len(), 2);
    assert_abs_diff_eq!(saved[1].coeffs()[0], 2.0, epsilon = 1e-6);
}

#[test]
fn test_solve_dipole_height() {
    let (outcomes, db) = solve_one(all_effects(), ("DipoleHeight", 0.3), 0.33);
    assert!(outcomes[0].converged(), "{:?}", outcomes[0].result);
    let saved = db.stored("DipoleHeight");
    assert_eq!(saved.len(), 2);
    assert_abs_diff_eq!(saved[1].coeffs()[0], 0.3, epsilon = 1e-6);
}

#[test]
fn test_source_below_cutoff_is_singular() {
    let config = ModelConfig {
        elevation_cutoff: 89.9,
        ..all_effects()
    };
    let (mut outcomes, db) = solve_one(config, ("RotationMeasure:A", 2.0), 1.97);
    let outcome = outcomes.remove(0);
    assert!(!outcome.saved);
    assert_eq!(db.stored("RotationMeasure:A").len(), 1);

    let err = outcome.result.unwrap_err();
    match &err {
        CalibrateError::Solve(SolveError::SingularNormalEquations { names }) => {
            assert_eq!(names, &["RotationMeasure:A"])
        }
        e => panic!("unexpected error: {e}"),
    }
    let err = KernelError::from(err);
    assert_eq!(err.kind(), ErrorKind::SingularNormalEquations);
    assert!(!err.is_fatal());
}
