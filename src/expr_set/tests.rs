// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use marlu::c64;

use super::*;
use crate::{
    expr::{AmplitudePhase, Constant, Hermitian, MatrixProduct, ParmExpr, Sum},
    grid::Axis,
    parm::{Parm, Polc},
    value_set::{Sample, Shape},
};

fn grid() -> Arc<Grid> {
    Arc::new(Grid::new(
        Axis::regular(1090008640.0, 10.0, 4).unwrap(),
        Axis::regular(150e6, 1e6, 5).unwrap(),
    ))
}

fn parms() -> ParmManager {
    let mut pm = ParmManager::new();
    for (name, value) in [
        ("Ampl:0", 1.0),
        ("Ampl:1", 2.0),
        ("Ampl:2", 0.5),
        ("Phase:0", 0.0),
        ("Phase:1", 0.2),
        ("Phase:2", -0.4),
        ("Flux", 3.0),
    ] {
        pm.add(Parm::new(name, Polc::constant(value))).unwrap();
    }
    pm
}

/// V_pq = g_p * S * conj(g_q) for three stations. Every station gain is
/// shared by two baselines.
fn expr_set() -> ExprSet {
    let gains: Vec<ExprRef> = (0..3)
        .map(|st| {
            AmplitudePhase::new(
                ParmExpr::new(format!("Ampl:{st}")),
                ParmExpr::new(format!("Phase:{st}")),
            )
        })
        .collect();
    let flux = ParmExpr::new("Flux");
    let baselines = vec![Baseline(0, 1), Baseline(0, 2), Baseline(1, 2)];
    let roots = baselines
        .iter()
        .map(|&Baseline(p, q)| {
            MatrixProduct::new(vec![
                Arc::clone(&gains[p]),
                Arc::clone(&flux),
                Hermitian::new(Arc::clone(&gains[q])),
            ])
        })
        .collect();
    ExprSet::new(baselines, roots, parms()).unwrap()
}

#[test]
fn test_length_mismatch() {
    let result = ExprSet::new(vec![Baseline(0, 1)], vec![], parms());
    assert!(matches!(
        result,
        Err(ExprSetError::LengthMismatch {
            baselines: 1,
            roots: 0
        })
    ));
}

#[test]
fn test_unknown_parameter_at_construction() {
    let result = ExprSet::new(vec![Baseline(0, 1)], vec![ParmExpr::new("Nope")], parms());
    match result {
        Err(ExprSetError::Expr(ExprError::UnknownParameter(name))) => assert_eq!(name, "Nope"),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn test_evaluate_needs_grid() {
    let set = expr_set();
    assert!(matches!(set.evaluate(0), Err(ExprSetError::NoGrid)));
    assert!(matches!(set.evaluate_all(), Err(ExprSetError::NoGrid)));
}

#[test]
fn test_baseline_out_of_range() {
    let mut set = expr_set();
    set.set_eval_grid(grid());
    assert!(matches!(
        set.evaluate(3),
        Err(ExprSetError::BaselineOutOfRange { index: 3, size: 3 })
    ));
}

#[test]
fn test_values() {
    let mut set = expr_set();
    set.set_eval_grid(grid());
    assert_eq!(set.size(), 3);
    assert_eq!(set.domain(), Some(grid().domain()));
    let results = set.evaluate_all().unwrap();
    // baseline 1-2: 2 e^{0.2i} * 3 * 0.5 e^{0.4i}
    let expected = c64::from_polar(3.0, 0.6);
    for sample in results[2].values() {
        assert_abs_diff_eq!(sample.as_scalar().re, expected.re, epsilon = 1e-12);
        assert_abs_diff_eq!(sample.as_scalar().im, expected.im, epsilon = 1e-12);
    }
    assert_eq!(
        set.parm_names(),
        ["Ampl:0", "Ampl:1", "Ampl:2", "Flux", "Phase:0", "Phase:1", "Phase:2"]
    );
}

#[test]
fn test_shared_nodes_computed_once() {
    let mut set = expr_set();
    set.set_eval_grid(grid());
    set.evaluate_all().unwrap();
    let first = set.cache_stats();
    // Three gains, each made of two parms, plus the flux, three conjugated
    // gains and three products.
    assert_eq!(first.computations, 3 * 3 + 1 + 3 + 3);

    // Nothing is solvable, so evaluating again is all cache hits.
    set.evaluate_all().unwrap();
    let second = set.cache_stats();
    assert_eq!(second.computations, first.computations);
    assert!(second.hits > first.hits);
}

#[test]
fn test_new_iteration_keeps_non_volatile_results() {
    let mut set = expr_set();
    set.set_eval_grid(grid());
    let n = set.set_solvable_parms(&["Ampl:1", "Phase:1"]).unwrap();
    assert_eq!(n, 2);
    set.evaluate_all().unwrap();
    let before = set.cache_stats().computations;

    set.new_iteration();
    set.evaluate_all().unwrap();
    let recomputed = set.cache_stats().computations - before;
    // Station 1's gain (2 parms + AmplitudePhase), its conjugate and the two
    // products it takes part in.
    assert_eq!(recomputed, 3 + 1 + 2);
}

#[test]
fn test_apply_update_changes_values() {
    let mut set = expr_set();
    set.set_eval_grid(grid());
    set.set_solvable_parms(&["Ampl:1"]).unwrap();
    let before = set.evaluate(0).unwrap();
    assert!(before.partial(0).is_some());

    set.apply_update(&[1.0]).unwrap();
    assert_eq!(set.coefficients(), [3.0]);
    let after = set.evaluate(0).unwrap();
    // V_01 is linear in Ampl:1.
    let ratio = after.value(0, 0).as_scalar() / before.value(0, 0).as_scalar();
    assert_abs_diff_eq!(ratio.re, 1.5, epsilon = 1e-12);
    assert_abs_diff_eq!(ratio.im, 0.0, epsilon = 1e-12);

    set.restore(&[2.0]).unwrap();
    let restored = set.evaluate(0).unwrap();
    assert_eq!(restored.value(0, 0), before.value(0, 0));
}

#[test]
fn test_changing_solvable_set_makes_new_request() {
    let mut set = expr_set();
    set.set_eval_grid(grid());
    let first = set.request().unwrap().id();
    set.evaluate_all().unwrap();
    assert!(!set.context().cache().is_empty());

    set.set_solvable_parms(&["Flux"]).unwrap();
    let second = set.request().unwrap();
    assert_ne!(second.id(), first);
    assert_eq!(second.spids(), [0]);
    assert!(set.context().cache().is_empty());

    set.clear_solvable_parms();
    assert!(!set.request().unwrap().wants_derivatives());
}

#[test]
fn test_new_grid_evicts_old_results() {
    let mut set = expr_set();
    set.set_eval_grid(grid());
    set.evaluate_all().unwrap();
    assert!(!set.context().cache().is_empty());
    set.set_eval_grid(grid());
    assert!(set.context().cache().is_empty());
}

#[test]
fn test_failing_baseline_does_not_stop_others() {
    let roots = vec![
        ParmExpr::new("Flux"),
        Sum::new(vec![
            ParmExpr::new("Flux"),
            Constant::new(Shape::Jones, Sample::identity()),
        ]),
        ParmExpr::new("Ampl:2"),
    ];
    let baselines = vec![Baseline(0, 1), Baseline(0, 2), Baseline(1, 2)];
    let mut set = ExprSet::new(baselines, roots, parms()).unwrap();
    set.set_eval_grid(grid());
    let results = set.evaluate_each().unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(ExprError::ShapeMismatch { node: "Sum", .. })
    ));
    assert!(results[2].is_ok());
    assert!(matches!(
        set.evaluate_all(),
        Err(ExprSetError::Expr(ExprError::ShapeMismatch { .. }))
    ));
}
