// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use approx::assert_abs_diff_eq;

use super::*;
use crate::grid::{Axis, Grid};

fn domain() -> Domain {
    Domain {
        time_start: 0.0,
        time_end: 10.0,
        freq_start: 100e6,
        freq_end: 104e6,
    }
}

fn grid() -> Arc<Grid> {
    Arc::new(Grid::new(
        Axis::regular(0.0, 2.0, 5).unwrap(),
        Axis::regular(100e6, 1e6, 4).unwrap(),
    ))
}

fn manager() -> ParmManager {
    let mut pm = ParmManager::new();
    for (name, value) in [
        ("Gain:11:Phase:CS002", 0.1),
        ("Gain:11:Ampl:CS002", 1.0),
        ("Gain:11:Ampl:CS001", 1.1),
        ("Ra:3C196", 2.15),
    ] {
        pm.add(Parm::new(name, Polc::constant(value))).unwrap();
    }
    pm.add(Parm::new(
        "Gain:22:Ampl:CS001",
        Polc::new(domain(), 2, 2, vec![1.0, 0.5, -0.25, 0.125]).unwrap(),
    ))
    .unwrap();
    pm
}

#[test]
fn test_polc_evaluate_and_basis() {
    let polc = Polc::new(domain(), 2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let (t, f) = (2.5, 103e6);
    let (x, y) = polc.normalise(t, f);
    assert_abs_diff_eq!(x, 0.25);
    assert_abs_diff_eq!(y, 0.75);
    let expected = 1.0 + 2.0 * y + 3.0 * y * y + x * (4.0 + 5.0 * y + 6.0 * y * y);
    assert_abs_diff_eq!(polc.evaluate(t, f), expected, epsilon = 1e-12);

    // The value is linear in the coefficients, so it must equal the sum of
    // the coefficients multiplied by their basis functions.
    let sum: f64 = (0..polc.n_coeffs())
        .map(|k| polc.coeffs()[k] * polc.basis(k, t, f))
        .sum();
    assert_abs_diff_eq!(polc.evaluate(t, f), sum, epsilon = 1e-12);
    assert_abs_diff_eq!(polc.basis(5, t, f), x * y * y);

    assert_eq!(Polc::new(domain(), 0, 1, vec![]), Err(ParmError::EmptyPolc));
    assert!(Polc::new(domain(), 2, 2, vec![1.0]).is_err());
}

#[test]
fn test_constant_polc_ignores_domain() {
    let polc = Polc::constant(3.0);
    assert_abs_diff_eq!(polc.evaluate(-1e9, 1e12), 3.0);
    assert_abs_diff_eq!(polc.basis(0, 5.0, 5.0), 1.0);
}

#[test]
fn test_spids_sorted_by_name() {
    let mut pm = manager();
    let n = pm
        .set_solvable_parms(&["Gain:22:Ampl:CS001", "Gain:11:Ampl:CS002", "Gain:11:Ampl:CS001"])
        .unwrap();
    // 1 + 1 + 4 coefficients.
    assert_eq!(n, 6);
    assert_eq!(pm.n_solvable(), 6);

    let solvable = pm.get_solvable_parms();
    let names: Vec<&str> = solvable.iter().map(|p| p.name()).collect();
    assert_eq!(
        names,
        ["Gain:11:Ampl:CS001", "Gain:11:Ampl:CS002", "Gain:22:Ampl:CS001"]
    );
    assert_eq!(pm.get("Gain:11:Ampl:CS001").unwrap().spids().collect::<Vec<_>>(), [(0, 0)]);
    assert_eq!(pm.get("Gain:11:Ampl:CS002").unwrap().spids().collect::<Vec<_>>(), [(0, 1)]);
    assert_eq!(
        pm.get("Gain:22:Ampl:CS001").unwrap().spids().collect::<Vec<_>>(),
        [(0, 2), (1, 3), (2, 4), (3, 5)]
    );
    assert!(pm.get("Ra:3C196").unwrap().spids().next().is_none());
    assert_eq!(pm.spid_names()[0], "Gain:11:Ampl:CS001");
    assert_eq!(pm.spid_names()[3], "Gain:22:Ampl:CS001[0,1]");

    pm.clear_solvable_parms();
    assert_eq!(pm.n_solvable(), 0);
    assert!(pm.get_solvable_parms().is_empty());
}

#[test]
fn test_unknown_solvable_parm() {
    let mut pm = manager();
    assert_eq!(
        pm.set_solvable_parms(&["Gain:11:Ampl:CS003"]),
        Err(ParmError::Unknown("Gain:11:Ampl:CS003".to_string()))
    );
    assert!(pm.get("nope").is_err());
}

#[test]
fn test_solvable_mask() {
    let mut pm = manager();
    pm.get_mut("Gain:22:Ampl:CS001")
        .unwrap()
        .set_solvable_mask(vec![true, false, false, true])
        .unwrap();
    assert_eq!(pm.set_solvable_parms(&["Gain:22:Ampl:CS001"]).unwrap(), 2);
    assert_eq!(
        pm.get("Gain:22:Ampl:CS001").unwrap().spids().collect::<Vec<_>>(),
        [(0, 0), (3, 1)]
    );
    assert!(pm
        .get_mut("Ra:3C196")
        .unwrap()
        .set_solvable_mask(vec![true, true])
        .is_err());
}

#[test]
fn test_select_solvable() {
    let pm = manager();
    let selected = pm
        .select_solvable(&["Gain:*"], &["*:Phase:*"])
        .unwrap();
    assert_eq!(
        selected,
        ["Gain:11:Ampl:CS001", "Gain:11:Ampl:CS002", "Gain:22:Ampl:CS001"]
    );
    let empty: [&str; 0] = [];
    assert_eq!(pm.select_solvable(&["Ra:*"], &empty).unwrap(), ["Ra:3C196"]);
    assert!(pm.select_solvable(&["[unclosed"], &empty).is_err());
}

#[test]
fn test_update_and_restore() {
    let mut pm = manager();
    pm.set_solvable_parms(&["Gain:11:Ampl:CS001", "Ra:3C196"]).unwrap();
    let before = pm.coefficients();
    assert_eq!(before, [1.1, 2.15]);

    pm.update_from_solution(&[0.5, -0.15]).unwrap();
    let after = pm.coefficients();
    assert_abs_diff_eq!(after[0], 1.6, epsilon = 1e-12);
    assert_abs_diff_eq!(after[1], 2.0, epsilon = 1e-12);
    // Non-solvable parameters are untouched.
    assert_eq!(pm.get("Gain:11:Ampl:CS002").unwrap().coefficients(), [1.0]);

    pm.restore(&before).unwrap();
    assert_eq!(pm.coefficients(), before);

    assert!(matches!(
        pm.update_from_solution(&[1.0]),
        Err(ParmError::SolutionLength { expected: 2, got: 1 })
    ));
    assert!(pm.update_from_solution(&[f64::NAN, 0.0]).is_err());
    assert_eq!(pm.coefficients(), before);
}

#[test]
fn test_parm_evaluate() {
    let mut pm = manager();
    pm.set_solvable_parms(&["Gain:22:Ampl:CS001"]).unwrap();
    let parm = pm.get("Gain:22:Ampl:CS001").unwrap();
    let grid = grid();
    let request = Request::new(Arc::clone(&grid), [1, 2, 17]);
    let vs = parm.evaluate(&request);

    assert_eq!(vs.dim(), (5, 4));
    assert!(vs.is_volatile());
    assert_eq!(vs.num_flagged(), 0);
    assert_eq!(vs.spids().collect::<Vec<_>>(), [1, 2]);
    let (t, f) = (grid.time().center(3), grid.freq().center(2));
    assert_abs_diff_eq!(vs.value(3, 2).re(0), parm.polc().evaluate(t, f));
    assert_abs_diff_eq!(
        vs.partial_value(1, 3, 2).re(0),
        parm.polc().basis(1, t, f)
    );

    // Values only.
    let vs = parm.evaluate(&Request::values_only(grid));
    assert!(!vs.has_partials());

    // A parameter that isn't solvable isn't volatile.
    let vs = pm
        .get("Ra:3C196")
        .unwrap()
        .evaluate(&Request::values_only(self::grid()));
    assert!(!vs.is_volatile());
}

#[test]
fn test_parm_evaluate_outside_domain_is_flagged() {
    let polc = Polc::new(
        Domain {
            time_start: 0.0,
            time_end: 5.0,
            ..domain()
        },
        1,
        1,
        vec![2.0],
    )
    .unwrap();
    let vs = Parm::new("x", polc).evaluate(&Request::values_only(grid()));
    // Time centres are 1, 3, 5, 7, 9; the last two are outside.
    assert_eq!(vs.num_flagged(), 2 * 4);
    assert!(vs.is_flagged(3, 0));
    assert!(!vs.is_flagged(2, 0));
}

#[test]
fn test_memory_parmdb() {
    let mut db = MemoryParmDb::new();
    db.set_default_value("Gain:11:Ampl:*", 1.0).unwrap();
    db.set_default_value("Gain:*", 0.0).unwrap();

    let d = domain();
    assert_eq!(db.read_polc("Gain:11:Ampl:CS001", &d).unwrap().coeffs(), [1.0]);
    assert_eq!(db.read_polc("Gain:11:Phase:CS001", &d).unwrap().coeffs(), [0.0]);
    assert_eq!(
        db.read_polc("Ra:CasA", &d),
        Err(ParmDbError::NotFound("Ra:CasA".to_string()))
    );

    let names = ["Gain:11:Ampl:CS001", "Gain:11:Phase:CS001"];
    let mut pm = ParmManager::load(&db, &names, &d).unwrap();
    pm.set_solvable_parms(&["Gain:11:Ampl:CS001"]).unwrap();
    pm.update_from_solution(&[0.25]).unwrap();
    pm.save(&mut db, &d).unwrap();

    // Only solvable parameters are saved.
    assert_eq!(db.names().collect::<Vec<_>>(), ["Gain:11:Ampl:CS001"]);
    assert_eq!(db.read_polc("Gain:11:Ampl:CS001", &d).unwrap().coeffs(), [1.25]);
    // Saving again for the same domain replaces the old value.
    pm.save(&mut db, &d).unwrap();
    assert_eq!(db.stored("Gain:11:Ampl:CS001").len(), 1);

    // A domain that isn't covered falls back to the defaults.
    let other = Domain {
        time_start: 10.0,
        time_end: 20.0,
        ..d
    };
    assert_eq!(db.read_polc("Gain:11:Ampl:CS001", &other).unwrap().coeffs(), [1.0]);

    assert!(db.set_default_value("[", 1.0).is_err());
}
