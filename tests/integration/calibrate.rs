// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Simulate, perturb, solve and save.

use std::io::Write;
use std::sync::Mutex;

use approx::assert_abs_diff_eq;
use indoc::indoc;

use super::*;
use bbs_kernel::{solve_domains, Domain, ParmManager, SolveConfig, SolveStatus};

const SOURCES: [SourceSpec; 2] = [
    ("A", 0.0, 0.0, 10.0, 1.0),
    ("B", 0.012, -0.007, 4.0, 0.0),
];
const N_STATIONS: usize = 5;

/// Gains for every station; station 0's phases are the reference.
fn true_gains(scale: f64) -> Vec<(String, f64)> {
    let mut gains = vec![];
    for st in 0..N_STATIONS {
        let x = st as f64;
        for (pol, offset) in [("11", 0.0), ("22", 0.05)] {
            gains.push((
                format!("Gain:{pol}:Ampl:CS{st:03}"),
                scale * (0.8 + 0.1 * x + offset),
            ));
            if st > 0 {
                gains.push((
                    format!("Gain:{pol}:Phase:CS{st:03}"),
                    scale * (0.25 * x - 0.6 + offset),
                ));
            }
        }
    }
    gains
}

fn gain_config(domain_size: DomainSize) -> SolveConfig {
    SolveConfig {
        domain_size,
        solve_parms: vec!["Gain:*".to_string()],
        exclude_parms: vec!["Gain:*:Phase:CS000".to_string()],
        ..Default::default()
    }
}

/// The solved value of `name` for `domain`.
fn solved(db: &MemoryParmDb, name: &str, domain: &Domain) -> f64 {
    let polc = db
        .stored(name)
        .iter()
        .find(|p| p.domain() == domain)
        .unwrap_or_else(|| panic!("nothing saved for {name}"));
    polc.coeffs()[0]
}

#[test]
fn test_simulate_perturb_solve_save() {
    let model = model(ModelConfig::default(), N_STATIONS, &SOURCES);
    let grid = grid(4, 6);
    let size = DomainSize::default();

    let mut truth = sky_db(&SOURCES);
    for (name, value) in true_gains(1.0) {
        truth.save(&name, &Polc::constant(value)).unwrap();
    }
    let observed = simulate(&model, &truth, &grid, &size);
    assert_eq!(observed.num_flagged(), 0);

    // Start from unit gains.
    let db = Mutex::new(sky_db(&SOURCES));
    let outcomes = solve_domains(&model, &observed, &db, &gain_config(size), None).unwrap();
    assert_eq!(outcomes.len(), 1);
    let report = outcomes[0].result.as_ref().unwrap();
    assert_eq!(report.status, SolveStatus::Converged);
    assert!(report.iterations <= 50);
    assert_eq!(report.n_unknowns, 4 * N_STATIONS - 2);
    assert!(outcomes[0].saved);

    let db = db.into_inner().unwrap();
    let domain = grid.domain();
    for (name, value) in true_gains(1.0) {
        assert_abs_diff_eq!(solved(&db, &name, &domain), value, epsilon = 1e-6);
    }

    // Predicting with the saved parameters reproduces the data.
    let predicted = simulate(&model, &db, &grid, &size);
    assert!(max_abs_diff(&observed, &predicted) < 1e-6);
}

#[test]
fn test_domains_solve_independently() {
    let model = model(ModelConfig::default(), N_STATIONS, &SOURCES);
    let grid = grid(4, 4);
    // Two domains along time.
    let size = DomainSize {
        band_width: None,
        time_interval: Some(16.0),
    };
    let ranges = grid.split(&size).unwrap();
    assert_eq!(ranges.len(), 2);
    let domains: Vec<Domain> = ranges
        .iter()
        .map(|r| {
            grid.subset(r.time.clone(), r.freq.clone())
                .unwrap()
                .domain()
        })
        .collect();

    // The gains change between the domains.
    let mut truth = sky_db(&SOURCES);
    for (domain, scale) in domains.iter().zip([1.0, 0.9]) {
        for (name, value) in true_gains(scale) {
            truth
                .save(&name, &Polc::constant(value).with_domain(*domain))
                .unwrap();
        }
    }
    let mut observed = simulate(&model, &truth, &grid, &size);
    // Lose a baseline in the second domain.
    observed
        .flags_mut()
        .slice_mut(s![2..4, .., 3])
        .fill(true);

    let db = Mutex::new(sky_db(&SOURCES));
    let outcomes = solve_domains(&model, &observed, &db, &gain_config(size), None).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.converged() && o.saved));
    assert!(
        outcomes[1].result.as_ref().unwrap().n_equations
            < outcomes[0].result.as_ref().unwrap().n_equations
    );

    let db = db.into_inner().unwrap();
    for (outcome, scale) in outcomes.iter().zip([1.0, 0.9]) {
        assert_eq!(outcome.domain, domains[outcome.index]);
        for (name, value) in true_gains(scale) {
            assert_abs_diff_eq!(
                solved(&db, &name, &outcome.domain),
                value,
                epsilon = 1e-6
            );
        }
    }

    // Reading a domain back gives its own solutions.
    let names: Vec<String> = true_gains(1.0).into_iter().map(|(n, _)| n).collect();
    let parms = ParmManager::load(&db, &names, &domains[1]).unwrap();
    assert_abs_diff_eq!(
        parms.get("Gain:11:Ampl:CS000").unwrap().coefficients()[0],
        0.9 * 0.8,
        epsilon = 1e-6
    );
}

#[test]
fn test_solve_from_config_file() {
    let model = model(ModelConfig::default(), N_STATIONS, &SOURCES);
    let grid = grid(2, 4);
    let mut truth = sky_db(&SOURCES);
    for (name, value) in true_gains(1.0) {
        if name.contains(":Ampl:") {
            truth.save(&name, &Polc::constant(value)).unwrap();
        }
    }
    let observed = simulate(&model, &truth, &grid, &DomainSize::default());

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(
        indoc! {r#"
            solve_parms = ["Gain:*:Ampl:*"]

            [solver]
            max_iter = 30
            polarisations = "XX_YY"

            [domain_size]
            band_width = 80e3
        "#}
        .as_bytes(),
    )
    .unwrap();
    let config = SolveConfig::from_file(file.path()).unwrap();

    let db = Mutex::new(sky_db(&SOURCES));
    let outcomes = solve_domains(&model, &observed, &db, &config, None).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.converged()));
    for outcome in &outcomes {
        let report = outcome.result.as_ref().unwrap();
        assert_eq!(report.n_unknowns, 2 * N_STATIONS);
        // 10 baselines x 4 cells x 2 correlations x 2
        assert_eq!(report.n_equations, 160);
    }
    let db = db.into_inner().unwrap();
    assert_abs_diff_eq!(
        solved(&db, "Gain:22:Ampl:CS004", &outcomes[1].domain),
        1.25,
        epsilon = 1e-6
    );
    // Phases weren't solved for.
    assert!(db.stored("Gain:11:Phase:CS001").is_empty());
}
