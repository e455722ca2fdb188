// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io::Write;

use approx::assert_abs_diff_eq;
use indoc::indoc;
use tempfile::Builder;

use super::*;
use crate::{constants::DEFAULT_MAX_ITER, solver::Polarisations};

fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_read_toml() {
    let file = write_config(
        ".toml",
        indoc! {r#"
            solve_parms = ["Gain:*"]
            exclude_parms = ["Gain:*:Phase:CS001"]

            [solver]
            max_iter = 20
            polarisations = "XX_YY"

            [domain_size]
            band_width = 1e6

            [model]
            bandpass = true
        "#},
    );
    let config = SolveConfig::from_file(file.path()).unwrap();
    assert_eq!(config.solver.max_iter, 20);
    assert_eq!(config.solver.polarisations, Polarisations::XX_YY);
    assert_eq!(config.domain_size.band_width, Some(1e6));
    assert_eq!(config.domain_size.time_interval, None);
    assert_eq!(config.exclude_parms, ["Gain:*:Phase:CS001"]);
    assert!(config.model.bandpass);
    assert!(config.model.gain);
}

#[test]
fn test_read_json() {
    let file = write_config(
        ".json",
        indoc! {r#"
            {
                "solve_parms": ["Bandpass:*"],
                "solver": { "epsilon": 1e-6 },
                "domain_size": { "time_interval": 30.0 }
            }
        "#},
    );
    let config = SolveConfig::from_file(file.path()).unwrap();
    assert_eq!(config.solve_parms, ["Bandpass:*"]);
    assert_abs_diff_eq!(config.solver.epsilon, 1e-6);
    assert_eq!(config.solver.max_iter, DEFAULT_MAX_ITER);
    assert_eq!(config.domain_size.time_interval, Some(30.0));
}

#[test]
fn test_empty_file_is_default() {
    let file = write_config(".toml", "");
    assert_eq!(
        SolveConfig::from_file(file.path()).unwrap(),
        SolveConfig::default()
    );
}

#[test]
fn test_unrecognised_extension() {
    let file = write_config(".yaml", "");
    let err = SolveConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::UnrecognisedExtension(_)));
    assert!(err.to_string().contains("toml, json"));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = SolveConfig::from_file(dir.path().join("missing.toml"));
    assert!(matches!(result, Err(ConfigError::Read { .. })));
}

#[test]
fn test_unknown_field() {
    let file = write_config(".toml", "[solver]\nmax_iterations = 3\n");
    assert!(matches!(
        SolveConfig::from_file(file.path()),
        Err(ConfigError::Toml { .. })
    ));
    let file = write_config(".json", r#"{"solver": 3}"#);
    assert!(matches!(
        SolveConfig::from_file(file.path()),
        Err(ConfigError::Json { .. })
    ));
}

#[test]
fn test_validation() {
    let check = |config: SolveConfig, expected: &str| match config.validate() {
        Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
        other => panic!("expected {expected} to be invalid, got {other:?}"),
    };

    SolveConfig::default().validate().unwrap();

    let mut config = SolveConfig::default();
    config.solver.max_iter = 0;
    check(config, "solver.max_iter");

    let mut config = SolveConfig::default();
    config.solver.epsilon = 0.0;
    check(config, "solver.epsilon");

    let mut config = SolveConfig::default();
    config.solver.min_converged = 1.5;
    check(config, "solver.min_converged");

    let mut config = SolveConfig::default();
    config.solver.lm_factor = 1.0;
    check(config, "solver.lm_factor");

    let mut config = SolveConfig::default();
    config.solver.lm_max_lambda = config.solver.lm_lambda;
    check(config, "solver.lm_max_lambda");

    let mut config = SolveConfig::default();
    config.domain_size.time_interval = Some(-1.0);
    check(config, "domain_size.time_interval");

    let mut config = SolveConfig::default();
    config.solve_parms.clear();
    check(config, "solve_parms");

    // Validation also happens when reading.
    let file = write_config(".toml", "[domain_size]\nband_width = 0.0\n");
    assert!(matches!(
        SolveConfig::from_file(file.path()),
        Err(ConfigError::Invalid {
            field: "domain_size.band_width",
            ..
        })
    ));
}
