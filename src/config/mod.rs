// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Solve configuration files.
//!
//! A configuration file is toml or json, picked by its extension. Every field
//! has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! solve_parms = ["Gain:*"]
//! exclude_parms = ["Gain:*:Phase:CS001"]
//!
//! [solver]
//! max_iter = 20
//! polarisations = "XX_YY"
//!
//! [domain_size]
//! band_width = 1e6
//! time_interval = 60.0
//!
//! [model]
//! bandpass = true
//! ```

mod error;
#[cfg(test)]
mod tests;

pub use error::ConfigError;

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use itertools::Itertools;
use log::debug;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{grid::DomainSize, model::ModelConfig, solver::SolverOptions};

#[derive(Debug, Display, EnumIter, EnumString)]
enum ConfigFileType {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

pub(crate) static CONFIG_FILE_TYPES_COMMA_SEPARATED: Lazy<String> =
    Lazy::new(|| ConfigFileType::iter().join(", "));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolveConfig {
    pub solver: SolverOptions,

    pub domain_size: DomainSize,

    /// Glob patterns of the parameters to solve for.
    pub solve_parms: Vec<String>,

    /// Glob patterns of parameters to keep fixed, even if they match
    /// `solve_parms`.
    pub exclude_parms: Vec<String>,

    pub model: ModelConfig,
}

impl Default for SolveConfig {
    fn default() -> Self {
        SolveConfig {
            solver: SolverOptions::default(),
            domain_size: DomainSize::default(),
            solve_parms: vec!["Gain:*".to_string()],
            exclude_parms: vec![],
            model: ModelConfig::default(),
        }
    }
}

impl SolveConfig {
    /// Read and validate a toml or json configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SolveConfig, ConfigError> {
        let path = path.as_ref();
        let file_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ConfigFileType::from_str(&e).ok())
            .ok_or_else(|| ConfigError::UnrecognisedExtension(path.to_path_buf()))?;

        let mut contents = String::new();
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut contents))
            .map_err(|err| ConfigError::Read {
                path: path.to_path_buf(),
                err,
            })?;
        debug!("Parsing {file_type} config file {}", path.display());

        let config: SolveConfig = match file_type {
            ConfigFileType::Toml => toml::from_str(&contents).map_err(|err| ConfigError::Toml {
                path: path.to_path_buf(),
                err,
            })?,
            ConfigFileType::Json => {
                serde_json::from_str(&contents).map_err(|err| ConfigError::Json {
                    path: path.to_path_buf(),
                    err,
                })?
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };

        let s = &self.solver;
        if s.max_iter == 0 {
            return invalid("solver.max_iter", "must be at least 1");
        }
        if !(s.epsilon > 0.0 && s.epsilon.is_finite()) {
            return invalid("solver.epsilon", "must be positive");
        }
        if !(s.min_converged > 0.0 && s.min_converged <= 1.0) {
            return invalid("solver.min_converged", "must be in (0, 1]");
        }
        if !(s.lm_lambda > 0.0 && s.lm_lambda.is_finite()) {
            return invalid("solver.lm_lambda", "must be positive");
        }
        if !(s.lm_factor > 1.0 && s.lm_factor.is_finite()) {
            return invalid("solver.lm_factor", "must be larger than 1");
        }
        if s.lm_max_lambda.is_nan() || s.lm_max_lambda <= s.lm_lambda {
            return invalid("solver.lm_max_lambda", "must be larger than lm_lambda");
        }

        for (field, size) in [
            ("domain_size.band_width", self.domain_size.band_width),
            ("domain_size.time_interval", self.domain_size.time_interval),
        ] {
            if let Some(size) = size {
                if !(size > 0.0) {
                    return invalid(field, "must be positive");
                }
            }
        }

        if self.solve_parms.is_empty() {
            return invalid("solve_parms", "no parameters to solve for");
        }
        if !(-90.0..=90.0).contains(&self.model.elevation_cutoff) {
            return invalid("model.elevation_cutoff", "must be in [-90, 90] degrees");
        }
        Ok(())
    }
}
