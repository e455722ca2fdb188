// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Building measurement equations.
//!
//! The visibility of baseline (p, q) is modelled as
//!
//! `V_pq = G_p [Σ_s E_s K_ps K_qs* C_s E_s^H] G_q^H`
//!
//! where `G_p` is station p's direction-independent gain (and bandpass),
//! `E_s` the direction-dependent effects towards source s, `K_ps` the
//! geometric phase of station p towards source s and `C_s` the source's
//! coherency. Every per-station, per-source and per-(station, source) term is
//! a single node shared by all baselines that use it.

mod error;

pub use error::ModelError;

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use marlu::{RADec, XyzGeodetic};
use serde::{Deserialize, Serialize};
use vec1::Vec1;

use crate::{
    constants::{DEFAULT_DIPOLE_HEIGHT, DEFAULT_DIPOLE_ORIENTATION_DEG, DEFAULT_ELEVATION_CUTOFF_DEG},
    expr::{
        count_nodes, parm_names, AmplitudePhase, ArrayPosition, AzEl, DiagonalJones, DipoleBeam,
        ElevationCut, ExprRef, FaradayRotation, Hermitian, Lmn, MatrixProduct, ParallacticRotation,
        ParmExpr, PointCoherence, SpectralIndex, StationShift, StationUvw, Sum,
    },
    expr_set::{Baseline, ExprSet},
    grid::Domain,
    parm::{MemoryParmDb, ParmDb, ParmDbError, ParmManager},
};

/// Which effects go into the measurement equation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Per-station complex gains (`Gain:{11,22}:{Ampl,Phase}:<station>`).
    pub gain: bool,

    /// Per-station real bandpass (`Bandpass:{11,22}:<station>`).
    pub bandpass: bool,

    /// A crossed-dipole beam over a ground plane (`DipoleHeight`).
    pub beam: bool,

    /// The orientation of the X dipoles from north through east
    /// \[degrees\].
    pub dipole_orientation: f64,

    /// Rotate coherencies from the sky frame to the local horizontal frame.
    pub parallactic: bool,

    /// Faraday rotation towards each source (`RotationMeasure:<source>`).
    pub faraday: bool,

    /// Drop sources below `elevation_cutoff`.
    pub elevation_cut: bool,

    /// \[degrees\]
    pub elevation_cutoff: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            gain: true,
            bandpass: false,
            beam: false,
            dipole_orientation: DEFAULT_DIPOLE_ORIENTATION_DEG,
            parallactic: false,
            faraday: false,
            elevation_cut: false,
            elevation_cutoff: DEFAULT_ELEVATION_CUTOFF_DEG,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Station {
    pub name: String,
    pub position: XyzGeodetic,
}

/// A point source. Its position, Stokes parameters, spectral index and
/// rotation measure are all parameters (`Ra:<name>`, `I:<name>`, ...).
#[derive(Debug, Clone)]
pub struct SkySource {
    pub name: String,
    /// The frequency the Stokes parameters are specified at \[Hz\].
    pub reference_freq: f64,
}

/// The nodes of one station that don't depend on direction.
struct StationTerms {
    uvw: ExprRef,
    /// `G_p` and `G_p^H`.
    gain: Option<(ExprRef, ExprRef)>,
}

/// The nodes of one source that don't depend on the station.
struct SourceTerms {
    lmn: ExprRef,
    coherence: ExprRef,
    /// `E_s` and `E_s^H`.
    effects: Option<(ExprRef, ExprRef)>,
}

#[derive(Debug, Clone)]
pub struct MeasurementModel {
    config: ModelConfig,
    array: ArrayPosition,
    phase_centre: RADec,
    stations: Vec1<Station>,
    sources: Vec1<SkySource>,
}

impl MeasurementModel {
    pub fn new(
        config: ModelConfig,
        array: ArrayPosition,
        phase_centre: RADec,
        stations: Vec<Station>,
        sources: Vec<SkySource>,
    ) -> Result<MeasurementModel, ModelError> {
        let stations = Vec1::try_from_vec(stations).map_err(|_| ModelError::NoStations)?;
        let sources = Vec1::try_from_vec(sources).map_err(|_| ModelError::NoSources)?;

        let mut seen = HashSet::new();
        if let Some(st) = stations.iter().find(|st| !seen.insert(st.name.as_str())) {
            return Err(ModelError::DuplicateStation(st.name.clone()));
        }
        let mut seen = HashSet::new();
        if let Some(src) = sources.iter().find(|src| !seen.insert(src.name.as_str())) {
            return Err(ModelError::DuplicateSource(src.name.clone()));
        }

        Ok(MeasurementModel {
            config,
            array,
            phase_centre,
            stations,
            sources,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The same array, stations and sources with different effects.
    pub fn with_config(&self, config: ModelConfig) -> MeasurementModel {
        MeasurementModel {
            config,
            ..self.clone()
        }
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn sources(&self) -> &[SkySource] {
        &self.sources
    }

    /// Every baseline between two different stations, with p < q.
    pub fn cross_baselines(&self) -> Vec<Baseline> {
        let n = self.stations.len();
        (0..n)
            .flat_map(|p| (p + 1..n).map(move |q| Baseline(p, q)))
            .collect()
    }

    /// Build the expression of every baseline.
    pub fn build(&self, baselines: &[Baseline]) -> Result<Vec<ExprRef>, ModelError> {
        let n_stations = self.stations.len();
        if let Some(&baseline) = baselines
            .iter()
            .find(|b| b.0 >= n_stations || b.1 >= n_stations)
        {
            return Err(ModelError::StationOutOfRange {
                baseline,
                n_stations,
            });
        }

        let dipole_height = ParmExpr::new("DipoleHeight");
        let stations: Vec<StationTerms> = self
            .stations
            .iter()
            .map(|st| self.station_terms(st))
            .collect();
        let sources: Vec<SourceTerms> = self
            .sources
            .iter()
            .map(|src| self.source_terms(src, &dipole_height))
            .collect();

        // K_ps and K_ps*, indexed [station][source].
        let shifts: Vec<Vec<(ExprRef, ExprRef)>> = stations
            .iter()
            .map(|st| {
                sources
                    .iter()
                    .map(|src| {
                        let k = StationShift::new(Arc::clone(&st.uvw), Arc::clone(&src.lmn));
                        let k_conj = Hermitian::new(Arc::clone(&k));
                        (k, k_conj)
                    })
                    .collect()
            })
            .collect();

        let roots: Vec<ExprRef> = baselines
            .iter()
            .map(|&Baseline(p, q)| {
                let mut terms: Vec<ExprRef> = sources
                    .iter()
                    .enumerate()
                    .map(|(s, src)| {
                        let mut factors = Vec::with_capacity(5);
                        if let Some((e, _)) = &src.effects {
                            factors.push(Arc::clone(e));
                        }
                        factors.push(Arc::clone(&shifts[p][s].0));
                        factors.push(Arc::clone(&shifts[q][s].1));
                        factors.push(Arc::clone(&src.coherence));
                        if let Some((_, e_h)) = &src.effects {
                            factors.push(Arc::clone(e_h));
                        }
                        MatrixProduct::new(factors)
                    })
                    .collect();
                let sky = match terms.len() {
                    1 => terms.remove(0),
                    _ => Sum::new(terms),
                };
                match (&stations[p].gain, &stations[q].gain) {
                    (Some((g_p, _)), Some((_, g_q_h))) => {
                        MatrixProduct::new(vec![Arc::clone(g_p), sky, Arc::clone(g_q_h)])
                    }
                    _ => sky,
                }
            })
            .collect();

        debug!(
            "Built a measurement equation for {} baselines, {} stations and {} sources ({} nodes)",
            baselines.len(),
            n_stations,
            self.sources.len(),
            count_nodes(&roots)
        );
        Ok(roots)
    }

    fn station_terms(&self, station: &Station) -> StationTerms {
        let name = &station.name;
        let uvw = StationUvw::new(station.position, self.array, self.phase_centre);

        let mut factors = vec![];
        if self.config.gain {
            let gain = |pol: &str| {
                AmplitudePhase::new(
                    ParmExpr::new(format!("Gain:{pol}:Ampl:{name}")),
                    ParmExpr::new(format!("Gain:{pol}:Phase:{name}")),
                )
            };
            factors.push(DiagonalJones::new(gain("11"), gain("22")));
        }
        if self.config.bandpass {
            factors.push(DiagonalJones::new(
                ParmExpr::new(format!("Bandpass:11:{name}")),
                ParmExpr::new(format!("Bandpass:22:{name}")),
            ));
        }

        StationTerms {
            uvw,
            gain: product(factors).map(|g| {
                let g_h = Hermitian::new(Arc::clone(&g));
                (g, g_h)
            }),
        }
    }

    fn source_terms(&self, source: &SkySource, dipole_height: &ExprRef) -> SourceTerms {
        let name = &source.name;
        let parm = |kind: &str| ParmExpr::new(format!("{kind}:{name}"));
        let ra = parm("Ra");
        let dec = parm("Dec");

        let lmn = Lmn::new(Arc::clone(&ra), Arc::clone(&dec), self.phase_centre);
        let stokes_i = SpectralIndex::new(parm("I"), parm("SpectralIndex"), source.reference_freq);
        let coherence = PointCoherence::new(stokes_i, parm("Q"), parm("U"), parm("V"));

        // Applied to the coherency right to left.
        let mut factors = vec![];
        if self.config.elevation_cut || self.config.beam {
            let azel = AzEl::new(Arc::clone(&ra), Arc::clone(&dec), self.array);
            if self.config.elevation_cut {
                factors.push(ElevationCut::new(
                    Arc::clone(&azel),
                    self.config.elevation_cutoff.to_radians(),
                ));
            }
            if self.config.beam {
                factors.push(DipoleBeam::new(
                    azel,
                    Arc::clone(dipole_height),
                    self.config.dipole_orientation.to_radians(),
                ));
            }
        }
        if self.config.parallactic {
            factors.push(ParallacticRotation::new(
                Arc::clone(&ra),
                Arc::clone(&dec),
                self.array,
            ));
        }
        if self.config.faraday {
            factors.push(FaradayRotation::new(parm("RotationMeasure")));
        }

        SourceTerms {
            lmn,
            coherence,
            effects: product(factors).map(|e| {
                let e_h = Hermitian::new(Arc::clone(&e));
                (e, e_h)
            }),
        }
    }

    /// The names of the parameters the given baselines' expressions read.
    pub fn parm_names(&self, baselines: &[Baseline]) -> Result<Vec<String>, ModelError> {
        Ok(parm_names(&self.build(baselines)?))
    }

    /// Build the expressions of `baselines` and load their parameters for
    /// `domain`.
    pub fn expr_set(
        &self,
        baselines: Vec<Baseline>,
        db: &dyn ParmDb,
        domain: &Domain,
    ) -> Result<ExprSet, ModelError> {
        let roots = self.build(&baselines)?;
        let parms = ParmManager::load(db, &parm_names(&roots), domain)?;
        Ok(ExprSet::new(baselines, roots, parms)?)
    }
}

fn product(mut factors: Vec<ExprRef>) -> Option<ExprRef> {
    match factors.len() {
        0 => None,
        1 => factors.pop(),
        _ => Some(MatrixProduct::new(factors)),
    }
}

/// Fill in the parameters that usually aren't stored: unit gains, zero
/// phases, unpolarised flat-spectrum sources and no Faraday rotation.
pub fn set_default_values(db: &mut MemoryParmDb) -> Result<(), ParmDbError> {
    for (pattern, value) in [
        ("Gain:*:Ampl:*", 1.0),
        ("Gain:*:Phase:*", 0.0),
        ("Bandpass:*", 1.0),
        ("Q:*", 0.0),
        ("U:*", 0.0),
        ("V:*", 0.0),
        ("SpectralIndex:*", 0.0),
        ("RotationMeasure:*", 0.0),
        ("DipoleHeight", DEFAULT_DIPOLE_HEIGHT),
    ] {
        db.set_default_value(pattern, value)?;
    }
    Ok(())
}
