// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Solving an observation domain by domain.
//!
//! The observation's grid is chopped into domains of a [`DomainSize`]. Each
//! domain gets its own [`ExprSet`](crate::expr_set::ExprSet), with
//! parameters read from the [`ParmDb`] for that domain, and its own solve.
//! Domains are independent and are solved in parallel; the database is only
//! locked while a domain's parameters are read or saved.
//!
//! [`DomainSize`]: crate::grid::DomainSize

mod error;

pub use error::CalibrateError;

use std::sync::{Arc, Mutex};

use crossbeam_utils::atomic::AtomicCell;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::{
    config::SolveConfig,
    grid::{Domain, DomainRanges},
    model::MeasurementModel,
    parm::ParmDb,
    solver::{SolveReport, SolveStatus, Solver},
    vis::VisBuffer,
    PROGRESS_BARS,
};

/// What happened to one domain.
#[derive(Debug)]
pub struct DomainOutcome {
    /// The position of this domain in the time-first ordering of domains.
    pub index: usize,
    /// The domain's cells in the observation's grid.
    pub ranges: DomainRanges,
    pub domain: Domain,
    pub result: Result<SolveReport, CalibrateError>,
    /// Were this domain's parameters written to the database?
    pub saved: bool,
}

impl DomainOutcome {
    pub fn converged(&self) -> bool {
        matches!(&self.result, Ok(report) if report.converged())
    }
}

/// Solve every domain of `vis` against the measurement equation of `model`.
/// The effects in the equation are those of `config.model`; `model` supplies
/// the array, stations and sources.
///
/// A domain that fails doesn't stop the others; its error is in its
/// [`DomainOutcome`]. Parameters are saved for domains that converged or hit
/// the iteration limit. Setting `cancel` stops domains that haven't started
/// yet and interrupts running ones between iterations.
pub fn solve_domains<D: ParmDb>(
    model: &MeasurementModel,
    vis: &VisBuffer,
    db: &Mutex<D>,
    config: &SolveConfig,
    cancel: Option<&AtomicCell<bool>>,
) -> Result<Vec<DomainOutcome>, CalibrateError> {
    config.validate()?;
    if model.config() != &config.model {
        debug!("Using the configured model effects: {:?}", config.model);
    }
    let model = &model.with_config(config.model.clone());
    let domains = vis
        .grid()
        .split(&config.domain_size)?
        .into_iter()
        .map(|ranges| {
            let slice = vis.slice(&ranges)?;
            Ok((ranges, slice))
        })
        .collect::<Result<Vec<_>, CalibrateError>>()?;
    info!(
        "Solving {} domains of {} baselines ({} x {} cells)",
        domains.len(),
        vis.baselines().len(),
        vis.grid().shape().0,
        vis.grid().shape().1
    );

    let progress_bar = make_calibration_progress_bar(domains.len(), "Solving domains".to_string());
    let outcomes: Vec<DomainOutcome> = domains
        .into_par_iter()
        .enumerate()
        .map(|(index, (ranges, slice))| {
            let domain = slice.grid().domain();
            let result = solve_domain(model, &slice, &domain, db, config, cancel);
            let (result, saved) = match result {
                Ok((report, saved)) => (Ok(report), saved),
                Err(e) => (Err(e), false),
            };

            let status_str = match &result {
                Ok(report) => format!(
                    "Domain {index:>3}: {:<9} ({:>2}): chi² {:.5e} -> {:.5e}",
                    report.status.to_string().to_lowercase(),
                    report.iterations,
                    report.initial_chi2,
                    report.chi2
                ),
                Err(e) => format!("Domain {index:>3}: failed: {e}"),
            };
            info!("{status_str}");
            progress_bar.inc(1);

            DomainOutcome {
                index,
                ranges,
                domain,
                result,
                saved,
            }
        })
        .collect();
    progress_bar.abandon_with_message("Finished solving domains");

    let n_converged = outcomes.iter().filter(|o| o.converged()).count();
    let n_failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!("{n_converged} of {} domains converged", outcomes.len());
    if n_failed > 0 {
        warn!("{n_failed} domains could not be solved");
    }
    Ok(outcomes)
}

/// Solve one domain, returning its report and whether its parameters were
/// saved.
fn solve_domain<D: ParmDb>(
    model: &MeasurementModel,
    vis: &VisBuffer,
    domain: &Domain,
    db: &Mutex<D>,
    config: &SolveConfig,
    cancel: Option<&AtomicCell<bool>>,
) -> Result<(SolveReport, bool), CalibrateError> {
    if cancel.map(|c| c.load()).unwrap_or(false) {
        return Err(CalibrateError::Cancelled);
    }

    let mut set = {
        let db = db.lock().map_err(|_| CalibrateError::Poisoned)?;
        model.expr_set(vis.baselines().to_vec(), &*db, domain)?
    };
    set.set_eval_grid(Arc::clone(vis.grid()));
    let solvable = set
        .parms()
        .select_solvable(&config.solve_parms, &config.exclude_parms)?;

    let mut solver = Solver::new(config.solver.clone());
    if let Some(cancel) = cancel {
        solver = solver.with_cancel(cancel);
    }
    let report = solver.solve(&mut set, vis, &solvable)?;

    let saved = report.status.is_usable();
    if saved {
        let mut db = db.lock().map_err(|_| CalibrateError::Poisoned)?;
        set.parms().save(&mut *db, domain)?;
    } else if report.status == SolveStatus::Diverged {
        warn!(
            "Not saving diverged solutions for domain {:.1}-{:.1} s, {:.4}-{:.4} MHz",
            domain.time_start,
            domain.time_end,
            domain.freq_start / 1e6,
            domain.freq_end / 1e6
        );
    }
    Ok((report, saved))
}

/// Convenience function to make a progress bar while solving.
fn make_calibration_progress_bar(num_domains: usize, message: String) -> ProgressBar {
    ProgressBar::with_draw_target(
        Some(num_domains as _),
        if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg}: [{wide_bar:.blue}] {pos:3}/{len:3} ({elapsed_precise}<{eta_precise})")
            .unwrap()
            .progress_chars("=> "),
    )
    .with_position(0)
    .with_message(message)
}
