// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Observed visibilities.
//!
//! A [`VisBuffer`] holds one [`Sample`] and one flag per (time, frequency,
//! baseline) cell. Its time and frequency indices are the same as those of
//! the [`Grid`] it is defined on, so cell (t, f) of a buffer lines up with cell
//! (t, f) of a model [`ValueSet`](crate::value_set::ValueSet) evaluated on the
//! same grid. Every operation that selects or coalesces cells produces the
//! matching grid alongside the data to keep it that way.

mod error;
#[cfg(test)]
mod tests;

pub use error::VisError;

use std::sync::Arc;

use itertools::izip;
use log::debug;
use ndarray::prelude::*;

use crate::{
    expr_set::{Baseline, ExprSet, ExprSetError},
    grid::{AxisMapping, DomainRanges, Grid},
    value_set::Sample,
};

#[derive(Debug, Clone)]
pub struct VisBuffer {
    grid: Arc<Grid>,
    baselines: Vec<Baseline>,
    /// Axes are (time, frequency, baseline).
    data_tfb: Array3<Sample>,
    flags_tfb: Array3<bool>,
}

impl VisBuffer {
    pub fn new(
        grid: Arc<Grid>,
        baselines: Vec<Baseline>,
        data_tfb: Array3<Sample>,
        flags_tfb: Array3<bool>,
    ) -> Result<VisBuffer, VisError> {
        let (n_time, n_freq) = grid.shape();
        let expected = (n_time, n_freq, baselines.len());
        if data_tfb.dim() != expected {
            return Err(VisError::BadShape {
                expected,
                got: data_tfb.dim(),
            });
        }
        if flags_tfb.dim() != data_tfb.dim() {
            return Err(VisError::FlagShape {
                data: data_tfb.dim(),
                flags: flags_tfb.dim(),
            });
        }
        Ok(VisBuffer {
            grid,
            baselines,
            data_tfb,
            flags_tfb,
        })
    }

    /// Unflagged zeros.
    pub fn zeros(grid: Arc<Grid>, baselines: Vec<Baseline>) -> VisBuffer {
        let (n_time, n_freq) = grid.shape();
        let dim = (n_time, n_freq, baselines.len());
        VisBuffer {
            grid,
            baselines,
            data_tfb: Array3::from_elem(dim, Sample::zero()),
            flags_tfb: Array3::from_elem(dim, false),
        }
    }

    /// Noiseless visibilities predicted by a model on its current grid.
    /// Cells the model can't predict are flagged.
    pub fn simulate(set: &ExprSet) -> Result<VisBuffer, VisError> {
        let grid = Arc::clone(set.grid().ok_or(ExprSetError::NoGrid)?);
        let results = set.evaluate_all()?;
        let mut vis = VisBuffer::zeros(grid, set.baselines().to_vec());
        for (i_bl, result) in results.iter().enumerate() {
            vis.data_tfb
                .slice_mut(s![.., .., i_bl])
                .assign(&result.values());
            vis.flags_tfb
                .slice_mut(s![.., .., i_bl])
                .assign(&result.flags());
        }
        debug!(
            "Simulated {} baselines; {} cells flagged",
            vis.baselines.len(),
            vis.num_flagged()
        );
        Ok(vis)
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn baselines(&self) -> &[Baseline] {
        &self.baselines
    }

    pub fn baseline_index(&self, baseline: Baseline) -> Option<usize> {
        self.baselines.iter().position(|&b| b == baseline)
    }

    /// Axes are (time, frequency, baseline).
    pub fn data(&self) -> ArrayView3<Sample> {
        self.data_tfb.view()
    }

    pub fn data_mut(&mut self) -> ArrayViewMut3<Sample> {
        self.data_tfb.view_mut()
    }

    pub fn flags(&self) -> ArrayView3<bool> {
        self.flags_tfb.view()
    }

    pub fn flags_mut(&mut self) -> ArrayViewMut3<bool> {
        self.flags_tfb.view_mut()
    }

    /// The (time, frequency) data of one baseline.
    pub fn baseline_data(&self, i_bl: usize) -> ArrayView2<Sample> {
        self.data_tfb.slice(s![.., .., i_bl])
    }

    pub fn baseline_flags(&self, i_bl: usize) -> ArrayView2<bool> {
        self.flags_tfb.slice(s![.., .., i_bl])
    }

    /// Flag every cell of a baseline.
    pub fn flag_baseline(&mut self, i_bl: usize) {
        self.flags_tfb.slice_mut(s![.., .., i_bl]).fill(true);
    }

    pub fn num_flagged(&self) -> usize {
        self.flags_tfb.iter().filter(|&&f| f).count()
    }

    /// Check that this buffer's cells line up with a model's.
    pub fn check_alignment(&self, set: &ExprSet) -> Result<(), VisError> {
        if self.baselines.len() != set.size() {
            return Err(VisError::BaselineMismatch {
                vis: self.baselines.len(),
                model: set.size(),
            });
        }
        let (vis_time, vis_freq) = self.grid.shape();
        let (model_time, model_freq) = set
            .grid()
            .map(|g| g.shape())
            .ok_or(ExprSetError::NoGrid)?;
        if (vis_time, vis_freq) != (model_time, model_freq) {
            return Err(VisError::GridMismatch {
                vis_time,
                vis_freq,
                model_time,
                model_freq,
            });
        }
        Ok(())
    }

    /// The data of one calibration domain, on the domain's sub-grid.
    pub fn slice(&self, ranges: &DomainRanges) -> Result<VisBuffer, VisError> {
        let grid = self.grid.subset(ranges.time.clone(), ranges.freq.clone())?;
        let data = self
            .data_tfb
            .slice(s![ranges.time.clone(), ranges.freq.clone(), ..])
            .to_owned();
        let flags = self
            .flags_tfb
            .slice(s![ranges.time.clone(), ranges.freq.clone(), ..])
            .to_owned();
        VisBuffer::new(Arc::new(grid), self.baselines.clone(), data, flags)
    }

    /// Average every `time_factor` x `freq_factor` cells into one.
    pub fn compress(&self, time_factor: usize, freq_factor: usize) -> Result<VisBuffer, VisError> {
        let (grid, time_map, freq_map) = self.grid.compress(time_factor, freq_factor)?;
        Ok(self.compress_with(Arc::new(grid), &time_map, &freq_map))
    }

    /// Average the cells of each group of the mappings into one. Only
    /// unflagged cells contribute; a new cell with no unflagged contributions
    /// is flagged.
    fn compress_with(
        &self,
        grid: Arc<Grid>,
        time_map: &AxisMapping,
        freq_map: &AxisMapping,
    ) -> VisBuffer {
        let mut out = VisBuffer::zeros(grid, self.baselines.clone());
        for (time_group, mut data_fb, mut flags_fb) in izip!(
            &time_map.groups,
            out.data_tfb.outer_iter_mut(),
            out.flags_tfb.outer_iter_mut()
        ) {
            for (freq_group, mut data_b, mut flags_b) in izip!(
                &freq_map.groups,
                data_fb.outer_iter_mut(),
                flags_fb.outer_iter_mut()
            ) {
                let chunk_data =
                    self.data_tfb
                        .slice(s![time_group.clone(), freq_group.clone(), ..]);
                let chunk_flags =
                    self.flags_tfb
                        .slice(s![time_group.clone(), freq_group.clone(), ..]);
                for (data_tf, flags_tf, avg, flag) in izip!(
                    chunk_data.axis_iter(Axis(2)),
                    chunk_flags.axis_iter(Axis(2)),
                    data_b.iter_mut(),
                    flags_b.iter_mut()
                ) {
                    let mut sum = Sample::zero();
                    let mut count = 0;
                    for (&sample, &flagged) in data_tf.iter().zip(flags_tf.iter()) {
                        if !flagged {
                            sum += sample;
                            count += 1;
                        }
                    }
                    if count > 0 {
                        *avg = sum * (1.0 / count as f64);
                    } else {
                        *flag = true;
                    }
                }
            }
        }
        out
    }
}
