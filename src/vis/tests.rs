// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;

use super::*;
use crate::{
    expr::{Constant, ParmExpr},
    grid::{self, DomainSize},
    parm::{Parm, ParmManager, Polc},
    value_set::Shape,
};

fn grid(n_time: usize, n_freq: usize) -> Arc<Grid> {
    Arc::new(Grid::new(
        grid::Axis::regular(1000.0, 10.0, n_time).unwrap(),
        grid::Axis::regular(100e6, 1e6, n_freq).unwrap(),
    ))
}

fn baselines() -> Vec<Baseline> {
    vec![Baseline(0, 1), Baseline(0, 2)]
}

/// Sample value encodes its position: t + 10 f + 100 b.
fn numbered(n_time: usize, n_freq: usize) -> VisBuffer {
    let mut vis = VisBuffer::zeros(grid(n_time, n_freq), baselines());
    for ((t, f, b), sample) in vis.data_mut().indexed_iter_mut() {
        *sample = Sample::real((t + 10 * f + 100 * b) as f64);
    }
    vis
}

#[test]
fn test_new_checks_shape() {
    let g = grid(2, 3);
    let result = VisBuffer::new(
        Arc::clone(&g),
        baselines(),
        Array3::from_elem((3, 2, 2), Sample::zero()),
        Array3::from_elem((3, 2, 2), false),
    );
    assert!(matches!(
        result,
        Err(VisError::BadShape {
            expected: (2, 3, 2),
            got: (3, 2, 2)
        })
    ));

    let result = VisBuffer::new(
        g,
        baselines(),
        Array3::from_elem((2, 3, 2), Sample::zero()),
        Array3::from_elem((2, 3, 1), false),
    );
    assert!(matches!(result, Err(VisError::FlagShape { .. })));
}

#[test]
fn test_slice_keeps_alignment() {
    let vis = numbered(4, 6);
    let ranges = vis.grid().split(&DomainSize {
        band_width: Some(3e6),
        time_interval: Some(20.0),
    });
    let ranges = ranges.unwrap();
    assert_eq!(ranges.len(), 4);

    let last = &ranges[3];
    let sliced = vis.slice(last).unwrap();
    assert_eq!(sliced.grid().shape(), (2, 3));
    assert_abs_diff_eq!(sliced.grid().time().start(), vis.grid().time().lower(2));
    assert_abs_diff_eq!(sliced.grid().freq().start(), vis.grid().freq().lower(3));
    // Cell (0, 0) of the slice is cell (2, 3) of the original.
    assert_eq!(sliced.baseline_data(1)[(0, 0)], Sample::real((2 + 30 + 100) as f64));
}

#[test]
fn test_compress_averages_unflagged() {
    let mut vis = numbered(4, 4);
    // Flag one of the four cells that make up compressed cell (0, 0) of
    // baseline 0.
    vis.flags_mut()[(1, 1, 0)] = true;
    // Flag all of compressed cell (1, 1) of baseline 1.
    for t in 2..4 {
        for f in 2..4 {
            vis.flags_mut()[(t, f, 1)] = true;
        }
    }

    let compressed = vis.compress(2, 2).unwrap();
    assert_eq!(compressed.grid().shape(), (2, 2));
    assert_abs_diff_eq!(compressed.grid().time().width(0), 20.0);

    // (0 + 10 + 1) / 3
    assert_abs_diff_eq!(compressed.data()[(0, 0, 0)][0].re, 11.0 / 3.0, epsilon = 1e-12);
    assert!(!compressed.flags()[(0, 0, 0)]);
    // (0 + 1 + 10 + 11) / 4 + 100
    assert_abs_diff_eq!(compressed.data()[(0, 0, 1)][0].re, 105.5, epsilon = 1e-12);
    assert!(compressed.flags()[(1, 1, 1)]);
    assert_eq!(compressed.data()[(1, 1, 1)], Sample::zero());
    assert_eq!(compressed.num_flagged(), 1);
}

#[test]
fn test_compress_uneven() {
    let compressed = numbered(3, 5).compress(2, 3).unwrap();
    assert_eq!(compressed.grid().shape(), (2, 2));
    // The last time cell is made of one cell, the last frequency cell of two.
    // (2 + 30) and (2 + 40)
    assert_abs_diff_eq!(compressed.data()[(1, 1, 0)][0].re, 37.0, epsilon = 1e-12);
}

#[test]
fn test_flag_baseline() {
    let mut vis = numbered(2, 2);
    vis.flag_baseline(1);
    assert_eq!(vis.num_flagged(), 4);
    assert!(vis.baseline_flags(1).iter().all(|&f| f));
    assert!(vis.baseline_flags(0).iter().all(|&f| !f));
    assert_eq!(vis.baseline_index(Baseline(0, 2)), Some(1));
    assert_eq!(vis.baseline_index(Baseline(1, 2)), None);
}

#[test]
fn test_simulate_and_alignment() {
    let mut pm = ParmManager::new();
    pm.add(Parm::new("A", Polc::constant(4.0))).unwrap();
    let roots = vec![
        ParmExpr::new("A"),
        Constant::new(Shape::Scalar, Sample::real(-1.0)),
    ];
    let mut set = ExprSet::new(baselines(), roots, pm).unwrap();
    assert!(matches!(
        VisBuffer::simulate(&set),
        Err(VisError::ExprSet(ExprSetError::NoGrid))
    ));

    set.set_eval_grid(grid(2, 3));
    let vis = VisBuffer::simulate(&set).unwrap();
    assert_eq!(vis.num_flagged(), 0);
    assert!(vis.baseline_data(0).iter().all(|s| *s == Sample::real(4.0)));
    assert!(vis.baseline_data(1).iter().all(|s| *s == Sample::real(-1.0)));
    vis.check_alignment(&set).unwrap();

    let other = VisBuffer::zeros(grid(3, 3), baselines());
    assert!(matches!(
        other.check_alignment(&set),
        Err(VisError::GridMismatch { .. })
    ));
    let other = VisBuffer::zeros(grid(2, 3), vec![Baseline(0, 1)]);
    assert!(matches!(
        other.check_alignment(&set),
        Err(VisError::BaselineMismatch { vis: 1, model: 2 })
    ));
}
