// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use super::*;
use crate::grid::Axis;

fn grid() -> Arc<Grid> {
    Arc::new(Grid::new(
        Axis::regular(0.0, 1.0, 3).unwrap(),
        Axis::regular(1e8, 1e6, 2).unwrap(),
    ))
}

#[test]
fn test_request_ids_increase() {
    let grid = grid();
    let r1 = Request::values_only(Arc::clone(&grid));
    let r2 = Request::values_only(grid);
    assert!(r2.id() > r1.id());
    assert_ne!(r1, r2);
    assert_eq!(r1, r1.clone());
}

#[test]
fn test_request_spids_are_sorted() {
    let r = Request::new(grid(), [5, 1, 3, 1]);
    assert_eq!(r.spids(), &[1, 3, 5]);
    assert!(r.wants_derivatives());
    assert!(r.wants(3));
    assert!(!r.wants(2));

    let values = r.with_spids([]);
    assert!(!values.wants_derivatives());
    assert_eq!(values.grid(), r.grid());
    assert_ne!(values.id(), r.id());
}
