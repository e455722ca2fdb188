// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Expression DAGs.
//!
//! A model is a directed acyclic graph of [`Expr`] nodes. Evaluating a node
//! for a [`Request`] evaluates its arguments for the same request, combines
//! their [`ValueSet`]s cell by cell and caches the result in the
//! [`SolveContext`]'s [`Cache`], so that a node shared by many roots (e.g. a
//! per-station gain used by every baseline of that station) is computed once
//! per request.
//!
//! Derivatives are propagated in forward mode: every node that combines its
//! arguments also combines their derivatives (tangents) with the chain rule,
//! for each derivative index present in any argument. Leaves ([`ParmExpr`])
//! seed the tangents with the exact polynomial basis functions.

mod algebra;
mod error;
mod geometry;
mod jones;
mod leaf;
mod sky;

pub use algebra::{Hermitian, MatrixProduct, Sum};
pub use error::ExprError;
pub use geometry::{ArrayPosition, AzEl, Lmn, StationShift, StationUvw};
pub use jones::{
    AmplitudePhase, DiagonalJones, DipoleBeam, ElevationCut, FaradayRotation,
    ParallacticRotation,
};
pub use leaf::{Constant, ParmExpr};
pub use sky::{PointCoherence, SpectralIndex};

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ndarray::prelude::*;

use crate::{
    cache::{Cache, CachePolicy},
    parm::ParmManager,
    request::Request,
    value_set::{Sample, Shape, ValueSet},
};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

/// The identity of an expression node. Unique for the lifetime of the
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn next() -> NodeId {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type ExprRef = Arc<dyn Expr>;

/// A node in an expression DAG.
pub trait Expr: Send + Sync + fmt::Debug {
    fn id(&self) -> NodeId;

    /// The kind of node, for diagnostics.
    fn name(&self) -> &'static str;

    fn arguments(&self) -> &[ExprRef] {
        &[]
    }

    fn n_arguments(&self) -> usize {
        self.arguments().len()
    }

    fn argument(&self, i: usize) -> Option<&ExprRef> {
        self.arguments().get(i)
    }

    /// How long results of this node should be kept. Results that depend on
    /// solvable parameters are only ever kept for the current iteration,
    /// whatever this says.
    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::Permanent
    }

    /// If this node reads a parameter, its name.
    fn parm_name(&self) -> Option<&str> {
        None
    }

    /// Compute this node's result from its arguments' results (which are
    /// given in argument order, evaluated for the same request).
    fn compute(
        &self,
        ctx: &SolveContext,
        request: &Request,
        args: &[Arc<ValueSet>],
    ) -> Result<ValueSet, ExprError>;
}

/// Everything needed to evaluate expressions: the result cache and the
/// parameters.
#[derive(Debug, Default)]
pub struct SolveContext {
    cache: Cache,
    parms: ParmManager,
}

impl SolveContext {
    pub fn new(parms: ParmManager) -> SolveContext {
        SolveContext {
            cache: Cache::new(),
            parms,
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn parms(&self) -> &ParmManager {
        &self.parms
    }

    /// Parameters can only be changed when nothing is being evaluated.
    pub fn parms_mut(&mut self) -> &mut ParmManager {
        &mut self.parms
    }

    pub fn into_parms(self) -> ParmManager {
        self.parms
    }

    pub fn evaluate(
        &self,
        expr: &dyn Expr,
        request: &Request,
    ) -> Result<Arc<ValueSet>, ExprError> {
        evaluate(expr, self, request)
    }
}

/// Evaluate a node for a request, using the context's cache.
pub fn evaluate(
    expr: &dyn Expr,
    ctx: &SolveContext,
    request: &Request,
) -> Result<Arc<ValueSet>, ExprError> {
    let compute = || -> Result<ValueSet, ExprError> {
        let args = expr
            .arguments()
            .iter()
            .map(|a| evaluate(a.as_ref(), ctx, request))
            .collect::<Result<Vec<_>, _>>()?;
        let vs = expr.compute(ctx, request, &args)?;
        if vs.dim() != request.grid().shape() {
            return Err(ExprError::GridMismatch {
                node: expr.name(),
                expected: request.grid().shape(),
                found: vs.dim(),
            });
        }
        Ok(vs)
    };

    match expr.cache_policy() {
        CachePolicy::None => compute().map(Arc::new),
        hint => ctx
            .cache
            .get_or_compute(expr.id(), request.id(), || {
                let vs = compute()?;
                let policy = if vs.is_volatile() {
                    hint.min(CachePolicy::Volatile)
                } else {
                    hint
                };
                Ok((vs, policy))
            }),
    }
}

/// Visit every node reachable from `roots` exactly once, parents before
/// children.
pub fn walk(roots: &[ExprRef], mut f: impl FnMut(&ExprRef)) {
    let mut seen = HashSet::new();
    let mut stack: Vec<&ExprRef> = roots.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id()) {
            continue;
        }
        f(node);
        stack.extend((0..node.n_arguments()).rev().filter_map(|i| node.argument(i)));
    }
}

/// The (sorted, unique) names of all parameters read by `roots`.
pub fn parm_names(roots: &[ExprRef]) -> Vec<String> {
    let mut names = BTreeSet::new();
    walk(roots, |node| {
        if let Some(name) = node.parm_name() {
            names.insert(name.to_string());
        }
    });
    names.into_iter().collect()
}

/// The number of distinct nodes reachable from `roots`.
pub fn count_nodes(roots: &[ExprRef]) -> usize {
    let mut n = 0;
    walk(roots, |_| n += 1);
    n
}

/// The position of a cell being computed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cell {
    pub(crate) i_time: usize,
    pub(crate) time: f64,
    pub(crate) freq: f64,
}

/// Compute a node's result cell by cell.
///
/// `value` maps the arguments' samples for a cell to the node's sample, or
/// `None` if the cell has no valid value (it is then flagged). `tangent` maps
/// the arguments' samples and the arguments' derivatives (for one derivative
/// index) to the node's derivative; it must be linear in the derivatives.
///
/// A cell is flagged if any argument's cell is flagged, or if its value or
/// any of its derivatives isn't finite. The result is volatile if any
/// argument is.
pub(crate) fn cellwise<V, T>(
    request: &Request,
    shape: Shape,
    args: &[Arc<ValueSet>],
    value: V,
    tangent: T,
) -> ValueSet
where
    V: Fn(&Cell, &[Sample]) -> Option<Sample>,
    T: Fn(&Cell, &[Sample], &[Sample]) -> Sample,
{
    let grid = request.grid();
    let dim = grid.shape();
    let times = grid.time().centers().collect::<Vec<_>>();
    let freqs = grid.freq().centers().collect::<Vec<_>>();
    let cell = |i_time: usize, i_freq: usize| Cell {
        i_time,
        time: times[i_time],
        freq: freqs[i_freq],
    };

    let mut flags = Array2::from_elem(dim, false);
    for arg in args {
        flags.zip_mut_with(&arg.flags(), |f, &a| *f |= a);
    }

    let mut values = Array2::from_elem(dim, Sample::default());
    let mut x = vec![Sample::default(); args.len()];
    for ((i_time, i_freq), v) in values.indexed_iter_mut() {
        if flags[(i_time, i_freq)] {
            continue;
        }
        for (x, arg) in x.iter_mut().zip(args) {
            *x = arg.value(i_time, i_freq);
        }
        match value(&cell(i_time, i_freq), &x) {
            Some(s) if s.is_finite() => *v = s,
            _ => flags[(i_time, i_freq)] = true,
        }
    }

    let spids: BTreeSet<usize> = args.iter().flat_map(|a| a.spids()).collect();
    let mut partials = Vec::with_capacity(spids.len());
    let mut dx = vec![Sample::default(); args.len()];
    for spid in spids {
        let arg_partials: Vec<Option<ArrayView2<Sample>>> =
            args.iter().map(|a| a.partial(spid)).collect();
        let mut partial = Array2::from_elem(dim, Sample::default());
        for ((i_time, i_freq), d) in partial.indexed_iter_mut() {
            if flags[(i_time, i_freq)] {
                continue;
            }
            for (((x, dx), arg), arg_partial) in
                x.iter_mut().zip(dx.iter_mut()).zip(args).zip(&arg_partials)
            {
                *x = arg.value(i_time, i_freq);
                *dx = arg_partial
                    .as_ref()
                    .map(|p| p[(i_time, i_freq)])
                    .unwrap_or_default();
            }
            let t = tangent(&cell(i_time, i_freq), &x, &dx);
            if t.is_finite() {
                *d = t;
            } else {
                // Zeroed with the values (and earlier partials) below.
                flags[(i_time, i_freq)] = true;
            }
        }
        partials.push((spid, partial));
    }

    let mut vs = ValueSet::new(shape, values, flags)
        .with_volatile(args.iter().any(|a| a.is_volatile()));
    for (spid, partial) in partials {
        vs.insert_partial(spid, partial);
    }
    vs
}

pub(crate) fn check_arity(
    node: &'static str,
    args: &[Arc<ValueSet>],
    expected: usize,
) -> Result<(), ExprError> {
    if args.len() != expected {
        return Err(ExprError::ArgumentCount {
            node,
            expected: expected.to_string(),
            got: args.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_shape(
    node: &'static str,
    args: &[Arc<ValueSet>],
    argument: usize,
    expected: Shape,
) -> Result<(), ExprError> {
    let found = args[argument].shape();
    if found != expected {
        return Err(ExprError::ShapeMismatch {
            node,
            argument,
            expected: expected.to_string(),
            found,
        });
    }
    Ok(())
}
