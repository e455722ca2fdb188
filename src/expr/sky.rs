// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sky-model nodes.

use std::sync::Arc;

use marlu::c64;

use super::{cellwise, check_arity, check_shape, Expr, ExprError, ExprRef, NodeId, SolveContext};
use crate::{
    request::Request,
    value_set::{Sample, Shape, ValueSet},
};

/// The coherency matrix of a point source, `[[I+Q, U+iV], [U-iV, I-Q]]`.
/// Arguments: Stokes I, Q, U and V \[Jy\].
#[derive(Debug)]
pub struct PointCoherence {
    id: NodeId,
    args: [ExprRef; 4],
}

impl PointCoherence {
    pub fn new(i: ExprRef, q: ExprRef, u: ExprRef, v: ExprRef) -> ExprRef {
        Arc::new(PointCoherence {
            id: NodeId::next(),
            args: [i, q, u, v],
        })
    }
}

fn coherence(stokes: &[Sample]) -> Sample {
    let [i, q, u, v] = [0, 1, 2, 3].map(|k| stokes[k].as_scalar());
    let iv = c64::i() * v;
    Sample::jones(i + q, u + iv, u - iv, i - q)
}

impl Expr for PointCoherence {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "PointCoherence"
    }

    fn arguments(&self) -> &[ExprRef] {
        &self.args
    }

    fn compute(
        &self,
        _: &SolveContext,
        request: &Request,
        args: &[Arc<ValueSet>],
    ) -> Result<ValueSet, ExprError> {
        check_arity(self.name(), args, 4)?;
        for i in 0..4 {
            check_shape(self.name(), args, i, Shape::Scalar)?;
        }

        // Linear in the Stokes parameters.
        Ok(cellwise(
            request,
            Shape::Jones,
            args,
            |_, x| Some(coherence(x)),
            |_, _, dx| coherence(dx),
        ))
    }
}

/// A flux density scaled to each frequency with a power law,
/// `S (f / f0)^α`. Arguments: the flux density at the reference frequency
/// and the spectral index.
#[derive(Debug)]
pub struct SpectralIndex {
    id: NodeId,
    args: [ExprRef; 2],
    /// \[Hz\]
    reference_freq: f64,
}

impl SpectralIndex {
    pub fn new(flux: ExprRef, index: ExprRef, reference_freq: f64) -> ExprRef {
        Arc::new(SpectralIndex {
            id: NodeId::next(),
            args: [flux, index],
            reference_freq,
        })
    }
}

impl Expr for SpectralIndex {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "SpectralIndex"
    }

    fn arguments(&self) -> &[ExprRef] {
        &self.args
    }

    fn compute(
        &self,
        _: &SolveContext,
        request: &Request,
        args: &[Arc<ValueSet>],
    ) -> Result<ValueSet, ExprError> {
        check_arity(self.name(), args, 2)?;
        check_shape(self.name(), args, 0, Shape::Scalar)?;
        check_shape(self.name(), args, 1, Shape::Scalar)?;
        let f0 = self.reference_freq;

        Ok(cellwise(
            request,
            Shape::Scalar,
            args,
            |cell, x| {
                let ratio = cell.freq / f0;
                if ratio <= 0.0 {
                    return None;
                }
                Some(Sample::scalar(x[0].as_scalar() * ratio.powf(x[1].re(0))))
            },
            |cell, x, dx| {
                let ratio = cell.freq / f0;
                let scale = ratio.powf(x[1].re(0));
                let flux = x[0].as_scalar();
                Sample::scalar(
                    dx[0].as_scalar() * scale + flux * (scale * ratio.ln() * dx[1].re(0)),
                )
            },
        ))
    }
}
