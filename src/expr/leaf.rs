// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Leaf nodes.

use std::sync::Arc;

use super::{Expr, ExprError, ExprRef, NodeId, SolveContext};
use crate::{
    cache::CachePolicy,
    request::Request,
    value_set::{Sample, Shape, ValueSet},
};

/// The same value in every cell.
#[derive(Debug)]
pub struct Constant {
    id: NodeId,
    shape: Shape,
    value: Sample,
}

impl Constant {
    pub fn new(shape: Shape, value: Sample) -> ExprRef {
        Arc::new(Constant {
            id: NodeId::next(),
            shape,
            value,
        })
    }

    pub fn real(value: f64) -> ExprRef {
        Constant::new(Shape::Scalar, Sample::real(value))
    }
}

impl Expr for Constant {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "Constant"
    }

    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::None
    }

    fn compute(
        &self,
        _: &SolveContext,
        request: &Request,
        _: &[Arc<ValueSet>],
    ) -> Result<ValueSet, ExprError> {
        Ok(ValueSet::constant(
            self.shape,
            self.value,
            request.grid().shape(),
        ))
    }
}

/// The value of a named parameter.
#[derive(Debug)]
pub struct ParmExpr {
    id: NodeId,
    name: String,
}

impl ParmExpr {
    pub fn new(name: impl Into<String>) -> ExprRef {
        Arc::new(ParmExpr {
            id: NodeId::next(),
            name: name.into(),
        })
    }
}

impl Expr for ParmExpr {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "Parm"
    }

    fn parm_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn compute(
        &self,
        ctx: &SolveContext,
        request: &Request,
        _: &[Arc<ValueSet>],
    ) -> Result<ValueSet, ExprError> {
        let parm = ctx
            .parms()
            .get(&self.name)
            .map_err(|_| ExprError::UnknownParameter(self.name.clone()))?;
        Ok(parm.evaluate(request))
    }
}
