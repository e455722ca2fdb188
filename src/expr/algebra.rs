// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Combinators: sums, products and conjugate transposes.

use std::sync::Arc;

use super::{cellwise, check_arity, Expr, ExprError, ExprRef, NodeId, SolveContext};
use crate::{
    request::Request,
    value_set::{Sample, Shape, ValueSet},
};

/// The element-wise sum of any number of arguments of the same shape.
#[derive(Debug)]
pub struct Sum {
    id: NodeId,
    args: Vec<ExprRef>,
}

impl Sum {
    pub fn new(terms: Vec<ExprRef>) -> ExprRef {
        Arc::new(Sum {
            id: NodeId::next(),
            args: terms,
        })
    }
}

impl Expr for Sum {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "Sum"
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
        let shape = match args.first() {
            Some(a) => a.shape(),
            None => {
                return Err(ExprError::ArgumentCount {
                    node: self.name(),
                    expected: "at least 1".to_string(),
                    got: 0,
                })
            }
        };
        for (i, arg) in args.iter().enumerate() {
            if arg.shape() != shape {
                return Err(ExprError::ShapeMismatch {
                    node: self.name(),
                    argument: i,
                    expected: shape.to_string(),
                    found: arg.shape(),
                });
            }
        }

        let sum = |s: &[Sample]| s.iter().fold(Sample::zero(), |acc, &x| acc + x);
        Ok(cellwise(
            request,
            shape,
            args,
            |_, x| Some(sum(x)),
            |_, _, dx| sum(dx),
        ))
    }
}

/// Multiply two samples, each either a scalar or a Jones matrix.
fn mul(a: Sample, a_shape: Shape, b: Sample, b_shape: Shape) -> Sample {
    match (a_shape, b_shape) {
        (Shape::Jones, Shape::Jones) => a.matmul(b),
        (Shape::Jones, _) => a.scale(b.as_scalar()),
        (_, Shape::Jones) => b.scale(a.as_scalar()),
        _ => Sample::scalar(a.as_scalar() * b.as_scalar()),
    }
}

/// The (matrix) product of its arguments, from left to right. Arguments may
/// be any mix of scalars and Jones matrices; the result is a Jones matrix if
/// any argument is.
#[derive(Debug)]
pub struct MatrixProduct {
    id: NodeId,
    args: Vec<ExprRef>,
}

impl MatrixProduct {
    pub fn new(factors: Vec<ExprRef>) -> ExprRef {
        Arc::new(MatrixProduct {
            id: NodeId::next(),
            args: factors,
        })
    }
}

impl Expr for MatrixProduct {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "MatrixProduct"
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
        if args.is_empty() {
            return Err(ExprError::ArgumentCount {
                node: self.name(),
                expected: "at least 1".to_string(),
                got: 0,
            });
        }
        let shapes: Vec<Shape> = args.iter().map(|a| a.shape()).collect();
        if let Some((i, &found)) = shapes
            .iter()
            .enumerate()
            .find(|(_, s)| !matches!(s, Shape::Scalar | Shape::Jones))
        {
            return Err(ExprError::ShapeMismatch {
                node: self.name(),
                argument: i,
                expected: "scalar or Jones matrix".to_string(),
                found,
            });
        }
        let out_shape = if shapes.contains(&Shape::Jones) {
            Shape::Jones
        } else {
            Shape::Scalar
        };

        // Running products keep track of the shape so far.
        let product = |x: &[Sample]| {
            let mut acc = (x[0], shapes[0]);
            for (&s, &shape) in x.iter().zip(&shapes).skip(1) {
                let out = if acc.1 == Shape::Jones || shape == Shape::Jones {
                    Shape::Jones
                } else {
                    Shape::Scalar
                };
                acc = (mul(acc.0, acc.1, s, shape), out);
            }
            acc.0
        };

        Ok(cellwise(
            request,
            out_shape,
            args,
            |_, x| Some(product(x)),
            |_, x, dx| {
                // Product rule: replace one factor at a time by its tangent.
                let mut factors = x.to_vec();
                let mut total = Sample::zero();
                for (k, d) in dx.iter().enumerate() {
                    if *d == Sample::zero() {
                        continue;
                    }
                    factors[k] = *d;
                    total += product(factors.as_slice());
                    factors[k] = x[k];
                }
                total
            },
        ))
    }
}

/// The conjugate transpose of a Jones matrix, or the conjugate of a scalar.
#[derive(Debug)]
pub struct Hermitian {
    id: NodeId,
    args: [ExprRef; 1],
}

impl Hermitian {
    pub fn new(arg: ExprRef) -> ExprRef {
        Arc::new(Hermitian {
            id: NodeId::next(),
            args: [arg],
        })
    }
}

impl Expr for Hermitian {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "Hermitian"
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
        check_arity(self.name(), args, 1)?;
        let shape = args[0].shape();
        let op: fn(Sample) -> Sample = match shape {
            Shape::Jones => Sample::h,
            Shape::Scalar => Sample::conj,
            found => {
                return Err(ExprError::ShapeMismatch {
                    node: self.name(),
                    argument: 0,
                    expected: "scalar or Jones matrix".to_string(),
                    found,
                })
            }
        };

        // Parameters are real, so conjugation commutes with differentiation.
        Ok(cellwise(
            request,
            shape,
            args,
            |_, x| Some(op(x[0])),
            |_, _, dx| op(dx[0]),
        ))
    }
}
