//! Fit/transform interfaces.
//!
//! An [`Estimator`] turns a dataset into a [`Model`]; a model transforms
//! inputs into outputs. Orchestration code depends on these traits (and on
//! [`MatchIndex`](crate::MatchIndex)) rather than on concrete types, so any
//! implementation can be swapped in.

use crate::Result;

pub trait Estimator {
    type Input: ?Sized;
    type Model;

    fn fit(&self, data: &Self::Input) -> Result<Self::Model>;
}

pub trait Model {
    type Input;
    type Output;

    fn transform(&self, data: Self::Input) -> Result<Self::Output>;
}
