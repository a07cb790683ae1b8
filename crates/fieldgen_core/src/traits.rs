use crate::error::EngineError;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars by the steppers.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A dynamical system dx/dt = F(t, x) evaluated at solver-chosen points.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the derivative vector at (t, x) into `out`.
    ///
    /// Evaluation is fallible: a derivative defined by a textual expression
    /// can hit a singularity at a solver-chosen stage point.
    fn apply(&self, t: T, x: &[T], out: &mut [T]) -> Result<(), EngineError>;
}
