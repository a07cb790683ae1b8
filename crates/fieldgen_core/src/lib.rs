//! The `fieldgen_core` crate is the numeric engine behind slope-field,
//! vector-field, and solution-curve visualization of first-order planar
//! ODEs. It produces sample sequences; turning them into figures is the
//! rendering collaborator's job.
//!
//! Key components:
//! - **Expression engine**: a restricted-grammar parser and bytecode VM that
//!   turns textual definitions over `x`/`y` into evaluatable form, with a
//!   checked scalar mode and a broadcast grid mode.
//! - **Definition adapter**: the `Expression`-or-`Native` tagged union every
//!   entry point accepts, validated on each invocation.
//! - **Tracers**: bidirectional fixed-step Euler for dy/dx = f(x, y), and an
//!   adaptive Dormand-Prince 5(4) driver for coupled parametric systems.
//! - **Grid evaluation**: one broadcast pass over a viewport lattice for
//!   field rendering.

pub mod definition;
pub mod error;
pub mod expr;
pub mod geometry;
pub mod grid;
pub mod parametric;
pub mod solvers;
pub mod tracer;
pub mod traits;

pub use definition::{evaluate, Definition};
pub use error::EngineError;
pub use geometry::{Point, Viewport};
pub use grid::evaluate_over_grid;
pub use parametric::{trace_parametric, ParametricTrajectory};
pub use tracer::trace_fixed_step;
