use crate::definition::{Compiled, Definition};
use crate::error::EngineError;
use crate::geometry::Point;
use crate::solvers::Dopri5;
use crate::traits::DynamicalSystem;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Number of evenly spaced sample times reported over [0, tmax].
pub const SAMPLE_COUNT: usize = 500;

// Tolerances and step-controller constants for the embedded pair.
const RTOL: f64 = 1e-3;
const ATOL: f64 = 1e-6;
const SAFETY: f64 = 0.9;
const MIN_SCALE: f64 = 0.2;
const MAX_SCALE: f64 = 10.0;
const MAX_STEPS: usize = 1_000_000;

/// Trajectory of a coupled planar system, sampled at [`SAMPLE_COUNT`]
/// evenly spaced times, plus the component time series over the same axis
/// for the companion time-domain views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametricTrajectory {
    /// (x, y) positions at the sample times.
    pub path: Vec<Point>,
    /// (t, x(t)) pairs.
    pub time_series_x: Vec<(f64, f64)>,
    /// (t, y(t)) pairs.
    pub time_series_y: Vec<(f64, f64)>,
}

/// The coupled system [dx/dt, dy/dt] = [f(x, y), g(x, y)].
///
/// Interior mutability for the VM scratch stack keeps derivative evaluation
/// allocation-free; this makes the system !Sync, which is fine for the
/// single-threaded driver below.
struct CoupledSystem<'a> {
    fx: Compiled<'a>,
    fy: Compiled<'a>,
    stack: RefCell<Vec<f64>>,
}

impl DynamicalSystem<f64> for CoupledSystem<'_> {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) -> Result<(), EngineError> {
        let mut stack = self.stack.borrow_mut();
        out[0] = self.fx.eval_scalar(x[0], x[1], &mut stack)?;
        out[1] = self.fy.eval_scalar(x[0], x[1], &mut stack)?;
        Ok(())
    }
}

/// Integrates dx/dt = f(x, y), dy/dt = g(x, y) from (xinit, yinit) over
/// [0, tmax], reporting [`SAMPLE_COUNT`] evenly spaced samples.
///
/// Uses an adaptive Dormand-Prince 5(4) integrator; steps are capped so
/// every requested sample time is hit exactly. Unlike the fixed-step
/// tracer, a singularity here is not a termination signal: any evaluation
/// error, non-finite state, or step-control breakdown surfaces as
/// `IntegrationFailure`.
pub fn trace_parametric(
    x_definition: &Definition,
    y_definition: &Definition,
    xinit: f64,
    yinit: f64,
    tmax: f64,
) -> Result<ParametricTrajectory, EngineError> {
    if !tmax.is_finite() || tmax <= 0.0 {
        return Err(EngineError::InvalidArgument(format!(
            "time horizon must be finite and positive, got {tmax}"
        )));
    }
    if !xinit.is_finite() || !yinit.is_finite() {
        return Err(EngineError::InvalidArgument(format!(
            "initial point ({xinit}, {yinit}) must be finite"
        )));
    }
    let system = CoupledSystem {
        fx: x_definition.resolve()?,
        fy: y_definition.resolve()?,
        stack: RefCell::new(Vec::with_capacity(16)),
    };

    let times: Vec<f64> = (0..SAMPLE_COUNT)
        .map(|i| tmax * i as f64 / (SAMPLE_COUNT - 1) as f64)
        .collect();

    let mut solver = Dopri5::new(2);
    let mut state = [xinit, yinit];
    let mut t = 0.0;
    let mut dt = tmax / SAMPLE_COUNT as f64;
    let mut y_out = [0.0; 2];
    let mut y_err = [0.0; 2];
    let mut steps = 0usize;

    let mut path = Vec::with_capacity(SAMPLE_COUNT);
    path.push(Point::new(state[0], state[1]));

    for &target in &times[1..] {
        while t < target {
            let h = dt.min(target - t);
            steps += 1;
            if steps > MAX_STEPS {
                return Err(EngineError::IntegrationFailure(format!(
                    "step budget exhausted at t = {t}"
                )));
            }
            solver
                .step(&system, t, &state, h, &mut y_out, &mut y_err)
                .map_err(|err| {
                    EngineError::IntegrationFailure(format!(
                        "derivative evaluation failed at t = {t}: {err}"
                    ))
                })?;
            if !y_out.iter().all(|v| v.is_finite()) {
                return Err(EngineError::IntegrationFailure(format!(
                    "non-finite state at t = {}",
                    t + h
                )));
            }

            let err_norm = error_norm(&state, &y_out, &y_err);
            if err_norm <= 1.0 {
                t += h;
                state = y_out;
                dt = h * (SAFETY * err_norm.powf(-0.2)).clamp(MIN_SCALE, MAX_SCALE);
            } else {
                dt = h * (SAFETY * err_norm.powf(-0.2)).clamp(MIN_SCALE, 1.0);
                log::trace!("step rejected at t = {t}: err = {err_norm}, retry dt = {dt}");
                if dt < f64::EPSILON * tmax {
                    return Err(EngineError::IntegrationFailure(format!(
                        "step size underflow at t = {t}"
                    )));
                }
            }
        }
        path.push(Point::new(state[0], state[1]));
    }

    let time_series_x = times.iter().zip(&path).map(|(&t, p)| (t, p.x)).collect();
    let time_series_y = times.iter().zip(&path).map(|(&t, p)| (t, p.y)).collect();
    Ok(ParametricTrajectory {
        path,
        time_series_x,
        time_series_y,
    })
}

/// RMS of the error estimate against the mixed absolute/relative tolerance;
/// values <= 1 mean the step is within tolerance.
fn error_norm(y0: &[f64], y1: &[f64], err: &[f64]) -> f64 {
    let mut acc = 0.0;
    for i in 0..y0.len() {
        let tol = ATOL + RTOL * y0[i].abs().max(y1[i].abs());
        let ratio = err[i] / tol;
        acc += ratio * ratio;
    }
    (acc / y0.len() as f64).sqrt()
}
