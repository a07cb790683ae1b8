use crate::error::EngineError;
use crate::traits::{DynamicalSystem, Scalar};

/// Dormand-Prince 5(4) embedded pair.
///
/// One trial step produces the 5th-order solution together with the
/// embedded 4th-order error estimate; the caller owns step acceptance and
/// step-size control. Stage buffers are preallocated per solver instance.
pub struct Dopri5<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    k7: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> Dopri5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::from_f64(0.0).unwrap();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            k7: vec![z; dim],
            tmp: vec![z; dim],
        }
    }

    /// Attempts one step of size `dt` from (t, state).
    ///
    /// Writes the 5th-order solution into `y_out` and the raw embedded
    /// error estimate (already scaled by `dt`) into `y_err`. Neither `t`
    /// nor `state` is advanced; the caller decides acceptance.
    pub fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: T,
        state: &[T],
        dt: T,
        y_out: &mut [T],
        y_err: &mut [T],
    ) -> Result<(), EngineError> {
        let c2 = T::from_f64(1.0 / 5.0).unwrap();
        let c3 = T::from_f64(3.0 / 10.0).unwrap();
        let c4 = T::from_f64(4.0 / 5.0).unwrap();
        let c5 = T::from_f64(8.0 / 9.0).unwrap();

        let a21 = T::from_f64(1.0 / 5.0).unwrap();

        let a31 = T::from_f64(3.0 / 40.0).unwrap();
        let a32 = T::from_f64(9.0 / 40.0).unwrap();

        let a41 = T::from_f64(44.0 / 45.0).unwrap();
        let a42 = T::from_f64(-56.0 / 15.0).unwrap();
        let a43 = T::from_f64(32.0 / 9.0).unwrap();

        let a51 = T::from_f64(19372.0 / 6561.0).unwrap();
        let a52 = T::from_f64(-25360.0 / 2187.0).unwrap();
        let a53 = T::from_f64(64448.0 / 6561.0).unwrap();
        let a54 = T::from_f64(-212.0 / 729.0).unwrap();

        let a61 = T::from_f64(9017.0 / 3168.0).unwrap();
        let a62 = T::from_f64(-355.0 / 33.0).unwrap();
        let a63 = T::from_f64(46732.0 / 5247.0).unwrap();
        let a64 = T::from_f64(49.0 / 176.0).unwrap();
        let a65 = T::from_f64(-5103.0 / 18656.0).unwrap();

        // 5th-order weights (also the a7 row: the final stage sits on the
        // solution, so k7 is free for the error estimate).
        let b1 = T::from_f64(35.0 / 384.0).unwrap();
        let b3 = T::from_f64(500.0 / 1113.0).unwrap();
        let b4 = T::from_f64(125.0 / 192.0).unwrap();
        let b5 = T::from_f64(-2187.0 / 6784.0).unwrap();
        let b6 = T::from_f64(11.0 / 84.0).unwrap();

        // Embedded 4th-order weights.
        let bh1 = T::from_f64(5179.0 / 57600.0).unwrap();
        let bh3 = T::from_f64(7571.0 / 16695.0).unwrap();
        let bh4 = T::from_f64(393.0 / 640.0).unwrap();
        let bh5 = T::from_f64(-92097.0 / 339200.0).unwrap();
        let bh6 = T::from_f64(187.0 / 2100.0).unwrap();
        let bh7 = T::from_f64(1.0 / 40.0).unwrap();

        system.apply(t, state, &mut self.k1)?;

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (a21 * self.k1[i]);
        }
        system.apply(t + c2 * dt, &self.tmp, &mut self.k2)?;

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (a31 * self.k1[i] + a32 * self.k2[i]);
        }
        system.apply(t + c3 * dt, &self.tmp, &mut self.k3)?;

        for i in 0..state.len() {
            self.tmp[i] =
                state[i] + dt * (a41 * self.k1[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        system.apply(t + c4 * dt, &self.tmp, &mut self.k4)?;

        for i in 0..state.len() {
            self.tmp[i] = state[i]
                + dt * (a51 * self.k1[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        system.apply(t + c5 * dt, &self.tmp, &mut self.k5)?;

        for i in 0..state.len() {
            self.tmp[i] = state[i]
                + dt * (a61 * self.k1[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        system.apply(t + dt, &self.tmp, &mut self.k6)?;

        for i in 0..state.len() {
            y_out[i] = state[i]
                + dt * (b1 * self.k1[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }
        system.apply(t + dt, y_out, &mut self.k7)?;

        for i in 0..state.len() {
            y_err[i] = dt
                * ((b1 - bh1) * self.k1[i]
                    + (b3 - bh3) * self.k3[i]
                    + (b4 - bh4) * self.k4[i]
                    + (b5 - bh5) * self.k5[i]
                    + (b6 - bh6) * self.k6[i]
                    - bh7 * self.k7[i]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ExponentialDecay;

    impl DynamicalSystem<f64> for ExponentialDecay {
        fn dimension(&self) -> usize {
            1
        }
        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) -> Result<(), EngineError> {
            out[0] = -x[0];
            Ok(())
        }
    }

    struct HarmonicOscillator;

    impl DynamicalSystem<f64> for HarmonicOscillator {
        fn dimension(&self) -> usize {
            2
        }
        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) -> Result<(), EngineError> {
            out[0] = x[1];
            out[1] = -x[0];
            Ok(())
        }
    }

    #[test]
    fn single_step_is_fifth_order_accurate_on_decay() {
        let mut solver = Dopri5::new(1);
        let mut y_out = [0.0];
        let mut y_err = [0.0];
        let dt = 0.1;
        solver
            .step(&ExponentialDecay, 0.0, &[1.0], dt, &mut y_out, &mut y_err)
            .expect("step should succeed");
        let exact = (-dt).exp();
        assert!(
            (y_out[0] - exact).abs() < 1e-8,
            "y = {}, exact = {exact}",
            y_out[0]
        );
        assert!(y_err[0].abs() < 1e-6);
    }

    #[test]
    fn fixed_stepping_holds_oscillator_amplitude() {
        let mut solver = Dopri5::new(2);
        let mut state = [1.0, 0.0];
        let mut t = 0.0;
        let dt = 0.01;
        let mut y_out = [0.0; 2];
        let mut y_err = [0.0; 2];
        for _ in 0..628 {
            solver
                .step(&HarmonicOscillator, t, &state, dt, &mut y_out, &mut y_err)
                .expect("step should succeed");
            state = y_out;
            t += dt;
        }
        // One full revolution: back near (1, 0) with unit energy.
        let energy = state[0] * state[0] + state[1] * state[1];
        assert!((energy - 1.0).abs() < 1e-9, "energy drifted to {energy}");
        assert!((state[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn derivative_failure_propagates() {
        struct Singular;
        impl DynamicalSystem<f64> for Singular {
            fn dimension(&self) -> usize {
                1
            }
            fn apply(&self, _t: f64, _x: &[f64], _out: &mut [f64]) -> Result<(), EngineError> {
                Err(EngineError::DivisionByZero)
            }
        }
        let mut solver = Dopri5::new(1);
        let mut y_out = [0.0];
        let mut y_err = [0.0];
        assert_eq!(
            solver.step(&Singular, 0.0, &[1.0], 0.1, &mut y_out, &mut y_err),
            Err(EngineError::DivisionByZero)
        );
    }
}
