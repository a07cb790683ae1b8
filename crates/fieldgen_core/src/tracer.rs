use crate::definition::Definition;
use crate::error::EngineError;
use crate::geometry::{Point, Viewport};

/// Fixed Euler step in x.
pub const STEP_SIZE: f64 = 0.0005;

/// Iteration budget for each directional pass.
pub const MAX_STEPS_PER_PASS: usize = 2_000_000;

/// Approximates the solution curve of dy/dx = f(x, y) through
/// (xinit, yinit) by bidirectional fixed-step Euler integration, clipped to
/// the viewport.
///
/// Each pass records the current point, evaluates the slope, then advances;
/// a pass stops when the advanced point leaves the viewport, when the slope
/// evaluation hits a singularity, or when the step budget runs out. Hitting
/// a singularity is normal termination: the partial curve is the result.
///
/// Both passes start from the initial point (the backward pass does not
/// continue from where the forward pass ended), so the initial point appears
/// twice in the output: once opening the forward half, once opening the
/// backward half. Points are returned in insertion order, forward half
/// first.
pub fn trace_fixed_step(
    definition: &Definition,
    xinit: f64,
    yinit: f64,
    viewport: &Viewport,
) -> Result<Vec<Point>, EngineError> {
    viewport.validate()?;
    if !xinit.is_finite() || !yinit.is_finite() {
        return Err(EngineError::InvalidArgument(format!(
            "initial point ({xinit}, {yinit}) must be finite"
        )));
    }
    let compiled = definition.resolve()?;

    let mut points = Vec::new();
    let mut stack = Vec::with_capacity(16);
    for direction in [1.0_f64, -1.0] {
        let mut x = xinit;
        let mut y = yinit;
        for _ in 0..MAX_STEPS_PER_PASS {
            points.push(Point { x, y });
            let slope = match compiled.eval_scalar(x, y, &mut stack) {
                Ok(slope) => slope,
                Err(err) => {
                    // Singular point; keep what was accumulated and end the pass.
                    log::debug!("euler pass stopped at ({x}, {y}): {err}");
                    break;
                }
            };
            x += direction * STEP_SIZE;
            y += direction * slope * STEP_SIZE;
            if !viewport.contains(x, y) {
                break;
            }
        }
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn default_viewport() -> Viewport {
        Viewport::new(-10.0, 10.0, -10.0, 10.0).expect("viewport should validate")
    }

    /// Index where the backward half starts: the second exact occurrence of
    /// the initial point.
    fn backward_start(points: &[Point], init: Point) -> usize {
        points
            .iter()
            .skip(1)
            .position(|p| *p == init)
            .map(|i| i + 1)
            .expect("backward half should restart from the initial point")
    }

    #[test]
    fn both_halves_start_at_the_initial_point() {
        // Tall viewport so the x bounds are what terminates both passes.
        let viewport = Viewport::new(-10.0, 10.0, -60.0, 60.0).unwrap();
        let points =
            trace_fixed_step(&"x".into(), 0.0, 0.0, &viewport).expect("trace should succeed");
        assert!(!points.is_empty());
        let init = Point::new(0.0, 0.0);
        assert_eq!(points[0], init);
        let split = backward_start(&points, init);
        assert_eq!(points[split], init);
        // Forward half ascends in x, backward half descends.
        assert!(points[split - 1].x > 9.9);
        assert!(points.last().unwrap().x < -9.9);
    }

    #[test]
    fn all_points_stay_inside_the_viewport() {
        let viewport = default_viewport();
        let points =
            trace_fixed_step(&"x - y".into(), 1.0, 2.0, &viewport).expect("trace should succeed");
        for p in &points {
            assert!(
                viewport.contains(p.x, p.y),
                "point ({}, {}) escaped the viewport",
                p.x,
                p.y
            );
        }
    }

    #[test]
    fn euler_tracks_the_quadratic_solution() {
        // dy/dx = x through the origin solves to y = x^2 / 2; explicit Euler
        // with step h lags by at most h*|x|/2.
        let points = trace_fixed_step(&"x".into(), 0.0, 0.0, &default_viewport())
            .expect("trace should succeed");
        for p in &points {
            let exact = p.x * p.x / 2.0;
            let bound = STEP_SIZE * p.x.abs() / 2.0 + 1e-9;
            assert!(
                (p.y - exact).abs() <= bound,
                "y({}) = {} deviates from {exact} beyond {bound}",
                p.x,
                p.y
            );
        }
    }

    #[test]
    fn singularity_ends_a_pass_without_error() {
        // dy/dx = 1/x is singular exactly at the initial point: each pass
        // records the initial point and stops, so the result is two points.
        let points = trace_fixed_step(&"1/x".into(), 0.0, 0.0, &default_viewport())
            .expect("trace should succeed despite the singularity");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], points[1]);
    }

    #[test]
    fn native_definitions_trace_identically_to_text() {
        let viewport = default_viewport();
        let text = trace_fixed_step(&"x - y".into(), 0.5, -0.5, &viewport).unwrap();
        let native = trace_fixed_step(
            &Definition::native(|x, y| x - y),
            0.5,
            -0.5,
            &viewport,
        )
        .unwrap();
        assert_eq!(text, native);
    }

    #[test]
    fn repeated_traces_are_identical() {
        let viewport = default_viewport();
        let first = trace_fixed_step(&"sin(x)*y".into(), 0.0, 1.0, &viewport).unwrap();
        let second = trace_fixed_step(&"sin(x)*y".into(), 0.0, 1.0, &viewport).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_definitions_fail_before_stepping() {
        assert!(matches!(
            trace_fixed_step(&"x +* y".into(), 0.0, 0.0, &default_viewport()),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(matches!(
            trace_fixed_step(&"x + w".into(), 0.0, 0.0, &default_viewport()),
            Err(EngineError::UndefinedSymbol(_))
        ));
        let bad = Viewport {
            xmin: 3.0,
            xmax: -3.0,
            ymin: 0.0,
            ymax: 1.0,
        };
        assert!(matches!(
            trace_fixed_step(&"x".into(), 0.0, 0.0, &bad),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            .. ProptestConfig::default()
        })]

        #[test]
        fn prop_trace_is_nonempty_and_anchored(
            xinit in -2.0f64..2.0,
            yinit in -2.0f64..2.0,
            half_width in 0.5f64..4.0,
            half_height in 0.5f64..4.0,
        ) {
            let viewport = Viewport::new(
                xinit - half_width,
                xinit + half_width,
                yinit - half_height,
                yinit + half_height,
            ).unwrap();
            let points = trace_fixed_step(&"x - y".into(), xinit, yinit, &viewport).unwrap();
            prop_assert!(!points.is_empty());
            prop_assert_eq!(points[0], Point::new(xinit, yinit));
            for p in &points {
                prop_assert!(viewport.contains(p.x, p.y));
            }
        }
    }
}
