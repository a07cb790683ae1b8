use crate::definition::Definition;
use crate::error::EngineError;
use crate::geometry::Viewport;
use nalgebra::DMatrix;

/// Lattice points per axis at density 1.
pub const LATTICE_POINTS_PER_DENSITY: usize = 20;

/// Evaluates a definition over a rectangular lattice spanning the viewport,
/// `density * 20` evenly spaced points per axis, endpoints included.
///
/// The result has one row per y lattice value and one column per x lattice
/// value: entry (r, c) is the definition evaluated at (xs\[c\], ys\[r\]).
/// Evaluation is broadcast, so isolated singularities come back as inf/NaN
/// sentinels instead of failing the whole lattice; the field renderer drops
/// or skips those points.
pub fn evaluate_over_grid(
    definition: &Definition,
    viewport: &Viewport,
    density: usize,
) -> Result<DMatrix<f64>, EngineError> {
    viewport.validate()?;
    if density == 0 {
        return Err(EngineError::InvalidArgument(
            "grid density must be at least 1".to_string(),
        ));
    }
    let compiled = definition.resolve()?;

    let n = density * LATTICE_POINTS_PER_DENSITY;
    let xs = linspace(viewport.xmin, viewport.xmax, n);
    let ys = linspace(viewport.ymin, viewport.ymax, n);
    let grid_x = DMatrix::from_fn(n, n, |_r, c| xs[c]);
    let grid_y = DMatrix::from_fn(n, n, |r, _c| ys[r]);

    Ok(compiled.eval_grid(&grid_x, &grid_y))
}

/// `n` evenly spaced values from `start` to `end` inclusive.
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![start];
    }
    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|i| start + step * i as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_has_density_times_twenty_points_per_axis() {
        let viewport = Viewport::new(-1.0, 1.0, -1.0, 1.0).unwrap();
        let grid = evaluate_over_grid(&"x*y".into(), &viewport, 2).unwrap();
        assert_eq!(grid.shape(), (40, 40));
    }

    #[test]
    fn lattice_orientation_matches_meshgrid() {
        let viewport = Viewport::new(0.0, 1.0, 10.0, 11.0).unwrap();
        let grid = evaluate_over_grid(&"x + y".into(), &viewport, 1).unwrap();
        // Row 0 is ymin, column 0 is xmin; opposite corner holds the maxima.
        assert!((grid[(0, 0)] - 10.0).abs() < 1e-12);
        assert!((grid[(19, 19)] - 12.0).abs() < 1e-12);
        // Moving along a row varies x only.
        assert!((grid[(0, 19)] - 11.0).abs() < 1e-12);
    }

    #[test]
    fn singularities_become_sentinels_not_errors() {
        // xmin = 0 puts a whole column on the y/x singularity.
        let viewport = Viewport::new(0.0, 10.0, 1.0, 10.0).unwrap();
        let grid = evaluate_over_grid(&"y/x".into(), &viewport, 1).unwrap();
        assert!(grid[(0, 0)].is_infinite());
        assert!(grid[(0, 1)].is_finite());
    }

    #[test]
    fn native_definitions_broadcast_elementwise() {
        let viewport = Viewport::new(0.0, 1.0, 0.0, 1.0).unwrap();
        let definition = Definition::native(|x, y| x - y);
        let grid = evaluate_over_grid(&definition, &viewport, 1).unwrap();
        assert!((grid[(0, 19)] - 1.0).abs() < 1e-12);
        assert!((grid[(19, 0)] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_inputs_fail_eagerly() {
        let viewport = Viewport::new(0.0, 1.0, 0.0, 1.0).unwrap();
        assert!(matches!(
            evaluate_over_grid(&"x".into(), &viewport, 0),
            Err(EngineError::InvalidArgument(_))
        ));
        let bad = Viewport {
            xmin: 1.0,
            xmax: 0.0,
            ymin: 0.0,
            ymax: 1.0,
        };
        assert!(matches!(
            evaluate_over_grid(&"x".into(), &bad, 1),
            Err(EngineError::InvalidArgument(_))
        ));
    }
}
