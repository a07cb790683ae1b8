use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// A single trajectory sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The rectangular region bounding trajectory growth and field sampling.
///
/// Invariant: all bounds finite, `xmin < xmax` and `ymin < ymax`. The fields
/// are public, so every entry point re-validates eagerly via [`validate`]
/// before any computation begins.
///
/// [`validate`]: Viewport::validate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Viewport {
    /// Builds a validated viewport.
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Result<Self, EngineError> {
        let viewport = Self {
            xmin,
            xmax,
            ymin,
            ymax,
        };
        viewport.validate()?;
        Ok(viewport)
    }

    /// Checks the viewport invariant, reporting violations as `InvalidArgument`.
    pub fn validate(&self) -> Result<(), EngineError> {
        let bounds = [self.xmin, self.xmax, self.ymin, self.ymax];
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(EngineError::InvalidArgument(
                "viewport bounds must be finite".to_string(),
            ));
        }
        if self.xmin >= self.xmax || self.ymin >= self.ymax {
            return Err(EngineError::InvalidArgument(format!(
                "viewport requires xmin < xmax and ymin < ymax, got \
                 ({}, {}, {}, {})",
                self.xmin, self.xmax, self.ymin, self.ymax
            )));
        }
        Ok(())
    }

    /// Whether (x, y) lies inside the viewport, boundary included.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_bounds() {
        assert!(Viewport::new(1.0, 1.0, 0.0, 1.0).is_err());
        assert!(Viewport::new(0.0, 1.0, 2.0, 1.0).is_err());
        assert!(Viewport::new(f64::NAN, 1.0, 0.0, 1.0).is_err());
        assert!(Viewport::new(0.0, f64::INFINITY, 0.0, 1.0).is_err());
    }

    #[test]
    fn contains_includes_the_boundary() {
        let viewport = Viewport::new(-1.0, 1.0, -2.0, 2.0).expect("viewport should validate");
        assert!(viewport.contains(1.0, 2.0));
        assert!(viewport.contains(0.0, 0.0));
        assert!(!viewport.contains(1.0000001, 0.0));
        assert!(!viewport.contains(0.0, -2.0000001));
        assert!(!viewport.contains(f64::NAN, 0.0));
    }
}
