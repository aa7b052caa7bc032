//! Physical key and pixel positions.

use serde::Serialize;
use std::fmt;

/// Physical position of a key switch or pixel.
///
/// Positions are partial: any subset of the six axes may be provided,
/// and later assignments overlay only the axes they mention. Distances
/// are millimetres, rotations degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PhysicalPosition {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub rx: Option<f64>,
    pub ry: Option<f64>,
    pub rz: Option<f64>,
}

impl PhysicalPosition {
    /// Creates a position with no axes set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an axis by its KLL name. Returns false for unknown names.
    pub fn set_axis(&mut self, axis: &str, value: f64) -> bool {
        match axis {
            "x" => self.x = Some(value),
            "y" => self.y = Some(value),
            "z" => self.z = Some(value),
            "rx" => self.rx = Some(value),
            "ry" => self.ry = Some(value),
            "rz" => self.rz = Some(value),
            _ => return false,
        }
        true
    }

    /// Overlays another position onto this one, axis by axis.
    ///
    /// Axes the other position does not provide are left untouched, so
    /// assigning only `x` never erases a previously set `y`.
    pub fn merge(&mut self, other: &PhysicalPosition) {
        if other.x.is_some() {
            self.x = other.x;
        }
        if other.y.is_some() {
            self.y = other.y;
        }
        if other.z.is_some() {
            self.z = other.z;
        }
        if other.rx.is_some() {
            self.rx = other.rx;
        }
        if other.ry.is_some() {
            self.ry = other.ry;
        }
        if other.rz.is_some() {
            self.rz = other.rz;
        }
    }

    /// Returns all six axes with unset axes defaulted to 0.
    #[must_use]
    pub fn resolved(&self) -> [f64; 6] {
        [
            self.x.unwrap_or(0.0),
            self.y.unwrap_or(0.0),
            self.z.unwrap_or(0.0),
            self.rx.unwrap_or(0.0),
            self.ry.unwrap_or(0.0),
            self.rz.unwrap_or(0.0),
        ]
    }

    /// True when no axis has been assigned.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.x.is_none()
            && self.y.is_none()
            && self.z.is_none()
            && self.rx.is_none()
            && self.ry.is_none()
            && self.rz.is_none()
    }
}

impl fmt::Display for PhysicalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let axes = [
            ("x", self.x),
            ("y", self.y),
            ("z", self.z),
            ("rx", self.rx),
            ("ry", self.ry),
            ("rz", self.rz),
        ];

        let mut first = true;
        for (name, value) in axes {
            if let Some(value) = value {
                if !first {
                    write!(f, ",")?;
                }
                if value.fract() == 0.0 {
                    write!(f, "{name}:{}", value as i64)?;
                } else {
                    write!(f, "{name}:{value}")?;
                }
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_preserves_unset_axes() {
        let mut position = PhysicalPosition::new();
        position.set_axis("x", 20.0);
        position.set_axis("y", 15.0);

        let mut update = PhysicalPosition::new();
        update.set_axis("x", 25.0);
        position.merge(&update);

        assert_eq!(position.x, Some(25.0));
        assert_eq!(position.y, Some(15.0));
    }

    #[test]
    fn test_resolved_defaults_to_zero() {
        let mut position = PhysicalPosition::new();
        position.set_axis("y", 9.5);
        assert_eq!(position.resolved(), [0.0, 9.5, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_display_only_set_axes() {
        let mut position = PhysicalPosition::new();
        position.set_axis("x", 20.0);
        position.set_axis("rz", 12.5);
        assert_eq!(position.to_string(), "x:20,rz:12.5");
    }

    #[test]
    fn test_unknown_axis_rejected() {
        let mut position = PhysicalPosition::new();
        assert!(!position.set_axis("w", 1.0));
        assert!(position.is_empty());
    }
}
