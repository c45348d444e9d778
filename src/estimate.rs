//! Distance heuristic.
//!
//! The estimate is a focal-length style proportionality:
//!
//! ```text
//! distance = apparent_size * known_size / reference_size
//! ```
//!
//! It is an approximation, not a calibrated measurement. Its accuracy depends
//! entirely on camera optics (focal length, sensor size, lens distortion) that
//! are not modeled here. Treat the result as a relative "closer / farther"
//! signal.
//!
//! The safe distance threshold assumes a fixed half-angle of view and the
//! fraction of the reference size that should fill the view at the boundary:
//!
//! ```text
//! safe = round(reference_size * safe_fraction / tan(half_angle))
//! ```

use serde::Deserialize;

/// Assumed real-world size of the target class (average person height, inches).
pub const DEFAULT_KNOWN_SIZE_IN: f64 = 72.0;
/// Assumed half-angle of view (60 degree total field of view).
pub const DEFAULT_HALF_ANGLE_DEG: f64 = 30.0;
/// Fraction of the reference size that fills the view at the safe boundary.
pub const DEFAULT_SAFE_FRACTION: f64 = 0.75;

/// Which bounding-box dimension is used as the apparent size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApparentDimension {
    #[default]
    Width,
    Height,
}

impl ApparentDimension {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "width" | "w" => Some(Self::Width),
            "height" | "h" => Some(Self::Height),
            _ => None,
        }
    }
}

/// Policy constants for the distance heuristic.
///
/// The assumed class size and the user's reference size are independent
/// parameters; only the former lives here.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimatorSettings {
    pub known_size_in: f64,
    pub half_angle_deg: f64,
    pub safe_fraction: f64,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            known_size_in: DEFAULT_KNOWN_SIZE_IN,
            half_angle_deg: DEFAULT_HALF_ANGLE_DEG,
            safe_fraction: DEFAULT_SAFE_FRACTION,
        }
    }
}

impl EstimatorSettings {
    /// Estimated distance in inches, or `None` when the reference size is not
    /// a positive finite number ("unknown").
    pub fn estimate_distance(&self, apparent_size: f64, reference_size: f64) -> Option<f64> {
        if !is_valid_reference(reference_size) {
            return None;
        }
        let distance = apparent_size * self.known_size_in / reference_size;
        distance.is_finite().then_some(distance)
    }

    /// Safe distance threshold in whole inches. Zero for an invalid reference
    /// size, which means the alert never triggers.
    pub fn calculate_safe_distance(&self, reference_size: f64) -> u32 {
        if !is_valid_reference(reference_size) {
            return 0;
        }
        let half_angle = self.half_angle_deg.to_radians();
        let safe = (reference_size * self.safe_fraction) / half_angle.tan();
        if safe.is_finite() && safe > 0.0 {
            safe.round().min(u32::MAX as f64) as u32
        } else {
            0
        }
    }
}

/// `estimate_distance` with the default policy constants.
pub fn estimate_distance(apparent_size: f64, reference_size: f64) -> Option<f64> {
    EstimatorSettings::default().estimate_distance(apparent_size, reference_size)
}

/// `calculate_safe_distance` with the default policy constants.
pub fn calculate_safe_distance(reference_size: f64) -> u32 {
    EstimatorSettings::default().calculate_safe_distance(reference_size)
}

/// Parse a reference size typed by the user. Non-numeric, non-finite and
/// non-positive inputs are rejected.
pub fn parse_reference_size(input: &str) -> Option<f64> {
    let value: f64 = input.trim().parse().ok()?;
    is_valid_reference(value).then_some(value)
}

fn is_valid_reference(reference_size: f64) -> bool {
    reference_size.is_finite() && reference_size > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_matches_documented_example() {
        let distance = estimate_distance(300.0, 72.0).unwrap();
        assert!((distance - 300.0).abs() < 1e-9);
    }

    #[test]
    fn estimate_is_linear_in_apparent_size() {
        let reference = 15.6;
        let base = estimate_distance(100.0, reference).unwrap();
        for factor in [0.5, 2.0, 3.0, 10.0] {
            let scaled = estimate_distance(100.0 * factor, reference).unwrap();
            assert!((scaled - base * factor).abs() < 1e-9);
        }
    }

    #[test]
    fn estimate_is_inversely_proportional_to_reference() {
        let base = estimate_distance(240.0, 10.0).unwrap();
        let doubled = estimate_distance(240.0, 20.0).unwrap();
        assert!((doubled * 2.0 - base).abs() < 1e-9);
    }

    #[test]
    fn estimate_is_unknown_for_invalid_reference() {
        assert_eq!(estimate_distance(300.0, 0.0), None);
        assert_eq!(estimate_distance(300.0, -4.0), None);
        assert_eq!(estimate_distance(300.0, f64::NAN), None);
        assert_eq!(estimate_distance(300.0, f64::INFINITY), None);
    }

    #[test]
    fn safe_distance_for_forty_inches() {
        assert_eq!(calculate_safe_distance(40.0), 52);
    }

    #[test]
    fn safe_distance_is_zero_for_invalid_reference() {
        assert_eq!(calculate_safe_distance(0.0), 0);
        assert_eq!(calculate_safe_distance(-13.3), 0);
        assert_eq!(calculate_safe_distance(f64::NAN), 0);
    }

    #[test]
    fn safe_distance_is_positive_for_positive_reference() {
        for reference in [1.0, 11.6, 13.3, 15.6, 17.3, 27.0] {
            assert!(calculate_safe_distance(reference) > 0, "{reference}");
        }
    }

    #[test]
    fn custom_settings_change_the_threshold() {
        let wide = EstimatorSettings {
            half_angle_deg: 45.0,
            ..EstimatorSettings::default()
        };
        // tan(45deg) == 1, so the threshold is just the filled fraction.
        assert_eq!(wide.calculate_safe_distance(40.0), 30);

        let tall = EstimatorSettings {
            known_size_in: 36.0,
            ..EstimatorSettings::default()
        };
        let distance = tall.estimate_distance(300.0, 72.0).unwrap();
        assert!((distance - 150.0).abs() < 1e-9);
    }

    #[test]
    fn parses_reference_input() {
        assert_eq!(parse_reference_size(" 15.6 "), Some(15.6));
        assert_eq!(parse_reference_size("40"), Some(40.0));
        assert_eq!(parse_reference_size("0"), None);
        assert_eq!(parse_reference_size("-3"), None);
        assert_eq!(parse_reference_size("big"), None);
        assert_eq!(parse_reference_size(""), None);
        assert_eq!(parse_reference_size("inf"), None);
    }

    #[test]
    fn parses_apparent_dimension() {
        assert_eq!(ApparentDimension::parse("Width"), Some(ApparentDimension::Width));
        assert_eq!(ApparentDimension::parse("h"), Some(ApparentDimension::Height));
        assert_eq!(ApparentDimension::parse("depth"), None);
    }
}
