//! Body orientation from shoulder depth and head occlusion.
//!
//! When the two shoulders sit at clearly different depths the person is
//! side-on to the sensor and the farther shoulder tells which way. When they
//! are at about the same depth the person faces towards or away from the
//! sensor, and shoulders alone cannot tell which. The tracker's depth image
//! has more holes around the back of a head than around a face, so the number
//! of zero samples near the head breaks the tie. How many holes count as
//! "back" depends on range, hence a small calibration table of distance bands.

use crate::config::OrientationConfig;
use crate::geometry::CameraPoint;
use crate::tracking::person::Orientation;

/// Classifies a person's facing direction from tilt-corrected joints.
#[derive(Debug, Clone)]
pub struct OrientationClassifier {
    side_on_threshold: f32,
    min_reliable_distance: f64,
    band_length: f64,
    band_thresholds: [u32; 4],
}

impl OrientationClassifier {
    /// Build a classifier whose distance bands split the display depth evenly.
    pub fn new(config: &OrientationConfig, display_height: f64) -> Self {
        Self {
            side_on_threshold: config.max_shoulder_z_diff / config.boundary,
            min_reliable_distance: config.min_reliable_distance_cm,
            band_length: (display_height - config.min_reliable_distance_cm) / 4.0,
            band_thresholds: config.band_thresholds,
        }
    }

    /// Whether the shoulders are far enough apart in depth to be side-on.
    pub fn is_side_on(&self, left: CameraPoint, right: CameraPoint) -> bool {
        (left.z - right.z).abs() >= self.side_on_threshold
    }

    /// Distance band for a ground-plane Y (cm), or `None` when out of range.
    ///
    /// A position on a shared boundary belongs to the farther band.
    pub fn band(&self, ground_y: f64) -> Option<usize> {
        if ground_y < 0.0 || ground_y > self.band_start(4) {
            return None;
        }
        Some((1..4).rev().find(|&k| ground_y >= self.band_start(k)).unwrap_or(0))
    }

    fn band_start(&self, k: usize) -> f64 {
        self.band_length * k as f64 + self.min_reliable_distance
    }

    /// Occlusion count at or above which a frontal person is facing away.
    pub fn band_threshold(&self, band: usize) -> u32 {
        self.band_thresholds[band.min(3)]
    }

    /// Classify one person.
    ///
    /// Returns `None` when the person faces the sensor axis from outside
    /// every calibrated band; the caller keeps the previous orientation.
    pub fn classify(
        &self,
        left_shoulder: CameraPoint,
        right_shoulder: CameraPoint,
        ground_y: f64,
        occlusion_count: u32,
    ) -> Option<Orientation> {
        if self.is_side_on(left_shoulder, right_shoulder) {
            return Some(if left_shoulder.z > right_shoulder.z {
                Orientation::RIGHT
            } else {
                Orientation::LEFT
            });
        }

        let band = self.band(ground_y)?;
        Some(if occlusion_count >= self.band_threshold(band) {
            Orientation::BACK
        } else {
            Orientation::FRONT
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> OrientationClassifier {
        // 450 cm display, 50 cm dead zone: bands start at 50, 150, 250, 350.
        OrientationClassifier::new(&OrientationConfig::default(), 450.0)
    }

    fn shoulders(left_z: f32, right_z: f32) -> (CameraPoint, CameraPoint) {
        (
            CameraPoint::new(-0.2, 0.0, left_z),
            CameraPoint::new(0.2, 0.0, right_z),
        )
    }

    #[test]
    fn test_side_on_direction() {
        let c = classifier();

        let (l, r) = shoulders(2.3, 2.0);
        assert_eq!(c.classify(l, r, 200.0, 0), Some(Orientation::RIGHT));

        let (l, r) = shoulders(2.0, 2.3);
        assert_eq!(c.classify(l, r, 200.0, 500), Some(Orientation::LEFT));
    }

    #[test]
    fn test_band_boundaries() {
        let c = classifier();
        assert_eq!(c.band(0.0), Some(0));
        assert_eq!(c.band(149.9), Some(0));
        assert_eq!(c.band(150.0), Some(1));
        assert_eq!(c.band(250.0), Some(2));
        assert_eq!(c.band(349.0), Some(2));
        assert_eq!(c.band(350.0), Some(3));
        assert_eq!(c.band(450.0), Some(3));
        assert_eq!(c.band(450.1), None);
        assert_eq!(c.band(-1.0), None);
    }

    #[test]
    fn test_calibration_table() {
        let c = classifier();
        let (l, r) = shoulders(2.0, 2.05);

        let cases = [
            (100.0, 0, Orientation::FRONT),
            (100.0, 1, Orientation::BACK),
            (200.0, 1, Orientation::FRONT),
            (200.0, 2, Orientation::BACK),
            (300.0, 29, Orientation::FRONT),
            (300.0, 30, Orientation::BACK),
            (400.0, 54, Orientation::FRONT),
            (400.0, 55, Orientation::BACK),
        ];

        for (y, count, expected) in cases {
            assert_eq!(
                c.classify(l, r, y, count),
                Some(expected),
                "y={y} count={count}"
            );
        }
    }

    #[test]
    fn test_frontal_out_of_range_keeps_previous() {
        let c = classifier();
        let (l, r) = shoulders(2.0, 2.0);
        assert_eq!(c.classify(l, r, 600.0, 100), None);
    }
}
