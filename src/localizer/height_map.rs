//! Top-down height map rasterized from the sensor point cloud.

use crate::config::LocalizerConfig;
use crate::geometry::{rotate_back_from_tilt, CameraPoint};

/// Offset added to a height (cm) before it is stored in a cell.
const HEIGHT_OFFSET: f32 = 255.0;

/// One cell per centimetre of floor. Empty cells are 0.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightMap {
    width: usize,
    height: usize,
    cells: Vec<f32>,
}

impl HeightMap {
    /// An all-zero map.
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0.0; width * height],
        }
    }

    /// Project every usable point of a cloud onto the floor grid.
    ///
    /// Points are tilt-corrected first. Anything outside the height band
    /// (floor and ceiling clutter) or outside the grid is dropped. When
    /// several points land in the same cell the last one wins.
    pub fn from_point_cloud(cloud: &[CameraPoint], tilt_degrees: f64, config: &LocalizerConfig) -> Self {
        let mut map = Self::empty(config.grid_width, config.grid_height);

        for point in cloud.iter().filter(|p| p.is_finite()) {
            let point = rotate_back_from_tilt(*point, tilt_degrees);
            let height = point.y * 100.0;
            if height <= config.height_floor_cm || height >= config.height_ceiling_cm {
                continue;
            }

            let x = (-point.x * 100.0) as i64 + (config.grid_width / 2) as i64;
            let y = (point.z * 100.0) as i64;
            map.set(x, y, height + HEIGHT_OFFSET);
        }

        map
    }

    fn set(&mut self, x: i64, y: i64, value: f32) {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            self.cells[x as usize + y as usize * self.width] = value;
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.cells[x + y * self.width]
    }

    /// Number of cells that received a point.
    pub fn filled_cells(&self) -> usize {
        self.cells.iter().filter(|c| **c != 0.0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LocalizerConfig {
        LocalizerConfig {
            grid_width: 60,
            grid_height: 250,
            ..LocalizerConfig::default()
        }
    }

    #[test]
    fn test_band_and_bounds() {
        let cloud = [
            // 1 m below the sensor, 50 cm forward, 25 cm to the right
            CameraPoint::new(-0.25, -1.0, 0.5),
            // Floor
            CameraPoint::new(0.0, -3.0, 0.5),
            // Ceiling-side clutter
            CameraPoint::new(0.0, -0.2, 0.5),
            // Beyond the grid
            CameraPoint::new(0.0, -1.0, 5.0),
            CameraPoint::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        ];

        let map = HeightMap::from_point_cloud(&cloud, 0.0, &config());

        assert_eq!(map.filled_cells(), 1);
        assert_eq!(map.at(55, 50), 155.0);
    }

    #[test]
    fn test_tilt_is_corrected() {
        // 30 cm below and 2 m ahead as seen by the sensor: too high to keep
        // until the 9 degree tilt is taken out.
        let cloud = [CameraPoint::new(0.0, -0.3, 2.0)];

        let flat = HeightMap::from_point_cloud(&cloud, 0.0, &config());
        assert_eq!(flat.filled_cells(), 0);

        let tilted = HeightMap::from_point_cloud(&cloud, 9.0, &config());
        assert_eq!(tilted.filled_cells(), 1);
        assert!(tilted.at(30, 192) > 190.0);
    }
}
