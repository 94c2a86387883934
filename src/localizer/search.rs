//! Exhaustive sliding-window template search.

use super::height_map::HeightMap;
use super::template::Template;

/// Best window origin found for one template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fit {
    /// Window origin (column, row)
    pub top_left: (usize, usize),
    /// Sum of absolute differences at `top_left`
    pub distance: f32,
}

/// Sum of absolute differences between the template and the map window at `top_left`.
pub fn sad(map: &HeightMap, template: &Template, top_left: (usize, usize)) -> f32 {
    let (left, top) = top_left;
    let mut distance = 0.0;
    for row in 0..template.height {
        for col in 0..template.width {
            distance += (template.at(col, row) - map.at(left + col, top + row)).abs();
        }
    }
    distance
}

/// Scan every reachable window position and keep the lowest distance.
///
/// Positions are visited row by row, stepping by the template's slide, and
/// only a strictly smaller distance replaces the current best. Returns `None`
/// when the template does not fit on the map at all.
pub fn best_fit(map: &HeightMap, template: &Template) -> Option<Fit> {
    if template.width > map.width() || template.height > map.height() {
        return None;
    }

    let mut best: Option<Fit> = None;
    let mut top = 0;
    while top + template.height <= map.height() {
        let mut left = 0;
        while left + template.width <= map.width() {
            let distance = sad(map, template, (left, top));
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(Fit {
                    top_left: (left, top),
                    distance,
                });
            }
            left += template.slide_width;
        }
        top += template.slide_height;
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateSpec;
    use crate::geometry::CameraPoint;

    fn template(width: usize, height: usize, slide: usize, data: Vec<f32>) -> Template {
        let spec = TemplateSpec {
            name: "Block".to_string(),
            file: String::new(),
            width,
            height,
            slide_width: slide,
            slide_height: slide,
            color: "red".to_string(),
            max_mean_error: None,
        };
        Template::from_data(&spec, data).unwrap()
    }

    #[test]
    fn test_all_zero_grid_fits_at_origin() {
        let map = HeightMap::empty(40, 30);
        let t = template(5, 4, 1, vec![0.0; 20]);

        let fit = best_fit(&map, &t).unwrap();
        assert_eq!(fit.top_left, (0, 0));
        assert_eq!(fit.distance, 0.0);
    }

    #[test]
    fn test_finds_raised_block() {
        // A 2x2 block of height 100 at columns 6-7, rows 4-5.
        let mut config = crate::config::LocalizerConfig::default();
        config.grid_width = 12;
        config.grid_height = 8;

        let mut cloud = Vec::new();
        for (col, row) in [(6, 4), (7, 4), (6, 5), (7, 5)] {
            // Column c sits at x = -(c - 6) / 100 m; row r at z = r / 100 m.
            let x = -((col as f32) - 6.0) / 100.0;
            let z = row as f32 / 100.0 + 0.005;
            cloud.push(CameraPoint::new(x - 0.005, -1.55, z));
        }
        let map = HeightMap::from_point_cloud(&cloud, 0.0, &config);
        assert_eq!(map.filled_cells(), 4);

        let t = template(2, 2, 1, vec![100.0; 4]);
        let fit = best_fit(&map, &t).unwrap();
        assert_eq!(fit.top_left, (6, 4));
        assert!(fit.distance < 1.0);
    }

    #[test]
    fn test_slide_step_limits_positions() {
        let map = HeightMap::empty(10, 10);
        let t = template(4, 4, 4, vec![1.0; 16]);

        // Ties keep the first position scanned.
        let fit = best_fit(&map, &t).unwrap();
        assert_eq!(fit.top_left, (0, 0));
        assert_eq!(fit.distance, 16.0);
    }

    #[test]
    fn test_template_larger_than_map() {
        let map = HeightMap::empty(3, 3);
        let t = template(4, 1, 1, vec![0.0; 4]);
        assert!(best_fit(&map, &t).is_none());
    }
}
