//! Coordinate transforms between sensor space, the ground plane and the display.
//!
//! Three coordinate systems are in play:
//!
//! - **Sensor space**: metres, as reported by the body tracker. The sensor is
//!   mounted tilted down, so its Y axis is not vertical.
//! - **Ground plane**: centimetres on the floor, sensor at the origin, X to the
//!   sensor's left and Y pointing away from it.
//! - **Display space**: the area/canvas frame that activity areas are drawn in.
//!   The sensor sits at the bottom centre and Y grows downwards.
//!
//! Everything here is stateless and never fails on finite input.

use serde::{Deserialize, Serialize};

/// A point in a 2D frame (ground plane or display).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in display space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect2D {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect2D {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Edge-inclusive containment test.
    pub fn contains(&self, p: Point2D) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Whether every component is finite and both sides are non-negative.
    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
    }

    /// Upper half of the rectangle.
    pub fn top_half(&self) -> Rect2D {
        Rect2D::new(self.x, self.y, self.width, self.height / 2.0)
    }

    /// Lower half of the rectangle.
    pub fn bottom_half(&self) -> Rect2D {
        Rect2D::new(
            self.x,
            self.y + self.height / 2.0,
            self.width,
            self.height / 2.0,
        )
    }

    /// Left half of the rectangle.
    pub fn left_half(&self) -> Rect2D {
        Rect2D::new(self.x, self.y, self.width / 2.0, self.height)
    }

    /// Right half of the rectangle.
    pub fn right_half(&self) -> Rect2D {
        Rect2D::new(
            self.x + self.width / 2.0,
            self.y,
            self.width / 2.0,
            self.height,
        )
    }

    /// Grow the rectangle by `margin` in total on each axis, keeping its centre.
    pub fn expanded(&self, margin: f64) -> Rect2D {
        Rect2D::new(
            self.x - margin / 2.0,
            self.y - margin / 2.0,
            self.width + margin,
            self.height + margin,
        )
    }
}

/// A point in sensor space, in metres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl CameraPoint {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The depth mapper reports unmappable pixels as infinities.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A pixel position in the depth image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthPoint {
    pub x: f32,
    pub y: f32,
}

/// Size of the display frame that areas are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayFrame {
    pub width: f64,
    pub height: f64,
}

impl Default for DisplayFrame {
    fn default() -> Self {
        Self {
            width: 900.0,
            height: 450.0,
        }
    }
}

impl DisplayFrame {
    pub fn to_display(&self, ground: Point2D) -> Point2D {
        to_display(ground, self.width, self.height)
    }

    pub fn from_display(&self, display: Point2D) -> Point2D {
        from_display(display, self.width, self.height)
    }
}

/// Undo the sensor's downward mounting tilt (rotation about its X axis).
pub fn rotate_back_from_tilt(point: CameraPoint, tilt_degrees: f64) -> CameraPoint {
    let angle = (-tilt_degrees).to_radians();
    let (sin, cos) = angle.sin_cos();
    let (y, z) = (point.y as f64, point.z as f64);

    CameraPoint {
        x: point.x,
        y: (z * sin + y * cos) as f32,
        z: (z * cos - y * sin) as f32,
    }
}

/// Project an already tilt-corrected point onto the ground plane (cm).
pub fn ground_space_to_plane(point: CameraPoint) -> Point2D {
    Point2D::new(-(point.x as f64) * 100.0, point.z as f64 * 100.0)
}

/// Sensor-space point to ground-plane centimetres.
pub fn to_ground_plane(point: CameraPoint, tilt_degrees: f64) -> Point2D {
    ground_space_to_plane(rotate_back_from_tilt(point, tilt_degrees))
}

/// Ground plane to display space.
pub fn to_display(ground: Point2D, width: f64, height: f64) -> Point2D {
    Point2D::new(ground.x + width / 2.0, height - ground.y)
}

/// Display space back to the ground plane.
pub fn from_display(display: Point2D, width: f64, height: f64) -> Point2D {
    Point2D::new(display.x - width / 2.0, height - display.y)
}

/// Count zero (invalid) depth samples in a square window centred on `center`.
///
/// Samples outside the image are ignored, not counted.
pub fn count_zero_in_square(
    depth: &[u16],
    image_width: usize,
    center: DepthPoint,
    side: usize,
) -> u32 {
    if image_width == 0 {
        return 0;
    }

    let half = (side / 2) as f32;
    let row_start = (center.y - half) as i64;
    let row_end = (center.y + half) as i64;
    let col_start = (center.x - half) as i64;
    let col_end = (center.x + half) as i64;
    let rows = (depth.len() / image_width) as i64;

    let mut zeros = 0;
    for row in row_start.max(0)..row_end.min(rows) {
        for col in col_start.max(0)..col_end.min(image_width as i64) {
            let index = col as usize + row as usize * image_width;
            if depth[index] == 0 {
                zeros += 1;
            }
        }
    }
    zeros
}
