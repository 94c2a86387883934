//! Furniture templates: reference height matrices and where they were found.

use crate::config::TemplateSpec;
use crate::error::TemplateError;
use crate::geometry::{DisplayFrame, Point2D, Rect2D};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A reference height matrix for one piece of furniture.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub slide_width: usize,
    pub slide_height: usize,
    pub color: String,
    pub max_mean_error: Option<f32>,
    /// Row-major, `width * height` values in height-map units
    data: Vec<f32>,
}

impl Template {
    /// Build a template from in-memory data.
    pub fn from_data(spec: &TemplateSpec, data: Vec<f32>) -> Result<Self, TemplateError> {
        if spec.width == 0 || spec.height == 0 || spec.slide_width == 0 || spec.slide_height == 0 {
            return Err(TemplateError::EmptyWindow(spec.name.clone()));
        }

        let expected = spec.width * spec.height;
        if data.len() != expected {
            return Err(TemplateError::WrongSize {
                name: spec.name.clone(),
                expected,
                found: data.len(),
            });
        }

        Ok(Self {
            name: spec.name.clone(),
            width: spec.width,
            height: spec.height,
            slide_width: spec.slide_width,
            slide_height: spec.slide_height,
            color: spec.color.clone(),
            max_mean_error: spec.max_mean_error,
            data,
        })
    }

    /// Parse newline-delimited values, one per line, row-major.
    pub fn parse(spec: &TemplateSpec, content: &str) -> Result<Self, TemplateError> {
        let mut data = Vec::with_capacity(spec.width * spec.height);

        for (index, line) in content.lines().enumerate() {
            let value = line.trim();
            if value.is_empty() {
                continue;
            }
            let parsed = value.parse::<f32>().map_err(|_| TemplateError::BadValue {
                name: spec.name.clone(),
                line: index + 1,
                value: value.to_string(),
            })?;
            data.push(parsed);
        }

        Self::from_data(spec, data)
    }

    /// Load a template file from `dir`.
    pub fn load(spec: &TemplateSpec, dir: &Path) -> Result<Self, TemplateError> {
        let path = dir.join(&spec.file);
        let content = std::fs::read_to_string(&path).map_err(|source| TemplateError::Io {
            name: spec.name.clone(),
            path: path.clone(),
            source,
        })?;
        Self::parse(spec, &content)
    }

    /// Reference value at row `y`, column `x`.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[x + y * self.width]
    }

    pub fn cell_count(&self) -> usize {
        self.data.len()
    }

    /// Display-space area for a template whose window starts at `top_left`
    /// on a grid `grid_width` cells wide, grown by `extension` in total.
    pub fn location(
        &self,
        top_left: (usize, usize),
        grid_width: usize,
        display: DisplayFrame,
        extension: f64,
    ) -> Rect2D {
        let ground = Point2D::new(
            top_left.0 as f64 - (grid_width / 2) as f64,
            (top_left.1 + self.height) as f64,
        );
        let corner = display.to_display(ground);

        Rect2D::new(corner.x, corner.y, self.width as f64, self.height as f64).expanded(extension)
    }
}

/// Load every configured template, skipping ones that cannot be read.
pub fn load_templates(specs: &[TemplateSpec], dir: &Path) -> Vec<Template> {
    specs
        .iter()
        .filter_map(|spec| match Template::load(spec, dir) {
            Ok(template) => Some(template),
            Err(e) => {
                tracing::warn!("Skipping template: {e}");
                None
            }
        })
        .collect()
}

/// Result of one template search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedTemplate {
    pub name: String,
    /// Best-fit window origin on the height map (column, row)
    pub top_left: (usize, usize),
    /// Sum of absolute differences at the best fit
    pub distance: f32,
    /// `distance` divided by the template's cell count
    pub mean_error: f32,
    /// Expanded display-space area
    pub location: Rect2D,
    pub color: String,
    /// False when the fit was worse than the template's error ceiling
    pub accepted: bool,
}
