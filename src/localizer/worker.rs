//! Background template scans.
//!
//! A scan takes a private copy of the point cloud, rasterizes it and searches
//! every template. Results come back over a channel and are picked up by the
//! frame pipeline before it evaluates the next frame, so the areas used for
//! one frame never change halfway through it.

use super::height_map::HeightMap;
use super::search::best_fit;
use super::template::{LocatedTemplate, Template};
use crate::config::LocalizerConfig;
use crate::error::LocalizerError;
use crate::geometry::{CameraPoint, DisplayFrame};
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Output of one completed scan.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub completed_at: DateTime<Utc>,
    pub filled_cells: usize,
    pub placements: Vec<LocatedTemplate>,
}

/// Clears the processing flag when the scan ends, even by panic.
struct ProcessingGuard(Arc<AtomicBool>);

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs template scans off the frame path.
pub struct TemplateLocalizer {
    config: LocalizerConfig,
    display: DisplayFrame,
    tilt_degrees: f64,
    templates: Arc<Vec<Template>>,
    processing: Arc<AtomicBool>,
    sender: Sender<ScanResult>,
    receiver: Receiver<ScanResult>,
}

impl TemplateLocalizer {
    pub fn new(
        config: LocalizerConfig,
        display: DisplayFrame,
        tilt_degrees: f64,
        templates: Vec<Template>,
    ) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            config,
            display,
            tilt_degrees,
            templates: Arc::new(templates),
            processing: Arc::new(AtomicBool::new(false)),
            sender,
            receiver,
        }
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Whether a background scan is in flight.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Start a background scan of `cloud`. Rejected while another is running.
    pub fn request(&self, cloud: Vec<CameraPoint>) -> Result<(), LocalizerError> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LocalizerError::Busy);
        }
        let guard = ProcessingGuard(self.processing.clone());

        let config = self.config.clone();
        let display = self.display;
        let tilt = self.tilt_degrees;
        let templates = self.templates.clone();
        let sender = self.sender.clone();

        thread::Builder::new()
            .name("template-localizer".to_string())
            .spawn(move || {
                let _guard = guard;
                let result = scan(&cloud, tilt, &config, display, &templates);
                debug!(
                    "Template scan finished: {} cells, {} placements",
                    result.filled_cells,
                    result.placements.len()
                );
                let _ = sender.send(result);
            })
            .map_err(|e| LocalizerError::Spawn(e.to_string()))?;

        Ok(())
    }

    /// Take the newest finished scan, if any.
    pub fn try_collect(&self) -> Option<ScanResult> {
        self.receiver.try_iter().last()
    }

    /// Run a scan on the calling thread.
    pub fn scan_now(&self, cloud: &[CameraPoint]) -> ScanResult {
        scan(cloud, self.tilt_degrees, &self.config, self.display, &self.templates)
    }
}

/// Rasterize `cloud` and locate every template on it.
pub fn scan(
    cloud: &[CameraPoint],
    tilt_degrees: f64,
    config: &LocalizerConfig,
    display: DisplayFrame,
    templates: &[Template],
) -> ScanResult {
    let map = HeightMap::from_point_cloud(cloud, tilt_degrees, config);

    let placements = templates
        .iter()
        .filter_map(|template| {
            let Some(fit) = best_fit(&map, template) else {
                warn!("Template {} does not fit on the height map", template.name);
                return None;
            };

            let mean_error = fit.distance / template.cell_count() as f32;
            let accepted = template.max_mean_error.map_or(true, |max| mean_error <= max);
            let location = template.location(fit.top_left, config.grid_width, display, config.extension);

            if accepted {
                info!(
                    "Located {} at {:?} (mean error {:.1})",
                    template.name, fit.top_left, mean_error
                );
            } else {
                info!(
                    "Rejected fit for {} at {:?} (mean error {:.1})",
                    template.name, fit.top_left, mean_error
                );
            }

            Some(LocatedTemplate {
                name: template.name.clone(),
                top_left: fit.top_left,
                distance: fit.distance,
                mean_error,
                location,
                color: template.color.clone(),
                accepted,
            })
        })
        .collect();

    ScanResult {
        completed_at: Utc::now(),
        filled_cells: map.filled_cells(),
        placements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateSpec;
    use std::time::{Duration, Instant};

    fn small_config() -> LocalizerConfig {
        LocalizerConfig {
            grid_width: 40,
            grid_height: 20,
            ..LocalizerConfig::default()
        }
    }

    fn template(max_mean_error: Option<f32>, value: f32) -> Template {
        let spec = TemplateSpec {
            name: "Table".to_string(),
            file: String::new(),
            width: 4,
            height: 2,
            slide_width: 2,
            slide_height: 2,
            color: "red".to_string(),
            max_mean_error,
        };
        Template::from_data(&spec, vec![value; 8]).unwrap()
    }

    #[test]
    fn test_scan_reports_location_and_score() {
        let result = scan(
            &[],
            9.0,
            &small_config(),
            DisplayFrame::default(),
            &[template(None, 0.0)],
        );

        assert_eq!(result.filled_cells, 0);
        let placement = &result.placements[0];
        assert_eq!(placement.top_left, (0, 0));
        assert_eq!(placement.distance, 0.0);
        assert!(placement.accepted);
        // Ground (-20, 2) -> display (430, 448), grown by 100.
        assert_eq!(placement.location.x, 380.0);
        assert_eq!(placement.location.y, 398.0);
        assert_eq!(placement.location.width, 104.0);
    }

    #[test]
    fn test_error_ceiling_rejects_poor_fit() {
        let result = scan(
            &[],
            9.0,
            &small_config(),
            DisplayFrame::default(),
            &[template(Some(10.0), 50.0)],
        );
        assert_eq!(result.placements[0].mean_error, 50.0);
        assert!(!result.placements[0].accepted);
    }

    #[test]
    fn test_background_request_and_collect() {
        let localizer = TemplateLocalizer::new(
            small_config(),
            DisplayFrame::default(),
            9.0,
            vec![template(None, 0.0)],
        );

        localizer.request(Vec::new()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut result = None;
        while result.is_none() && Instant::now() < deadline {
            result = localizer.try_collect();
            thread::sleep(Duration::from_millis(5));
        }

        let result = result.expect("scan never completed");
        assert_eq!(result.placements.len(), 1);

        while localizer.is_processing() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!localizer.is_processing());
    }

    #[test]
    fn test_overlapping_request_is_busy() {
        let localizer = TemplateLocalizer::new(
            small_config(),
            DisplayFrame::default(),
            9.0,
            vec![template(None, 0.0)],
        );

        localizer.processing.store(true, Ordering::SeqCst);
        assert_eq!(localizer.request(Vec::new()), Err(LocalizerError::Busy));
        assert!(localizer.try_collect().is_none());
    }
}
