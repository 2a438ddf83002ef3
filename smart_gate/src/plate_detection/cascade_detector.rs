use log::debug;
use opencv::core::{Rect, Size, Vector};
use opencv::imgproc::{cvt_color, COLOR_BGR2GRAY};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;

use super::{filter_by_area, CandidateRegion, PlateDetector};
use crate::config::DetectorConfig;
use crate::error::VisionError;

/// Haar cascade plate detector. Runs on a greyscale copy of the frame and
/// drops regions that are not larger than the configured area.
pub struct CascadeDetector {
    classifier: CascadeClassifier,
    scale_factor: f64,
    min_neighbors: i32,
    min_area: i64,
}

impl CascadeDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self, VisionError> {
        let path = config.cascade_path.to_string_lossy();
        let classifier = CascadeClassifier::new(&path)
            .map_err(|err| VisionError::ModelLoad(format!("{path}: {err}")))?;
        // OpenCV hands back an empty classifier instead of failing on a bad file.
        if classifier
            .empty()
            .map_err(|err| VisionError::ModelLoad(err.to_string()))?
        {
            return Err(VisionError::ModelLoad(format!(
                "{path} did not load a cascade"
            )));
        }

        Ok(Self {
            classifier,
            scale_factor: config.scale_factor,
            min_neighbors: config.min_neighbors,
            min_area: config.min_area,
        })
    }
}

impl PlateDetector for CascadeDetector {
    type Frame = Mat;

    fn detect(&mut self, frame: &Mat) -> Result<Vec<CandidateRegion>, VisionError> {
        let mut grey = Mat::default();
        cvt_color(frame, &mut grey, COLOR_BGR2GRAY, 0)
            .map_err(|err| VisionError::Detection(err.to_string()))?;

        let mut plates = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &grey,
                &mut plates,
                self.scale_factor,
                self.min_neighbors,
                0,
                Size::default(),
                Size::default(),
            )
            .map_err(|err| VisionError::Detection(err.to_string()))?;

        let regions = filter_by_area(
            plates
                .iter()
                .map(|rect| CandidateRegion::new(rect.x, rect.y, rect.width, rect.height)),
            self.min_area,
        );
        debug!("{} raw detections, {} kept", plates.len(), regions.len());
        Ok(regions)
    }
}
