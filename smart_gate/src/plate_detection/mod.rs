#[cfg(feature = "vision")]
pub mod bounding_box_render;
#[cfg(feature = "vision")]
pub mod cascade_detector;
#[cfg(feature = "vision")]
pub mod tess_ocr;
#[cfg(feature = "vision")]
pub mod video_reader;

use crate::error::VisionError;

pub const DEFAULT_MIN_AREA: i64 = 500;

/// Rectangle within a frame that may contain a plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl CandidateRegion {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }
}

/// Raw text read from one region, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedFragment {
    pub region: CandidateRegion,
    pub text: String,
    /// Engine confidence in `0.0..=1.0`. Carried along, not used for filtering.
    pub confidence: f32,
}

/// Keeps regions whose area is strictly above `min_area`, preserving order.
pub fn filter_by_area(
    regions: impl IntoIterator<Item = CandidateRegion>,
    min_area: i64,
) -> Vec<CandidateRegion> {
    regions
        .into_iter()
        .filter(|region| region.area() > min_area)
        .collect()
}

pub trait FrameSource {
    type Frame;

    /// Opens the device if it is not already open.
    fn open(&mut self) -> Result<(), VisionError>;

    /// Next frame, or `None` when the device is closed, failed, or at end of stream.
    fn next_frame(&mut self) -> Option<Self::Frame>;

    fn release(&mut self);

    fn is_open(&self) -> bool;
}

pub trait PlateDetector {
    type Frame;

    fn detect(&mut self, frame: &Self::Frame) -> Result<Vec<CandidateRegion>, VisionError>;
}

pub trait TextRecognizer {
    type Frame;

    fn recognize(
        &mut self,
        frame: &Self::Frame,
        region: &CandidateRegion,
    ) -> Result<Vec<RecognizedFragment>, VisionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_by_area_is_strict() {
        let regions = vec![
            CandidateRegion::new(0, 0, 10, 50),
            CandidateRegion::new(5, 5, 100, 30),
            CandidateRegion::new(1, 1, 20, 20),
            CandidateRegion::new(7, 7, 25, 21),
        ];
        let kept = filter_by_area(regions, DEFAULT_MIN_AREA);
        assert_eq!(
            kept,
            vec![
                CandidateRegion::new(5, 5, 100, 30),
                CandidateRegion::new(7, 7, 25, 21),
            ]
        );
    }

    #[test]
    fn test_negative_dimensions_have_no_area() {
        assert_eq!(CandidateRegion::new(0, 0, -40, 40).area(), 0);
    }
}
