use std::ffi::CString;

use leptess::tesseract::TessApi;
use log::debug;
use opencv::core::Rect;
use opencv::imgproc::{cvt_color, COLOR_BGR2GRAY};
use opencv::prelude::*;

use super::{CandidateRegion, RecognizedFragment, TextRecognizer};
use crate::config::RecognizerConfig;
use crate::error::VisionError;

const CHAR_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Treat the crop as a single text line.
const PAGE_SEG_MODE: &str = "7";

pub struct TessOcrReader {
    ocr: TessApi,
}

impl TessOcrReader {
    pub fn new(config: &RecognizerConfig) -> Result<Self, VisionError> {
        let data_path = config
            .data_path
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned());
        let mut ocr = TessApi::new(data_path.as_deref(), &config.language)
            .map_err(|err| VisionError::ModelLoad(format!("tesseract: {err:?}")))?;

        set_variable(&mut ocr, "tessedit_char_whitelist", CHAR_WHITELIST)?;
        set_variable(&mut ocr, "tessedit_pageseg_mode", PAGE_SEG_MODE)?;

        Ok(Self { ocr })
    }
}

fn set_variable(ocr: &mut TessApi, name: &str, value: &str) -> Result<(), VisionError> {
    let name_c = CString::new(name).map_err(|err| VisionError::ModelLoad(err.to_string()))?;
    let value_c = CString::new(value).map_err(|err| VisionError::ModelLoad(err.to_string()))?;
    ocr.raw
        .set_variable(&name_c, &value_c)
        .map_err(|err| VisionError::ModelLoad(format!("{name}: {err:?}")))
}

/// Intersection of the region with the frame, or `None` when they do not overlap.
fn clamp_to_frame(region: &CandidateRegion, cols: i32, rows: i32) -> Option<Rect> {
    let x0 = region.x.max(0);
    let y0 = region.y.max(0);
    let x1 = region.x.saturating_add(region.width).min(cols);
    let y1 = region.y.saturating_add(region.height).min(rows);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
}

impl TextRecognizer for TessOcrReader {
    type Frame = Mat;

    fn recognize(
        &mut self,
        frame: &Mat,
        region: &CandidateRegion,
    ) -> Result<Vec<RecognizedFragment>, VisionError> {
        let rect = clamp_to_frame(region, frame.cols(), frame.rows()).ok_or_else(|| {
            VisionError::Recognition(format!("region {region:?} lies outside the frame"))
        })?;

        let roi = frame
            .apply_1(rect)
            .map_err(|err| VisionError::Recognition(err.to_string()))?;
        let mut grey = Mat::default();
        cvt_color(&roi, &mut grey, COLOR_BGR2GRAY, 0)
            .map_err(|err| VisionError::Recognition(err.to_string()))?;

        let cols = grey.cols();
        let rows = grey.rows();
        let bytes = grey
            .data_bytes()
            .map_err(|err| VisionError::Recognition(err.to_string()))?;
        self.ocr
            .raw
            .set_image(bytes, cols, rows, 1, cols)
            .map_err(|err| VisionError::Recognition(format!("{err:?}")))?;

        let text = self
            .ocr
            .get_utf8_text()
            .map_err(|err| VisionError::Recognition(err.to_string()))?;
        let confidence = (self.ocr.mean_text_conf() as f32 / 100.0).clamp(0.0, 1.0);
        debug!("OCR {:?} ({confidence:.2})", text.trim());

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| RecognizedFragment {
                region: *region,
                text: line.to_string(),
                confidence,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_inside_frame() {
        let rect = clamp_to_frame(&CandidateRegion::new(10, 20, 100, 30), 640, 480).unwrap();
        assert_eq!(rect, Rect::new(10, 20, 100, 30));
    }

    #[test]
    fn test_clamp_crosses_border() {
        let rect = clamp_to_frame(&CandidateRegion::new(-5, 470, 50, 30), 640, 480).unwrap();
        assert_eq!(rect, Rect::new(0, 470, 45, 10));
    }

    #[test]
    fn test_clamp_outside_frame() {
        assert!(clamp_to_frame(&CandidateRegion::new(700, 10, 50, 30), 640, 480).is_none());
    }

    #[test]
    fn test_char_whitelist_is_plate_alphabet() {
        assert_eq!(CHAR_WHITELIST.len(), 36);
        assert!(CHAR_WHITELIST
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
