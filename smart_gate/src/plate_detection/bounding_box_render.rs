use std::path::Path;

use log::{info, warn};
use opencv::core::{Point, Rect, Scalar, Size};
use opencv::imgproc::{put_text, rectangle, FONT_HERSHEY_PLAIN, LINE_8};
use opencv::prelude::*;
use opencv::videoio::VideoWriter;

use super::CandidateRegion;
use crate::access::Decision;
use crate::error::VisionError;
use crate::gate::{GateContext, GateState};
use crate::pipeline::{FrameReport, PlateOutcome};

const THICKNESS_PX: i32 = 2;
const HEADER_HEIGHT: i32 = 20;

fn to_rect(region: &CandidateRegion) -> Rect {
    Rect::new(region.x, region.y, region.width, region.height)
}

// BGR
fn outcome_color(outcome: PlateOutcome) -> Scalar {
    match outcome {
        PlateOutcome::Decided(Decision::Granted) => Scalar::from((0.0, 200.0, 0.0)),
        PlateOutcome::Decided(Decision::Denied) => Scalar::from((0.0, 0.0, 220.0)),
        PlateOutcome::Decided(Decision::Suppressed) | PlateOutcome::Skipped => {
            Scalar::from((160.0, 160.0, 160.0))
        }
        PlateOutcome::Failed => Scalar::from((0.0, 165.0, 255.0)),
    }
}

fn draw_err(err: opencv::Error) -> VisionError {
    VisionError::Render(err.to_string())
}

/// Overlays the candidate regions, each recognized plate with its outcome,
/// and the gate status line.
pub fn draw_report(
    frame: &mut Mat,
    report: &FrameReport,
    context: &GateContext,
) -> Result<(), VisionError> {
    let region_color = Scalar::from((0.0, 255.0, 0.0));
    let text_color = Scalar::from((255.0, 255.0, 255.0));

    for region in &report.regions {
        rectangle(frame, to_rect(region), region_color, THICKNESS_PX, LINE_8, 0)
            .map_err(draw_err)?;
    }

    for event in &report.events {
        let color = outcome_color(event.outcome);
        let header = Rect::new(
            event.region.x,
            event.region.y - HEADER_HEIGHT,
            event.region.width,
            HEADER_HEIGHT,
        );
        rectangle(frame, header, color, -1, LINE_8, 0).map_err(draw_err)?;
        rectangle(frame, to_rect(&event.region), color, THICKNESS_PX, LINE_8, 0)
            .map_err(draw_err)?;
        put_text(
            frame,
            event.plate.as_str(),
            Point::new(event.region.x, event.region.y - 4),
            FONT_HERSHEY_PLAIN,
            1.5,
            text_color,
            2,
            LINE_8,
            false,
        )
        .map_err(draw_err)?;
    }

    let status_color = match context.gate_state() {
        GateState::Open => Scalar::from((0.0, 200.0, 0.0)),
        GateState::Closed => Scalar::from((0.0, 0.0, 220.0)),
    };
    let status = format!(
        "Gate: {}  Surveillance: {}",
        context.gate_state(),
        if context.surveillance_enabled() { "on" } else { "off" }
    );
    put_text(
        frame,
        &status,
        Point::new(10, 25),
        FONT_HERSHEY_PLAIN,
        1.5,
        status_color,
        2,
        LINE_8,
        false,
    )
    .map_err(draw_err)?;

    Ok(())
}

/// Writes annotated frames to an MJPG file.
pub struct FrameRecorder {
    writer: VideoWriter,
    size: Size,
}

impl FrameRecorder {
    pub fn create(path: &Path, fps: f64, size: Size) -> Result<Self, VisionError> {
        let fourcc = VideoWriter::fourcc('M', 'J', 'P', 'G')
            .map_err(|err| VisionError::Capture(err.to_string()))?;
        let writer = VideoWriter::new(&path.to_string_lossy(), fourcc, fps, size, true)
            .map_err(|err| VisionError::Capture(err.to_string()))?;
        if !writer
            .is_opened()
            .map_err(|err| VisionError::Capture(err.to_string()))?
        {
            return Err(VisionError::Capture(format!(
                "cannot write video to {}",
                path.display()
            )));
        }
        info!("Recording to {}", path.display());
        Ok(Self { writer, size })
    }

    /// Frames whose size differs from the recording size are skipped.
    pub fn write(&mut self, frame: &Mat) -> Result<(), VisionError> {
        let frame_size = frame
            .size()
            .map_err(|err| VisionError::Capture(err.to_string()))?;
        if frame_size != self.size {
            warn!(
                "Frame is {}x{}, recording is {}x{}; frame not recorded",
                frame_size.width, frame_size.height, self.size.width, self.size.height
            );
            return Ok(());
        }
        self.writer
            .write(frame)
            .map_err(|err| VisionError::Capture(err.to_string()))
    }
}

impl Drop for FrameRecorder {
    fn drop(&mut self) {
        if let Err(err) = self.writer.release() {
            warn!("Failed to close recording: {err}");
        }
    }
}
