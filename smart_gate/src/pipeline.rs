use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam::channel::{Receiver, Sender, TryRecvError};
use log::{debug, error, info, warn};

use crate::access::{AccessEngine, ArrivalStore, Decision};
use crate::gate::{GateContext, OperatorCommand};
use crate::metrics;
use crate::plate_detection::{CandidateRegion, FrameSource, PlateDetector, TextRecognizer};
use crate::plate_number::{PlateNumber, PlateValidator};
use crate::utils::LoopPacer;

const DEFAULT_TICK: Duration = Duration::from_millis(100);
const DEFAULT_FRAME_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

/// Transient message for the operator interface.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub plate: Option<PlateNumber>,
    pub message: String,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateOutcome {
    /// Seen again before the dedup interval elapsed.
    Skipped,
    Decided(Decision),
    /// The store could not be reached; access was not granted.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlateEvent {
    pub region: CandidateRegion,
    pub plate: PlateNumber,
    pub outcome: PlateOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub regions: Vec<CandidateRegion>,
    pub events: Vec<PlateEvent>,
}

/// Frame-by-frame detection to decision loop.
pub struct GatePipeline<D, R, S> {
    detector: D,
    recognizer: R,
    validator: PlateValidator,
    engine: AccessEngine<S>,
    context: GateContext,
    commands: Option<Receiver<OperatorCommand>>,
    notifications: Option<Sender<Notification>>,
    tick: Duration,
    frame_deadline: Duration,
}

impl<D, R, S> GatePipeline<D, R, S>
where
    D: PlateDetector,
    R: TextRecognizer<Frame = D::Frame>,
    S: ArrivalStore,
{
    pub fn new(
        detector: D,
        recognizer: R,
        validator: PlateValidator,
        engine: AccessEngine<S>,
        context: GateContext,
    ) -> Self {
        Self {
            detector,
            recognizer,
            validator,
            engine,
            context,
            commands: None,
            notifications: None,
            tick: DEFAULT_TICK,
            frame_deadline: DEFAULT_FRAME_DEADLINE,
        }
    }

    pub fn with_commands(mut self, commands: Receiver<OperatorCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn with_notifications(mut self, notifications: Sender<Notification>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn with_timing(mut self, tick: Duration, frame_deadline: Duration) -> Self {
        self.tick = tick;
        self.frame_deadline = frame_deadline;
        self
    }

    pub fn context(&self) -> &GateContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut GateContext {
        &mut self.context
    }

    pub fn engine(&self) -> &AccessEngine<S> {
        &self.engine
    }

    /// Applies every queued operator command. Returns `false` once the command
    /// channel is gone (or was never attached).
    pub fn apply_pending_commands(&mut self) -> bool {
        let Some(commands) = &self.commands else {
            return false;
        };
        loop {
            match commands.try_recv() {
                Ok(command) => {
                    debug!("Operator command {command:?}");
                    self.context.apply_command(command);
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    pub fn process_frame(&mut self, frame: &D::Frame) -> FrameReport {
        self.process_frame_at(frame, Instant::now(), Utc::now())
    }

    /// Runs one frame through detection, recognition, validation, the dedup
    /// gate and the access decision. `now` drives the in-memory tracker and
    /// `wall_clock` is what gets written to the arrival log.
    pub fn process_frame_at(
        &mut self,
        frame: &D::Frame,
        now: Instant,
        wall_clock: DateTime<Utc>,
    ) -> FrameReport {
        let started = Instant::now();
        metrics::FRAMES_PROCESSED.inc();

        let regions = match self.detector.detect(frame) {
            Ok(regions) => regions,
            Err(err) => {
                warn!("Plate detection failed: {err}");
                Vec::new()
            }
        };
        metrics::REGIONS_DETECTED.inc_by(regions.len() as u64);

        let mut events = Vec::new();
        for region in &regions {
            let fragments = match self.recognizer.recognize(frame, region) {
                Ok(fragments) => fragments,
                Err(err) => {
                    metrics::RECOGNITION_FAILURES.inc();
                    warn!("Recognition failed for region {region:?}: {err}");
                    continue;
                }
            };

            for fragment in fragments {
                let Some(plate) = self.validator.parse(&fragment.text) else {
                    metrics::FRAGMENTS_REJECTED.inc();
                    continue;
                };
                let outcome = self.handle_plate(&plate, now, wall_clock);
                events.push(PlateEvent {
                    region: *region,
                    plate,
                    outcome,
                });
            }
        }

        metrics::FRAME_SECONDS.observe(started.elapsed().as_secs_f64());
        FrameReport { regions, events }
    }

    fn handle_plate(
        &mut self,
        plate: &PlateNumber,
        now: Instant,
        wall_clock: DateTime<Utc>,
    ) -> PlateOutcome {
        if !self.context.dedup().should_process(plate, now) {
            debug!("Plate {plate} seen within the dedup interval, skipping");
            return PlateOutcome::Skipped;
        }

        match self
            .engine
            .decide_and_apply(plate, wall_clock, &mut self.context)
        {
            Ok(decision) => {
                metrics::record_decision(decision);
                match decision {
                    Decision::Granted => self.notify(
                        NotificationLevel::Success,
                        plate,
                        format!("Access for plate {plate} granted. Gate open."),
                    ),
                    Decision::Denied => self.notify(
                        NotificationLevel::Warning,
                        plate,
                        format!("Access for plate {plate} denied. Gate closed."),
                    ),
                    Decision::Suppressed => {}
                }
                self.context.dedup_mut().mark_processed(plate, now);
                PlateOutcome::Decided(decision)
            }
            Err(err) => {
                metrics::STORE_FAILURES.inc();
                error!("Access check for plate {plate} failed: {err}");
                self.notify(
                    NotificationLevel::Error,
                    plate,
                    format!("Access for plate {plate} could not be verified ({err}). Gate closed."),
                );
                PlateOutcome::Failed
            }
        }
    }

    fn notify(&self, level: NotificationLevel, plate: &PlateNumber, message: String) {
        if let Some(notifications) = &self.notifications {
            let notification = Notification {
                level,
                plate: Some(plate.clone()),
                message,
            };
            if notifications.send(notification).is_err() {
                debug!("Notification receiver dropped");
            }
        }
    }

    fn wait_for_command(&mut self, timeout: Duration) {
        if let Some(commands) = &self.commands {
            if let Ok(command) = commands.recv_timeout(timeout) {
                debug!("Operator command {command:?}");
                self.context.apply_command(command);
            }
        }
    }

    /// Runs until a stop is requested, or until surveillance is off and no
    /// command can turn it back on. `on_frame` sees every processed frame
    /// together with its report. Returns the number of frames processed.
    pub fn run<Src, F>(&mut self, source: &mut Src, mut on_frame: F) -> usize
    where
        Src: FrameSource<Frame = D::Frame>,
        F: FnMut(&mut D::Frame, &FrameReport, &GateContext),
    {
        let mut pacer = LoopPacer::new(self.tick);
        let mut frames = 0;

        loop {
            let connected = self.apply_pending_commands();
            if self.context.stop_requested() {
                info!("Stop requested, leaving the processing loop");
                break;
            }

            if !self.context.surveillance_enabled() {
                if source.is_open() {
                    info!("Surveillance disabled, releasing camera");
                    source.release();
                }
                if !connected {
                    info!("Surveillance disabled and no command source left, stopping");
                    break;
                }
                self.wait_for_command(pacer.tick());
                pacer.reset();
                continue;
            }

            if !source.is_open() {
                if let Err(err) = source.open() {
                    warn!("Failed to open camera: {err}");
                    pacer.wait();
                    continue;
                }
                info!("Camera opened");
            }

            let iteration = Instant::now();
            if let Some(mut frame) = source.next_frame() {
                let report = self.process_frame(&frame);
                on_frame(&mut frame, &report, &self.context);
                frames += 1;
            }
            let elapsed = iteration.elapsed();
            if elapsed > self.frame_deadline {
                warn!(
                    "Frame took {}ms, over the {}ms deadline",
                    elapsed.as_millis(),
                    self.frame_deadline.as_millis()
                );
            }

            pacer.wait();
        }

        source.release();
        frames
    }
}
