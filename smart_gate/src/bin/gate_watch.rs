use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};
use opencv::prelude::*;

use smart_gate::access::AccessEngine;
use smart_gate::config::GateConfig;
use smart_gate::gate::{GateContext, OperatorCommand};
use smart_gate::metrics;
use smart_gate::pipeline::{GatePipeline, Notification, NotificationLevel};
use smart_gate::plate_detection::bounding_box_render::{draw_report, FrameRecorder};
use smart_gate::plate_detection::cascade_detector::CascadeDetector;
use smart_gate::plate_detection::tess_ocr::TessOcrReader;
use smart_gate::plate_detection::video_reader::CameraReader;
use smart_gate::storage::Database;

/// Watches the gate camera and decides access for every recognized plate.
///
/// Operator commands are read from stdin, one per line: open, close, on, off, stop.
#[derive(Parser, Debug)]
#[command(name = "gate_watch", version)]
struct Args {
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured database path.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Overrides the configured camera index.
    #[arg(long)]
    camera: Option<i32>,

    /// Record annotated frames to this .avi file.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Start with surveillance enabled instead of waiting for `on`.
    #[arg(long)]
    surveil: bool,
}

fn spawn_command_reader(commands: Sender<OperatorCommand>) {
    // Not joined: the thread stays blocked on stdin until the process exits.
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("Failed to read operator input: {err}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<OperatorCommand>() {
                Ok(command) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                Err(err) => warn!("{err}; expected open, close, on, off or stop"),
            }
        }
    });
}

fn spawn_notification_printer(notifications: Receiver<Notification>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for notification in notifications.iter() {
            let label = match notification.level {
                NotificationLevel::Success => "OK",
                NotificationLevel::Warning => "DENIED",
                NotificationLevel::Error => "ERROR",
            };
            println!("[{label}] {notification}");
        }
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config =
        GateConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = args.db {
        config.database_path = db;
    }
    if let Some(camera) = args.camera {
        config.camera_index = camera;
    }

    let database = Database::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database_path.display()
        )
    })?;
    let detector =
        CascadeDetector::new(&config.detector).context("Failed to load plate detector")?;
    let recognizer =
        TessOcrReader::new(&config.recognizer).context("Failed to initialize text recognizer")?;
    let validator = config.plate_validator()?;

    let mut context = GateContext::new(config.dedup_tracker());
    context.set_surveillance(args.surveil);

    let (command_tx, command_rx) = unbounded();
    let (notification_tx, notification_rx) = unbounded();
    spawn_command_reader(command_tx);
    let printer = spawn_notification_printer(notification_rx);

    let mut pipeline = GatePipeline::new(
        detector,
        recognizer,
        validator,
        AccessEngine::new(database, config.debounce()),
        context,
    )
    .with_commands(command_rx)
    .with_notifications(notification_tx)
    .with_timing(config.tick(), config.frame_deadline());

    let mut camera = CameraReader::new(config.camera_index);
    let mut pending_recording = args.record;
    let mut recorder: Option<FrameRecorder> = None;
    let record_fps = 1000.0 / config.tick_ms as f64;

    info!(
        "Watching camera {} (surveillance {})",
        config.camera_index,
        if args.surveil { "on" } else { "off" }
    );
    let frames = pipeline.run(&mut camera, |frame, report, context| {
        if let Err(err) = draw_report(frame, report, context) {
            warn!("{err}");
        }

        if let Some(path) = pending_recording.take() {
            match frame.size() {
                Ok(size) => match FrameRecorder::create(&path, record_fps, size) {
                    Ok(created) => recorder = Some(created),
                    Err(err) => error!("Recording disabled: {err}"),
                },
                Err(err) => error!("Recording disabled: {err}"),
            }
        }
        if let Some(recorder) = recorder.as_mut() {
            if let Err(err) = recorder.write(frame) {
                warn!("{err}");
            }
        }
    });

    drop(recorder);
    drop(pipeline);
    if printer.join().is_err() {
        error!("Notification printer panicked");
    }

    info!("Processed {frames} frames");
    info!("Metrics:\n{}", metrics::render());
    Ok(())
}
