use std::fmt;
use std::str::FromStr;

use log::info;

use crate::access::Decision;
use crate::dedup::DedupTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    Open,
    #[default]
    Closed,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Open => f.write_str("open"),
            GateState::Closed => f.write_str("closed"),
        }
    }
}

/// Commands an operator can issue. They are applied between loop iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    OpenGate,
    CloseGate,
    Stop,
    EnableSurveillance,
    DisableSurveillance,
}

impl FromStr for OperatorCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(OperatorCommand::OpenGate),
            "close" => Ok(OperatorCommand::CloseGate),
            "stop" | "quit" => Ok(OperatorCommand::Stop),
            "on" | "start" => Ok(OperatorCommand::EnableSurveillance),
            "off" | "pause" => Ok(OperatorCommand::DisableSurveillance),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

/// Mutable state owned by the processing loop: the gate, the control flags,
/// and the dedup tracker.
pub struct GateContext {
    gate: GateState,
    surveillance_enabled: bool,
    stop_requested: bool,
    dedup: DedupTracker,
}

impl GateContext {
    pub fn new(dedup: DedupTracker) -> Self {
        Self {
            gate: GateState::Closed,
            surveillance_enabled: false,
            stop_requested: false,
            dedup,
        }
    }

    pub fn gate_state(&self) -> GateState {
        self.gate
    }

    pub fn surveillance_enabled(&self) -> bool {
        self.surveillance_enabled
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn dedup(&self) -> &DedupTracker {
        &self.dedup
    }

    pub fn dedup_mut(&mut self) -> &mut DedupTracker {
        &mut self.dedup
    }

    pub fn open_gate(&mut self) {
        self.set_gate(GateState::Open);
    }

    pub fn close_gate(&mut self) {
        self.set_gate(GateState::Closed);
    }

    pub fn set_surveillance(&mut self, enabled: bool) {
        if self.surveillance_enabled != enabled {
            info!(
                "Surveillance {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        self.surveillance_enabled = enabled;
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Granted opens the gate, Denied closes it, Suppressed leaves it alone.
    pub fn apply_decision(&mut self, decision: Decision) {
        match decision {
            Decision::Granted => self.open_gate(),
            Decision::Denied => self.close_gate(),
            Decision::Suppressed => {}
        }
    }

    pub fn apply_command(&mut self, command: OperatorCommand) {
        match command {
            OperatorCommand::OpenGate => self.open_gate(),
            OperatorCommand::CloseGate => self.close_gate(),
            OperatorCommand::Stop => self.request_stop(),
            OperatorCommand::EnableSurveillance => self.set_surveillance(true),
            OperatorCommand::DisableSurveillance => self.set_surveillance(false),
        }
    }

    fn set_gate(&mut self, state: GateState) {
        if self.gate != state {
            info!("Gate {state}");
        }
        self.gate = state;
    }
}
