use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;

use agent_presence::{AgentDetector, StatusEvent};

use crate::actions::Action;

/// Replay state: drives the detector and writes its events as JSON lines.
pub struct App<W: Write> {
    /// Detector under replay
    pub detector: Arc<AgentDetector>,
    /// Subscription taken before the first action
    events: broadcast::Receiver<StatusEvent>,
    /// Where events and snapshots are written
    out: W,
    /// Number of actions handled so far
    pub processed: usize,
}

impl<W: Write> App<W> {
    pub fn new(detector: Arc<AgentDetector>, out: W) -> Self {
        let events = detector.subscribe();
        Self {
            detector,
            events,
            out,
            processed: 0,
        }
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        self.processed += 1;
        match action {
            Action::Input { terminal, data } => self.detector.observe_input(&terminal, &data),
            Action::Output { terminal, data } => self.detector.observe_output(&terminal, &data),
            Action::Close { terminal } => self.detector.cleanup_terminal(&terminal),
            Action::Name { terminal, name } => self.detector.set_display_name(&terminal, &name),
            Action::Resync => {
                self.write_events()?;
                self.write_snapshot()?;
                return Ok(false);
            }
            Action::Quit => {
                self.write_events()?;
                return Ok(true);
            }
        }
        self.write_events()?;
        Ok(false)
    }

    /// Write every event published since the last call.
    pub fn write_events(&mut self) -> Result<()> {
        loop {
            match self.events.try_recv() {
                Ok(event) => writeln!(self.out, "{}", serde_json::to_string(&event)?)?,
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged; run a resync");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        Ok(())
    }

    pub fn write_snapshot(&mut self) -> Result<()> {
        let snapshot = self.detector.snapshot();
        writeln!(self.out, "{}", serde_json::json!({ "snapshot": snapshot }))?;
        Ok(())
    }

    pub fn into_output(self) -> W {
        self.out
    }
}
