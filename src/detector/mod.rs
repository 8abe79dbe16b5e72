mod buffers;
mod heuristics;
mod normalize;
mod registry;

pub use buffers::{BufferStore, TerminalBuffers};
pub use heuristics::{AgentType, LineClassification, PatternLibrary};
pub use normalize::{normalize, normalize_bytes, normalized_lines};
pub use registry::{parse_ordinal, AgentRegistry};

use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::trace;

use crate::config::DetectorConfig;
use crate::error::{Error, Result};
use crate::events::{ActiveAgent, AgentRecord, AgentStatus, StatusEvent, TerminalSnapshot};

/// Classifies raw terminal I/O and tracks which terminal hosts the
/// foreground agent.
///
/// Safe to share between the threads feeding different terminals. Calls for
/// the same terminal must arrive in order.
pub struct AgentDetector {
    registry: Mutex<AgentRegistry>,
    buffers: Mutex<BufferStore>,
    patterns: PatternLibrary,
    events: broadcast::Sender<StatusEvent>,
}

impl AgentDetector {
    /// Build a detector, rejecting configs that [`DetectorConfig::validate`] refuses.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|reason| Error::InvalidConfig { path: None, reason })?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: DetectorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            registry: Mutex::new(AgentRegistry::new()),
            patterns: PatternLibrary::new(config.termination_line_cutoff),
            buffers: Mutex::new(BufferStore::new(config)),
            events,
        }
    }

    /// Receive every status change from now on. A receiver that falls behind
    /// gets `RecvError::Lagged` and should resync through [`Self::snapshot`].
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// Feed raw keystrokes typed or pasted into a terminal.
    pub fn observe_input(&self, terminal_id: &str, data: &str) {
        if data.is_empty() {
            return;
        }
        let commands = self.buffers().append_input(terminal_id, data);
        self.registry().touch(terminal_id);

        for command in commands {
            let Some(agent) = self.patterns.detect_invocation(&command) else {
                continue;
            };
            let changed = self.transition(|registry| {
                if registry.status(terminal_id) == AgentStatus::Connected {
                    return Vec::new();
                }
                registry.activate(terminal_id, agent)
            });
            if changed {
                self.buffers().clear_prompt_lines(terminal_id);
            }
        }
    }

    /// Feed raw output produced by a terminal's process.
    pub fn observe_output(&self, terminal_id: &str, data: &str) {
        if data.is_empty() {
            return;
        }
        trace!(terminal = terminal_id, bytes = data.len(), "output chunk");
        self.registry().touch(terminal_id);

        for line in normalized_lines(data) {
            let window = self.buffers().push_output_line(terminal_id, &line);
            let classification = self.patterns.classify(&line, &window);

            let changed = self.transition(|registry| match registry.status(terminal_id) {
                AgentStatus::None => match classification.startup {
                    Some(agent) => registry.activate(terminal_id, agent),
                    None => Vec::new(),
                },
                AgentStatus::Connected if classification.is_termination() => {
                    registry.deactivate(terminal_id)
                }
                AgentStatus::Connected => Vec::new(),
                AgentStatus::Disconnected => {
                    if classification.is_termination() {
                        registry.deactivate(terminal_id)
                    } else if let Some(agent) = classification.startup {
                        registry.activate(terminal_id, agent)
                    } else {
                        Vec::new()
                    }
                }
            });
            if changed {
                self.buffers().clear_prompt_lines(terminal_id);
            }
        }
    }

    /// The host closed the terminal. Safe to call repeatedly or for
    /// terminals never seen.
    pub fn cleanup_terminal(&self, terminal_id: &str) {
        self.transition(|registry| registry.cleanup_terminal(terminal_id));
        self.buffers().remove(terminal_id);
    }

    /// Drop every agent record, e.g. on host shutdown.
    pub fn deactivate_all(&self) {
        let mut removed = Vec::new();
        self.transition(|registry| {
            let events = registry.deactivate_all();
            removed = events.iter().map(|event| event.terminal_id.clone()).collect();
            events
        });
        let mut buffers = self.buffers();
        for terminal_id in &removed {
            buffers.clear_prompt_lines(terminal_id);
        }
    }

    /// Name shown for the terminal; its trailing number orders promotion.
    pub fn set_display_name(&self, terminal_id: &str, name: &str) {
        self.registry().set_display_name(terminal_id, name);
    }

    pub fn query_status(&self, terminal_id: &str) -> AgentStatus {
        self.registry().status(terminal_id)
    }

    pub fn query_type(&self, terminal_id: &str) -> Option<AgentType> {
        self.registry().agent_type(terminal_id)
    }

    pub fn query_globally_active(&self) -> Option<ActiveAgent> {
        self.registry().active().cloned()
    }

    pub fn record(&self, terminal_id: &str) -> Option<AgentRecord> {
        self.registry().record(terminal_id).cloned()
    }

    /// Up to `limit` completed commands for the terminal, newest first.
    pub fn recent_commands(&self, terminal_id: &str, limit: usize) -> Vec<String> {
        self.buffers().recent_commands(terminal_id, limit)
    }

    /// Status of every known terminal, for a full resync of a late subscriber.
    pub fn snapshot(&self) -> Vec<TerminalSnapshot> {
        let registry = self.registry();
        let mut ids: Vec<String> = self
            .buffers()
            .terminal_ids()
            .map(str::to_string)
            .chain(registry.records().map(|record| record.terminal_id.clone()))
            .collect();
        ids.sort_by(|a, b| registry.promotion_order(a, b));
        ids.dedup();

        ids.into_iter()
            .map(|terminal_id| {
                let record = registry.record(&terminal_id);
                TerminalSnapshot {
                    display_name: registry.display_name(&terminal_id).map(str::to_string),
                    status: registry.status(&terminal_id),
                    agent_type: record.map(|record| record.agent_type),
                    start_time: record.map(|record| record.start_time),
                    last_activity: record.map(|record| record.last_activity),
                    terminal_id,
                }
            })
            .collect()
    }

    /// Run a registry transition and publish its events while the registry
    /// is still locked, so the channel order matches the transition order.
    fn transition<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut AgentRegistry) -> Vec<StatusEvent>,
    {
        let mut registry = self.registry();
        let events = f(&mut *registry);
        debug_assert!(registry.is_consistent());
        let changed = !events.is_empty();
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        changed
    }

    fn registry(&self) -> MutexGuard<'_, AgentRegistry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn buffers(&self) -> MutexGuard<'_, BufferStore> {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for AgentDetector {
    fn default() -> Self {
        Self::with_valid_config(DetectorConfig::default())
    }
}
