use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::info;

use super::heuristics::AgentType;
use crate::events::{ActiveAgent, AgentRecord, AgentStatus, StatusEvent};

/// Authoritative map of agent records plus the single foreground slot.
///
/// Every transition returns the events it caused, in order; the caller
/// publishes them after the mutation. At most one record is `Connected`, and
/// it is always the one `active` points at.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    records: HashMap<String, AgentRecord>,
    active: Option<ActiveAgent>,
    display_names: HashMap<String, String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring `terminal_id` to the foreground, demoting whoever held it.
    pub fn activate(&mut self, terminal_id: &str, agent_type: AgentType) -> Vec<StatusEvent> {
        if let Some(active) = &self.active {
            if active.terminal_id == terminal_id && active.agent_type == agent_type {
                return Vec::new();
            }
        }

        let mut events = Vec::new();
        if let Some(previous) = self.active.take() {
            if previous.terminal_id != terminal_id {
                if let Some(record) = self.records.get_mut(&previous.terminal_id) {
                    if record.status == AgentStatus::Connected {
                        record.status = AgentStatus::Disconnected;
                        info!(terminal = %record.terminal_id, agent = %record.agent_type, "agent moved to background");
                        events.push(StatusEvent::disconnected(&record.terminal_id, record.agent_type));
                    }
                }
            }
        }

        let now = Utc::now();
        let same_lifecycle = self
            .records
            .get(terminal_id)
            .is_some_and(|record| record.agent_type == agent_type);
        if same_lifecycle {
            if let Some(record) = self.records.get_mut(terminal_id) {
                record.status = AgentStatus::Connected;
                record.last_activity = now;
            }
        } else {
            // A record's type is fixed; a different agent starts a new lifecycle.
            self.records.insert(
                terminal_id.to_string(),
                AgentRecord {
                    terminal_id: terminal_id.to_string(),
                    agent_type,
                    status: AgentStatus::Connected,
                    start_time: now,
                    last_activity: now,
                },
            );
        }

        self.active = Some(ActiveAgent {
            terminal_id: terminal_id.to_string(),
            agent_type,
        });
        info!(terminal = terminal_id, agent = %agent_type, "agent connected");
        events.push(StatusEvent::connected(terminal_id, agent_type));
        events
    }

    /// Remove the terminal's record. If it held the foreground slot, the
    /// background agent with the lowest ordinal is promoted.
    pub fn deactivate(&mut self, terminal_id: &str) -> Vec<StatusEvent> {
        let Some(record) = self.records.remove(terminal_id) else {
            return Vec::new();
        };
        info!(terminal = terminal_id, agent = %record.agent_type, "agent removed");
        let mut events = vec![StatusEvent::removed(terminal_id)];

        let held_slot = self
            .active
            .as_ref()
            .is_some_and(|active| active.terminal_id == terminal_id);
        if held_slot {
            self.active = None;
            if let Some(event) = self.promote() {
                events.push(event);
            }
        }
        events
    }

    /// Terminal closed by the host. Safe for unknown terminals.
    pub fn cleanup_terminal(&mut self, terminal_id: &str) -> Vec<StatusEvent> {
        let events = self.deactivate(terminal_id);
        self.display_names.remove(terminal_id);
        events
    }

    /// Remove every record without promoting anyone in between.
    pub fn deactivate_all(&mut self) -> Vec<StatusEvent> {
        let mut ids: Vec<String> = self.records.keys().cloned().collect();
        ids.sort_by(|a, b| self.promotion_order(a, b));
        self.records.clear();
        self.active = None;
        info!(count = ids.len(), "all agents removed");
        ids.iter().map(|id| StatusEvent::removed(id)).collect()
    }

    /// Record the last time anything was seen from an agent's terminal.
    pub fn touch(&mut self, terminal_id: &str) {
        if let Some(record) = self.records.get_mut(terminal_id) {
            record.last_activity = Utc::now();
        }
    }

    pub fn set_display_name(&mut self, terminal_id: &str, name: &str) {
        self.display_names
            .insert(terminal_id.to_string(), name.to_string());
    }

    pub fn display_name(&self, terminal_id: &str) -> Option<&str> {
        self.display_names.get(terminal_id).map(String::as_str)
    }

    pub fn status(&self, terminal_id: &str) -> AgentStatus {
        self.records
            .get(terminal_id)
            .map(|record| record.status)
            .unwrap_or(AgentStatus::None)
    }

    pub fn agent_type(&self, terminal_id: &str) -> Option<AgentType> {
        self.records.get(terminal_id).map(|record| record.agent_type)
    }

    pub fn record(&self, terminal_id: &str) -> Option<&AgentRecord> {
        self.records.get(terminal_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &AgentRecord> {
        self.records.values()
    }

    pub fn active(&self) -> Option<&ActiveAgent> {
        self.active.as_ref()
    }

    /// Ordinal used for promotion: display name if set, otherwise the id.
    pub fn ordinal(&self, terminal_id: &str) -> Option<u64> {
        parse_ordinal(self.display_name(terminal_id).unwrap_or(terminal_id))
    }

    /// Ascending ordinal, unparseable last, then by id.
    pub fn promotion_order(&self, a: &str, b: &str) -> Ordering {
        match (self.ordinal(a), self.ordinal(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.cmp(b))
    }

    /// Whether the mutual-exclusion invariant holds.
    pub fn is_consistent(&self) -> bool {
        let connected: Vec<&AgentRecord> = self
            .records
            .values()
            .filter(|record| record.status == AgentStatus::Connected)
            .collect();
        match (&self.active, connected.as_slice()) {
            (None, []) => true,
            (Some(active), [record]) => {
                record.terminal_id == active.terminal_id && record.agent_type == active.agent_type
            }
            _ => false,
        }
    }

    fn promote(&mut self) -> Option<StatusEvent> {
        let candidate = self
            .records
            .values()
            .filter(|record| record.status == AgentStatus::Disconnected)
            .map(|record| record.terminal_id.as_str())
            .min_by(|a, b| self.promotion_order(a, b))?
            .to_string();

        let record = self.records.get_mut(&candidate)?;
        record.status = AgentStatus::Connected;
        self.active = Some(ActiveAgent {
            terminal_id: candidate.clone(),
            agent_type: record.agent_type,
        });
        info!(terminal = %candidate, agent = %record.agent_type, "background agent promoted");
        Some(StatusEvent::connected(&candidate, record.agent_type))
    }
}

/// Trailing run of ASCII digits in a terminal name, e.g. `Terminal 3` -> 3.
pub fn parse_ordinal(name: &str) -> Option<u64> {
    let name = name.trim_end();
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}
