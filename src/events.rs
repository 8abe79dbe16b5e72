use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::detector::AgentType;

/// Agent presence for a single terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// No agent record exists for the terminal
    #[default]
    None,
    /// The terminal holds the single global foreground slot
    Connected,
    /// An agent is still running here but another terminal is in front
    Disconnected,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AgentStatus::None => "none",
            AgentStatus::Connected => "connected",
            AgentStatus::Disconnected => "disconnected",
        })
    }
}

/// Broadcast once per registry transition, in transition order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub terminal_id: String,
    pub agent_type: Option<AgentType>,
    pub status: AgentStatus,
}

impl StatusEvent {
    pub fn connected(terminal_id: &str, agent_type: AgentType) -> Self {
        Self {
            terminal_id: terminal_id.to_string(),
            agent_type: Some(agent_type),
            status: AgentStatus::Connected,
        }
    }

    pub fn disconnected(terminal_id: &str, agent_type: AgentType) -> Self {
        Self {
            terminal_id: terminal_id.to_string(),
            agent_type: Some(agent_type),
            status: AgentStatus::Disconnected,
        }
    }

    pub fn removed(terminal_id: &str) -> Self {
        Self {
            terminal_id: terminal_id.to_string(),
            agent_type: None,
            status: AgentStatus::None,
        }
    }
}

/// The terminal currently holding the foreground slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAgent {
    pub terminal_id: String,
    pub agent_type: AgentType,
}

/// One agent lifecycle in one terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub terminal_id: String,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Row of a full-state resync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSnapshot {
    pub terminal_id: String,
    pub display_name: Option<String>,
    pub status: AgentStatus,
    pub agent_type: Option<AgentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_event_wire_format() {
        let event = StatusEvent::connected("term-1", AgentType::Claude);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"terminal_id": "term-1", "agent_type": "claude", "status": "connected"})
        );

        let json = serde_json::to_value(StatusEvent::removed("term-1")).unwrap();
        assert_eq!(json["agent_type"], serde_json::Value::Null);
        assert_eq!(json["status"], "none");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(AgentStatus::Disconnected.to_string(), "disconnected");
        assert_eq!(AgentStatus::default(), AgentStatus::None);
    }
}
