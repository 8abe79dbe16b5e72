//! Agent presence detection for multi-terminal hosts.
//!
//! Feed each terminal's raw keystrokes and output into an [`AgentDetector`];
//! it infers when an agent CLI starts or exits in that terminal and keeps at
//! most one of them "connected" (in the foreground) at a time.

pub mod config;
pub mod detector;
pub mod error;
pub mod events;

pub use config::DetectorConfig;
pub use detector::{AgentDetector, AgentType, PatternLibrary};
pub use error::{Error, Result};
pub use events::{ActiveAgent, AgentRecord, AgentStatus, StatusEvent, TerminalSnapshot};
