use std::collections::{HashMap, VecDeque};

use tracing::trace;

use super::normalize::normalize;
use crate::config::DetectorConfig;

const BACKSPACE: char = '\x7f';
const CTRL_H: char = '\x08';
const CTRL_C: char = '\x03';
const CTRL_U: char = '\x15';

/// Input line, command history and recent output for one terminal.
#[derive(Debug, Default, Clone)]
pub struct TerminalBuffers {
    input_line: String,
    history: VecDeque<String>,
    prompt_lines: VecDeque<String>,
}

impl TerminalBuffers {
    /// Partial input typed since the last line terminator.
    pub fn pending_input(&self) -> &str {
        &self.input_line
    }

    /// Completed commands, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    /// Recent normalized output lines, oldest first.
    pub fn prompt_lines(&self) -> impl Iterator<Item = &str> {
        self.prompt_lines.iter().map(String::as_str)
    }

    fn push_input(&mut self, data: &str, config: &DetectorConfig) -> Vec<String> {
        let mut completed = Vec::new();
        for c in data.chars() {
            match c {
                '\r' | '\n' => {
                    let line = normalize(&std::mem::take(&mut self.input_line));
                    if line.is_empty() {
                        continue;
                    }
                    if config.history_limit > 0 {
                        if self.history.len() >= config.history_limit {
                            self.history.pop_front();
                        }
                        self.history.push_back(line.clone());
                    }
                    completed.push(line);
                }
                BACKSPACE | CTRL_H => {
                    self.input_line.pop();
                }
                CTRL_C | CTRL_U => self.input_line.clear(),
                _ if self.input_line.len() < config.max_input_line => self.input_line.push(c),
                _ => {}
            }
        }
        completed
    }

    fn push_output_line(&mut self, line: &str, config: &DetectorConfig) -> String {
        if self.prompt_lines.len() >= config.prompt_buffer_lines {
            self.prompt_lines.pop_front();
        }
        self.prompt_lines.push_back(line.to_string());

        let skip = self
            .prompt_lines
            .len()
            .saturating_sub(config.prompt_window_lines);
        self.prompt_lines.iter().skip(skip).map(String::as_str).collect()
    }
}

/// Per-terminal buffers keyed by terminal id, created lazily on first use.
#[derive(Debug)]
pub struct BufferStore {
    terminals: HashMap<String, TerminalBuffers>,
    config: DetectorConfig,
}

impl BufferStore {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            terminals: HashMap::new(),
            config,
        }
    }

    /// Feed raw keystrokes; returns every line completed by this chunk.
    pub fn append_input(&mut self, terminal_id: &str, data: &str) -> Vec<String> {
        let completed = self
            .terminals
            .entry(terminal_id.to_string())
            .or_default()
            .push_input(data, &self.config);
        if !completed.is_empty() {
            trace!(terminal = terminal_id, ?completed, "input lines completed");
        }
        completed
    }

    /// Push one normalized output line and return the concatenated tail of
    /// the prompt buffer, for matching prompts split across writes.
    pub fn push_output_line(&mut self, terminal_id: &str, line: &str) -> String {
        self.terminals
            .entry(terminal_id.to_string())
            .or_default()
            .push_output_line(line, &self.config)
    }

    pub fn clear_prompt_lines(&mut self, terminal_id: &str) {
        if let Some(buffers) = self.terminals.get_mut(terminal_id) {
            buffers.prompt_lines.clear();
        }
    }

    /// Drop everything held for a closed terminal.
    pub fn remove(&mut self, terminal_id: &str) -> Option<TerminalBuffers> {
        self.terminals.remove(terminal_id)
    }

    pub fn get(&self, terminal_id: &str) -> Option<&TerminalBuffers> {
        self.terminals.get(terminal_id)
    }

    /// Up to `limit` completed commands, newest first.
    pub fn recent_commands(&self, terminal_id: &str, limit: usize) -> Vec<String> {
        self.terminals
            .get(terminal_id)
            .map(|buffers| buffers.history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn terminal_ids(&self) -> impl Iterator<Item = &str> {
        self.terminals.keys().map(String::as_str)
    }
}
