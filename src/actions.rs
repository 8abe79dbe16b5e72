use agent_presence::{Error, Result};
use serde::Deserialize;

/// Actions that can be dispatched through the replay loop
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Action {
    /// Keystrokes typed into a terminal
    Input { terminal: String, data: String },
    /// Output written by a terminal's process
    Output { terminal: String, data: String },
    /// The host closed a terminal
    Close { terminal: String },
    /// A terminal got a display name
    Name { terminal: String, name: String },
    /// Print a full status snapshot
    Resync,
    /// End of the transcript
    #[serde(skip)]
    Quit,
}

impl Action {
    /// Parse one transcript line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str, line_number: usize) -> Result<Option<Action>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(line)
            .map(Some)
            .map_err(|e| Error::Transcript {
                line: line_number,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        let action = Action::parse(r#"{"kind":"input","terminal":"t1","data":"claude\r"}"#, 1)
            .unwrap()
            .unwrap();
        assert_eq!(
            action,
            Action::Input {
                terminal: "t1".to_string(),
                data: "claude\r".to_string()
            }
        );
        assert_eq!(Action::parse(r#"{"kind":"resync"}"#, 2).unwrap(), Some(Action::Resync));
    }

    #[test]
    fn test_parse_skips_blank_and_comments() {
        assert_eq!(Action::parse("   ", 1).unwrap(), None);
        assert_eq!(Action::parse("# setup", 2).unwrap(), None);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = Action::parse(r#"{"kind":"quit"}"#, 7).unwrap_err();
        assert!(matches!(err, Error::Transcript { line: 7, .. }));
        assert!(Action::parse("{", 8).is_err());
    }
}
