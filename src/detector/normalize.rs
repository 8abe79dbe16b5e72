use once_cell::sync::Lazy;
use regex::Regex;

// Applied in declaration order. Each pass only removes bytes, so running the
// whole chain twice yields the same text as running it once.

/// CSI sequences: cursor movement, colors, erase, scroll regions.
static RE_CSI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;:<=>?]*[ -/]*[@-~]").unwrap());

/// OSC sequences (window title, hyperlinks, cwd reports) ended by BEL or ST.
static RE_OSC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\][^\x07\x1b]*(\x07|\x1b\\)").unwrap());

/// String terminator left behind by a sequence split across chunks.
static RE_ST: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\\").unwrap());

static RE_CARRIAGE_RETURN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r").unwrap());

/// DEC private mode set/reset, e.g. bracketed paste or cursor visibility.
static RE_PRIVATE_MODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[\?[0-9;]*[hl]").unwrap());

/// Application/normal keypad and charset designation.
static RE_KEYPAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b([=>]|[()][0-9A-Za-z])").unwrap());

/// Escape sequences truncated at the end of a chunk.
static RE_TRUNCATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b(\[[0-9;:<=>?]*[ -/]*|\][^\x07\x1b]*)?$").unwrap());

/// Two-byte escapes: cursor save/restore (ESC 7/8), reverse index (ESC M),
/// full reset (ESC c) and the rest of the Fp, Fe and Fs ranges.
static RE_ESC_SHORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b[0-9@-Z\\-_\x60-\x7e]").unwrap());

/// Everything non-printable except tab and newline.
static RE_CONTROL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0b-\x1f\x7f]").unwrap());

/// Strip terminal control sequences from a chunk of output, leaving plain text.
///
/// Never fails: malformed or truncated sequences are dropped byte by byte.
/// Newlines are kept so callers can still split the result into lines.
pub fn normalize(raw: &str) -> String {
    let text = RE_CSI.replace_all(raw, "");
    let text = RE_OSC.replace_all(&text, "");
    let text = RE_ST.replace_all(&text, "");
    let text = RE_CARRIAGE_RETURN.replace_all(&text, "");
    let text = RE_PRIVATE_MODE.replace_all(&text, "");
    let text = RE_KEYPAD.replace_all(&text, "");
    let text = RE_TRUNCATED.replace_all(&text, "");
    let text = RE_ESC_SHORT.replace_all(&text, "");
    let text = RE_CONTROL.replace_all(&text, "");
    text.trim().to_string()
}

/// Same as [`normalize`] for raw PTY bytes; invalid UTF-8 is replaced.
pub fn normalize_bytes(raw: &[u8]) -> String {
    normalize(&String::from_utf8_lossy(raw))
}

/// Normalize a chunk and split it into non-empty trimmed lines.
pub fn normalized_lines(raw: &str) -> Vec<String> {
    normalize(raw)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_colors_and_cursor_movement() {
        let raw = "\x1b[1;32muser@host\x1b[0m:\x1b[34m~\x1b[0m$ \x1b[K";
        assert_eq!(normalize(raw), "user@host:~$");
    }

    #[test]
    fn test_strips_osc_title() {
        let raw = "\x1b]0;claude - ~/project\x07Welcome to Claude Code!";
        assert_eq!(normalize(raw), "Welcome to Claude Code!");

        let raw = "\x1b]8;;file:///tmp\x1b\\link\x1b]8;;\x1b\\";
        assert_eq!(normalize(raw), "link");
    }

    #[test]
    fn test_strips_private_modes_and_keypad() {
        let raw = "\x1b[?2004h\x1b[?25l\x1b=ready\x1b>\x1b[?2004l";
        assert_eq!(normalize(raw), "ready");
    }

    #[test]
    fn test_strips_two_byte_escapes() {
        assert_eq!(normalize("\x1b7user@host:~$ \x1b8"), "user@host:~$");
        assert_eq!(normalize("\x1bMscrolled\x1bD"), "scrolled");
        assert_eq!(normalize("\x1bcuser@host:~/proj$ "), "user@host:~/proj$");
        // OSC is still consumed whole, not as ESC ]
        assert_eq!(normalize("\x1b]0;title\x07\x1b7ok"), "ok");
    }

    #[test]
    fn test_tolerates_truncated_sequences() {
        assert_eq!(normalize("hello\x1b[31"), "hello");
        assert_eq!(normalize("hello\x1b]0;unterminated"), "hello");
        assert_eq!(normalize("\x1b"), "");
    }

    #[test]
    fn test_removes_raw_control_bytes() {
        assert_eq!(normalize("a\x07b\x08c\x00d\r\n"), "abcd");
    }

    #[test]
    fn test_idempotent_on_clean_text() {
        let clean = "PS C:\\Users\\me>";
        assert_eq!(normalize(clean), clean);
        let once = normalize("\x1b[31m  some\toutput \x1b[0m\r\n");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_normalized_lines_skips_blank_lines() {
        let lines = normalized_lines("first\r\n\r\n\x1b[2K\r\n  second  \n");
        assert_eq!(lines, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_normalize_bytes_handles_invalid_utf8() {
        assert_eq!(normalize_bytes(b"ok\xff\x1b[0m"), "ok\u{fffd}");
    }
}
