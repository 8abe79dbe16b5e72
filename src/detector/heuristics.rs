use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Known agent CLIs that can be recognised from their terminal footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Claude,
    Gemini,
    Codex,
    Qwen,
}

impl AgentType {
    /// Every known agent, in matching priority order.
    pub const ALL: [AgentType; 4] = [
        AgentType::Claude,
        AgentType::Gemini,
        AgentType::Codex,
        AgentType::Qwen,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentType::Claude => "claude",
            AgentType::Gemini => "gemini",
            AgentType::Codex => "codex",
            AgentType::Qwen => "qwen",
        }
    }

    /// Name of the executable typed at the shell to start the agent.
    pub fn binary_name(self) -> &'static str {
        self.as_str()
    }

    pub fn from_binary(name: &str) -> Option<AgentType> {
        AgentType::ALL
            .into_iter()
            .find(|agent| agent.binary_name().eq_ignore_ascii_case(name))
    }

    fn rules(self) -> &'static StartupRules {
        match self {
            AgentType::Claude => &CLAUDE_RULES,
            AgentType::Gemini => &GEMINI_RULES,
            AgentType::Codex => &CODEX_RULES,
            AgentType::Qwen => &QWEN_RULES,
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered startup rule set for one agent type.
struct StartupRules {
    /// Phrases that are never a startup banner for this agent.
    exclusions: RegexSet,
    /// High-confidence banners that match on their own.
    signatures: RegexSet,
    /// Agent name; must co-occur with a [`RE_STARTUP_CONTEXT`] keyword.
    name: Regex,
}

impl StartupRules {
    fn new(exclusions: &[&str], signatures: &[&str], name: &str) -> Self {
        let exclusions = COMMON_EXCLUSIONS
            .iter()
            .chain(exclusions)
            .map(|pattern| format!("(?i){pattern}"));
        Self {
            exclusions: RegexSet::new(exclusions).unwrap(),
            signatures: RegexSet::new(signatures.iter().map(|pattern| format!("(?i){pattern}")))
                .unwrap(),
            name: Regex::new(&format!(r"(?i)\b{name}\b")).unwrap(),
        }
    }

    fn matches(&self, line: &str) -> bool {
        if self.exclusions.is_match(line) {
            return false;
        }
        if self.signatures.is_match(line) {
            return true;
        }
        self.name.is_match(line) && RE_STARTUP_CONTEXT.is_match(line)
    }
}

/// Permission notices, links and diagnostics that mention an agent by name.
const COMMON_EXCLUSIONS: &[&str] = &[
    r"\bmay (read|write|access|modify|execute)\b",
    r"\bpermission",
    r"https?://",
    r"\bwww\.",
    r"\berror:",
    r"\bwarning:",
    r"\bfailed\b",
    r"\bnot found\b",
    r"^\s*[\w.@/-]+\s+(is\s+)?available\b",
];

static RE_STARTUP_CONTEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(starting|ready|initiali[sz]ed|welcome)\b").unwrap());

static CLAUDE_RULES: Lazy<StartupRules> = Lazy::new(|| {
    StartupRules::new(
        &[r"\bclaude\.md\b", r"\banthropic_api_key\b"],
        &[
            r"welcome to claude( code)?\b",
            r"^✻\s*welcome to claude",
            r"^claude code v?\d+\.\d+",
            r"^╭─+\s*claude code",
        ],
        "claude",
    )
});

static GEMINI_RULES: Lazy<StartupRules> = Lazy::new(|| {
    StartupRules::new(
        &[r"\bgemini\.md\b", r"\bgemini_api_key\b"],
        &[
            r"welcome to gemini( cli)?\b",
            r"^gemini cli v?\d+\.\d+",
            r"tips for getting started.*gemini",
        ],
        "gemini",
    )
});

static CODEX_RULES: Lazy<StartupRules> = Lazy::new(|| {
    StartupRules::new(
        &[r"\bagents\.md\b", r"\bopenai_api_key\b"],
        &[
            r"^>_\s*openai codex",
            r"^openai codex\b",
            r"welcome to codex\b",
            r"^codex cli v?\d+\.\d+",
        ],
        "codex",
    )
});

static QWEN_RULES: Lazy<StartupRules> = Lazy::new(|| {
    StartupRules::new(
        &[r"\bqwen\.md\b", r"\bdashscope_api_key\b"],
        &[r"welcome to qwen( code)?\b", r"^qwen code v?\d+\.\d+"],
        "qwen",
    )
});

/// Farewells, interrupts and EOF markers printed when an agent goes away.
static RE_TERMINATION: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        // farewell
        r"(?i)^(good)?bye\b",
        r"(?i)\bsee you (later|next time|soon)\b",
        r"(?i)^/?(exit|quit)$",
        r"(?i)^exiting\b",
        r"(?i)\b(session|conversation|chat) (ended|terminated|closed)\b",
        r"(?i)\bagent (exited|terminated|stopped)\b",
        r"(?i)\bprocess exited with code -?\d+",
        r"(?i)^\[process (completed|exited)",
        // interrupt
        r"(?i)\bkeyboardinterrupt\b",
        r"(?i)\binterrupted by user\b",
        r"(?i)\b(received|caught|got) sigint\b",
        // eof
        r"(?i)^(\^d|eof)$",
        r"(?i)\bend of (file|input)\b",
    ])
    .unwrap()
});

/// Shell prompt shapes, anchored at the end of the candidate text.
static RE_PROMPT: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        // user@host:path$ (unanchored start so a split prompt still matches)
        r"[\w.-]+@[\w.-]+:\S*\s?[$#%]\s*$",
        r"^[\w.-]+@[\w.-]+\s?[$#%]\s*$",
        // [user@host dir]$
        r"^\[[\w.-]+@[\w.-]+[^\]]*\]\s?[$#]\s*$",
        // ~/path% and /path$
        r"^(~|/)\S*\s?[$#%]\s*$",
        // oh-my-zsh robbyrussell and starship
        r"^➜\s+[\w.~/-]+(\s+git:\([^)]*\))?(\s+✗)?\s*$",
        r"^[\w.~/-]+(\s+on\s+.+?)?\s+❯\s*$",
        // PowerShell and cmd.exe
        r"^PS\s+[^>]*>\s*$",
        r"^[A-Za-z]:\\[^>]*>\s*$",
        // [12:34:56] or (venv) prefixed prompts
        r"^\[\d{1,2}:\d{2}(:\d{2})?\]\s*\S.*[$#%>]\s*$",
        r"^\([\w.-]+\)\s+\S.*[$#%>]\s*$",
    ])
    .unwrap()
});

/// Conversational or code vocabulary that disqualifies a prompt-shaped line
/// when it appears as a plain word outside the prompt's host/path token.
const PROMPT_EXCLUDED_WORDS: &[&str] = &[
    "assistant", "thinking", "claude", "gemini", "codex", "qwen", "function", "def", "class",
    "const", "let", "var", "import", "return", "fn", "impl", "echo", "printf",
];

static RE_PROMPT_CODE_SYMBOLS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"=>|console\.log|print\(").unwrap());

/// Characters that mark a token as prompt chrome (host, path, sigil) rather than prose.
const PROMPT_CHROME_CHARS: &[char] = &['@', '/', '~', '\\', ':', '$', '#', '%', '>', '❯', '➜', '✗'];

/// Package runners that may precede an agent binary on the command line.
const RUNNERS: &[&str] = &["npx", "bunx", "pnpx"];

/// Result of evaluating one normalized line against the pattern library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineClassification {
    pub startup: Option<AgentType>,
    pub exit: bool,
    pub prompt_return: bool,
}

impl LineClassification {
    /// Whether the line ends the current agent lifecycle.
    pub fn is_termination(&self) -> bool {
        self.exit || self.prompt_return
    }
}

/// Matches normalized terminal text against agent signatures.
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    /// Lines longer than this (in chars) are never treated as exit phrases.
    termination_line_cutoff: usize,
}

impl PatternLibrary {
    pub fn new(termination_line_cutoff: usize) -> Self {
        Self {
            termination_line_cutoff,
        }
    }

    /// Classify a normalized line. `window` is the tail of the prompt buffer
    /// concatenated, used for prompts split across output chunks.
    pub fn classify(&self, line: &str, window: &str) -> LineClassification {
        let classification = LineClassification {
            startup: self.detect_startup(line),
            exit: self.is_exit_phrase(line),
            prompt_return: self.is_prompt_return(line, window),
        };
        if classification != LineClassification::default() {
            debug!(line, ?classification, "line matched agent patterns");
        }
        classification
    }

    /// First agent whose startup rules accept the line.
    pub fn detect_startup(&self, line: &str) -> Option<AgentType> {
        AgentType::ALL
            .into_iter()
            .find(|agent| agent.rules().matches(line))
    }

    pub fn is_exit_phrase(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() || line.chars().count() > self.termination_line_cutoff {
            return false;
        }
        RE_TERMINATION.is_match(line)
    }

    pub fn is_prompt_return(&self, line: &str, window: &str) -> bool {
        let looks_like_prompt =
            |text: &str| RE_PROMPT.is_match(text) && !has_prose_vocabulary(text);
        looks_like_prompt(line.trim()) || (!window.is_empty() && looks_like_prompt(window.trim()))
    }

    /// Agent started by a completed input line, if the line invokes one.
    ///
    /// Accepts `claude`, `/usr/local/bin/claude --resume`, `npx codex`,
    /// `FOO=1 gemini -p ...`. The startup exclusions still apply so that a
    /// line merely mentioning an agent does not count.
    pub fn detect_invocation(&self, command: &str) -> Option<AgentType> {
        let mut words = command
            .split_whitespace()
            .skip_while(|word| is_env_assignment(word))
            .peekable();

        let mut program = words.next()?;
        if RUNNERS.contains(&program) {
            program = words.next()?;
        } else if program == "pnpm" && words.peek() == Some(&"dlx") {
            words.next();
            program = words.next()?;
        }

        let program = program.rsplit(['/', '\\']).next().unwrap_or(program);
        let program = program.strip_suffix(".exe").unwrap_or(program);
        let agent = AgentType::from_binary(program)?;
        if agent.rules().exclusions.is_match(command) {
            debug!(command, %agent, "invocation suppressed by exclusion rule");
            return None;
        }
        Some(agent)
    }
}

/// Whether excluded vocabulary shows up as prose, ignoring the prompt's own
/// host, path and directory tokens (a prompt in `~/src/claude-demo` is still a prompt).
fn has_prose_vocabulary(text: &str) -> bool {
    if RE_PROMPT_CODE_SYMBOLS.is_match(text) {
        return true;
    }
    let tokens: Vec<&str> = text.split_whitespace().collect();
    // Directory shown by glyph prompts: `➜  dir git:(main)` and `dir on main ❯`.
    let glyph_dir = match tokens.as_slice() {
        ["➜", ..] => Some(1),
        [.., "❯"] => Some(0),
        _ => None,
    };
    tokens
        .iter()
        .copied()
        .enumerate()
        .filter(|(i, token)| Some(*i) != glyph_dir && !token.contains(PROMPT_CHROME_CHARS))
        .map(|(_, token)| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty() && word.chars().all(char::is_alphabetic))
        .any(|word| {
            PROMPT_EXCLUDED_WORDS
                .iter()
                .any(|excluded| excluded.eq_ignore_ascii_case(word))
        })
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> PatternLibrary {
        PatternLibrary::new(100)
    }

    #[test]
    fn test_detect_startup_signatures() {
        let lib = library();
        assert_eq!(lib.detect_startup("✻ Welcome to Claude Code!"), Some(AgentType::Claude));
        assert_eq!(lib.detect_startup("Claude Code v1.0.43"), Some(AgentType::Claude));
        assert_eq!(lib.detect_startup(">_ OpenAI Codex (v0.20.0)"), Some(AgentType::Codex));
        assert_eq!(lib.detect_startup("Welcome to Gemini CLI"), Some(AgentType::Gemini));
        assert_eq!(lib.detect_startup("Qwen Code v0.0.9"), Some(AgentType::Qwen));
    }

    #[test]
    fn test_detect_startup_compound_rule() {
        let lib = library();
        assert_eq!(lib.detect_startup("gemini is ready"), Some(AgentType::Gemini));
        assert_eq!(lib.detect_startup("Codex initialized in ~/src"), Some(AgentType::Codex));
        // The name alone is not enough.
        assert_eq!(lib.detect_startup("I asked claude to refactor this"), None);
        // Neither is the keyword alone.
        assert_eq!(lib.detect_startup("server ready on port 8080"), None);
    }

    #[test]
    fn test_startup_exclusions() {
        let lib = library();
        assert_eq!(lib.detect_startup("claude may read configuration files"), None);
        assert_eq!(
            lib.detect_startup("Welcome to Claude Code, see https://docs.anthropic.com"),
            None
        );
        assert_eq!(lib.detect_startup("error: claude failed to start"), None);
        assert_eq!(lib.detect_startup("zsh: command not found: gemini ready"), None);
        assert_eq!(lib.detect_startup("claude available"), None);
        assert_eq!(lib.detect_startup("Welcome! Loaded CLAUDE.md for claude"), None);
    }

    #[test]
    fn test_exit_phrases() {
        let lib = library();
        assert!(lib.is_exit_phrase("Goodbye!"));
        assert!(lib.is_exit_phrase("/exit"));
        assert!(lib.is_exit_phrase("Session ended."));
        assert!(lib.is_exit_phrase("KeyboardInterrupt"));
        assert!(lib.is_exit_phrase("Received SIGINT, shutting down"));
        assert!(lib.is_exit_phrase("^D"));
        assert!(!lib.is_exit_phrase("Type /exit to leave"));
        assert!(!lib.is_exit_phrase(""));
    }

    #[test]
    fn test_long_lines_never_terminate() {
        let lib = library();
        let prose = format!(
            "Exiting early from the loop is handled by the guard clause below, {}",
            "which keeps the happy path unindented and easy to follow in review"
        );
        assert!(prose.chars().count() > 100);
        assert!(!lib.is_exit_phrase(&prose));

        let session = format!("Session ended {}", "x".repeat(100));
        assert!(!lib.is_exit_phrase(&session));
    }

    #[test]
    fn test_prompt_shapes() {
        let lib = library();
        for prompt in [
            "user@host:~$",
            "root@box:/var/log#",
            "dev@laptop %",
            "[user@host project]$",
            "~/src/app %",
            "➜  myproject git:(main) ✗",
            "myproject on main ❯",
            "PS C:\\Users\\me>",
            "C:\\Users\\me>",
            "[12:30:01] ~/src $",
            "(venv) user@host:~/proj$",
        ] {
            assert!(lib.is_prompt_return(prompt, ""), "expected prompt: {prompt}");
        }
    }

    #[test]
    fn test_prompt_in_agent_or_keyword_named_directory() {
        let lib = library();
        for prompt in [
            "user@host:~/work/claude-demo$",
            "user@host:~/src/let-it-be$",
            "user@host:~/gemini$",
            "~/code/return-values %",
            "[dev@box codex]$",
            "➜  claude git:(main) ✗",
            "claude-demo on main ❯",
            "PS C:\\Users\\me\\qwen>",
            "(venv) user@host:~/class-notes$",
        ] {
            assert!(lib.is_prompt_return(prompt, ""), "expected prompt: {prompt}");
        }
    }

    #[test]
    fn test_bare_sigil_is_not_a_prompt() {
        let lib = library();
        for sigil in ["$", "#", "%"] {
            assert!(!lib.is_prompt_return(sigil, ""), "sigil {sigil}");
            assert!(!lib.is_prompt_return(sigil, &format!("ho{sigil}")), "window for {sigil}");
        }
    }

    #[test]
    fn test_prompt_split_across_lines() {
        let lib = library();
        assert!(!lib.is_prompt_return("st:~/proj$", ""));
        assert!(lib.is_prompt_return("st:~/proj$", "user@host:~/proj$"));
    }

    #[test]
    fn test_prompt_exclusions() {
        let lib = library();
        assert!(!lib.is_prompt_return("Claude is thinking... $", ""));
        assert!(!lib.is_prompt_return("(assistant) writing code %", ""));
        assert!(!lib.is_prompt_return("[10:01] const total = price * qty; $", ""));
        assert!(!lib.is_prompt_return("user@host:~$ claude", ""));
        assert!(!lib.is_prompt_return("> ", ""));
    }

    #[test]
    fn test_detect_invocation() {
        let lib = library();
        assert_eq!(lib.detect_invocation("claude"), Some(AgentType::Claude));
        assert_eq!(lib.detect_invocation("claude --resume"), Some(AgentType::Claude));
        assert_eq!(lib.detect_invocation("/opt/bin/gemini -m pro"), Some(AgentType::Gemini));
        assert_eq!(lib.detect_invocation("npx codex"), Some(AgentType::Codex));
        assert_eq!(lib.detect_invocation("pnpm dlx qwen"), Some(AgentType::Qwen));
        assert_eq!(lib.detect_invocation("DEBUG=1 claude"), Some(AgentType::Claude));
        assert_eq!(lib.detect_invocation("ls -la"), None);
        assert_eq!(lib.detect_invocation("git commit -m claude"), None);
        assert_eq!(lib.detect_invocation(""), None);
    }

    #[test]
    fn test_invocation_exclusions() {
        let lib = library();
        assert_eq!(lib.detect_invocation("claude may read configuration files"), None);
    }

    #[test]
    fn test_classify_combines_rules() {
        let lib = library();
        let classification = lib.classify("user@host:~$", "");
        assert!(classification.prompt_return);
        assert!(classification.is_termination());
        assert_eq!(classification.startup, None);

        let classification = lib.classify("Welcome to Claude Code!", "");
        assert_eq!(classification.startup, Some(AgentType::Claude));
        assert!(!classification.is_termination());
    }
}
