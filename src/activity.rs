use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// What an agent appears to be doing, judged from the tail of its log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Activity {
    /// Agent is actively processing (spinning, thinking)
    Busy,
    /// Agent is idle, waiting at prompt
    Idle,
    /// Agent is asking the user something
    WaitingForInput,
    /// Agent printed an error
    Error,
    /// Nothing recognisable in the output yet
    #[default]
    Unknown,
}

/// CSI, OSC and two-byte escapes as written by `tmux pipe-pane`
static RE_ANSI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(\x07|\x1b\\)|\x1b[@-Z\\-_]|\r").unwrap()
});

static RE_WAITING_INPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)(Do you want to|Press Enter|waiting for input|\? $|\[y/n\]|\(y/N\)|\(Y/n\)|❯ \d\.)").unwrap()
});

static RE_BUSY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)(esc to interrupt|Thinking|Processing|Working|⠋|⠙|⠹|⠸|⠼|⠴|⠦|⠧|⠇|⠏|✻|✶)").unwrap()
});

static RE_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(^Error:|^error(\[E\d+\])?:|API Error|FAILED|panicked at|^fatal:)").unwrap()
});

static RE_IDLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(^\$\s*$|^❯\s*$|^>\s*$|^│ >\s*│?$)").unwrap()
});

/// Remove terminal escape sequences so log text can be shown and matched
pub fn strip_ansi(content: &str) -> String {
    RE_ANSI.replace_all(content, "").into_owned()
}

/// Classify the most recent output of an agent
pub fn infer_activity(content: &str) -> Activity {
    let clean = strip_ansi(content);
    // Only the last screenful matters
    let lines: Vec<&str> = clean
        .lines()
        .rev()
        .filter(|l| !l.trim().is_empty())
        .take(15)
        .collect();
    let recent = lines.into_iter().rev().collect::<Vec<_>>().join("\n");

    // Priority order: WaitingForInput > Error > Busy > Idle > Unknown
    if RE_WAITING_INPUT.is_match(&recent) {
        Activity::WaitingForInput
    } else if RE_ERROR.is_match(&recent) {
        Activity::Error
    } else if RE_BUSY.is_match(&recent) {
        Activity::Busy
    } else if RE_IDLE.is_match(&recent) {
        Activity::Idle
    } else {
        Activity::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        let raw = "\x1b[1;32mok\x1b[0m done\r\n\x1b]0;title\x07next";
        assert_eq!(strip_ansi(raw), "ok done\nnext");
    }

    #[test]
    fn test_detect_waiting_for_input() {
        let content = "Edit src/main.rs\nDo you want to make this edit?\n❯ 1. Yes";
        assert_eq!(infer_activity(content), Activity::WaitingForInput);

        let content = "Continue? [y/n]";
        assert_eq!(infer_activity(content), Activity::WaitingForInput);
    }

    #[test]
    fn test_detect_busy_through_colors() {
        let content = "reading files\n\x1b[33m✻ Thinking…\x1b[0m (esc to interrupt)";
        assert_eq!(infer_activity(content), Activity::Busy);
    }

    #[test]
    fn test_detect_error() {
        let content = "cargo build\nerror[E0308]: mismatched types";
        assert_eq!(infer_activity(content), Activity::Error);
    }

    #[test]
    fn test_detect_idle_and_unknown() {
        assert_eq!(infer_activity("Previous output\n$ \n\n"), Activity::Idle);
        assert_eq!(infer_activity(""), Activity::Unknown);
    }
}
