/// Prompt inference from a startup banner and recognition of its reappearance
use regex::Regex;
use std::sync::OnceLock;

/// Lines longer than this are never treated as a prompt by the shape heuristic
const MAX_HEURISTIC_PROMPT_LEN: usize = 48;

const KNOWN_PROMPTS: &[&str] = &[
    // POSIX shells: `$`, `user@host:~/dir$`, `bash-5.2#`, `(venv) user%`
    r"^(?:\([^)]*\)\s*)?[\w.@~:/\-\[\] ]*[$#%]$",
    // Python / IPython
    r"^(?:>>>|\.\.\.)$",
    r"^In \[\d+\]:$",
    // Ruby irb / pry
    r"^irb\([^)]*\):\d+(?::\d+)?[>*]$",
    r"^\[\d+\] pry\([^)]*\)>$",
    // Node, Lua, generic bare markers
    r"^[>❯»]$",
    // Named REPLs and database clients: `mysql>`, `postgres=#`, `sqlite>`, `127.0.0.1:6379>`
    r"^[\w.\-:]+(?:\([^)]*\))?[=\-]?[>#]$",
    // PowerShell
    r"^PS .+>$",
];

fn known_prompts() -> &'static [Regex] {
    static PROMPTS: OnceLock<Vec<Regex>> = OnceLock::new();
    PROMPTS.get_or_init(|| {
        KNOWN_PROMPTS
            .iter()
            .map(|p| Regex::new(p).expect("prompt pattern must compile"))
            .collect()
    })
}

fn digits() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"[0-9]+").expect("digit pattern must compile"))
}

/// Last line of `screen` that has any non-whitespace content
pub fn last_non_blank_line(screen: &str) -> Option<&str> {
    screen.lines().rev().find(|line| !line.trim().is_empty())
}

/// Heuristic prompt recognizer
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptDetector;

impl PromptDetector {
    pub fn new() -> Self {
        Self
    }

    /// Whether a single line looks like a prompt
    pub fn looks_like_prompt(&self, line: &str) -> bool {
        let candidate = line.trim_end();
        if candidate.trim().is_empty() {
            return false;
        }

        if known_prompts().iter().any(|re| re.is_match(candidate)) {
            return true;
        }

        candidate.chars().count() <= MAX_HEURISTIC_PROMPT_LEN
            && candidate
                .chars()
                .last()
                .is_some_and(|c| matches!(c, '$' | '#' | '%' | '>' | ':' | '❯' | '»'))
    }

    /// Exact-match pattern for a prompt line, anchored at end of line.
    /// Digit runs are generalized so counters such as `In [3]:` keep matching.
    pub fn pattern_for(&self, line: &str) -> Option<Regex> {
        let literal = line.trim();
        if literal.is_empty() {
            return None;
        }
        let escaped = regex::escape(literal);
        let generalized = digits().replace_all(&escaped, r"\d+");
        Regex::new(&format!(r"{}\s*$", generalized)).ok()
    }

    /// Infer the prompt pattern from the last non-empty line of a screen
    pub fn infer(&self, screen: &str) -> Option<Regex> {
        let line = last_non_blank_line(screen)?;
        if self.looks_like_prompt(line) {
            self.pattern_for(line)
        } else {
            None
        }
    }

    /// Whether the last non-blank line of `screen` matches `pattern`
    pub fn matches(&self, pattern: &Regex, screen: &str) -> bool {
        last_non_blank_line(screen)
            .map(|line| pattern.is_match(line.trim_end()))
            .unwrap_or(false)
    }
}
