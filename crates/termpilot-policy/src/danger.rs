use regex::Regex;
use std::sync::OnceLock;

/// A single destructive-input rule
pub struct DangerRule {
    pattern: Regex,
    pub reason: &'static str,
}

/// Classification of a candidate input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DangerVerdict {
    Safe,
    Dangerous(&'static str),
}

impl DangerVerdict {
    pub fn is_dangerous(&self) -> bool {
        matches!(self, DangerVerdict::Dangerous(_))
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            DangerVerdict::Safe => None,
            DangerVerdict::Dangerous(reason) => Some(reason),
        }
    }
}

// Ordered: the first match is the reported reason.
const RULES: &[(&str, &str)] = &[
    (
        r"\brm\s+(?:-[^\s]*\s+)*(?:-[a-zA-Z]*[rR][a-zA-Z]*f[a-zA-Z]*|-[a-zA-Z]*f[a-zA-Z]*[rR][a-zA-Z]*)(?:\s|$)",
        "Recursive force delete",
    ),
    (
        r"\brm\s+(?:-[^\s]*\s+)*(?:(?:-r|-R|--recursive)\s+(?:-[^\s]*\s+)*(?:-f|--force)|(?:-f|--force)\s+(?:-[^\s]*\s+)*(?:-r|-R|--recursive))(?:\s|$)",
        "Recursive force delete",
    ),
    (r"\bmkfs(?:\.[a-z0-9]+)?\b", "Filesystem format"),
    (r"\bdd\b[^\n]*\bof=/dev/", "Raw device write"),
    (r">\s*/dev/(?:sd[a-z]|hd[a-z]|nvme\d|vd[a-z]|xvd[a-z]|disk\d|mmcblk\d)", "Raw device write"),
    (r"(?i)\bdrop\s+(?:table|database|schema)\b", "SQL DROP statement"),
    (r"(?i)\btruncate\s+(?:table\s+)?[`\x22\w.]+", "SQL TRUNCATE statement"),
    (r"(?i)\bdelete\s+from\s+[`\x22\w.]+\s*(?:;|$)", "SQL DELETE without WHERE clause"),
    (
        r"\b(?:curl|wget)\b[^|\n]*\|\s*(?:sudo\s+)?(?:ba|z|da|k|fi)?sh\b",
        "Piping remote script to shell",
    ),
    (r"\bchmod\s+(?:-[^\s]*\s+)*(?:0?777|a\+rwx|ugo\+rwx|o\+w)\b", "World-writable permission change"),
    (r"\bchown\s+(?:-[^\s]*\s+)*(?:-R|--recursive)\b", "Recursive ownership change"),
    (r"\bsystemctl\s+(?:stop|disable|mask)\b", "Stopping system service"),
    (r"\bservice\s+\S+\s+stop\b", "Stopping system service"),
    (r"\bkill\s+(?:-9|-KILL|-SIGKILL|-s\s+KILL)\b", "Force kill process"),
    (r"\bpkill\s+(?:-9|-KILL)\b", "Force kill process"),
    (r"\bkillall\b", "Force kill process"),
    (r"\b(?:fdisk|sfdisk|gdisk|parted|wipefs)\b", "Partition table modification"),
    (r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "Fork bomb"),
    (
        r">\s*/etc/(?:passwd|shadow|group|sudoers|hosts|fstab|resolv\.conf|crontab)\b",
        "System configuration overwrite",
    ),
];

fn rules() -> &'static [DangerRule] {
    static RULE_TABLE: OnceLock<Vec<DangerRule>> = OnceLock::new();
    RULE_TABLE.get_or_init(|| {
        RULES
            .iter()
            .map(|(pattern, reason)| DangerRule {
                pattern: Regex::new(pattern).expect("danger rule pattern must compile"),
                reason,
            })
            .collect()
    })
}

/// Pattern-based classifier for destructive input
#[derive(Debug, Clone, Copy, Default)]
pub struct DangerDetector;

impl DangerDetector {
    pub fn new() -> Self {
        Self
    }

    /// First matching rule's reason, or `Safe`
    pub fn detect(&self, input: &str) -> DangerVerdict {
        rules()
            .iter()
            .find(|rule| rule.pattern.is_match(input))
            .map(|rule| DangerVerdict::Dangerous(rule.reason))
            .unwrap_or(DangerVerdict::Safe)
    }

    /// Every matching reason, deduplicated, in table order
    pub fn detect_all(&self, input: &str) -> Vec<&'static str> {
        let mut reasons: Vec<&'static str> = Vec::new();
        for rule in rules() {
            if rule.pattern.is_match(input) && !reasons.contains(&rule.reason) {
                reasons.push(rule.reason);
            }
        }
        reasons
    }
}
