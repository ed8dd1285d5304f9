//! Configuration validation with unknown field detection.

use serde_json::Value;
use std::collections::HashSet;

use super::{Config, StoreBackend};

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["model", "agent", "memory", "compaction", "logging"];

/// Known fields for each section.
const KNOWN_MODEL: &[&str] = &["api_key", "base_url", "model", "max_tokens", "temperature"];
const KNOWN_AGENT: &[&str] = &["system_prompt", "max_history", "stream_buffer"];
const KNOWN_MEMORY: &[&str] = &["backend", "path"];
const KNOWN_COMPACTION: &[&str] = &[
    "enabled",
    "max_tokens_before_summary",
    "max_tokens_for_recent_messages",
    "splice_summary",
    "summary_prompt",
];
const KNOWN_LOGGING: &[&str] = &["level", "format", "file"];

const SECTIONS: &[(&str, &[&str])] = &[
    ("model", KNOWN_MODEL),
    ("agent", KNOWN_AGENT),
    ("memory", KNOWN_MEMORY),
    ("compaction", KNOWN_COMPACTION),
    ("logging", KNOWN_LOGGING),
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn unknown_fields(
    obj: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut found = false;
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        found = true;
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let msg = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}' ({})", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, &path, msg));
    }
    found
}

/// Validate a raw config value: unknown fields, types, and semantic checks.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                "Config must be a JSON object",
            ));
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid syntax"));

    let mut has_unknown = unknown_fields(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);
    for (section, known) in SECTIONS {
        if let Some(fields) = obj.get(*section).and_then(|v| v.as_object()) {
            has_unknown |= unknown_fields(fields, known, section, &mut diagnostics);
        }
    }
    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    match serde_json::from_value::<Config>(raw.clone()) {
        Ok(config) => diagnostics.extend(check_semantics(&config)),
        Err(e) => diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "",
            format!("Invalid value: {}", e),
        )),
    }

    diagnostics
}

/// Checks on a parsed config that serde alone cannot express.
pub fn check_semantics(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.model.api_key.as_deref().map_or(true, str::is_empty) {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "model.api_key",
            "Not set; export COLLOQUY_MODEL_API_KEY before chatting",
        ));
    }
    if let Some(t) = config.model.temperature {
        if !(0.0..=2.0).contains(&t) {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Warn,
                "model.temperature",
                format!("{} is outside the usual 0.0 to 2.0 range", t),
            ));
        }
    }
    if config.agent.stream_buffer == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "agent.stream_buffer",
            "0 is treated as 1",
        ));
    }

    if config.memory.backend == StoreBackend::File && config.memory.path.is_none() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "memory.path",
            format!(
                "Not set; sessions go to {}",
                Config::dir().join("sessions").display()
            ),
        ));
    }

    let compaction = &config.compaction;
    if let Err(e) = compaction.validate() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "compaction",
            e.to_string(),
        ));
    } else if compaction.max_tokens_for_recent_messages >= compaction.max_tokens_before_summary {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "compaction.max_tokens_for_recent_messages",
            "Not below max_tokens_before_summary; compaction may summarize nothing",
        ));
    }

    if config.logging.level.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "logging.level",
            "Must not be empty",
        ));
    }

    diagnostics
}
