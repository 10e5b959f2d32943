//! Configuration validation.
//!
//! Detects unknown/misspelled fields in TOML files and checks the loaded
//! values for settings that would leave the control plane unable to place
//! sessions or reach the chat platform.

use std::{net::SocketAddr, path::Path};

use crate::{env_subst::substitute_env, schema::HowlConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "value", "credential", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "fleet.max_sessions_per_worker"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Known keys ──────────────────────────────────────────────────────────────

/// Section name → accepted keys. Only one level is checked: `metrics.labels`
/// and `channels.telegram` are free-form, the latter is parsed by the telegram
/// crate.
const KNOWN_SECTIONS: &[(&str, &[&str])] = &[
    ("fleet", &[
        "max_sessions_per_worker",
        "shutdown_notify_threshold",
        "health_interval_secs",
        "idle_timeout_secs",
    ]),
    ("workers", &[
        "bind",
        "port",
        "handshake_timeout_ms",
        "heartbeat_interval_ms",
    ]),
    ("locale", &["dir", "default_locale"]),
    ("access", &["dev_user_ids", "admin_user_ids", "blocked_user_ids"]),
    ("metrics", &["enabled", "listen", "labels"]),
    ("channels", &["telegram"]),
];

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

fn unknown_field(path: String, key: &str, candidates: &[&str]) -> Diagnostic {
    let message = match suggest(key, candidates, 3) {
        Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
        None => "unknown field".to_string(),
    };
    Diagnostic::new(Severity::Error, "unknown-field", path, message)
}

fn check_unknown_fields(root: &toml::Table, diagnostics: &mut Vec<Diagnostic>) {
    let section_names: Vec<&str> = KNOWN_SECTIONS.iter().map(|(name, _)| *name).collect();
    for (section, value) in root {
        let Some((_, keys)) = KNOWN_SECTIONS.iter().find(|(name, _)| name == section) else {
            diagnostics.push(unknown_field(section.clone(), section, &section_names));
            continue;
        };
        match value.as_table() {
            Some(table) => {
                for key in table.keys().filter(|k| !keys.contains(&k.as_str())) {
                    diagnostics.push(unknown_field(format!("{section}.{key}"), key, keys));
                }
            },
            None => diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                section.clone(),
                "expected a table",
            )),
        }
    }
}

// ── Semantic checks ─────────────────────────────────────────────────────────

/// Check loaded values. Used both by `validate` and at startup.
#[must_use]
pub fn check_config(config: &HowlConfig) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let fleet = &config.fleet;

    if fleet.max_sessions_per_worker == 0 {
        out.push(Diagnostic::new(
            Severity::Error,
            "value",
            "fleet.max_sessions_per_worker",
            "must be at least 1, otherwise no session can ever be placed",
        ));
    } else if fleet.shutdown_notify_threshold >= fleet.max_sessions_per_worker {
        out.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "fleet.shutdown_notify_threshold",
            "not below the worker capacity; shutdown notices will never be sent",
        ));
    }

    if fleet.health_interval_secs == 0 {
        out.push(Diagnostic::new(
            Severity::Error,
            "value",
            "fleet.health_interval_secs",
            "must be at least 1",
        ));
    }
    if fleet.idle_timeout_secs < fleet.health_interval_secs {
        out.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "fleet.idle_timeout_secs",
            "shorter than the health interval; idle workers are only noticed once per sweep",
        ));
    }

    let workers = &config.workers;
    if workers.heartbeat_interval_ms == 0 {
        out.push(Diagnostic::new(
            Severity::Error,
            "value",
            "workers.heartbeat_interval_ms",
            "must be at least 1",
        ));
    } else if workers.heartbeat_interval_ms >= fleet.idle_timeout_secs.saturating_mul(1000) {
        out.push(Diagnostic::new(
            Severity::Error,
            "value",
            "workers.heartbeat_interval_ms",
            "not below fleet.idle_timeout_secs; healthy workers would be removed as idle",
        ));
    }

    match config
        .channels
        .telegram
        .as_ref()
        .and_then(|t| t.get("token"))
        .and_then(|t| t.as_str())
    {
        None | Some("") => out.push(Diagnostic::new(
            Severity::Error,
            "credential",
            "channels.telegram.token",
            "no bot token configured (set it or HOWL_TELEGRAM_TOKEN)",
        )),
        Some(token) if token.contains("${") => out.push(Diagnostic::new(
            Severity::Error,
            "credential",
            "channels.telegram.token",
            format!("unresolved environment placeholder {token}"),
        )),
        Some(_) => {},
    }

    if config.metrics.enabled
        && let Some(listen) = &config.metrics.listen
        && listen.parse::<SocketAddr>().is_err()
    {
        out.push(Diagnostic::new(
            Severity::Error,
            "value",
            "metrics.listen",
            format!("\"{listen}\" is not a socket address"),
        ));
    }

    let access = &config.access;
    for id in access
        .dev_user_ids
        .iter()
        .chain(&access.admin_user_ids)
        .filter(|id| access.blocked_user_ids.contains(id))
    {
        out.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "access.blocked_user_ids",
            format!("user {id} is both privileged and blocked"),
        ));
    }

    if !config.locale.dir.is_dir() {
        out.push(Diagnostic::new(
            Severity::Warning,
            "file-ref",
            "locale.dir",
            format!(
                "{} does not exist; notices will show raw string keys",
                config.locale.dir.display()
            ),
        ));
    }

    out
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let is_toml = actual_path
        .extension()
        .and_then(|e| e.to_str())
        .is_none_or(|e| e == "toml");

    let mut result = match std::fs::read_to_string(actual_path) {
        Ok(content) if is_toml => validate_toml_str(&substitute_env(&content)),
        Ok(_) => match crate::loader::load_config(actual_path) {
            Ok(cfg) => ValidationResult {
                diagnostics: check_config(&cfg),
                config_path: None,
            },
            Err(e) => ValidationResult {
                diagnostics: vec![Diagnostic::new(
                    Severity::Error,
                    "syntax",
                    "",
                    e.to_string(),
                )],
                config_path: None,
            },
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = config_path;
    result
}

/// Validate TOML text: syntax, unknown fields, then value checks.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let table: toml::Table = match toml::from_str(toml_str) {
        Ok(t) => t,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("TOML syntax error: {e}"),
            ));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&table, &mut diagnostics);

    match toml::from_str::<HowlConfig>(toml_str) {
        Ok(config) => diagnostics.extend(check_config(&config)),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}
