//! String-resource lookup.
//!
//! Each locale is a flat TOML table of `key = "text"` pairs stored as
//! `<locale>.toml` inside a language directory. Lookups fall back to the
//! default locale, then to the key itself so a missing string never breaks a
//! notification.

use std::{collections::HashMap, path::Path};

use tracing::{debug, warn};

use crate::error::{Context, Result};

/// Resolves a string key for a locale.
pub trait Localizer: Send + Sync {
    fn resolve(&self, key: &str, locale: &str) -> String;

    /// Resolve and substitute positional `{0}`, `{1}`, ... placeholders.
    fn resolve_with(&self, key: &str, locale: &str, args: &[&str]) -> String {
        let mut text = self.resolve(key, locale);
        for (i, arg) in args.iter().enumerate() {
            text = text.replace(&format!("{{{i}}}"), arg);
        }
        text
    }
}

/// In-memory string catalog keyed by locale name.
#[derive(Debug, Clone)]
pub struct Catalog {
    default_locale: String,
    tables: HashMap<String, HashMap<String, String>>,
}

impl Catalog {
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default_locale: default_locale.into(),
            tables: HashMap::new(),
        }
    }

    /// Add or replace a single entry.
    #[must_use]
    pub fn with_entry(
        mut self,
        locale: impl Into<String>,
        key: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.tables
            .entry(locale.into())
            .or_default()
            .insert(key.into(), text.into());
        self
    }

    /// Load every `*.toml` file in `dir`; the file stem is the locale name.
    ///
    /// A file that fails to parse is skipped with a warning, except the
    /// default locale, which must load.
    pub fn load_dir(dir: &Path, default_locale: &str) -> Result<Self> {
        let mut catalog = Self::new(default_locale);
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read language dir {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let Some(locale) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = std::fs::read_to_string(&path)?;
            match toml::from_str::<HashMap<String, String>>(&raw) {
                Ok(table) => {
                    debug!(locale, strings = table.len(), "loaded language file");
                    catalog.tables.insert(locale.to_string(), table);
                },
                Err(e) if locale == default_locale => return Err(e.into()),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping malformed language file");
                },
            }
        }

        catalog
            .tables
            .get(default_locale)
            .with_context(|| format!("default language file {default_locale}.toml not found"))?;
        Ok(catalog)
    }

    #[must_use]
    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    /// Loaded locale names, sorted.
    #[must_use]
    pub fn locales(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Localizer for Catalog {
    fn resolve(&self, key: &str, locale: &str) -> String {
        self.tables
            .get(locale)
            .and_then(|t| t.get(key))
            .or_else(|| {
                self.tables
                    .get(&self.default_locale)
                    .and_then(|t| t.get(key))
            })
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::new("English")
            .with_entry("English", "NodeShutsDown", "The game server is shutting down.")
            .with_entry("English", "GameStarting", "{0} started a game on {1}")
            .with_entry("Deutsch", "NodeShutsDown", "Der Spielserver wird beendet.")
    }

    #[test]
    fn resolves_requested_locale() {
        assert_eq!(
            catalog().resolve("NodeShutsDown", "Deutsch"),
            "Der Spielserver wird beendet."
        );
    }

    #[test]
    fn falls_back_to_default_then_key() {
        let c = catalog();
        assert_eq!(
            c.resolve("GameStarting", "Deutsch"),
            "{0} started a game on {1}"
        );
        assert_eq!(c.resolve("Missing", "Deutsch"), "Missing");
    }

    #[test]
    fn positional_arguments() {
        assert_eq!(
            catalog().resolve_with("GameStarting", "English", &["alice", "node-1"]),
            "alice started a game on node-1"
        );
    }

    #[test]
    fn load_dir_reads_toml_tables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("English.toml"),
            "NodeShutsDown = \"bye\"\nNoNodesAvailable = \"busy\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("Broken.toml"), "not = [valid").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let c = Catalog::load_dir(dir.path(), "English").unwrap();
        assert_eq!(c.locales(), vec!["English"]);
        assert_eq!(c.resolve("NoNodesAvailable", "Broken"), "busy");
    }

    #[test]
    fn load_dir_requires_default_locale() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Deutsch.toml"), "a = \"b\"\n").unwrap();
        let err = Catalog::load_dir(dir.path(), "English").unwrap_err();
        assert!(err.to_string().contains("English.toml"), "{err}");
    }
}
