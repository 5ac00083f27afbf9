use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default lifetime of a cached view, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Per-corpus policy: how strictly user-authored definitions are treated and
/// how long materialized views stay cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory holding the corpus documents.
    pub path: PathBuf,
    /// Raise on malformed filter/view shapes instead of degrading.
    pub strict_on_definition_parse: bool,
    /// Raise on expression compile and field evaluation failures instead of
    /// degrading to empty values.
    pub strict_on_field_eval: bool,
    pub cache_ttl_secs: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            strict_on_definition_parse: false,
            strict_on_field_eval: false,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl CorpusConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Source of the cache lifetime for a corpus.
pub trait TtlSource: Send + Sync {
    fn ttl(&self, corpus: &str) -> Duration;
}

/// The same lifetime for every corpus.
#[derive(Debug, Clone, Copy)]
pub struct FixedTtl(pub Duration);

impl TtlSource for FixedTtl {
    fn ttl(&self, _corpus: &str) -> Duration {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub corpora: BTreeMap<String, CorpusConfig>,
}

impl Settings {
    /// Load settings from, in order of priority:
    /// 1. An explicit path (from --config)
    /// 2. The DOCBASE_CONFIG environment variable
    /// 3. The XDG config file (~/.config/docbase/config.yaml)
    ///
    /// Only the XDG location may be absent, which yields empty settings.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(val) = std::env::var("DOCBASE_CONFIG") {
            return Self::load(Path::new(&val));
        }

        let Some(home) =
            xdg::BaseDirectories::with_prefix("docbase").get_config_home()
        else {
            return Ok(Self::default());
        };
        let path = home.join("config.yaml");
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "settings file does not exist: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn corpus(&self, name: &str) -> Result<&CorpusConfig> {
        self.corpora.get(name).ok_or_else(|| Error::NotFound {
            kind: "corpus",
            name: name.to_string(),
        })
    }
}

impl TtlSource for Settings {
    fn ttl(&self, corpus: &str) -> Duration {
        self.corpora
            .get(corpus)
            .map(CorpusConfig::cache_ttl)
            .unwrap_or(Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fills_defaults() {
        let settings = Settings::parse(
            "corpora:\n  notes:\n    path: /tmp/notes\n    strict_on_field_eval: true\n",
        )
        .unwrap();
        let notes = settings.corpus("notes").unwrap();

        assert_eq!(notes.path, PathBuf::from("/tmp/notes"));
        assert!(notes.strict_on_field_eval);
        assert!(!notes.strict_on_definition_parse);
        assert_eq!(notes.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
    }

    #[test]
    fn empty_text_is_empty_settings() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
    }

    #[test]
    fn unknown_corpus_is_not_found() {
        let err = Settings::default().corpus("missing").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "corpus", .. }));
    }

    #[test]
    fn ttl_falls_back_to_default() {
        let settings = Settings::parse(
            "corpora:\n  fast:\n    path: /x\n    cache_ttl_secs: 5\n",
        )
        .unwrap();
        assert_eq!(settings.ttl("fast"), Duration::from_secs(5));
        assert_eq!(
            settings.ttl("other"),
            Duration::from_secs(DEFAULT_CACHE_TTL_SECS)
        );
    }

    #[test]
    fn load_with_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "corpora:\n  a:\n    path: /a\n").unwrap();

        let settings = Settings::resolve(Some(&path)).unwrap();
        assert!(settings.corpora.contains_key("a"));
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Settings::load(&tmp.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
