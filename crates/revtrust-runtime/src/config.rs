//! Runtime configuration, read from YAML.
//!
//! ```yaml
//! artifacts:
//!   encoder: models/tfidf.json
//!   lexical_model: models/trees.json
//!   semantic_model_dir: models/bert
//! scoring:
//!   top_n: 5
//!   max_length: 512
//! cache:
//!   max_entries: 10000
//!   ttl: 1h
//! request_timeout: 5s
//! max_concurrency: 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use revtrust_core::{DEFAULT_TOP_N, MAX_SEQUENCE_LENGTH};

use crate::RuntimeError;

/// Where each fitted artifact lives. Any of them may be left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactPaths {
    /// TF-IDF vectorizer export (JSON)
    pub encoder: Option<PathBuf>,

    /// Tree ensemble export (JSON); also drives attribution
    pub lexical_model: Option<PathBuf>,

    /// Directory holding config.json, tokenizer.json and model.safetensors
    pub semantic_model_dir: Option<PathBuf>,
}

impl ArtifactPaths {
    /// Resolve relative paths against `base`.
    pub fn relative_to(mut self, base: &Path) -> Self {
        for path in [
            &mut self.encoder,
            &mut self.lexical_model,
            &mut self.semantic_model_dir,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    /// Contributors per list in explanations
    pub top_n: usize,

    /// Token window for the semantic model
    pub max_length: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            max_length: MAX_SEQUENCE_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Zero disables caching
    pub max_entries: u64,

    #[serde(with = "humantime_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub artifacts: ArtifactPaths,
    pub scoring: ScoringConfig,
    pub cache: CacheConfig,

    /// Upper bound on a single request, including queueing for a worker
    #[serde(with = "humantime_duration")]
    pub request_timeout: Duration,

    /// Requests in flight at once during batch scoring
    pub max_concurrency: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            artifacts: ArtifactPaths::default(),
            scoring: ScoringConfig::default(),
            cache: CacheConfig::default(),
            request_timeout: Duration::from_secs(5),
            max_concurrency: 4,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, RuntimeError> {
        let config: RuntimeConfig =
            serde_yaml::from_str(yaml).map_err(|e| RuntimeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file. Relative artifact paths resolve against the
    /// file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RuntimeError::Config(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_yaml(&contents)?;
        if let Some(base) = path.parent() {
            config.artifacts = config.artifacts.relative_to(base);
        }
        tracing::debug!(path = %path.display(), "Runtime config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.scoring.max_length == 0 {
            return Err(RuntimeError::Config(
                "scoring.max_length must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(RuntimeError::Config(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(RuntimeError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.cache.max_entries > 0 && self.cache.ttl.is_zero() {
            return Err(RuntimeError::Config(
                "cache.ttl must be greater than zero when caching is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.scoring.top_n, 5);
        assert_eq!(config.scoring.max_length, 512);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
artifacts:
  encoder: models/tfidf.json
  lexical_model: models/trees.json
scoring:
  top_n: 3
cache:
  max_entries: 500
  ttl: 30m
request_timeout: 2s 500ms
max_concurrency: 8
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.scoring.top_n, 3);
        assert_eq!(config.scoring.max_length, 512);
        assert_eq!(config.cache.ttl, Duration::from_secs(1800));
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.max_concurrency, 8);
        assert!(config.artifacts.semantic_model_dir.is_none());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(RuntimeConfig::from_yaml("{}").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_rejects_bad_duration() {
        let err = RuntimeConfig::from_yaml("request_timeout: soon").unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_field() {
        assert!(RuntimeConfig::from_yaml("threads: 4").is_err());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = RuntimeConfig::from_yaml("max_concurrency: 0").unwrap_err();
        assert_eq!(
            err,
            RuntimeError::Config("max_concurrency must be at least 1".to_string())
        );
    }

    #[test]
    fn test_relative_paths() {
        let paths = ArtifactPaths {
            encoder: Some(PathBuf::from("tfidf.json")),
            lexical_model: Some(PathBuf::from("/abs/trees.json")),
            semantic_model_dir: None,
        }
        .relative_to(Path::new("/etc/revtrust"));

        assert_eq!(paths.encoder, Some(PathBuf::from("/etc/revtrust/tfidf.json")));
        assert_eq!(paths.lexical_model, Some(PathBuf::from("/abs/trees.json")));
    }
}
