//! Artifact loading.
//!
//! Each artifact is loaded on its own. One that is missing or unreadable is
//! logged and left out; the engine still starts and requests that need it
//! fail with `ArtifactUnavailable`.

use std::path::Path;
use std::sync::Arc;

use revtrust_core::{TfidfEncoder, TreeEnsemble, TrustEngine, TrustEngineBuilder};

use crate::config::ArtifactPaths;

/// Build an engine from whatever artifacts can be loaded.
pub fn load_engine(paths: &ArtifactPaths, max_length: usize) -> TrustEngine {
    let mut builder = TrustEngine::builder().max_length(max_length);

    match &paths.encoder {
        Some(path) => match TfidfEncoder::from_json_file(path) {
            Ok(encoder) => {
                tracing::info!(
                    path = %path.display(),
                    terms = encoder.dimension(),
                    "Feature encoder loaded"
                );
                builder = builder.encoder(Arc::new(encoder));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Feature encoder not loaded")
            }
        },
        None => tracing::warn!("No feature encoder configured"),
    }

    match &paths.lexical_model {
        Some(path) => match TreeEnsemble::from_json_file(path) {
            Ok(trees) => {
                tracing::info!(
                    path = %path.display(),
                    trees = trees.trees().len(),
                    "Lexical model loaded"
                );
                builder = builder.lexical_trees(Arc::new(trees));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Lexical model not loaded")
            }
        },
        None => tracing::warn!("No lexical model configured"),
    }

    match &paths.semantic_model_dir {
        Some(dir) => builder = load_semantic(builder, dir),
        None => tracing::warn!("No semantic model configured"),
    }

    builder.build()
}

#[cfg(feature = "ml")]
fn load_semantic(builder: TrustEngineBuilder, dir: &Path) -> TrustEngineBuilder {
    match crate::bert::BertSequenceClassifier::from_dir(dir) {
        Ok(model) => {
            tracing::info!(path = %dir.display(), "Semantic model loaded");
            let model = Arc::new(model);
            builder
                .semantic_tokenizer(model.clone())
                .semantic_model(model)
        }
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "Semantic model not loaded");
            builder
        }
    }
}

#[cfg(not(feature = "ml"))]
fn load_semantic(builder: TrustEngineBuilder, dir: &Path) -> TrustEngineBuilder {
    tracing::warn!(
        path = %dir.display(),
        "Semantic model configured but this build lacks the `ml` feature"
    );
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use revtrust_core::{Artifact, ScoringError};
    use std::path::PathBuf;

    const TFIDF: &str = r#"{"vocabulary": {"excellent": 0, "refund": 1}, "idf": [1.0, 1.5]}"#;

    const TREES: &str = r#"{
        "base_score": 0.0,
        "trees": [{"nodes": [
            {"kind": "split", "feature": 0, "threshold": 0.1, "yes": 1, "no": 2, "cover": 10.0},
            {"kind": "leaf", "value": -0.4, "cover": 6.0},
            {"kind": "leaf", "value": 1.2, "cover": 4.0}
        ]}]
    }"#;

    fn write_artifacts(name: &str) -> (PathBuf, ArtifactPaths) {
        let dir = std::env::temp_dir()
            .join(format!("revtrust-loader-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tfidf.json"), TFIDF).unwrap();
        std::fs::write(dir.join("trees.json"), TREES).unwrap();
        let paths = ArtifactPaths {
            encoder: Some(dir.join("tfidf.json")),
            lexical_model: Some(dir.join("trees.json")),
            semantic_model_dir: None,
        };
        (dir, paths)
    }

    #[test]
    fn test_loads_lexical_artifacts() {
        let (dir, paths) = write_artifacts("lexical");
        let engine = load_engine(&paths, 512);

        let explanation = engine.explain("Excellent!", 5).unwrap();
        assert_eq!(explanation.positive[0].feature, "excellent");

        // Semantic side is absent, so scoring fails as a whole
        assert_eq!(
            engine.predict("Excellent!"),
            Err(ScoringError::ArtifactUnavailable(Artifact::SemanticTokenizer))
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_tolerated() {
        let paths = ArtifactPaths {
            encoder: Some(PathBuf::from("/nonexistent/tfidf.json")),
            lexical_model: None,
            semantic_model_dir: None,
        };
        let engine = load_engine(&paths, 512);
        assert!(engine
            .availability()
            .iter()
            .all(|(_, loaded)| !loaded));
        assert_eq!(
            engine.explain("anything", 5),
            Err(ScoringError::ArtifactUnavailable(Artifact::FeatureEncoder))
        );
    }

    #[test]
    fn test_invalid_artifact_is_tolerated() {
        let (dir, mut paths) = write_artifacts("invalid");
        std::fs::write(dir.join("broken.json"), r#"{"vocabulary": {"a": 3}, "idf": [1.0]}"#)
            .unwrap();
        paths.encoder = Some(dir.join("broken.json"));

        let engine = load_engine(&paths, 512);
        assert!(engine
            .availability()
            .contains(&(Artifact::FeatureEncoder, false)));
        assert!(engine
            .availability()
            .contains(&(Artifact::LexicalModel, true)));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
