//! `revtrust`: score reviews for authenticity from the command line.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use revtrust_runtime::{load_engine, RuntimeConfig, RuntimeError, ScoredReview, ScoringService};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML runtime configuration
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// TF-IDF encoder artifact (overrides the config)
    #[arg(long, global = true)]
    encoder: Option<PathBuf>,

    /// Tree ensemble artifact (overrides the config)
    #[arg(long, global = true)]
    lexical_model: Option<PathBuf>,

    /// Semantic model directory (overrides the config)
    #[arg(long, global = true)]
    semantic_model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one review as genuine or fake
    Predict {
        /// Review text
        text: String,
        /// Include contributors and a narrative
        #[arg(long)]
        report: bool,
        /// Contributors per list (defaults to the config)
        #[arg(long)]
        top_n: Option<usize>,
    },
    /// List the words that pushed the lexical model either way
    Explain {
        /// Review text
        text: String,
        /// Contributors per list (defaults to the config)
        #[arg(long)]
        top_n: Option<usize>,
    },
    /// Score one review per line from a file, or stdin when omitted
    Batch {
        file: Option<PathBuf>,
    },
    /// Report which artifacts loaded; fails unless scoring is possible
    Check,
}

#[derive(Serialize)]
struct BatchLine {
    line: usize,
    #[serde(flatten)]
    outcome: BatchOutcome,
}

#[derive(Serialize)]
#[serde(untagged)]
enum BatchOutcome {
    Scored(ScoredReview),
    Failed { error: String, status: u16 },
}

#[derive(Serialize)]
struct ArtifactStatus {
    artifact: String,
    loaded: bool,
}

#[derive(Serialize)]
struct CheckReport {
    ready: bool,
    artifacts: Vec<ArtifactStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<RuntimeConfig> {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RuntimeConfig::default(),
    };

    if let Some(path) = &cli.encoder {
        config.artifacts.encoder = Some(path.clone());
    }
    if let Some(path) = &cli.lexical_model {
        config.artifacts.lexical_model = Some(path.clone());
    }
    if let Some(path) = &cli.semantic_model_dir {
        config.artifacts.semantic_model_dir = Some(path.clone());
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn request_failed(e: RuntimeError) -> anyhow::Error {
    anyhow::anyhow!("{} (status {})", e, e.status())
}

fn read_lines(file: Option<&PathBuf>) -> Result<Vec<String>> {
    let reader: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    reader
        .lines()
        .collect::<io::Result<Vec<_>>>()
        .context("reading reviews")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    tracing::debug!(?config, "Configuration resolved");

    let engine = load_engine(&config.artifacts, config.scoring.max_length);
    let service = ScoringService::new(engine, &config);

    match cli.command {
        Commands::Predict {
            text,
            report,
            top_n,
        } => {
            if report {
                let top_n = top_n.unwrap_or(service.top_n());
                let report = service.report(&text, top_n).await.map_err(request_failed)?;
                print_json(&report)?;
            } else {
                let scored = service.predict(&text).await.map_err(request_failed)?;
                print_json(&scored)?;
            }
        }
        Commands::Explain { text, top_n } => {
            let top_n = top_n.unwrap_or(service.top_n());
            let explanation = service.explain(&text, top_n).await.map_err(request_failed)?;
            print_json(&explanation)?;
        }
        Commands::Batch { file } => {
            let texts = read_lines(file.as_ref())?;
            let results = service.predict_batch(&texts).await;

            let mut failed = 0;
            let lines: Vec<BatchLine> = results
                .into_iter()
                .enumerate()
                .map(|(i, result)| BatchLine {
                    line: i + 1,
                    outcome: match result {
                        Ok(scored) => BatchOutcome::Scored(scored),
                        Err(e) => {
                            failed += 1;
                            BatchOutcome::Failed {
                                error: e.to_string(),
                                status: e.status(),
                            }
                        }
                    },
                })
                .collect();
            print_json(&lines)?;

            if failed > 0 {
                bail!("{} of {} reviews failed", failed, texts.len());
            }
        }
        Commands::Check => {
            let engine = service.engine();
            let readiness = engine.ensure_scorers_ready();
            let report = CheckReport {
                ready: readiness.is_ok(),
                artifacts: engine
                    .availability()
                    .iter()
                    .map(|(artifact, loaded)| ArtifactStatus {
                        artifact: artifact.to_string(),
                        loaded: *loaded,
                    })
                    .collect(),
                error: readiness.err().map(|e| e.to_string()),
            };
            print_json(&report)?;

            if !report.ready {
                bail!("engine is not ready to score");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_predict() {
        let cli = Cli::try_parse_from([
            "revtrust",
            "--config",
            "revtrust.yaml",
            "predict",
            "Great product",
            "--report",
            "--top-n",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("revtrust.yaml")));
        match cli.command {
            Commands::Predict {
                text,
                report,
                top_n,
            } => {
                assert_eq!(text, "Great product");
                assert!(report);
                assert_eq!(top_n, Some(3));
            }
            _ => panic!("expected predict"),
        }
    }

    #[test]
    fn test_global_artifact_override() {
        let cli = Cli::try_parse_from(["revtrust", "check", "--encoder", "tfidf.json"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.artifacts.encoder, Some(PathBuf::from("tfidf.json")));
        assert!(config.artifacts.lexical_model.is_none());
    }

    #[test]
    fn test_predict_requires_text() {
        assert!(Cli::try_parse_from(["revtrust", "predict"]).is_err());
    }

    #[test]
    fn test_failed_batch_line_shape() {
        let line = BatchLine {
            line: 2,
            outcome: BatchOutcome::Failed {
                error: "Invalid input: review text is empty".to_string(),
                status: 400,
            },
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["line"], 2);
        assert_eq!(json["status"], 400);
    }
}
