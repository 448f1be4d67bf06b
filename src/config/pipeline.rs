// src/config/pipeline.rs
//! Paths and run parameters, loaded from TOML.
//!
//! Resolution order:
//! 1) $SIGNALS_CONFIG_PATH
//! 2) config/pipeline.toml
//! 3) built-in defaults

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "SIGNALS_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub enriched_dir: PathBuf,
    pub clustered_file: PathBuf,
    pub results_dir: PathBuf,
    pub generation: GenerationConfig,
    pub outputs: OutputPaths,
    pub classifier: ClassifierConfig,
    pub reconcile: ReconcileConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enriched_dir: PathBuf::from("enriched_data"),
            clustered_file: PathBuf::from("data_output/clustered_triplets.json"),
            results_dir: PathBuf::from("evaluation_results"),
            generation: GenerationConfig::default(),
            outputs: OutputPaths::default(),
            classifier: ClassifierConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Persist after this many processed (non-skipped) items.
    pub checkpoint_every: usize,
    pub delay_ms: u64,
    pub timeout_secs: u64,
    pub classifier_char_budget: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: 5,
            delay_ms: 800,
            timeout_secs: 60,
            classifier_char_budget: crate::assemble::CLASSIFIER_CHAR_BUDGET,
        }
    }
}

impl GenerationConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputPaths {
    pub llm: PathBuf,
    pub classifier: PathBuf,
    pub lexicon: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            llm: PathBuf::from("data_output/gpt_signals_combined.json"),
            classifier: PathBuf::from("data_output/finbert_signals_combined.json"),
            lexicon: PathBuf::from("data_output/lexicon_signals_combined.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Text-classification inference endpoint (`POST {"inputs": "..."}`).
    pub endpoint: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/predict".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcileConfig {
    pub fuzzy_threshold: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: crate::reconcile::FUZZY_MATCH_THRESHOLD,
        }
    }
}

impl PipelineConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let mut cfg: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("parsing pipeline config {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("SIGNALS_CONFIG_PATH points to non-existent path"));
            }
        }
        let p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if p.exists() {
            return Self::load_from(&p);
        }
        Ok(Self::default())
    }

    fn sanitize(&mut self) {
        if self.generation.checkpoint_every == 0 {
            self.generation.checkpoint_every = GenerationConfig::default().checkpoint_every;
        }
        if self.generation.classifier_char_budget == 0 {
            self.generation.classifier_char_budget = crate::assemble::CLASSIFIER_CHAR_BUDGET;
        }
        if !(0.0..=1.0).contains(&self.reconcile.fuzzy_threshold) {
            self.reconcile.fuzzy_threshold = crate::reconcile::FUZZY_MATCH_THRESHOLD;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("pipeline.toml");
        fs::write(
            &p,
            r#"
enriched_dir = "data/enriched"

[generation]
checkpoint_every = 0
delay_ms = 10

[reconcile]
fuzzy_threshold = 4.0
"#,
        )
        .unwrap();
        let cfg = PipelineConfig::load_from(&p).unwrap();
        assert_eq!(cfg.enriched_dir, PathBuf::from("data/enriched"));
        assert_eq!(cfg.generation.checkpoint_every, 5);
        assert_eq!(cfg.generation.delay_ms, 10);
        assert_eq!(cfg.generation.timeout_secs, 60);
        assert_eq!(cfg.reconcile.fuzzy_threshold, 0.9);
        assert_eq!(cfg.outputs, OutputPaths::default());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);

        assert_eq!(PipelineConfig::load_default().unwrap(), PipelineConfig::default());

        let p = tmp.path().join("custom.toml");
        fs::write(&p, r#"results_dir = "out""#).unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = PipelineConfig::load_default().unwrap();
        assert_eq!(cfg.results_dir, PathBuf::from("out"));

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));
        assert!(PipelineConfig::load_default().is_err());
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
